//! Observable storage layer: per-(domain, key) change notification
//!
//! Subjects live in an [`ObservationRegistry`] owned by the
//! [`StorageEnvironment`](crate::environment::StorageEnvironment), keyed by a
//! type-erased (backend type, domain, key) identity. Storages constructed
//! independently over the same environment therefore share event streams.
//! Events carry the encoded bytes written by the mutation; each subscriber
//! decodes through its storage's coder, so a type-mismatched subscriber
//! observes `None` for that event rather than an error.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::coder::{CodingValue, DataCoder, JsonDataCoder};
use crate::coding::CodingStorage;
use crate::error::Result;
use crate::identity::{StorageIdentity, SubjectIdentity};
use crate::traits::KeyValueDataStorage;

const SUBJECT_CAPACITY: usize = 256;

/// Registry of change subjects, one per observed (backend type, domain, key)
#[derive(Clone, Default)]
pub struct ObservationRegistry {
    subjects: Arc<Mutex<HashMap<SubjectIdentity, broadcast::Sender<Option<Bytes>>>>>,
}

impl ObservationRegistry {
    /// Subject for the identity, created on first request
    pub(crate) fn subject(&self, identity: SubjectIdentity) -> broadcast::Sender<Option<Bytes>> {
        self.subjects
            .lock()
            .entry(identity)
            .or_insert_with(|| broadcast::channel(SUBJECT_CAPACITY).0)
            .clone()
    }

    /// Publish to the identity's subject, if anyone ever observed it
    pub(crate) fn publish(&self, identity: &SubjectIdentity, payload: Option<Bytes>) {
        if let Some(subject) = self.subjects.lock().get(identity) {
            // A send error only means there is no live subscriber right now.
            let _ = subject.send(payload);
        }
    }

    /// Publish an absent value to every subject under the given storage
    /// identity, regardless of which keys are currently live
    pub(crate) fn publish_domain(&self, storage: &StorageIdentity) {
        for (identity, subject) in self.subjects.lock().iter() {
            if identity.storage() == storage {
                let _ = subject.send(None);
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, identity: &SubjectIdentity) -> usize {
        self.subjects
            .lock()
            .get(identity)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

/// [`CodingStorage`] that additionally publishes a change event after every
/// mutation
pub struct ObservableCodingStorage<B: KeyValueDataStorage, C: DataCoder = JsonDataCoder> {
    inner: CodingStorage<B, C>,
    observations: ObservationRegistry,
}

impl<B: KeyValueDataStorage, C: DataCoder> ObservableCodingStorage<B, C> {
    /// Wrap a backend with the given coder and subject registry
    pub fn with_coder(backend: B, coder: Arc<C>, observations: ObservationRegistry) -> Self {
        Self {
            inner: CodingStorage::with_coder(backend, coder),
            observations,
        }
    }

    /// The resolved partition this storage operates on
    pub fn domain(&self) -> Option<&B::Domain> {
        self.inner.domain()
    }

    fn subject_identity(&self, key: &B::Key) -> SubjectIdentity {
        SubjectIdentity::new::<B>(self.domain(), key)
    }

    fn storage_identity(&self) -> StorageIdentity {
        StorageIdentity::new::<B>(self.domain())
    }

    /// Decoded value for `key`, or `None` if absent
    pub async fn fetch<V: CodingValue>(&self, key: &B::Key) -> Result<Option<V>> {
        self.inner.fetch(key).await
    }

    /// Encode and store a value, then notify the key's observers
    pub async fn save<V: CodingValue>(&self, value: &V, key: &B::Key) -> Result<()> {
        let encoded = self.inner.coder().encode(value)?;
        self.inner.save_encoded(encoded.clone(), key).await?;
        self.observations
            .publish(&self.subject_identity(key), Some(encoded));
        Ok(())
    }

    /// Remove the item, then notify the key's observers with an absent value
    pub async fn delete(&self, key: &B::Key) -> Result<()> {
        self.inner.delete(key).await?;
        self.observations.publish(&self.subject_identity(key), None);
        Ok(())
    }

    /// Save if a value is present, delete otherwise; observers see exactly
    /// one event either way
    pub async fn set<V: CodingValue>(&self, value: Option<&V>, key: &B::Key) -> Result<()> {
        match value {
            Some(value) => self.save(value, key).await,
            None => self.delete(key).await,
        }
    }

    /// Clear the domain, then notify every key ever observed under it with
    /// an absent value
    pub async fn clear(&self) -> Result<()> {
        self.inner.clear().await?;
        self.observations.publish_domain(&self.storage_identity());
        Ok(())
    }

    /// Hot subscription to the key's change events.
    ///
    /// The first request for a (domain, key) creates its subject; later
    /// requests, including from a different storage instance over the same
    /// environment, attach to the same subject.
    pub fn subscribe<V: CodingValue>(&self, key: &B::Key) -> ValueSubscription<V, C> {
        let subject = self.observations.subject(self.subject_identity(key));
        ValueSubscription {
            receiver: subject.subscribe(),
            coder: self.inner.coder().clone(),
            _value: PhantomData,
        }
    }

    /// The key's change events as a [`Stream`]. Dropping the stream detaches
    /// its subscription immediately.
    pub fn stream<V: CodingValue>(&self, key: &B::Key) -> ValueStream<V, C> {
        let subject = self.observations.subject(self.subject_identity(key));
        ValueStream {
            inner: BroadcastStream::new(subject.subscribe()),
            coder: self.inner.coder().clone(),
            _value: PhantomData,
        }
    }
}

fn decode_event<V: CodingValue, C: DataCoder>(coder: &C, payload: Option<Bytes>) -> Option<V> {
    payload.and_then(|data| coder.decode(&data).ok())
}

/// Hot subscription to one key's change events
pub struct ValueSubscription<V, C = JsonDataCoder> {
    receiver: broadcast::Receiver<Option<Bytes>>,
    coder: Arc<C>,
    _value: PhantomData<fn() -> V>,
}

impl<V: CodingValue, C: DataCoder> ValueSubscription<V, C> {
    /// The next change event: `Some(Some(value))` after a save,
    /// `Some(None)` after a delete or clear, and `None` once the subject is
    /// gone.
    pub async fn recv(&mut self) -> Option<Option<V>> {
        loop {
            match self.receiver.recv().await {
                Ok(payload) => return Some(decode_event(self.coder.as_ref(), payload)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "observer fell behind; skipping to oldest retained event");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// One key's change events as a cancellable [`Stream`]
pub struct ValueStream<V, C = JsonDataCoder> {
    inner: BroadcastStream<Option<Bytes>>,
    coder: Arc<C>,
    _value: PhantomData<fn() -> V>,
}

impl<V: CodingValue, C: DataCoder> Stream for ValueStream<V, C> {
    type Item = Option<V>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(payload))) => {
                    return Poll::Ready(Some(decode_event(this.coder.as_ref(), payload)))
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(skipped, "observer fell behind; skipping to oldest retained event");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStorage;
    use crate::environment::StorageEnvironment;
    use crate::traits::KeyValueDataStorage as _;
    use futures::StreamExt;

    async fn storage(env: &StorageEnvironment) -> ObservableCodingStorage<InMemoryStorage> {
        ObservableCodingStorage::with_coder(
            InMemoryStorage::open_default(env).await.unwrap(),
            Arc::new(JsonDataCoder::new()),
            env.observations().clone(),
        )
    }

    #[tokio::test]
    async fn save_notifies_subscribers() {
        let env = StorageEnvironment::isolated();
        let storage = storage(&env).await;
        let key = "watched".to_string();

        let mut subscription = storage.subscribe::<String>(&key);
        storage.save(&"hello".to_string(), &key).await.unwrap();

        assert_eq!(subscription.recv().await, Some(Some("hello".to_string())));
    }

    #[tokio::test]
    async fn delete_notifies_with_absent() {
        let env = StorageEnvironment::isolated();
        let storage = storage(&env).await;
        let key = "watched".to_string();

        storage.save(&1_u32, &key).await.unwrap();
        let mut subscription = storage.subscribe::<u32>(&key);
        storage.delete(&key).await.unwrap();

        assert_eq!(subscription.recv().await, Some(None));
    }

    #[tokio::test]
    async fn clear_notifies_every_observed_key() {
        let env = StorageEnvironment::isolated();
        let storage = storage(&env).await;

        let mut first = storage.subscribe::<u32>(&"k1".to_string());
        let mut second = storage.subscribe::<u32>(&"k2".to_string());

        storage.save(&1_u32, &"k1".to_string()).await.unwrap();
        storage.clear().await.unwrap();

        assert_eq!(first.recv().await, Some(Some(1)));
        assert_eq!(first.recv().await, Some(None));
        assert_eq!(second.recv().await, Some(None));
    }

    #[tokio::test]
    async fn mutations_without_observers_do_not_create_subjects() {
        let env = StorageEnvironment::isolated();
        let storage = storage(&env).await;
        let key = "quiet".to_string();

        storage.save(&1_u32, &key).await.unwrap();

        let identity = storage.subject_identity(&key);
        assert_eq!(env.observations().subscriber_count(&identity), 0);
    }

    #[tokio::test]
    async fn dropping_a_stream_detaches_its_subscription() {
        let env = StorageEnvironment::isolated();
        let storage = storage(&env).await;
        let key = "watched".to_string();
        let identity = storage.subject_identity(&key);

        let stream = storage.stream::<u32>(&key);
        assert_eq!(env.observations().subscriber_count(&identity), 1);

        drop(stream);
        assert_eq!(env.observations().subscriber_count(&identity), 0);
    }

    #[tokio::test]
    async fn stream_yields_events_in_mutation_order() {
        let env = StorageEnvironment::isolated();
        let storage = storage(&env).await;
        let key = "ordered".to_string();

        let mut stream = storage.stream::<u32>(&key);

        storage.save(&1_u32, &key).await.unwrap();
        storage.save(&2_u32, &key).await.unwrap();
        storage.set::<u32>(None, &key).await.unwrap();

        assert_eq!(stream.next().await, Some(Some(1)));
        assert_eq!(stream.next().await, Some(Some(2)));
        assert_eq!(stream.next().await, Some(None));
    }

    #[tokio::test]
    async fn type_mismatched_subscriber_observes_absent() {
        let env = StorageEnvironment::isolated();
        let storage = storage(&env).await;
        let key = "typed".to_string();

        let mut subscription = storage.subscribe::<u32>(&key);
        storage.save(&"not a number".to_string(), &key).await.unwrap();

        assert_eq!(subscription.recv().await, Some(None));
    }
}
