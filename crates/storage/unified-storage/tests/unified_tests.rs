//! Facade tests: lazy singleton caching, typed routing, clear fan-outs

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use unified_storage::backends::{
    CredentialDomain, CredentialKey, CredentialStorage, FileTreeStorage, InMemoryStorage,
    PreferencesStorage,
};
use unified_storage::coder::JsonDataCoder;
use unified_storage::environment::StorageEnvironment;
use unified_storage::error::{Result, StorageError};
use unified_storage::factory::{DefaultStorageFactory, UnifiedStorageFactory};
use unified_storage::secure_store::{SecureItem, SecureStore, SecureStoreError, STATUS_NOT_FOUND};
use unified_storage::traits::KeyValueDataStorage;
use unified_storage::unified::{StorageHandle, UnifiedKey, UnifiedStorage};

use common::TestFixture;

/// Factory that counts how many adapters it constructs
struct CountingFactory {
    inner: DefaultStorageFactory,
    constructed: Arc<AtomicUsize>,
}

impl CountingFactory {
    fn new() -> (Self, Arc<AtomicUsize>) {
        let constructed = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner: DefaultStorageFactory::new(),
                constructed: constructed.clone(),
            },
            constructed,
        )
    }
}

#[async_trait]
impl UnifiedStorageFactory for CountingFactory {
    type Coder = JsonDataCoder;

    async fn data_storage<B: KeyValueDataStorage>(
        &self,
        domain: Option<B::Domain>,
        env: &StorageEnvironment,
    ) -> Result<B> {
        self.constructed.fetch_add(1, Ordering::SeqCst);
        self.inner.data_storage(domain, env).await
    }

    fn coding_storage<B: KeyValueDataStorage>(
        &self,
        backend: B,
        env: &StorageEnvironment,
    ) -> StorageHandle<B, JsonDataCoder> {
        self.inner.coding_storage(backend, env)
    }
}

#[tokio::test]
async fn in_memory_round_trip_through_the_facade() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());
    let key: UnifiedKey<InMemoryStorage, String> = UnifiedKey::new("k1");

    storage.save(&"hello".to_string(), &key).await.unwrap();
    assert_eq!(storage.fetch(&key).await.unwrap(), Some("hello".to_string()));

    storage.delete(&key).await.unwrap();
    assert_eq!(storage.fetch(&key).await.unwrap(), None);
}

#[tokio::test]
async fn repeated_access_reuses_one_adapter() {
    let fixture = TestFixture::new();
    let (factory, constructed) = CountingFactory::new();
    let storage = UnifiedStorage::with_environment(factory, fixture.env.clone());
    let key: UnifiedKey<InMemoryStorage, u32> = UnifiedKey::new("counter");

    for round in 0..5_u32 {
        storage.save(&round, &key).await.unwrap();
        storage.fetch(&key).await.unwrap();
    }

    assert_eq!(constructed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_first_access_constructs_exactly_one_adapter() {
    let fixture = TestFixture::new();
    let (factory, constructed) = CountingFactory::new();
    let storage = Arc::new(UnifiedStorage::with_environment(factory, fixture.env.clone()));

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let storage = storage.clone();
            tokio::spawn(async move {
                let key: UnifiedKey<InMemoryStorage, String> = UnifiedKey::new("raced");
                storage.fetch(&key).await.unwrap()
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(constructed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn distinct_domains_get_distinct_adapters() {
    let fixture = TestFixture::new();
    let (factory, constructed) = CountingFactory::new();
    let storage = UnifiedStorage::with_environment(factory, fixture.env.clone());

    let default_key: UnifiedKey<InMemoryStorage, u32> = UnifiedKey::new("k");
    let domain_key: UnifiedKey<InMemoryStorage, u32> = UnifiedKey::in_domain("k", "group".into());

    storage.save(&1, &default_key).await.unwrap();
    storage.save(&2, &domain_key).await.unwrap();

    assert_eq!(constructed.load(Ordering::SeqCst), 2);
    assert_eq!(storage.fetch(&default_key).await.unwrap(), Some(1));
    assert_eq!(storage.fetch(&domain_key).await.unwrap(), Some(2));
}

#[tokio::test]
async fn same_raw_key_under_different_backends_does_not_collide() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());

    let memory: UnifiedKey<InMemoryStorage, String> = UnifiedKey::new("slot");
    let preferences: UnifiedKey<PreferencesStorage, String> = UnifiedKey::new("slot");

    storage.save(&"in memory".to_string(), &memory).await.unwrap();
    storage
        .save(&"in preferences".to_string(), &preferences)
        .await
        .unwrap();

    assert_eq!(
        storage.fetch(&memory).await.unwrap(),
        Some("in memory".to_string())
    );
    assert_eq!(
        storage.fetch(&preferences).await.unwrap(),
        Some("in preferences".to_string())
    );
}

#[tokio::test]
async fn set_none_deletes_through_the_facade() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());
    let key: UnifiedKey<PreferencesStorage, bool> = UnifiedKey::new("flag");

    storage.set(Some(&true), &key).await.unwrap();
    assert_eq!(storage.fetch(&key).await.unwrap(), Some(true));

    storage.set(None, &key).await.unwrap();
    assert_eq!(storage.fetch(&key).await.unwrap(), None);
}

#[tokio::test]
async fn type_mismatch_surfaces_as_a_decode_error() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());

    let as_string: UnifiedKey<InMemoryStorage, String> = UnifiedKey::new("slot");
    let as_number: UnifiedKey<InMemoryStorage, u32> = UnifiedKey::new("slot");

    storage.save(&"text".to_string(), &as_string).await.unwrap();

    let result = storage.fetch(&as_number).await;
    assert!(matches!(result, Err(ref error) if error.is_decode()));
}

#[tokio::test]
async fn clear_domain_clears_only_that_pair() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());

    let default_key: UnifiedKey<FileTreeStorage, String> = UnifiedKey::new("doc");
    let domain_key: UnifiedKey<FileTreeStorage, String> = UnifiedKey::in_domain("doc", "group".into());

    storage.save(&"default".to_string(), &default_key).await.unwrap();
    storage.save(&"shared".to_string(), &domain_key).await.unwrap();

    storage
        .clear_domain::<FileTreeStorage>(Some(&"group".to_string()))
        .await
        .unwrap();

    assert_eq!(
        storage.fetch(&default_key).await.unwrap(),
        Some("default".to_string())
    );
    assert_eq!(storage.fetch(&domain_key).await.unwrap(), None);
}

#[tokio::test]
async fn clear_backend_spares_other_backends() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());

    let memory: UnifiedKey<InMemoryStorage, u32> = UnifiedKey::new("k");
    let preferences: UnifiedKey<PreferencesStorage, u32> = UnifiedKey::new("k");

    storage.save(&1, &memory).await.unwrap();
    storage.save(&2, &preferences).await.unwrap();

    storage.clear_backend::<InMemoryStorage>().await.unwrap();

    assert_eq!(storage.fetch(&memory).await.unwrap(), None);
    assert_eq!(storage.fetch(&preferences).await.unwrap(), Some(2));
}

#[tokio::test]
async fn clear_all_reaches_every_cached_instance() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());

    let memory: UnifiedKey<InMemoryStorage, u32> = UnifiedKey::new("k");
    let preferences: UnifiedKey<PreferencesStorage, u32> = UnifiedKey::new("k");
    let file: UnifiedKey<FileTreeStorage, u32> = UnifiedKey::new("k");

    storage.save(&1, &memory).await.unwrap();
    storage.save(&2, &preferences).await.unwrap();
    storage.save(&3, &file).await.unwrap();

    storage.clear().await.unwrap();

    assert_eq!(storage.fetch(&memory).await.unwrap(), None);
    assert_eq!(storage.fetch(&preferences).await.unwrap(), None);
    assert_eq!(storage.fetch(&file).await.unwrap(), None);
}

/// Secure store whose wipe always fails, for exercising the fan-out path
struct BrokenWipeStore;

impl SecureStore for BrokenWipeStore {
    fn get(&self, _item: &SecureItem<'_>) -> std::result::Result<Bytes, SecureStoreError> {
        Err(SecureStoreError::Status(STATUS_NOT_FOUND))
    }

    fn set(
        &self,
        _value: Bytes,
        _item: &SecureItem<'_>,
    ) -> std::result::Result<(), SecureStoreError> {
        Ok(())
    }

    fn remove(&self, _item: &SecureItem<'_>) -> std::result::Result<(), SecureStoreError> {
        Ok(())
    }

    fn remove_all(
        &self,
        _service: &str,
        _access_group: Option<&str>,
    ) -> std::result::Result<(), SecureStoreError> {
        Err(SecureStoreError::Status(-61))
    }
}

#[tokio::test]
async fn clear_all_continues_past_failures() {
    let dir = tempfile::TempDir::new().unwrap();
    let env = StorageEnvironment::builder()
        .with_default_group("storage-tests")
        .with_documents_root(dir.path().join("documents"))
        .with_containers_root(dir.path().join("containers"))
        .with_preferences_root(dir.path().join("preferences"))
        .with_secure_store(Arc::new(BrokenWipeStore))
        .build();
    let storage = UnifiedStorage::with_environment(DefaultStorageFactory::new(), env);

    let memory: UnifiedKey<InMemoryStorage, u32> = UnifiedKey::new("k");
    let secret: UnifiedKey<CredentialStorage, u32> =
        UnifiedKey::new(CredentialKey::new("token"));

    storage.save(&1, &memory).await.unwrap();
    storage.save(&2, &secret).await.unwrap();

    let result = storage.clear().await;
    match result {
        Err(StorageError::Clear(failures)) => {
            assert_eq!(failures.len(), 1);
            assert!(failures[0].target.starts_with("credential"));
        }
        other => panic!("expected an aggregated clear failure, got {other:?}"),
    }

    // The failing instance did not stop the fan-out.
    assert_eq!(storage.fetch(&memory).await.unwrap(), None);
}

#[tokio::test]
async fn credential_clear_through_the_facade_is_group_scoped() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());

    let group_a = CredentialDomain::new("group.a", "TEAM01");
    let group_b = CredentialDomain::new("group.b", "TEAM01");
    let key_a: UnifiedKey<CredentialStorage, String> =
        UnifiedKey::in_domain(CredentialKey::new("token"), group_a.clone());
    let key_b: UnifiedKey<CredentialStorage, String> =
        UnifiedKey::in_domain(CredentialKey::new("token"), group_b);

    storage.save(&"a".to_string(), &key_a).await.unwrap();
    storage.save(&"b".to_string(), &key_b).await.unwrap();

    storage
        .clear_domain::<CredentialStorage>(Some(&group_a))
        .await
        .unwrap();

    assert_eq!(storage.fetch(&key_a).await.unwrap(), None);
    assert_eq!(storage.fetch(&key_b).await.unwrap(), Some("b".to_string()));
}

#[tokio::test]
async fn non_observable_facade_reports_no_streams() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());
    let key: UnifiedKey<InMemoryStorage, String> = UnifiedKey::new("watched");

    assert!(storage.subscribe(&key).await.unwrap().is_none());
    assert!(storage.stream(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_preferences_suite_fails_resolution() {
    let fixture = TestFixture::new();
    let storage =
        UnifiedStorage::with_environment(DefaultStorageFactory::new(), fixture.env.clone());
    let key: UnifiedKey<PreferencesStorage, String> =
        UnifiedKey::in_domain("k", "not/a/suite".into());

    let result = storage.fetch(&key).await;
    assert!(matches!(result, Err(ref error) if error.is_configuration()));
}
