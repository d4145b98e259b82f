//! Basic usage examples for unified-storage

use std::error::Error;

use serde::{Deserialize, Serialize};
use unified_storage::backends::{CredentialKey, CredentialStorage, InMemoryStorage, PreferencesStorage};
use unified_storage::secure_store::Accessibility;
use unified_storage::unified::{UnifiedKey, UnifiedStorage};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

#[derive(Debug, Serialize, Deserialize)]
struct UserProfile {
    name: String,
    email: String,
    logins: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Example 1: typed round trip through the facade
    facade_example().await?;

    // Example 2: observing changes to a key
    observation_example().await?;

    // Example 3: a credential with store policy attached
    credential_example().await?;

    Ok(())
}

/// Example 1: typed round trip through the facade
async fn facade_example() -> Result<()> {
    println!("=== Facade Example ===");

    let storage = UnifiedStorage::new();

    let profile_key: UnifiedKey<PreferencesStorage, UserProfile> = UnifiedKey::new("profile");
    let profile = UserProfile {
        name: "Alice".into(),
        email: "alice@example.com".into(),
        logins: 30,
    };

    storage.save(&profile, &profile_key).await?;
    if let Some(stored) = storage.fetch(&profile_key).await? {
        println!("Stored profile: {stored:?}");
    }

    storage.delete(&profile_key).await?;
    println!("After delete: {:?}", storage.fetch(&profile_key).await?);

    Ok(())
}

/// Example 2: observing changes to a key
async fn observation_example() -> Result<()> {
    println!("=== Observation Example ===");

    let storage = UnifiedStorage::observable();
    let key: UnifiedKey<InMemoryStorage, u32> = UnifiedKey::new("counter");

    let mut changes = storage
        .subscribe(&key)
        .await?
        .expect("observable facade always supports subscriptions");

    storage.save(&1, &key).await?;
    storage.save(&2, &key).await?;
    storage.delete(&key).await?;

    while let Some(change) = changes.recv().await {
        println!("counter changed to {change:?}");
        if change.is_none() {
            break;
        }
    }

    Ok(())
}

/// Example 3: a credential with store policy attached
async fn credential_example() -> Result<()> {
    println!("=== Credential Example ===");

    let storage = UnifiedStorage::new();
    let token_key: UnifiedKey<CredentialStorage, String> = UnifiedKey::new(
        CredentialKey::new("api-token")
            .with_accessibility(Accessibility::AfterFirstUnlock)
            .synchronizable(false),
    );

    storage.save(&"s3cr3t".to_string(), &token_key).await?;
    println!("Token present: {}", storage.fetch(&token_key).await?.is_some());

    storage.clear_domain::<CredentialStorage>(None).await?;
    println!("After clear: {:?}", storage.fetch(&token_key).await?);

    Ok(())
}
