//! Common test utilities and fixtures

use tempfile::TempDir;
use unified_storage::environment::StorageEnvironment;

/// Test fixture holding a hermetic environment rooted in a temp directory
pub struct TestFixture {
    pub env: StorageEnvironment,
    _dir: TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let env = StorageEnvironment::builder()
            .with_default_group("storage-tests")
            .with_documents_root(dir.path().join("documents"))
            .with_containers_root(dir.path().join("containers"))
            .with_preferences_root(dir.path().join("preferences"))
            .build();

        Self { env, _dir: dir }
    }
}

/// Generate a unique test key
#[allow(dead_code)]
pub fn unique_key(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

/// Run one generic contract test against every string-keyed backend
#[macro_export]
macro_rules! for_each_string_backend {
    ($name:ident, $test:ident) => {
        mod $name {
            use super::*;

            #[tokio::test]
            async fn memory() {
                let fixture = $crate::common::TestFixture::new();
                $test::<unified_storage::backends::InMemoryStorage>(&fixture).await;
            }

            #[tokio::test]
            async fn preferences() {
                let fixture = $crate::common::TestFixture::new();
                $test::<unified_storage::backends::PreferencesStorage>(&fixture).await;
            }

            #[tokio::test]
            async fn file_tree() {
                let fixture = $crate::common::TestFixture::new();
                $test::<unified_storage::backends::FileTreeStorage>(&fixture).await;
            }
        }
    };
}
