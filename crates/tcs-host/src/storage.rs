//! Versioned JSON persistence
//!
//! Blobs are wrapped in a [`StorageFile`] carrying a major and minor version
//! and written under a `.storage/` directory, one file per key.

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored blob is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{key} is at version {from}, expected {to}, and no migration was given")]
    MigrationRequired { key: String, from: u32, to: u32 },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A persisted blob with its schema version
///
/// On disk: `{"version": 1, "minor_version": 1, "key": "<domain>.<entry>.<suffix>", "data": {...}}`.
/// A major bump needs a migration; a minor bump only adds fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageFile<T> {
    pub version: u32,
    pub minor_version: u32,
    pub key: String,
    pub data: T,
}

impl<T> StorageFile<T> {
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            key: key.into(),
            version,
            minor_version,
            data,
        }
    }
}

/// Manager for the `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// Storage rooted at `<config_dir>/.storage`
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Create the directory if needed; `create_dir_all` is a no-op when it exists
    pub async fn ensure_dir(&self) -> StorageResult<()> {
        fs::create_dir_all(&self.storage_dir).await?;
        Ok(())
    }

    pub fn file_path(&self, key: &str) -> PathBuf {
        self.storage_dir.join(key)
    }

    /// Load a storage file, `None` if it doesn't exist
    pub async fn load<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let content = match fs::read_to_string(self.file_path(key)).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(key, "No stored blob");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        let file: StorageFile<T> = serde_json::from_str(&content)?;
        debug!(key, version = file.version, minor_version = file.minor_version, "Loaded blob");
        Ok(Some(file))
    }

    /// Save atomically: write a temp file, then rename over the target
    pub async fn save<T>(&self, storage_file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        self.ensure_dir().await?;
        let target = self.file_path(&storage_file.key);
        let staging = self.file_path(&format!("{}.tmp", storage_file.key));

        fs::write(&staging, serde_json::to_vec_pretty(storage_file)?).await?;
        fs::rename(&staging, &target).await?;
        debug!(key = %storage_file.key, version = storage_file.version, "Saved blob");
        Ok(())
    }
}

/// A blob persisted once per config entry
pub trait Storable: Serialize + DeserializeOwned {
    /// Last key segment, e.g. `occupancy`
    const KEY_SUFFIX: &'static str;
    const VERSION: u32;
    const MINOR_VERSION: u32;

    /// `thermostat_contact_sensors.<entry_id>.<suffix>`
    fn storage_key(entry_id: &str) -> String {
        format!("{}.{}.{}", tcs_core::DOMAIN, entry_id, Self::KEY_SUFFIX)
    }

    fn to_storage_file(&self, entry_id: &str) -> StorageResult<StorageFile<serde_json::Value>> {
        Ok(StorageFile::new(
            Self::storage_key(entry_id),
            serde_json::to_value(self)?,
            Self::VERSION,
            Self::MINOR_VERSION,
        ))
    }
}

/// Converts the raw data of an older major version
pub type MigrationFn<T> = fn(serde_json::Value, u32) -> StorageResult<T>;

/// Decode a loaded blob, migrating it when its major version is older
pub fn decode_with_migration<T>(
    file: StorageFile<serde_json::Value>,
    migrate: Option<MigrationFn<T>>,
) -> StorageResult<T>
where
    T: Storable,
{
    if file.version != T::VERSION {
        return match migrate {
            Some(migrate_fn) => migrate_fn(file.data, file.version),
            None => Err(StorageError::MigrationRequired {
                key: file.key,
                from: file.version,
                to: T::VERSION,
            }),
        };
    }

    if file.minor_version < T::MINOR_VERSION {
        warn!(
            "Storage {} has older minor version ({} < {}), missing fields use defaults",
            file.key, file.minor_version, T::MINOR_VERSION
        );
    }

    Ok(serde_json::from_value(file.data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestBlob {
        name: String,
        value: i32,
    }

    impl Storable for TestBlob {
        const KEY_SUFFIX: &'static str = "test";
        const VERSION: u32 = 2;
        const MINOR_VERSION: u32 = 1;
    }

    fn blob() -> TestBlob {
        TestBlob {
            name: "den".to_string(),
            value: 42,
        }
    }

    #[tokio::test]
    async fn test_storage_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let file = StorageFile::new("thermostat_contact_sensors.e1.test", blob(), 1, 1);
        storage.save(&file).await.unwrap();
        assert!(storage.file_path("thermostat_contact_sensors.e1.test").exists());
        assert_eq!(std::fs::read_dir(storage.storage_dir()).unwrap().count(), 1);

        let loaded: StorageFile<TestBlob> = storage
            .load("thermostat_contact_sensors.e1.test")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.data, blob());
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_storage_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let missing: Option<StorageFile<TestBlob>> = storage.load("nonexistent").await.unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_storable_key_and_decode() {
        assert_eq!(
            TestBlob::storage_key("entry1"),
            "thermostat_contact_sensors.entry1.test"
        );

        let file = blob().to_storage_file("entry1").unwrap();
        assert_eq!(file.version, 2);
        let decoded: TestBlob = decode_with_migration(file, None).unwrap();
        assert_eq!(decoded, blob());
    }

    #[test]
    fn test_decode_requires_migration() {
        let old = StorageFile::new(
            "thermostat_contact_sensors.e1.test",
            serde_json::json!({"label": "den"}),
            1,
            1,
        );
        let result: StorageResult<TestBlob> = decode_with_migration(old.clone(), None);
        assert!(matches!(
            result,
            Err(StorageError::MigrationRequired { from: 1, to: 2, .. })
        ));

        fn migrate(data: serde_json::Value, _from: u32) -> StorageResult<TestBlob> {
            Ok(TestBlob {
                name: data["label"].as_str().unwrap_or_default().to_string(),
                value: 0,
            })
        }
        let migrated: TestBlob = decode_with_migration(old, Some(migrate)).unwrap();
        assert_eq!(migrated.name, "den");
    }
}
