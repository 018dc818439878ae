//! File-backed state store.

use crate::config::StateConfig;
use crate::errors::StateError;
use crate::provisioning::TerraformOptions;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Key under which the provisioning options are persisted.
pub const TERRAFORM_OPTIONS_KEY: &str = "TerraformOptions";

const ENTRY_EXTENSION: &str = "json";

/// Durable mapping from key to serializable value for one test directory.
///
/// Writes go to a temp file that is fsynced and renamed into place, so a
/// value is durable before `save` returns and a reader never sees a
/// half-written entry. Concurrent writers to the same key are not
/// supported; stages run sequentially.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateStore {
    test_dir: PathBuf,
    data_dir: PathBuf,
}

impl StateStore {
    /// Creates a store rooted at `<test_dir>/.test-data`.
    #[must_use]
    pub fn new(test_dir: impl Into<PathBuf>) -> Self {
        Self::with_config(test_dir, &StateConfig::default())
    }

    /// Creates a store using the configured data directory name.
    #[must_use]
    pub fn with_config(test_dir: impl Into<PathBuf>, config: &StateConfig) -> Self {
        Self::with_data_dir_name(test_dir, &config.data_dir_name)
    }

    /// Creates a store rooted at `<test_dir>/<name>`.
    #[must_use]
    pub fn with_data_dir_name(test_dir: impl Into<PathBuf>, name: &str) -> Self {
        let test_dir = test_dir.into();
        let data_dir = test_dir.join(name);
        Self { test_dir, data_dir }
    }

    /// The test directory this store is scoped to.
    #[must_use]
    pub fn test_dir(&self) -> &Path {
        &self.test_dir
    }

    /// The directory holding the entries.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the file backing `key`.
    pub fn path_for(&self, key: &str) -> Result<PathBuf, StateError> {
        validate_key(key)?;
        Ok(self.data_dir.join(format!("{key}.{ENTRY_EXTENSION}")))
    }

    /// Serializes `value` and durably writes it under `key`.
    ///
    /// An existing value under the same key is replaced.
    pub fn save<T>(&self, key: &str, value: &T) -> Result<(), StateError>
    where
        T: Serialize + ?Sized,
    {
        let path = self.path_for(key)?;
        let bytes = serde_json::to_vec_pretty(value).map_err(|e| StateError::CorruptData {
            key: key.to_string(),
            path: path.clone(),
            reason: format!("value is not serializable: {e}"),
        })?;

        std::fs::create_dir_all(&self.data_dir).map_err(|source| StateError::Storage {
            path: self.data_dir.clone(),
            source,
        })?;

        let tmp_path = path.with_extension(format!("{ENTRY_EXTENSION}.tmp"));
        write_synced(&tmp_path, &bytes).map_err(|source| StateError::Storage {
            path: tmp_path.clone(),
            source,
        })?;
        std::fs::rename(&tmp_path, &path).map_err(|source| StateError::Storage {
            path: path.clone(),
            source,
        })?;

        debug!(key, path = %path.display(), bytes = bytes.len(), "saved test data");
        Ok(())
    }

    /// Loads and deserializes the value saved under `key`.
    ///
    /// # Errors
    ///
    /// `NotFound` if nothing was saved, `CorruptData` if the stored bytes do
    /// not deserialize into `T`, `Storage` for any other IO failure.
    pub fn load<T>(&self, key: &str) -> Result<T, StateError>
    where
        T: DeserializeOwned,
    {
        let path = self.path_for(key)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StateError::NotFound {
                    key: key.to_string(),
                    path,
                });
            }
            Err(source) => return Err(StateError::Storage { path, source }),
        };

        let value = serde_json::from_slice(&bytes).map_err(|e| StateError::CorruptData {
            key: key.to_string(),
            path: path.clone(),
            reason: e.to_string(),
        })?;
        debug!(key, path = %path.display(), "loaded test data");
        Ok(value)
    }

    /// Returns true if a value is saved under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Removes the value under `key`. Returns true if something was removed.
    pub fn remove(&self, key: &str) -> Result<bool, StateError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StateError::Storage { path, source }),
        }
    }

    /// Lists the saved keys in sorted order.
    pub fn keys(&self) -> Result<Vec<String>, StateError> {
        let entries = match std::fs::read_dir(&self.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StateError::Storage {
                    path: self.data_dir.clone(),
                    source,
                })
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StateError::Storage {
                path: self.data_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Deletes every saved value for this test directory.
    pub fn clear(&self) -> Result<(), StateError> {
        match std::fs::remove_dir_all(&self.data_dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StateError::Storage {
                path: self.data_dir.clone(),
                source,
            }),
        }
    }

    /// Saves a string value.
    pub fn save_string(&self, key: &str, value: &str) -> Result<(), StateError> {
        self.save(key, value)
    }

    /// Loads a string value.
    pub fn load_string(&self, key: &str) -> Result<String, StateError> {
        self.load(key)
    }

    /// Saves an integer value.
    pub fn save_int(&self, key: &str, value: i64) -> Result<(), StateError> {
        self.save(key, &value)
    }

    /// Loads an integer value.
    pub fn load_int(&self, key: &str) -> Result<i64, StateError> {
        self.load(key)
    }

    /// Saves the provisioning options so teardown can reload them later.
    pub fn save_terraform_options(&self, options: &TerraformOptions) -> Result<(), StateError> {
        self.save(TERRAFORM_OPTIONS_KEY, options)
    }

    /// Loads the provisioning options saved by the deploy stage.
    pub fn load_terraform_options(&self) -> Result<TerraformOptions, StateError> {
        self.load(TERRAFORM_OPTIONS_KEY)
    }
}

fn validate_key(key: &str) -> Result<(), StateError> {
    let reason = if key.is_empty() {
        "must not be empty"
    } else if key == "." || key == ".." {
        "must not be a relative directory reference"
    } else if key.contains(['/', '\\']) {
        "contains a path separator"
    } else if key.contains('\0') {
        "contains a NUL byte"
    } else {
        return Ok(());
    };
    Err(StateError::InvalidKey {
        key: key.to_string(),
        reason,
    })
}

fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}
