use crate::models::{Priority, DEFAULT_CATEGORY};
use crate::storage::{create_storage, Storage, StorageError, StorageType};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Environment variable pointing at an alternative config file.
pub const CONFIG_ENV: &str = "TRUSTY_TASKS_CONFIG";

const APP_DIR: &str = "trusty_tasks";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

pub const KEYS: &[&str] = &[
    "storage.type",
    "storage.path",
    "default-category",
    "default-priority",
];

const VALID_STORAGE_TYPES: &[&str] = &["json", "sqlite"];
const VALID_PRIORITIES: &[&str] = &["high", "medium", "low"];

fn validate_storage_path(path: &str) -> Result<PathBuf, ConfigError> {
    // Check for null bytes and other invalid characters
    if path.contains('\0') {
        return Err(ConfigError::InvalidConfig(
            "Path contains invalid characters".to_string(),
        ));
    }

    if path.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "Path cannot be empty".to_string(),
        ));
    }

    let path = shellexpand::tilde(path);
    let path = PathBuf::from(path.as_ref());

    // Check if parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ConfigError::InvalidConfig(format!(
                "Parent directory does not exist: {}",
                parent.display()
            )));
        }

        // Check if directory is writable
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if let Ok(metadata) = parent.metadata() {
                if metadata.mode() & 0o200 == 0 {
                    return Err(ConfigError::InvalidConfig(format!(
                        "Directory is not writable: {}",
                        parent.display()
                    )));
                }
            }
        }
    }

    Ok(path)
}

fn validate_storage_type(value: &str) -> Result<(), ConfigError> {
    if !VALID_STORAGE_TYPES.contains(&value) {
        return Err(ConfigError::InvalidConfig(format!(
            "storage.type must be one of: {}",
            VALID_STORAGE_TYPES.join(", ")
        )));
    }
    Ok(())
}

fn validate_priority(value: &str) -> Result<(), ConfigError> {
    if !VALID_PRIORITIES.contains(&value) {
        return Err(ConfigError::InvalidConfig(format!(
            "default-priority must be one of: {}",
            VALID_PRIORITIES.join(", ")
        )));
    }
    Ok(())
}

fn validate_category(value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidConfig(
            "default-category cannot be empty".to_string(),
        ));
    }
    Ok(())
}

/// User overrides. Unset keys fall back to [`Config::with_defaults`].
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub storage_type: Option<String>,
    #[serde(default)]
    pub storage_path: Option<String>,
    #[serde(default)]
    pub default_category: Option<String>,
    #[serde(default)]
    pub default_priority: Option<String>,
}

impl Config {
    pub fn with_defaults() -> Self {
        Self {
            storage_type: default_storage_type(),
            storage_path: default_storage_path(),
            default_category: Some(DEFAULT_CATEGORY.to_string()),
            default_priority: default_priority(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(ref storage_type) = self.storage_type {
            validate_storage_type(storage_type)?;
        }
        if let Some(ref priority) = self.default_priority {
            validate_priority(priority)?;
        }
        if let Some(ref category) = self.default_category {
            validate_category(category)?;
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match key {
            "storage.type" => Ok(self.storage_type.clone()),
            "storage.path" => Ok(self.storage_path.clone()),
            "default-category" => Ok(self.default_category.clone()),
            "default-priority" => Ok(self.default_priority.clone()),
            _ => Err(ConfigError::InvalidKey(key.to_string())),
        }
    }

    fn slot(&mut self, key: &str) -> Result<&mut Option<String>, ConfigError> {
        match key {
            "storage.type" => Ok(&mut self.storage_type),
            "storage.path" => Ok(&mut self.storage_path),
            "default-category" => Ok(&mut self.default_category),
            "default-priority" => Ok(&mut self.default_priority),
            _ => Err(ConfigError::InvalidKey(key.to_string())),
        }
    }
}

fn default_storage_type() -> Option<String> {
    Some(StorageType::Json.as_str().to_string())
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(APP_DIR)
}

fn default_storage_path() -> Option<String> {
    Some(config_dir().join("tasks.json").to_string_lossy().to_string())
}

fn default_priority() -> Option<String> {
    Some(Priority::Medium.as_str().to_string())
}

pub fn default_config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Reads and writes the user's config file.
pub struct ConfigManager {
    path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Opens the config at `config_path`, or the default location. A missing
    /// file means every key is at its default; nothing is written until a
    /// value is set.
    pub fn new(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = config_path.map_or_else(default_config_path, Path::to_path_buf);

        let config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            if contents.trim().is_empty() {
                Config::default()
            } else {
                serde_json::from_str(&contents)?
            }
        } else {
            Config::default()
        };
        config.validate()?;
        debug!(path = %path.display(), "loaded config");

        Ok(Self { path, config })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.config)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }

    /// Effective value of `key`: the user's override, else the default.
    pub fn get(&self, key: &str) -> Result<Option<String>, ConfigError> {
        match self.config.get(key)? {
            Some(value) => Ok(Some(value)),
            None => Config::with_defaults().get(key),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut config = self.config.clone();
        let value = match key {
            "storage.type" => {
                validate_storage_type(value)?;
                value.to_string()
            }
            "storage.path" => validate_storage_path(value)?
                .to_string_lossy()
                .to_string(),
            "default-category" => {
                validate_category(value)?;
                value.to_string()
            }
            "default-priority" => {
                validate_priority(value)?;
                value.to_string()
            }
            _ => return Err(ConfigError::InvalidKey(key.to_string())),
        };
        *config.slot(key)? = Some(value);
        config.validate()?;

        self.config = config;
        self.save()
    }

    pub fn unset(&mut self, key: &str) -> Result<(), ConfigError> {
        *self.config.slot(key)? = None;
        self.save()
    }

    /// Every key with its default (`true`) followed by any override (`false`).
    pub fn list(&self) -> Vec<(String, String, bool)> {
        let defaults = Config::with_defaults();
        let mut list = Vec::new();

        for key in KEYS {
            let default = defaults
                .get(key)
                .ok()
                .flatten()
                .unwrap_or_else(|| "null".to_string());
            list.push((key.to_string(), default, true));
        }

        for key in KEYS {
            if let Ok(Some(value)) = self.config.get(key) {
                list.push((key.to_string(), value, false));
            }
        }

        list
    }

    pub fn storage_type(&self) -> StorageType {
        self.get("storage.type")
            .ok()
            .flatten()
            .and_then(|value| value.parse().ok())
            .unwrap_or(StorageType::Json)
    }

    pub fn storage_path(&self) -> PathBuf {
        let path = self
            .get("storage.path")
            .ok()
            .flatten()
            .unwrap_or_else(|| "tasks.json".to_string());
        PathBuf::from(shellexpand::tilde(&path).to_string())
    }

    pub fn default_priority(&self) -> Priority {
        self.get("default-priority")
            .ok()
            .flatten()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    pub fn default_category(&self) -> String {
        self.get("default-category")
            .ok()
            .flatten()
            .unwrap_or_else(|| DEFAULT_CATEGORY.to_string())
    }

    /// Builds the configured backend, with `path_override` taking precedence
    /// over `storage.path`.
    pub fn create_storage(
        &self,
        path_override: Option<&Path>,
    ) -> Result<Box<dyn Storage>, StorageError> {
        let path = path_override.map_or_else(|| self.storage_path(), Path::to_path_buf);
        create_storage(self.storage_type(), &path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = tempfile::Builder::new()
            .prefix("trusty_tasks_test")
            .tempdir()
            .expect("Failed to create temporary directory");
        let manager = ConfigManager::new(Some(temp_dir.path().join("config.json").as_path()))
            .expect("Failed to create config manager");
        (manager, temp_dir)
    }

    #[test]
    fn test_config_manager() {
        let (mut manager, temp_dir) = create_test_config_manager();

        // Test setting storage type
        assert!(manager.set("storage.type", "sqlite").is_ok());
        assert_eq!(manager.get("storage.type").unwrap(), Some("sqlite".to_string()));
        assert_eq!(manager.storage_type(), StorageType::Sqlite);

        // Test setting storage path
        let data_path = temp_dir.path().join("data.json");
        assert!(manager.set("storage.path", data_path.to_str().unwrap()).is_ok());
        assert_eq!(manager.storage_path(), data_path);

        // Test setting default category
        assert!(manager.set("default-category", "Work").is_ok());
        assert_eq!(manager.default_category(), "Work");

        // Test setting default priority
        assert!(manager.set("default-priority", "high").is_ok());
        assert_eq!(manager.default_priority(), Priority::High);

        // Test unsetting values
        assert!(manager.unset("default-category").is_ok());
        assert_eq!(manager.default_category(), "General");
    }

    #[test]
    fn test_config_manager_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();

        assert_eq!(manager.get("storage.type").unwrap(), Some("json".to_string()));
        assert_eq!(manager.get("default-category").unwrap(), Some("General".to_string()));
        assert_eq!(manager.get("default-priority").unwrap(), Some("medium".to_string()));
        assert!(manager
            .get("storage.path")
            .unwrap()
            .unwrap()
            .ends_with("tasks.json"));
        assert!(!manager.path().exists(), "defaults are not written to disk");
    }

    #[test]
    fn test_config_is_persisted() {
        let (mut manager, temp_dir) = create_test_config_manager();
        manager.set("default-priority", "low").unwrap();

        let reloaded = ConfigManager::new(Some(temp_dir.path().join("config.json").as_path())).unwrap();
        assert_eq!(reloaded.default_priority(), Priority::Low);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let (mut manager, temp_dir) = create_test_config_manager();

        assert!(matches!(
            manager.set("storage.type", "yaml"),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            manager.set("default-priority", "urgent"),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            manager.set("default-category", "  "),
            Err(ConfigError::InvalidConfig(_))
        ));
        let missing_parent = temp_dir.path().join("missing").join("tasks.json");
        assert!(matches!(
            manager.set("storage.path", missing_parent.to_str().unwrap()),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            manager.set("colour", "blue"),
            Err(ConfigError::InvalidKey(_))
        ));
        assert!(matches!(manager.get("colour"), Err(ConfigError::InvalidKey(_))));

        // Nothing invalid reached the file.
        assert!(!manager.path().exists());
    }

    #[test]
    fn test_config_manager_list() {
        let (mut manager, _temp_dir) = create_test_config_manager();
        manager.set("default-priority", "high").unwrap();
        let list = manager.list();

        for key in KEYS {
            assert!(
                list.iter().any(|(k, _, is_default)| k == key && *is_default),
                "{} should be present with its default value",
                key
            );
        }
        assert!(list
            .iter()
            .any(|(k, v, is_default)| k == "default-priority" && v == "high" && !*is_default));
        assert_eq!(list.iter().filter(|(_, _, is_default)| !*is_default).count(), 1);
    }

    #[test]
    fn test_create_storage_with_override() {
        let (manager, temp_dir) = create_test_config_manager();
        let data_path = temp_dir.path().join("override.json");
        let storage = manager.create_storage(Some(data_path.as_path())).unwrap();
        storage.save(&[]).unwrap();
        assert!(data_path.exists());
    }
}
