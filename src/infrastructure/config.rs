use crate::domain::{
    config::AppConfig,
    error::{BridgeError, BridgeResult},
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const CONFIG_DIR: &str = ".serbridge";
const CONFIG_FILE: &str = "config.toml";

/// Configuration manager
///
/// Layers the global file under the project file: keys present in the
/// project file win, everything else comes from the global file or the
/// built-in defaults.
pub struct ConfigManager {
    global_config_path: PathBuf,
    project_config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Create new configuration manager
    pub fn new() -> BridgeResult<Self> {
        let global_config_path = Self::get_global_config_path()?;
        let project_config_path = std::env::current_dir()
            .ok()
            .and_then(|dir| Self::find_project_config_path(&dir));

        Ok(Self {
            global_config_path,
            project_config_path,
        })
    }

    /// Manager over explicit file locations
    pub fn with_paths(global_config_path: PathBuf, project_config_path: Option<PathBuf>) -> Self {
        Self {
            global_config_path,
            project_config_path,
        }
    }

    /// Load configuration from files
    pub fn load_config(&self) -> BridgeResult<AppConfig> {
        let mut merged = toml::Table::new();

        for path in std::iter::once(&self.global_config_path).chain(self.project_config_path.as_ref()) {
            if path.exists() {
                debug!("Loading configuration from {}", path.display());
                merge_tables(&mut merged, read_table(path)?);
            }
        }

        toml::Value::Table(merged)
            .try_into()
            .map_err(|e| BridgeError::config(format!("Invalid configuration: {}", e)))
    }

    /// Get global configuration path
    fn get_global_config_path() -> BridgeResult<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| BridgeError::config("Could not determine home directory"))?;

        Ok(home.join(".config").join("serbridge").join(CONFIG_FILE))
    }

    /// Find project configuration path by walking up directory tree
    pub fn find_project_config_path(start: &Path) -> Option<PathBuf> {
        let mut path = start;

        loop {
            let config_path = path.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Some(config_path);
            }

            path = path.parent()?;
        }
    }

    /// Load configuration from specific path
    pub fn load_config_from_path(&self, path: &Path) -> BridgeResult<AppConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| BridgeError::config(format!("Failed to read config file {}: {}", path.display(), e)))?;

        toml::from_str(&content)
            .map_err(|e| BridgeError::config(format!("Failed to parse config file {}: {}", path.display(), e)))
    }

    /// Save configuration to specific path
    pub fn save_config_to_path(&self, path: &Path, config: &AppConfig) -> BridgeResult<()> {
        let content = toml::to_string_pretty(config)
            .map_err(|e| BridgeError::config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BridgeError::config(format!("Failed to create config directory {}: {}", parent.display(), e))
            })?;
        }

        fs::write(path, content)
            .map_err(|e| BridgeError::config(format!("Failed to write config file {}: {}", path.display(), e)))
    }

    /// Create default project configuration under `path/.serbridge`
    pub fn init_project_config(&self, path: &Path) -> BridgeResult<PathBuf> {
        let config_file = path.join(CONFIG_DIR).join(CONFIG_FILE);
        self.init_at(&config_file)?;
        Ok(config_file)
    }

    /// Create default global configuration
    pub fn init_global_config(&self) -> BridgeResult<PathBuf> {
        self.init_at(&self.global_config_path)?;
        Ok(self.global_config_path.clone())
    }

    fn init_at(&self, config_file: &Path) -> BridgeResult<()> {
        if config_file.exists() {
            return Err(BridgeError::config(format!(
                "Configuration already exists: {}",
                config_file.display()
            )));
        }

        self.save_config_to_path(config_file, &AppConfig::default())
    }

    /// Get the current project config path (if any)
    pub fn get_project_config_path(&self) -> Option<&PathBuf> {
        self.project_config_path.as_ref()
    }

    /// Get the global config path
    pub fn get_global_config_path_ref(&self) -> &PathBuf {
        &self.global_config_path
    }
}

fn read_table(path: &Path) -> BridgeResult<toml::Table> {
    let content = fs::read_to_string(path)
        .map_err(|e| BridgeError::config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    content
        .parse::<toml::Table>()
        .map_err(|e| BridgeError::config(format!("Failed to parse config file {}: {}", path.display(), e)))
}

/// Recursively overlay `overlay` onto `base`; nested tables merge, other
/// values replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => merge_tables(existing, nested),
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ParityConfig;
    use tempfile::TempDir;

    fn manager_in(dir: &TempDir, with_project: bool) -> ConfigManager {
        let global = dir.path().join("global").join(CONFIG_FILE);
        let project = with_project.then(|| dir.path().join("project").join(CONFIG_DIR).join(CONFIG_FILE));
        ConfigManager::with_paths(global, project)
    }

    #[test]
    fn test_load_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir, true);
        let config = manager.load_config().unwrap();

        assert_eq!(config.global.log_level, "info");
        assert_eq!(config.bridge.serial.baud_rate, 115_200);
        assert_eq!(config.bridge.network.port, 9000);
    }

    #[test]
    fn test_project_overrides_global() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir, true);

        let global = manager.get_global_config_path_ref().clone();
        fs::create_dir_all(global.parent().unwrap()).unwrap();
        fs::write(
            &global,
            "[global]\nlog_level = \"debug\"\n\n[bridge.serial]\ndevice = \"/dev/ttyUSB3\"\nparity = \"even\"\n",
        )
        .unwrap();

        let project = manager.get_project_config_path().unwrap().clone();
        fs::create_dir_all(project.parent().unwrap()).unwrap();
        fs::write(&project, "[bridge.serial]\nbaud_rate = 9600\n\n[bridge.network]\nport = 7000\n").unwrap();

        let config = manager.load_config().unwrap();
        assert_eq!(config.global.log_level, "debug");
        assert_eq!(config.bridge.serial.device, "/dev/ttyUSB3");
        assert_eq!(config.bridge.serial.parity, ParityConfig::Even);
        assert_eq!(config.bridge.serial.baud_rate, 9600);
        assert_eq!(config.bridge.network.port, 7000);
        assert_eq!(config.bridge.network.host, "127.0.0.1");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir, false);

        let global = manager.get_global_config_path_ref().clone();
        fs::create_dir_all(global.parent().unwrap()).unwrap();
        fs::write(&global, "[bridge.network]\nport = \"not a port\"\n").unwrap();

        let err = manager.load_config().unwrap_err();
        assert!(matches!(err, BridgeError::Config { .. }));
    }

    #[test]
    fn test_init_project_config() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir, false);

        let config_file = manager.init_project_config(temp_dir.path()).unwrap();
        assert_eq!(config_file, temp_dir.path().join(".serbridge").join("config.toml"));

        let config = manager.load_config_from_path(&config_file).unwrap();
        assert_eq!(config.bridge.serial.device, "auto");

        // A second init must not clobber the file
        assert!(manager.init_project_config(temp_dir.path()).is_err());
    }

    #[test]
    fn test_find_project_config_walks_up() {
        let temp_dir = TempDir::new().unwrap();
        let manager = manager_in(&temp_dir, false);
        manager.init_project_config(temp_dir.path()).unwrap();

        let nested = temp_dir.path().join("firmware").join("src");
        fs::create_dir_all(&nested).unwrap();

        let found = ConfigManager::find_project_config_path(&nested).unwrap();
        assert_eq!(found, temp_dir.path().join(".serbridge").join("config.toml"));
    }
}
