//! User configuration stored in `dirsnap.toml`
//!
//! The file lives next to the executable in portable mode, otherwise in the
//! platform config directory. A missing file means defaults.

use crate::{normalize_extension, AppConfig, DirsnapError};
use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "dirsnap.toml";

/// Where a configuration file is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Beside the running executable
    Portable(PathBuf),
    /// In the per-user config directory
    User(PathBuf),
}

impl ConfigLocation {
    /// Portable when requested or when a portable file already exists
    pub fn resolve(prefer_portable: bool) -> Result<Self, DirsnapError> {
        if let Some(path) = portable_config_path() {
            if prefer_portable || path.exists() {
                return Ok(ConfigLocation::Portable(path));
            }
        }

        let dirs = ProjectDirs::from("", "", "dirsnap").ok_or_else(|| {
            DirsnapError::Config("no home directory to place dirsnap.toml in".to_string())
        })?;
        Ok(ConfigLocation::User(dirs.config_dir().join(CONFIG_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        match self {
            ConfigLocation::Portable(path) | ConfigLocation::User(path) => path,
        }
    }

    pub fn is_portable(&self) -> bool {
        matches!(self, ConfigLocation::Portable(_))
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub path: PathBuf,
    pub exists: bool,
    pub portable: bool,
}

pub fn load_config(prefer_portable: bool) -> Result<LoadedConfig, DirsnapError> {
    let location = ConfigLocation::resolve(prefer_portable)?;
    let mut loaded = load_config_from(location.path())?;
    loaded.portable = location.is_portable();
    loaded.config.portable_mode = loaded.portable;
    Ok(loaded)
}

/// Read and check a config file; a missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<LoadedConfig, DirsnapError> {
    let exists = path.is_file();
    let mut config: AppConfig = if exists {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| DirsnapError::Serialization(format!("{}: {}", path.display(), e)))?
    } else {
        AppConfig::default()
    };

    config.extensions = config
        .extensions
        .iter()
        .map(|ext| normalize_extension(ext))
        .collect();
    validate(&config)?;

    Ok(LoadedConfig {
        config,
        path: path.to_path_buf(),
        exists,
        portable: false,
    })
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<(), DirsnapError> {
    validate(config)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text =
        toml::to_string_pretty(config).map_err(|e| DirsnapError::Serialization(e.to_string()))?;
    fs::write(path, text)?;
    Ok(())
}

/// Exclusions match walked paths exactly, so they must be absolute; an empty
/// extension list would match nothing.
fn validate(config: &AppConfig) -> Result<(), DirsnapError> {
    if config.extensions.is_empty() {
        return Err(DirsnapError::Config(
            "extensions must not be empty (use \".*\" to match every file)".to_string(),
        ));
    }
    if let Some(relative) = config.excluded_folders.iter().find(|p| p.is_relative()) {
        return Err(DirsnapError::Config(format!(
            "excluded folder must be an absolute path: {}",
            relative.display()
        )));
    }
    Ok(())
}

fn portable_config_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.parent()?.join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompareMode;
    use tempfile::TempDir;

    fn absolute(name: &str) -> PathBuf {
        std::env::temp_dir().join(name)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let loaded = load_config_from(&temp.path().join("dirsnap.toml")).unwrap();

        assert!(!loaded.exists);
        assert_eq!(loaded.config.extensions, vec![".*".to_string()]);
        assert!(loaded.config.include_system);
        assert_eq!(loaded.config.compare_mode, CompareMode::Metadata);
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("dirsnap.toml");

        let config = AppConfig {
            extensions: vec![".rs".to_string(), ".toml".to_string()],
            excluded_folders: vec![absolute("cache")],
            include_system: false,
            compare_mode: CompareMode::Content,
            portable_mode: false,
        };
        save_config(&path, &config).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert!(loaded.exists);
        assert_eq!(loaded.config.extensions, config.extensions);
        assert_eq!(loaded.config.excluded_folders, config.excluded_folders);
        assert!(!loaded.config.include_system);
        assert_eq!(loaded.config.compare_mode, CompareMode::Content);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dirsnap.toml");
        fs::write(&path, "compare_mode = \"none\"\n").unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.config.compare_mode, CompareMode::None);
        assert_eq!(loaded.config.extensions, vec![".*".to_string()]);
        assert!(loaded.config.include_system);
    }

    #[test]
    fn test_extensions_are_normalized_on_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dirsnap.toml");
        fs::write(&path, "extensions = [\"txt\", \".LOG\", \"*\"]\n").unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.config.extensions, vec![".txt", ".LOG", ".*"]);
    }

    #[test]
    fn test_relative_exclusion_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dirsnap.toml");
        fs::write(&path, "excluded_folders = [\"target\"]\n").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, DirsnapError::Config(_)));

        let config = AppConfig {
            excluded_folders: vec![PathBuf::from("target")],
            ..AppConfig::default()
        };
        assert!(save_config(&temp.path().join("out.toml"), &config).is_err());
        assert!(!temp.path().join("out.toml").exists());
    }

    #[test]
    fn test_empty_extension_list_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dirsnap.toml");
        fs::write(&path, "extensions = []\n").unwrap();

        assert!(matches!(
            load_config_from(&path).unwrap_err(),
            DirsnapError::Config(_)
        ));
    }

    #[test]
    fn test_invalid_toml_is_serialization_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("dirsnap.toml");
        fs::write(&path, "compare_mode = [").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(matches!(err, DirsnapError::Serialization(_)));
    }

    #[test]
    fn test_location_path_and_kind() {
        let portable = ConfigLocation::Portable(PathBuf::from("/opt/dirsnap/dirsnap.toml"));
        assert!(portable.is_portable());
        assert_eq!(portable.path(), Path::new("/opt/dirsnap/dirsnap.toml"));

        let user = ConfigLocation::User(PathBuf::from("/home/u/.config/dirsnap/dirsnap.toml"));
        assert!(!user.is_portable());
        assert!(user.path().ends_with(CONFIG_FILE_NAME));
    }
}
