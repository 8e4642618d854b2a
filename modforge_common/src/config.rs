use crate::ForgeError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "modforge.toml";

/// Context lines around each hunk; patches are always generated with 3
pub const CONTEXT_LINES: usize = 3;

/// Toolchain configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Lines of context around each hunk of a generated patch. Only
    /// [`CONTEXT_LINES`] is accepted.
    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    /// Extension given to generated patch files (without the dot)
    #[serde(default = "default_patch_extension")]
    pub patch_extension: String,

    /// Label prefix written on the `+++` side of patch headers
    #[serde(default = "default_patch_label_prefix")]
    pub patch_label_prefix: String,

    /// Prefixes removed from a patch's `---` header path before it is
    /// matched against the baseline tree (e.g. "src/main/java/")
    #[serde(default)]
    pub strip_prefixes: Vec<String>,

    /// Default archive include patterns when none are given explicitly
    #[serde(default)]
    pub include: Vec<String>,
}

fn default_context_lines() -> usize {
    CONTEXT_LINES
}

fn default_patch_extension() -> String {
    "patch".to_string()
}

fn default_patch_label_prefix() -> String {
    "patches/".to_string()
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            patch_extension: default_patch_extension(),
            patch_label_prefix: default_patch_label_prefix(),
            strip_prefixes: Vec::new(),
            include: Vec::new(),
        }
    }
}

impl ForgeConfig {
    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.context_lines != CONTEXT_LINES {
            return Err(ForgeError::Config(format!(
                "context_lines must be {CONTEXT_LINES}, got {}",
                self.context_lines
            )));
        }
        let ext = self.patch_extension.as_str();
        if ext.is_empty() || ext.contains('/') || ext.starts_with('.') {
            return Err(ForgeError::Config(format!(
                "patch_extension must be a bare extension, got '{ext}'"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ForgeConfig,
    pub path: PathBuf,
    pub exists: bool,
}

/// Load configuration from `explicit`, or from the per-user config file.
/// A missing per-user file yields the defaults; a missing explicit file is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ForgeError> {
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                return Err(ForgeError::NotFound(path.to_path_buf()));
            }
            path.to_path_buf()
        }
        None => default_config_path()?,
    };
    let exists = path.is_file();

    let config = if exists {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data).map_err(|e| ForgeError::Serialization(e.to_string()))?
    } else {
        ForgeConfig::default()
    };
    config.validate()?;

    Ok(LoadedConfig {
        config,
        path,
        exists,
    })
}

pub fn save_config(path: &Path, config: &ForgeConfig) -> Result<(), ForgeError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let data = toml::to_string_pretty(config)
        .map_err(|e| ForgeError::Serialization(e.to_string()))?;
    fs::write(path, data)?;
    Ok(())
}

pub fn default_config_path() -> Result<PathBuf, ForgeError> {
    let dirs = ProjectDirs::from("", "modforge", "modforge")
        .ok_or_else(|| ForgeError::Config("Unable to determine config directory".to_string()))?;
    Ok(dirs.config_dir().join(CONFIG_FILE_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = ForgeConfig::default();
        assert_eq!(config.context_lines, 3);
        assert_eq!(config.patch_extension, "patch");
        assert_eq!(config.patch_label_prefix, "patches/");
        assert!(config.strip_prefixes.is_empty());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("modforge.toml");
        fs::write(&path, "strip_prefixes = [\"src/main/java/\"]\n").unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert!(loaded.exists);
        assert_eq!(loaded.config.strip_prefixes, vec!["src/main/java/".to_string()]);
        assert_eq!(loaded.config.context_lines, 3);
    }

    #[test]
    fn test_save_and_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("modforge.toml");
        let config = ForgeConfig {
            include: vec!["net/minecraft/**".to_string()],
            ..ForgeConfig::default()
        };
        save_config(&path, &config).unwrap();

        let loaded = load_config(Some(&path)).unwrap();
        assert_eq!(loaded.config, config);
    }

    #[test]
    fn test_missing_explicit_file() {
        let temp = TempDir::new().unwrap();
        let result = load_config(Some(&temp.path().join("absent.toml")));
        assert!(matches!(result, Err(ForgeError::NotFound(_))));
    }

    #[test]
    fn test_rejects_dotted_extension() {
        let config = ForgeConfig {
            patch_extension: ".patch".to_string(),
            ..ForgeConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_other_context_sizes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("modforge.toml");
        fs::write(&path, "context_lines = 5\n").unwrap();

        let result = load_config(Some(&path));
        assert!(matches!(result, Err(ForgeError::Config(_))));
    }
}
