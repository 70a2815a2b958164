//! Client configuration file parsing (`.tidesync.toml`)

use std::path::Path;

/// Per-directory client configuration
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Metadata store address, e.g. "127.0.0.1:7600"
    pub meta_addr: Option<String>,

    /// Block size in bytes
    pub block_size: Option<u32>,

    /// Glob patterns excluded from scanning
    pub ignore: Vec<String>,
}

/// Config file name, looked up in the base directory
pub const CONFIG_FILENAME: &str = ".tidesync.toml";

impl ClientConfig {
    /// Load config from the base directory.
    ///
    /// Returns defaults if no config file exists.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(base_dir: &Path) -> color_eyre::Result<Self> {
        let config_path = base_dir.join(CONFIG_FILENAME);
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
meta_addr = "10.0.0.5:7600"
block_size = 8192
ignore = ["*.tmp", "target/"]
"#;

        let config: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.meta_addr.as_deref(), Some("10.0.0.5:7600"));
        assert_eq!(config.block_size, Some(8192));
        assert_eq!(config.ignore, vec!["*.tmp", "target/"]);
    }

    #[test]
    fn test_parse_empty_config() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert!(config.meta_addr.is_none());
        assert!(config.block_size.is_none());
        assert!(config.ignore.is_empty());
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig::load(dir.path()).unwrap();
        assert!(config.meta_addr.is_none());
    }
}
