use serde::Deserialize;
use std::path::{Path, PathBuf};

fn default_port() -> u16 {
    3000
}

/// Server configuration file structure (TOML)
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on (default: 3000)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path to the SQLite database file
    pub database: PathBuf,
    /// Directory holding the per-meeting legacy log files
    pub data_dir: PathBuf,
    /// Notify the analysis service when a meeting closes (default: false)
    #[serde(default)]
    pub post_meeting_analysis: bool,
    /// URL of the analysis service (required when post_meeting_analysis is true)
    pub analysis_url: Option<String>,
}

impl ServerConfig {
    /// Load and validate a configuration file
    pub fn load(config_path: &Path) -> Result<ServerConfig, Box<dyn std::error::Error>> {
        let config_content = std::fs::read_to_string(config_path).map_err(|e| {
            format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            )
        })?;
        let config: ServerConfig = toml::from_str(&config_content).map_err(|e| {
            format!(
                "Failed to parse config file '{}': {}",
                config_path.display(),
                e
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate analysis configuration
    ///
    /// If `post_meeting_analysis` is true, ensures that `analysis_url` is set.
    pub fn validate(&self) -> Result<(), String> {
        if self.post_meeting_analysis && self.analysis_url.is_none() {
            return Err(
                "post_meeting_analysis is enabled but analysis_url is missing in config"
                    .to_string(),
            );
        }

        Ok(())
    }
}
