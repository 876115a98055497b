//! Configuration management for Crosspost

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
    #[serde(default)]
    pub platforms: PlatformsConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Tuning knobs for fan-out, retries and verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSettings {
    /// Upper bound on concurrently running platform legs
    pub max_concurrency: usize,
    pub post_max_attempts: u32,
    /// Base of the exponential backoff between post attempts
    pub post_base_delay_ms: u64,
    pub verify_max_attempts: u32,
    /// Base of the linear backoff between verification attempts
    pub verify_retry_delay_ms: u64,
    /// Base delay before an out-of-band redrive picks up a queued leg
    pub queue_base_delay_secs: u64,
    pub http_timeout_secs: u64,
    pub media_processing_timeout_secs: u64,
    pub media_poll_interval_ms: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            post_max_attempts: 3,
            post_base_delay_ms: 1000,
            verify_max_attempts: 3,
            verify_retry_delay_ms: 2000,
            queue_base_delay_secs: 60,
            http_timeout_secs: 30,
            media_processing_timeout_secs: 60,
            media_poll_interval_ms: 2000,
        }
    }
}

impl OrchestratorSettings {
    pub fn post_base_delay(&self) -> Duration {
        Duration::from_millis(self.post_base_delay_ms)
    }

    pub fn verify_retry_delay(&self) -> Duration {
        Duration::from_millis(self.verify_retry_delay_ms)
    }

    pub fn queue_base_delay(&self) -> Duration {
        Duration::from_secs(self.queue_base_delay_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn media_processing_timeout(&self) -> Duration {
        Duration::from_secs(self.media_processing_timeout_secs)
    }

    pub fn media_poll_interval(&self) -> Duration {
        Duration::from_millis(self.media_poll_interval_ms)
    }

    /// Reject settings that would make legs unable to run
    pub fn validate(&self) -> Result<()> {
        let checks = [
            ("orchestrator.max_concurrency", self.max_concurrency as u64),
            ("orchestrator.post_max_attempts", self.post_max_attempts as u64),
            ("orchestrator.verify_max_attempts", self.verify_max_attempts as u64),
            ("orchestrator.http_timeout_secs", self.http_timeout_secs),
        ];

        for (field, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// OAuth application credentials for one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCredentialsConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub client_id: String,
    pub client_secret: String,
    /// Override of the platform API base URL (testing, proxies)
    #[serde(default)]
    pub api_base: Option<String>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformsConfig {
    pub twitter: Option<PlatformCredentialsConfig>,
    pub facebook: Option<PlatformCredentialsConfig>,
    pub instagram: Option<PlatformCredentialsConfig>,
    pub linkedin: Option<PlatformCredentialsConfig>,
    pub tiktok: Option<PlatformCredentialsConfig>,
    pub youtube: Option<PlatformCredentialsConfig>,
    pub pinterest: Option<PlatformCredentialsConfig>,
    pub snapchat: Option<PlatformCredentialsConfig>,
}

impl PlatformsConfig {
    pub fn get(&self, platform: Platform) -> Option<&PlatformCredentialsConfig> {
        match platform {
            Platform::Twitter => self.twitter.as_ref(),
            Platform::Facebook => self.facebook.as_ref(),
            Platform::Instagram => self.instagram.as_ref(),
            Platform::LinkedIn => self.linkedin.as_ref(),
            Platform::TikTok => self.tiktok.as_ref(),
            Platform::YouTube => self.youtube.as_ref(),
            Platform::Pinterest => self.pinterest.as_ref(),
            Platform::Snapchat => self.snapchat.as_ref(),
        }
    }

    /// Platforms with an enabled credentials section
    pub fn enabled(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.get(*p).is_some_and(|c| c.enabled))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default)]
    pub platforms: Vec<Platform>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.orchestrator.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/crosspost/crosspost.db".to_string(),
            },
            orchestrator: OrchestratorSettings::default(),
            platforms: PlatformsConfig::default(),
            defaults: DefaultsConfig::default(),
        }
    }
}

/// Resolve the configuration file path using the XDG Base Directory layout
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("CROSSPOST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("crosspost").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
[database]
path = "/tmp/crosspost.db"
"#,
        )
        .unwrap();

        assert_eq!(config.orchestrator, OrchestratorSettings::default());
        assert!(config.platforms.enabled().is_empty());
        assert_eq!(config.orchestrator.post_base_delay(), Duration::from_secs(1));
        assert_eq!(config.orchestrator.verify_retry_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_platform_sections() {
        let config: Config = toml::from_str(
            r#"
[database]
path = "/tmp/crosspost.db"

[orchestrator]
max_concurrency = 2

[platforms.twitter]
client_id = "id"
client_secret = "secret"

[platforms.linkedin]
enabled = false
client_id = "id"
client_secret = "secret"

[defaults]
platforms = ["twitter", "linkedin"]
"#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.max_concurrency, 2);
        assert_eq!(config.orchestrator.post_max_attempts, 3);
        assert_eq!(config.platforms.enabled(), vec![Platform::Twitter]);
        assert_eq!(
            config.defaults.platforms,
            vec![Platform::Twitter, Platform::LinkedIn]
        );
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[database]
path = "/tmp/crosspost.db"

[orchestrator]
post_max_attempts = 0
"#,
        )
        .unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("orchestrator.post_max_attempts"));
    }

    #[test]
    #[serial]
    fn test_config_path_from_env() {
        std::env::set_var("CROSSPOST_CONFIG", "/tmp/custom/crosspost.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("CROSSPOST_CONFIG");
        assert_eq!(path, PathBuf::from("/tmp/custom/crosspost.toml"));
    }
}
