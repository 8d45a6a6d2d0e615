//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered with the
//! `config` crate, later layers overriding earlier ones:
//!
//! 1. built-in defaults (`GuardConfig::default()`)
//! 2. `<dir>/upstream-guard.toml` (optional)
//! 3. `<dir>/upstream-guard.<env>.toml` (optional)
//! 4. `UPSTREAM_GUARD__SECTION__FIELD` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::GuardConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Base name of configuration files
pub const CONFIG_FILE_STEM: &str = "upstream-guard";

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "UPSTREAM_GUARD";

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: GuardConfig,
    environment: String,
    config_directory: PathBuf,
    loaded_files: Vec<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    ///
    /// An explicitly given directory must exist; the default directory may be
    /// absent, in which case only defaults and environment variables apply.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let explicit = config_dir.is_some();
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        if explicit && !config_directory.is_dir() {
            return Err(ConfigurationError::DirectoryNotFound {
                path: config_directory,
            });
        }

        debug!(
            environment = environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let (config, loaded_files) = Self::load_and_merge_config(&config_directory, environment)?;

        config.validate()?;

        info!(
            environment = environment,
            files = loaded_files.len(),
            cache_backend = %config.cache.backend,
            circuit_breakers_enabled = config.circuit_breakers.enabled,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
            loaded_files,
        }))
    }

    /// Wrap an already-built configuration (tests and embedding)
    pub fn from_config(config: GuardConfig, environment: &str) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: PathBuf::new(),
            loaded_files: Vec::new(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Get the configuration directory
    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Files that contributed to the configuration, in merge order
    pub fn loaded_files(&self) -> &[PathBuf] {
        &self.loaded_files
    }

    /// Configuration as JSON with credentials in URLs masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut value = serde_json::json!(self.config);
        Self::sanitize_json_recursive(&mut value);
        value
    }

    /// Detect current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("UPSTREAM_GUARD_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var("UPSTREAM_GUARD_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<(GuardConfig, Vec<PathBuf>)> {
        let defaults =
            Config::try_from(&GuardConfig::default()).map_err(ConfigurationError::build_error)?;

        let mut builder = Config::builder().add_source(defaults);
        let mut loaded_files = Vec::new();

        let candidates = [
            config_directory.join(format!("{CONFIG_FILE_STEM}.toml")),
            config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}.toml")),
        ];

        for path in candidates {
            if path.is_file() {
                debug!(file = %path.display(), "Adding configuration layer");
                builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
                loaded_files.push(path);
            }
        }

        // e.g. UPSTREAM_GUARD__CACHE__MEMORY__MAX_SIZE=5000
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder.build().map_err(Self::map_config_error)?;
        let config: GuardConfig = merged
            .try_deserialize()
            .map_err(ConfigurationError::build_error)?;

        Ok((config, loaded_files))
    }

    fn map_config_error(error: config::ConfigError) -> ConfigurationError {
        match error {
            config::ConfigError::FileParse { uri, cause } => ConfigurationError::invalid_toml(
                uri.unwrap_or_else(|| "<unknown>".to_string()),
                cause,
            ),
            other => ConfigurationError::build_error(other),
        }
    }

    /// Mask credentials in every string field named like a URL
    fn sanitize_json_recursive(value: &mut serde_json::Value) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    match val {
                        serde_json::Value::String(s) if key.ends_with("url") => {
                            *s = crate::cache::providers::redact_url(s);
                        }
                        _ => Self::sanitize_json_recursive(val),
                    }
                }
            }
            serde_json::Value::Array(arr) => {
                for item in arr.iter_mut() {
                    Self::sanitize_json_recursive(item);
                }
            }
            _ => {}
        }
    }
}
