//! Configuration for php-vfs.
//!
//! A [`Config`] is owned by each serving instance and handed to the
//! [`VirtualFs`](crate::VirtualFs) and [`EnvironmentCache`](crate::EnvironmentCache)
//! it creates. Use [`ConfigBuilder`] for a fluent setup, or [`Config::from_env`]
//! to pick up overrides from the process environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default prefix for variables exposed to executed scripts.
pub const DEFAULT_VAR_PREFIX: &str = "PHPVFS";

/// Default interval between two change-watch ticks.
pub const DEFAULT_WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Runtime configuration for one serving instance.
#[derive(Debug, Clone)]
pub struct Config {
    /// Prefix for every variable the request translator emits.
    /// Example: `PHPVFS` gives `PHPVFS_QUERY_page`.
    pub var_prefix: String,
    /// Development mode: rebuild environments on origin changes and watch
    /// source files in the background.
    pub develop: bool,
    /// Interval between two change-watch ticks.
    pub watch_interval: Duration,
    /// Parent directory for scratch roots. `None` uses the system temp dir.
    pub temp_root: Option<PathBuf>,
    /// Real directory mirrored whole into environments whose script lives under it.
    pub source_root: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            var_prefix: DEFAULT_VAR_PREFIX.to_string(),
            develop: false,
            watch_interval: DEFAULT_WATCH_INTERVAL,
            temp_root: None,
            source_root: None,
        }
    }
}

impl Config {
    /// Create a builder.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Default configuration with overrides from the process environment.
    ///
    /// Recognized variables:
    /// - `PHPVFS_DEVELOP` (`1`/`true`/`yes`/`on`)
    /// - `PHPVFS_WATCH_INTERVAL_MS`
    /// - `PHPVFS_TEMP_ROOT`
    /// - `PHPVFS_VAR_PREFIX`
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(value) = lookup("PHPVFS_DEVELOP") {
            config.develop = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(ms) = lookup("PHPVFS_WATCH_INTERVAL_MS").and_then(|v| v.trim().parse().ok()) {
            config.watch_interval = Duration::from_millis(ms);
        }
        if let Some(root) = lookup("PHPVFS_TEMP_ROOT").filter(|v| !v.is_empty()) {
            config.temp_root = Some(PathBuf::from(root));
        }
        if let Some(prefix) = lookup("PHPVFS_VAR_PREFIX").filter(|v| !v.is_empty()) {
            config.var_prefix = prefix;
        }
        config
    }

    /// Directory under which scratch roots are created.
    pub fn temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Configuration builder for fluent API.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the variable prefix.
    ///
    /// Default: `PHPVFS`
    ///
    /// # Example
    ///
    /// ```
    /// use php_vfs::config::ConfigBuilder;
    ///
    /// let config = ConfigBuilder::new().var_prefix("APP").build();
    /// assert_eq!(config.var_prefix, "APP");
    /// ```
    pub fn var_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.var_prefix = prefix.into();
        self
    }

    /// Enable or disable development mode.
    pub fn develop(mut self, develop: bool) -> Self {
        self.config.develop = develop;
        self
    }

    /// Set the change-watch interval.
    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.config.watch_interval = interval;
        self
    }

    /// Set the parent directory for scratch roots.
    pub fn temp_root(mut self, root: impl AsRef<Path>) -> Self {
        self.config.temp_root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Set the source root mirrored into environments.
    pub fn source_root(mut self, root: impl AsRef<Path>) -> Self {
        self.config.source_root = Some(root.as_ref().to_path_buf());
        self
    }

    /// Finish the configuration.
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.var_prefix, "PHPVFS");
        assert!(!config.develop);
        assert_eq!(config.watch_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_builder() {
        let config = ConfigBuilder::new()
            .var_prefix("APP")
            .develop(true)
            .watch_interval(Duration::from_millis(50))
            .temp_root("/tmp/x")
            .build();
        assert_eq!(config.var_prefix, "APP");
        assert!(config.develop);
        assert_eq!(config.watch_interval, Duration::from_millis(50));
        assert_eq!(config.temp_root(), PathBuf::from("/tmp/x"));
    }

    #[test]
    fn test_from_lookup() {
        let config = Config::from_lookup(|name| match name {
            "PHPVFS_DEVELOP" => Some("Yes".into()),
            "PHPVFS_WATCH_INTERVAL_MS" => Some("250".into()),
            "PHPVFS_VAR_PREFIX" => Some("".into()),
            _ => None,
        });
        assert!(config.develop);
        assert_eq!(config.watch_interval, Duration::from_millis(250));
        assert_eq!(config.var_prefix, "PHPVFS");
        assert!(config.temp_root.is_none());
    }
}
