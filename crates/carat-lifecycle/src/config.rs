//! Lifecycle configuration.

use std::time::Duration;

use crate::archive::DEFAULT_ARCHIVE_CAPACITY;
use crate::error::{LifecycleError, Result};
use crate::naming::NamingConvention;

/// Feedback form linked in every kibitz-opening notice.
pub const DEFAULT_FEEDBACK_FORM_URL: &str = "https://forms.gle/HqNfMv1pte8vo5j59";

/// Configuration for the lifecycle manager.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Resource naming convention
    pub naming: NamingConvention,

    /// Name of the category retired game channels are moved into
    pub archive_category: String,

    /// Maximum number of channels kept in the archive category
    pub archive_capacity: usize,

    /// Feedback form link posted when kibitz opens
    pub feedback_form_url: String,

    /// Upper bound for every individual platform call
    pub io_timeout: Duration,

    /// Reject out-of-order transitions (e.g. ArchiveGame before EndGame)
    pub enforce_ordering: bool,

    /// Role whose holders may act as storyteller for every game
    pub moderator_role: Option<String>,

    /// Channel that receives a line for every command run
    pub audit_channel: Option<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            naming: NamingConvention::default(),
            archive_category: "Archive".to_string(),
            archive_capacity: DEFAULT_ARCHIVE_CAPACITY,
            feedback_form_url: DEFAULT_FEEDBACK_FORM_URL.to_string(),
            io_timeout: Duration::from_secs(10),
            enforce_ordering: true,
            moderator_role: None,
            audit_channel: None,
        }
    }
}

impl LifecycleConfig {
    /// Create config from `CARAT_*` environment variables with defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let naming = &mut config.naming;

        if let Some(v) = lookup("CARAT_GAME_CHANNEL_PREFIX") {
            naming.game_channel_prefix = v;
        }
        if let Some(v) = lookup("CARAT_KIBITZ_CHANNEL_PREFIX") {
            naming.kibitz_channel_prefix = v;
        }
        if let Some(v) = lookup("CARAT_PLAYER_ROLE_PREFIX") {
            naming.player_role_prefix = v;
        }
        if let Some(v) = lookup("CARAT_SPECTATOR_ROLE_PREFIX") {
            naming.spectator_role_prefix = v;
        }
        if let Some(v) = lookup("CARAT_STORYTELLER_ROLE_PREFIX") {
            naming.storyteller_role_prefix = v;
        }
        if let Some(v) = lookup("CARAT_ARCHIVE_CATEGORY") {
            config.archive_category = v;
        }
        if let Some(v) = lookup("CARAT_ARCHIVE_CAPACITY") {
            config.archive_capacity = v.trim().parse().map_err(|_| {
                LifecycleError::Config(format!("CARAT_ARCHIVE_CAPACITY is not a number: {:?}", v))
            })?;
        }
        if let Some(v) = lookup("CARAT_FEEDBACK_URL") {
            config.feedback_form_url = v;
        }
        if let Some(v) = lookup("CARAT_IO_TIMEOUT_MS") {
            let ms: u64 = v.trim().parse().map_err(|_| {
                LifecycleError::Config(format!("CARAT_IO_TIMEOUT_MS is not a number: {:?}", v))
            })?;
            config.io_timeout = Duration::from_millis(ms);
        }
        if let Some(v) = lookup("CARAT_ENFORCE_ORDERING") {
            config.enforce_ordering = parse_bool("CARAT_ENFORCE_ORDERING", &v)?;
        }
        config.moderator_role = lookup("CARAT_MODERATOR_ROLE").filter(|v| !v.trim().is_empty());
        config.audit_channel = lookup("CARAT_AUDIT_CHANNEL").filter(|v| !v.trim().is_empty());

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.archive_capacity == 0 {
            return Err(LifecycleError::Config(
                "archive capacity must be at least 1".into(),
            ));
        }
        if self.io_timeout.is_zero() {
            return Err(LifecycleError::Config("I/O timeout must be positive".into()));
        }
        if self.archive_category.trim().is_empty() {
            return Err(LifecycleError::Config("archive category name is empty".into()));
        }
        let n = &self.naming;
        for prefix in [
            &n.game_channel_prefix,
            &n.kibitz_channel_prefix,
            &n.player_role_prefix,
            &n.spectator_role_prefix,
            &n.storyteller_role_prefix,
        ] {
            if prefix.is_empty() {
                return Err(LifecycleError::Config("resource name prefixes must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Set the archive capacity.
    #[must_use]
    pub fn with_archive_capacity(mut self, capacity: usize) -> Self {
        self.archive_capacity = capacity;
        self
    }

    /// Set the per-call I/O timeout.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Enable or disable transition ordering checks.
    #[must_use]
    pub fn with_enforce_ordering(mut self, enforce: bool) -> Self {
        self.enforce_ordering = enforce;
        self
    }

    /// Let holders of `role` act as storyteller everywhere.
    #[must_use]
    pub fn with_moderator_role(mut self, role: impl Into<String>) -> Self {
        self.moderator_role = Some(role.into());
        self
    }

    /// Mirror audit lines into the named channel.
    #[must_use]
    pub fn with_audit_channel(mut self, channel: impl Into<String>) -> Self {
        self.audit_channel = Some(channel.into());
        self
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(LifecycleError::Config(format!(
            "{} must be a boolean, got {:?}",
            key, value
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = LifecycleConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.archive_capacity, 50);
        assert_eq!(config.archive_category, "Archive");
        assert!(config.enforce_ordering);
        assert_eq!(config.moderator_role, None);
        assert_eq!(config.feedback_form_url, DEFAULT_FEEDBACK_FORM_URL);
    }

    #[test]
    fn overrides() {
        let config = LifecycleConfig::from_lookup(lookup(&[
            ("CARAT_ARCHIVE_CAPACITY", "20"),
            ("CARAT_IO_TIMEOUT_MS", "250"),
            ("CARAT_ENFORCE_ORDERING", "off"),
            ("CARAT_MODERATOR_ROLE", "Mod"),
            ("CARAT_AUDIT_CHANNEL", ""),
            ("CARAT_PLAYER_ROLE_PREFIX", "Player-"),
        ]))
        .unwrap();
        assert_eq!(config.archive_capacity, 20);
        assert_eq!(config.io_timeout, Duration::from_millis(250));
        assert!(!config.enforce_ordering);
        assert_eq!(config.moderator_role.as_deref(), Some("Mod"));
        assert_eq!(config.audit_channel, None);
        assert_eq!(config.naming.player_role_prefix, "Player-");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(LifecycleConfig::from_lookup(lookup(&[("CARAT_ARCHIVE_CAPACITY", "lots")])).is_err());
        assert!(LifecycleConfig::from_lookup(lookup(&[("CARAT_ARCHIVE_CAPACITY", "0")])).is_err());
        assert!(LifecycleConfig::from_lookup(lookup(&[("CARAT_IO_TIMEOUT_MS", "0")])).is_err());
        assert!(LifecycleConfig::from_lookup(lookup(&[("CARAT_ENFORCE_ORDERING", "maybe")])).is_err());
        assert!(LifecycleConfig::from_lookup(lookup(&[("CARAT_GAME_CHANNEL_PREFIX", "")])).is_err());
    }
}
