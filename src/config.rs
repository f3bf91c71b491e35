//! Store configuration and environment loading.

use std::env::VarError;

use thiserror::Error;

use crate::core::store::DEFAULT_RECENT_OPS;

/// Rejected configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held an unusable value.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar {
        /// Variable name.
        var: String,
        /// What was wrong with it.
        reason: String,
    },
    /// A [`StoreConfig`] field holds an unusable value.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

/// Storage keys, write batching and diagnostics sizing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Storage key of the cart document.
    pub cart_key: String,
    /// Storage key of the favorites document.
    pub favorites_key: String,
    /// Write each snapshot as soon as it is produced instead of batching.
    pub write_through: bool,
    /// Longest a batched snapshot waits before it is written.
    pub batch_max_latency_ms: u64,
    /// Bound of the runtime-to-writer queue. At least 1.
    pub persist_queue_bound: usize,
    /// Recent ops kept per store for diagnostics.
    pub recent_ops_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cart_key: "cart-storage".to_string(),
            favorites_key: "favorites-storage".to_string(),
            write_through: true,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            recent_ops_capacity: DEFAULT_RECENT_OPS,
        }
    }
}

impl StoreConfig {
    /// Checks that both storage keys are non-blank and distinct and that the
    /// persist queue holds at least one snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: &str| ConfigError::Invalid {
            field,
            reason: reason.to_string(),
        };
        if self.cart_key.trim().is_empty() {
            return Err(invalid("cart_key", "must not be empty"));
        }
        if self.favorites_key.trim().is_empty() {
            return Err(invalid("favorites_key", "must not be empty"));
        }
        if self.cart_key == self.favorites_key {
            return Err(invalid("favorites_key", "must differ from cart_key"));
        }
        if self.persist_queue_bound == 0 {
            return Err(invalid("persist_queue_bound", "must be at least 1"));
        }
        Ok(())
    }
}

/// Loads configuration from `CARTSTORE_*` environment variables, reading a
/// `.env` file first if one exists.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is set to an unparseable value.
pub fn load_config() -> Result<StoreConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_config_from_env()
}

/// Like [`load_config`] but without reading `.env`.
///
/// # Errors
///
/// Returns `ConfigError` if a variable is set to an unparseable value.
pub fn load_config_from_env() -> Result<StoreConfig, ConfigError> {
    build_config(|key| std::env::var(key))
}

fn build_config<F>(lookup: F) -> Result<StoreConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let defaults = StoreConfig::default();

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u64 = |var: &str, default: u64| -> Result<u64, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw.trim().parse::<u64>().map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    let parse_usize = |var: &str, default: usize| -> Result<usize, ConfigError> {
        match lookup(var) {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|e| invalid(var, e.to_string())),
            Err(_) => Ok(default),
        }
    };

    let parse_bool = |var: &str, default: bool| -> Result<bool, ConfigError> {
        match lookup(var) {
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(invalid(var, format!("expected a boolean, got {other:?}"))),
            },
            Err(_) => Ok(default),
        }
    };

    let key = |var: &str, default: String| -> Result<String, ConfigError> {
        match lookup(var) {
            Ok(raw) if raw.trim().is_empty() => Err(invalid(var, "must not be empty".to_string())),
            Ok(raw) => Ok(raw.trim().to_string()),
            Err(_) => Ok(default),
        }
    };

    let persist_queue_bound = parse_usize("CARTSTORE_PERSIST_QUEUE_BOUND", defaults.persist_queue_bound)?;
    if persist_queue_bound == 0 {
        return Err(invalid("CARTSTORE_PERSIST_QUEUE_BOUND", "must be at least 1".to_string()));
    }

    let cart_key = key("CARTSTORE_CART_KEY", defaults.cart_key)?;
    let favorites_key = key("CARTSTORE_FAVORITES_KEY", defaults.favorites_key)?;
    if cart_key == favorites_key {
        return Err(invalid(
            "CARTSTORE_FAVORITES_KEY",
            format!("must differ from CARTSTORE_CART_KEY ({cart_key:?})"),
        ));
    }

    Ok(StoreConfig {
        cart_key,
        favorites_key,
        write_through: parse_bool("CARTSTORE_WRITE_THROUGH", defaults.write_through)?,
        batch_max_latency_ms: parse_u64("CARTSTORE_BATCH_MAX_LATENCY_MS", defaults.batch_max_latency_ms)?,
        persist_queue_bound,
        recent_ops_capacity: parse_usize("CARTSTORE_RECENT_OPS", defaults.recent_ops_capacity)?,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from_map<'a>(
        map: &'a HashMap<&'a str, &'a str>,
    ) -> impl Fn(&str) -> Result<String, VarError> + 'a {
        move |key| {
            map.get(key)
                .map(|v| (*v).to_string())
                .ok_or(VarError::NotPresent)
        }
    }

    #[test]
    fn empty_env_yields_defaults() {
        let map = HashMap::new();
        let config = build_config(lookup_from_map(&map)).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.cart_key, "cart-storage");
        assert_eq!(config.favorites_key, "favorites-storage");
    }

    #[test]
    fn overrides_are_applied() {
        let mut map = HashMap::new();
        map.insert("CARTSTORE_CART_KEY", "shop-cart");
        map.insert("CARTSTORE_WRITE_THROUGH", "false");
        map.insert("CARTSTORE_BATCH_MAX_LATENCY_MS", "250");
        map.insert("CARTSTORE_PERSIST_QUEUE_BOUND", "8");
        map.insert("CARTSTORE_RECENT_OPS", "0");

        let config = build_config(lookup_from_map(&map)).unwrap();
        assert_eq!(config.cart_key, "shop-cart");
        assert_eq!(config.favorites_key, "favorites-storage");
        assert!(!config.write_through);
        assert_eq!(config.batch_max_latency_ms, 250);
        assert_eq!(config.persist_queue_bound, 8);
        assert_eq!(config.recent_ops_capacity, 0);
    }

    #[test]
    fn zero_queue_bound_is_rejected() {
        let mut map = HashMap::new();
        map.insert("CARTSTORE_PERSIST_QUEUE_BOUND", "0");
        let err = build_config(lookup_from_map(&map)).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "CARTSTORE_PERSIST_QUEUE_BOUND")
        );
    }

    #[test]
    fn unparseable_bool_names_the_variable() {
        let mut map = HashMap::new();
        map.insert("CARTSTORE_WRITE_THROUGH", "sometimes");
        let err = build_config(lookup_from_map(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "CARTSTORE_WRITE_THROUGH"));
    }

    #[test]
    fn blank_storage_key_is_rejected() {
        let mut map = HashMap::new();
        map.insert("CARTSTORE_FAVORITES_KEY", "  ");
        assert!(build_config(lookup_from_map(&map)).is_err());
    }

    #[test]
    fn shared_storage_key_is_rejected() {
        let mut map = HashMap::new();
        map.insert("CARTSTORE_CART_KEY", "same");
        map.insert("CARTSTORE_FAVORITES_KEY", " same ");
        let err = build_config(lookup_from_map(&map)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { ref var, .. } if var == "CARTSTORE_FAVORITES_KEY"));

        map.remove("CARTSTORE_CART_KEY");
        map.insert("CARTSTORE_FAVORITES_KEY", "cart-storage");
        assert!(build_config(lookup_from_map(&map)).is_err());
    }

    #[test]
    fn validate_rejects_hand_built_configs() {
        assert_eq!(StoreConfig::default().validate(), Ok(()));

        let shared = StoreConfig {
            favorites_key: "cart-storage".to_string(),
            ..StoreConfig::default()
        };
        assert!(matches!(
            shared.validate(),
            Err(ConfigError::Invalid { field: "favorites_key", .. })
        ));

        let unbounded = StoreConfig {
            persist_queue_bound: 0,
            ..StoreConfig::default()
        };
        assert!(matches!(
            unbounded.validate(),
            Err(ConfigError::Invalid { field: "persist_queue_bound", .. })
        ));

        let blank = StoreConfig {
            cart_key: " ".to_string(),
            ..StoreConfig::default()
        };
        assert!(blank.validate().is_err());
    }
}
