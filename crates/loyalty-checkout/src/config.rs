//! # Checkout Configuration
//!
//! Configuration for a storefront device running the checkout engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     LOYALTY_DEVICE_ID=tablet-1                                         │
//! │     LOYALTY_PERSISTENCE_TIMEOUT_MS=3000                                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/loyalty/loyalty.toml (Linux)                             │
//! │     ~/Library/Application Support/com.loyalty.storefront/loyalty.toml  │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     generated device id, 5000 ms deadline, 100 lines x 999 units       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # loyalty.toml
//! [device]
//! id = "550e8400-e29b-41d4-a716-446655440000"
//! name = "Kiosco 1"
//!
//! [storage]
//! database_path = "/var/lib/loyalty/loyalty.db"
//!
//! [checkout]
//! persistence_timeout_ms = 5000
//! max_cart_items = 100
//! max_item_quantity = 999
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConfigError, ConfigResult};
use loyalty_core::{CartLimits, MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

// =============================================================================
// Device
// =============================================================================

/// Identity of this device. The purchase history is keyed by `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (auto-generated if not set).
    #[serde(default = "generate_device_id")]
    pub id: String,

    /// Human-readable device name.
    #[serde(default = "default_device_name")]
    pub name: String,
}

fn generate_device_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_device_name() -> String {
    "Loyalty Storefront".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: generate_device_id(),
            name: default_device_name(),
        }
    }
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file. `None` means the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl StorageConfig {
    /// The configured database path, or `loyalty.db` in the platform data dir.
    pub fn resolved_database_path(&self) -> Option<PathBuf> {
        self.database_path.clone().or_else(|| {
            directories::ProjectDirs::from("com", "loyalty", "storefront")
                .map(|dirs| dirs.data_dir().join("loyalty.db"))
        })
    }
}

// =============================================================================
// Checkout Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSettings {
    /// Deadline for every collaborator call, in milliseconds.
    #[serde(default = "default_persistence_timeout")]
    pub persistence_timeout_ms: u64,

    #[serde(default = "default_max_cart_items")]
    pub max_cart_items: usize,

    #[serde(default = "default_max_item_quantity")]
    pub max_item_quantity: i64,
}

fn default_persistence_timeout() -> u64 {
    5000
}
fn default_max_cart_items() -> usize {
    MAX_CART_ITEMS
}
fn default_max_item_quantity() -> i64 {
    MAX_ITEM_QUANTITY
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            persistence_timeout_ms: default_persistence_timeout(),
            max_cart_items: default_max_cart_items(),
            max_item_quantity: default_max_item_quantity(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete checkout configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckoutConfig {
    #[serde(default)]
    pub device: DeviceConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub checkout: CheckoutSettings,
}

impl CheckoutConfig {
    /// Defaults only, with a freshly generated device id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the effective configuration: defaults, then `loyalty.toml`
    /// (if present), then `LOYALTY_*` variables. The result is validated.
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading checkout config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// [`load`](Self::load), falling back to defaults on any error.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Checkout config unusable, falling back to defaults");
            Self::default()
        })
    }

    /// Writes the config as TOML, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Checkout config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.device.id.trim().is_empty() {
            return Err(ConfigError::Invalid("device.id must not be empty".into()));
        }

        if self.checkout.persistence_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "persistence_timeout_ms must be greater than 0".into(),
            ));
        }

        if self.checkout.max_cart_items == 0 {
            return Err(ConfigError::Invalid(
                "max_cart_items must be greater than 0".into(),
            ));
        }

        if self.checkout.max_item_quantity < 1 {
            return Err(ConfigError::Invalid(
                "max_item_quantity must be at least 1".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `LOYALTY_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("LOYALTY_DEVICE_ID") {
            debug!(device_id = %id, "Overriding device ID from environment");
            self.device.id = id;
        }

        if let Some(name) = lookup("LOYALTY_DEVICE_NAME") {
            self.device.name = name;
        }

        if let Some(path) = lookup("LOYALTY_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.storage.database_path = Some(PathBuf::from(path));
        }

        if let Some(ms) = parsed(&lookup, "LOYALTY_PERSISTENCE_TIMEOUT_MS") {
            self.checkout.persistence_timeout_ms = ms;
        }
        if let Some(max) = parsed(&lookup, "LOYALTY_MAX_CART_ITEMS") {
            self.checkout.max_cart_items = max;
        }
        if let Some(max) = parsed(&lookup, "LOYALTY_MAX_ITEM_QUANTITY") {
            self.checkout.max_item_quantity = max;
        }
    }

    /// `loyalty.toml` in the platform config directory.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "loyalty", "storefront")
            .map(|dirs| dirs.config_dir().join("loyalty.toml"))
    }

    // =========================================================================
    // Accessors used by CheckoutEngine::new
    // =========================================================================

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn persistence_timeout(&self) -> Duration {
        Duration::from_millis(self.checkout.persistence_timeout_ms)
    }

    pub fn cart_limits(&self) -> CartLimits {
        CartLimits {
            max_items: self.checkout.max_cart_items,
            max_quantity: self.checkout.max_item_quantity,
        }
    }
}

/// Numeric override; an unparsable value is logged and ignored.
fn parsed<T: std::str::FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(key, value = %raw, "Ignoring unparsable override");
            None
        }
    }
}
