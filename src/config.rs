//! Configuration for the Agrimesh substrate
//!
//! TOML format, one section per subsystem:
//!
//! ```toml
//! [bus]
//! default_request_timeout_ms = 30000
//! max_delivery_attempts = 3
//! sweep_interval_secs = 60
//!
//! [context]
//! farmer_ttl_secs = 3600
//! fpo_ttl_secs = 86400
//! message_ttl_secs = 600
//! recent_messages_cap = 100
//!
//! [planning]
//! dependency_timeout_ms = 10000
//!
//! [investment]
//! avg_land_holding_ha = 2.0
//! land_ceiling_ha = 50.0
//! ```
//!
//! A missing file yields the defaults; unknown keys are ignored.

use crate::error::{MeshError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete configuration for a mesh process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Broker adapter settings
    #[serde(default)]
    pub bus: BusSettings,

    /// Context store settings
    #[serde(default)]
    pub context: ContextSettings,

    /// Collective planning settings
    #[serde(default)]
    pub planning: PlanningSettings,

    /// Investment unit normalization settings
    #[serde(default)]
    pub investment: InvestmentSettings,
}

/// Broker adapter settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSettings {
    /// Deadline for request/reply when the caller gives none
    #[serde(default = "default_request_timeout_ms")]
    pub default_request_timeout_ms: u64,

    /// Delivery attempts before a failing message is dropped
    #[serde(default = "default_delivery_attempts")]
    pub max_delivery_attempts: u32,

    /// Interval between expired-context sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            default_request_timeout_ms: default_request_timeout_ms(),
            max_delivery_attempts: default_delivery_attempts(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Context store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSettings {
    /// Farmer-scoped context lifetime, slid on every write
    #[serde(default = "default_farmer_ttl")]
    pub farmer_ttl_secs: u64,

    /// FPO-scoped context lifetime; collective state changes less often and
    /// is more expensive to recompute
    #[serde(default = "default_fpo_ttl")]
    pub fpo_ttl_secs: u64,

    /// Per-message context snapshot lifetime
    #[serde(default = "default_message_ttl")]
    pub message_ttl_secs: u64,

    /// Bound on the per-entity message recency list
    #[serde(default = "default_recent_cap")]
    pub recent_messages_cap: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        Self {
            farmer_ttl_secs: default_farmer_ttl(),
            fpo_ttl_secs: default_fpo_ttl(),
            message_ttl_secs: default_message_ttl(),
            recent_messages_cap: default_recent_cap(),
        }
    }
}

/// Collective planning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningSettings {
    /// Deadline for each upstream data dependency (market, climate, yields).
    /// A dependency that misses it is replaced by a fallback, not failed.
    #[serde(default = "default_dependency_timeout_ms")]
    pub dependency_timeout_ms: u64,
}

impl Default for PlanningSettings {
    fn default() -> Self {
        Self {
            dependency_timeout_ms: default_dependency_timeout_ms(),
        }
    }
}

/// Normalization bounds for the investment unit calculator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentSettings {
    /// Sigmoid center for land normalization (typical holding size)
    #[serde(default = "default_avg_land")]
    pub avg_land_holding_ha: f64,

    /// Smallholder sanity ceiling for declared land
    #[serde(default = "default_land_ceiling")]
    pub land_ceiling_ha: f64,

    /// Linear clamp bound for seasonal input spend (₹)
    #[serde(default = "default_max_inputs")]
    pub max_inputs_value: f64,

    /// Linear clamp bound for contributed labor (person-days)
    #[serde(default = "default_max_labor")]
    pub max_labor_days: f64,

    /// Linear clamp bound for equipment value (₹)
    #[serde(default = "default_max_equipment")]
    pub max_equipment_value: f64,
}

impl Default for InvestmentSettings {
    fn default() -> Self {
        Self {
            avg_land_holding_ha: default_avg_land(),
            land_ceiling_ha: default_land_ceiling(),
            max_inputs_value: default_max_inputs(),
            max_labor_days: default_max_labor(),
            max_equipment_value: default_max_equipment(),
        }
    }
}

// Default value helpers

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_delivery_attempts() -> u32 {
    3
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_farmer_ttl() -> u64 {
    3600
}

fn default_fpo_ttl() -> u64 {
    86_400
}

fn default_message_ttl() -> u64 {
    600
}

fn default_recent_cap() -> usize {
    100
}

fn default_dependency_timeout_ms() -> u64 {
    10_000
}

fn default_avg_land() -> f64 {
    2.0
}

fn default_land_ceiling() -> f64 {
    50.0
}

fn default_max_inputs() -> f64 {
    200_000.0
}

fn default_max_labor() -> f64 {
    365.0
}

fn default_max_equipment() -> f64 {
    500_000.0
}

impl MeshConfig {
    /// Load configuration from file, falling back to defaults if absent
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Config file not found, using defaults: {:?}", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: MeshConfig = toml::from_str(&content)
            .map_err(|e| MeshError::Config(format!("Failed to parse config file: {}", e)))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MeshError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = MeshConfig::default();
        assert_eq!(config.bus.default_request_timeout_ms, 30_000);
        assert_eq!(config.bus.max_delivery_attempts, 3);
        assert_eq!(config.context.farmer_ttl_secs, 3600);
        assert_eq!(config.context.fpo_ttl_secs, 86_400);
        assert_eq!(config.context.recent_messages_cap, 100);
        assert_eq!(config.investment.avg_land_holding_ha, 2.0);
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("agrimesh.toml");

        let mut config = MeshConfig::default();
        config.bus.max_delivery_attempts = 5;
        config.context.farmer_ttl_secs = 120;
        config.save(&config_path).unwrap();

        let loaded = MeshConfig::load(&config_path).unwrap();
        assert_eq!(loaded.bus.max_delivery_attempts, 5);
        assert_eq!(loaded.context.farmer_ttl_secs, 120);
        assert_eq!(loaded.planning.dependency_timeout_ms, 10_000);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config = MeshConfig::load(Path::new("/nonexistent/agrimesh.toml")).unwrap();
        assert_eq!(config.bus.default_request_timeout_ms, 30_000);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("partial.toml");
        std::fs::write(&config_path, "[bus]\nmax_delivery_attempts = 7\n").unwrap();

        let loaded = MeshConfig::load(&config_path).unwrap();
        assert_eq!(loaded.bus.max_delivery_attempts, 7);
        assert_eq!(loaded.bus.default_request_timeout_ms, 30_000);
        assert_eq!(loaded.context.fpo_ttl_secs, 86_400);
    }
}
