//! Configuration for memgate.
//!
//! Centralized settings for batch execution, the built-in connectors and
//! the optional page cache, with sensible defaults. Loaded from JSON when
//! the host wants to override anything.

use crate::error::{MemError, Result};
use crate::types::size;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Master configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemConfig {
    /// Batch I/O and connector limits.
    pub io: IoConfig,
    /// Page cache settings used by `CachedView`.
    pub cache: CacheConfig,
}

impl MemConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: MemConfig =
            serde_json::from_str(json).map_err(|e| MemError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| MemError::Config(e.to_string()))
    }
}

/// Batch I/O configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Page size used to split virtual requests (power of two).
    pub page_size: u64,
    /// Largest batch accepted at the boundary.
    pub max_batch_entries: usize,
    /// Batches with at least this many entries may run in parallel.
    pub parallel_threshold: usize,
    /// Largest dump file the `file` connector will map.
    pub max_dump_size: u64,
    /// Size of a `dummy` connector created without arguments.
    pub default_dummy_size: u64,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            page_size: 0x1000,
            max_batch_entries: 1 << 20,
            parallel_threshold: 64,
            max_dump_size: size::gb(64),
            default_dummy_size: 0x10000,
        }
    }
}

/// Page cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether sessions wrap new views in a cache.
    pub enabled: bool,
    /// Maximum number of cached pages.
    pub pages: usize,
    /// How long a cached page stays valid, in milliseconds.
    pub validity_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            pages: 256,
            validity_ms: 1000,
        }
    }
}

impl MemConfig {
    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.io.page_size.is_power_of_two() {
            return Err(MemError::Config(format!(
                "page_size {:#x} is not a power of two",
                self.io.page_size
            )));
        }
        if self.io.max_batch_entries == 0 {
            return Err(MemError::Config("max_batch_entries must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = MemConfig::default();
        assert_eq!(cfg.io.page_size, 0x1000);
        assert_eq!(cfg.io.parallel_threshold, 64);
        assert_eq!(cfg.io.default_dummy_size, 0x10000);
        assert!(!cfg.cache.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = MemConfig::from_json_str(r#"{"io": {"parallel_threshold": 8}}"#).unwrap();
        assert_eq!(cfg.io.parallel_threshold, 8);
        assert_eq!(cfg.io.page_size, 0x1000);
        assert_eq!(cfg.cache, CacheConfig::default());
    }

    #[test]
    fn invalid_json_is_config_error() {
        let err = MemConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, MemError::Config(_)));
    }

    #[test]
    fn rejects_odd_page_size() {
        let mut cfg = MemConfig::default();
        cfg.io.page_size = 0x1001;
        assert!(matches!(cfg.validate(), Err(MemError::Config(_))));
    }
}
