//! Scan configuration file support.
//!
//! A scan config is a TOML file naming the requested capability, the active
//! model, the active backends, and any disambiguation rules. It plays the
//! role of the ini file in a full inference run: everything the resolver
//! needs to know beyond the registry itself.
//!
//! ```toml
//! [request]
//! capability = "nevents_like"
//! model = "test_parent_I"
//! backends = ["MargLike1"]
//!
//! [rules.providers]
//! nevents = "example::nevents_dbl"
//!
//! [scan]
//! points = 500
//! seed = 42
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::resolver::Rules;

/// A complete scan configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// What to resolve and under which model/backends
    pub request: RequestConfig,

    /// Disambiguation rules
    pub rules: RulesConfig,

    /// Scan driver settings
    pub scan: ScanSettings,
}

/// The requested quantity and the active model/backend set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Top-level capability to resolve (result type is the scan likelihood type)
    pub capability: String,

    /// Active model name
    pub model: String,

    /// Active backend names
    pub backends: Vec<String>,
}

/// User overrides pinning providers and backends.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// capability name -> provider function name (or `module::function`)
    pub providers: HashMap<String, String>,

    /// requirement symbol or group name -> backend name
    pub backends: HashMap<String, String>,
}

/// Scan driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Number of points to sample
    pub points: usize,

    /// RNG seed (random when absent)
    pub seed: Option<u64>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        ScanSettings {
            points: 100,
            seed: None,
        }
    }
}

impl ScanConfig {
    /// Load a scan configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read scan config at {}", path.display()))?;
        let config: ScanConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse scan config at {}", path.display()))?;
        Ok(config)
    }

    /// Convert the `[rules]` tables into resolver rules.
    pub fn to_rules(&self) -> Rules {
        let mut rules = Rules::new();
        for (capability, function) in &self.rules.providers {
            rules.pin_provider(capability, function);
        }
        for (requirement, backend) in &self.rules.backends {
            rules.pin_backend(requirement, backend);
        }
        rules
    }
}
