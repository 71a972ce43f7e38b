//! Decoder configuration.
//!
//! Sizes and the execution strategy are fixed when a decoder is built. Values
//! can be assembled in code with the `with_*` builders or loaded from layered
//! sources through figment.

use figment::{
    providers::{Env, Format, Serialized, Toml, Yaml},
    Figment,
};
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use crate::error::{DecodeError, Result};
use crate::types::DecoderDims;

/// Built-in defaults.
pub mod defaults {
    /// Batch elements decoded per call.
    pub const BATCH_SIZE: usize = 1;

    /// Timesteps per batch element.
    pub const MAX_T: usize = 100;

    /// Alphabet classes, excluding the blank.
    pub const MAX_C: usize = 80;

    /// Default configuration file names, merged in this order.
    pub const TOML_FILE: &str = "bestpath.toml";
    pub const YAML_FILE: &str = "bestpath.yaml";

    /// Prefix for environment overrides, e.g. `BESTPATH_MAX_T=32`.
    pub const ENV_PREFIX: &str = "BESTPATH_";
}

/// How the per-timestep argmax and the collapse are scheduled.
///
/// Both strategies produce identical labels; the choice only affects how work
/// is split into groups and lanes.
///
/// Configuration files, environment variables and the command line all parse
/// through [`FromStr`], so `"2"`, `two_phase` and an integer `2` are accepted
/// wherever `two-phase` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Strategy {
    /// One group per batch element, one lane per timestep, collapse after a
    /// group barrier.
    Fused,
    /// One group per (element, timestep) with a reduction tree, then a second
    /// dispatch that collapses each element.
    #[default]
    TwoPhase,
}

impl Strategy {
    /// Numeric variant id (1 = fused, 2 = two-phase).
    pub fn variant(self) -> u8 {
        match self {
            Strategy::Fused => 1,
            Strategy::TwoPhase => 2,
        }
    }

    /// Number of dispatches one `compute` call issues.
    pub fn dispatch_count(self) -> usize {
        match self {
            Strategy::Fused => 1,
            Strategy::TwoPhase => 2,
        }
    }

    /// Canonical name, as written back to configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Fused => "fused",
            Strategy::TwoPhase => "two-phase",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fused" | "single-pass" | "1" => Ok(Strategy::Fused),
            "two-phase" | "two_phase" | "twophase" | "2" => Ok(Strategy::TwoPhase),
            other => Err(DecodeError::Configuration(format!(
                "unsupported strategy '{}', expected 'fused' or 'two-phase'",
                other
            ))),
        }
    }
}

impl Serialize for Strategy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Strategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(StrategyVisitor)
    }
}

struct StrategyVisitor;

impl<'de> Visitor<'de> for StrategyVisitor {
    type Value = Strategy;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a strategy name (fused, two-phase) or variant id (1, 2)")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<Strategy, E> {
        value.parse().map_err(E::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<Strategy, E> {
        self.visit_str(&value.to_string())
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<Strategy, E> {
        self.visit_str(&value.to_string())
    }
}

/// Construction-time settings for a `BatchDecoder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Number of batch elements per call.
    pub batch_size: usize,

    /// Number of timesteps per element.
    pub max_t: usize,

    /// Number of alphabet classes; the blank is the extra class `max_c`.
    pub max_c: usize,

    /// Execution strategy.
    #[serde(default)]
    pub strategy: Strategy,

    /// Worker threads for the CPU backend (defaults to logical CPU count).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Serialize dispatches on one worker and trace every kernel.
    #[serde(default)]
    pub debug_dispatch: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            max_t: defaults::MAX_T,
            max_c: defaults::MAX_C,
            strategy: Strategy::default(),
            workers: None,
            debug_dispatch: false,
        }
    }
}

impl DecoderConfig {
    /// Create a configuration for the given sizes with default strategy.
    pub fn new(batch_size: usize, max_t: usize, max_c: usize) -> Self {
        Self {
            batch_size,
            max_t,
            max_c,
            ..Self::default()
        }
    }

    /// Set the execution strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the CPU worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Enable or disable dispatch debugging.
    pub fn with_debug_dispatch(mut self, enabled: bool) -> Self {
        self.debug_dispatch = enabled;
        self
    }

    /// Load configuration from multiple sources with precedence:
    /// 1. `BESTPATH_`-prefixed environment variables (highest priority)
    /// 2. bestpath.yaml (if exists)
    /// 3. bestpath.toml (if exists)
    /// 4. Built-in defaults (lowest priority)
    pub fn load() -> Result<Self> {
        Self::extract(
            Figment::new()
                .merge(Self::default_figment())
                .merge(Toml::file(defaults::TOML_FILE))
                .merge(Yaml::file(defaults::YAML_FILE))
                .merge(Env::prefixed(defaults::ENV_PREFIX)),
        )
    }

    /// Load configuration from one TOML or YAML file layered over the defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let figment = Figment::new().merge(Self::default_figment());
        let figment = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => figment.merge(Yaml::file(path)),
            Some("toml") => figment.merge(Toml::file(path)),
            _ => {
                return Err(DecodeError::Configuration(format!(
                    "unsupported configuration file {:?}, expected .toml or .yaml",
                    path
                )))
            }
        };
        debug!("Loading decoder configuration from {:?}", path);
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: DecoderConfig = figment.extract().map_err(|e| {
            DecodeError::Configuration(format!("Failed to load configuration: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    fn default_figment() -> Figment {
        Figment::from(Serialized::defaults(DecoderConfig::default()))
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(DecodeError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_t == 0 {
            return Err(DecodeError::Configuration(
                "max_t must be at least 1".to_string(),
            ));
        }
        if self.max_c == 0 {
            return Err(DecodeError::Configuration(
                "max_c must be at least 1 (the blank is implicit)".to_string(),
            ));
        }
        // Labels travel as i32; the blank (max_c) must fit.
        if self.max_c >= i32::MAX as usize {
            return Err(DecodeError::Configuration(format!(
                "max_c {} does not fit the i32 label type",
                self.max_c
            )));
        }
        if self
            .batch_size
            .checked_mul(self.max_t)
            .and_then(|n| n.checked_mul(self.max_c + 1))
            .is_none()
        {
            return Err(DecodeError::Configuration(
                "batch_size * max_t * (max_c + 1) overflows".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(DecodeError::Configuration(
                "workers must be at least 1 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Decoder dimensions implied by this configuration.
    pub fn dims(&self) -> DecoderDims {
        DecoderDims::new(self.batch_size, self.max_t, self.max_c)
    }

    /// Effective CPU worker count.
    pub fn effective_workers(&self) -> usize {
        if self.debug_dispatch {
            1
        } else {
            self.workers.unwrap_or_else(num_cpus::get).max(1)
        }
    }

    /// Export configuration to TOML format.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DecodeError::Configuration(format!("Failed to serialize to TOML: {}", e)))
    }

    /// Export configuration to YAML format.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| DecodeError::Configuration(format!("Failed to serialize to YAML: {}", e)))
    }
}
