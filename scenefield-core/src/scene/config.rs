//! Scene configuration.
//!
//! Loaded from JSON. Every key is optional:
//!
//! ```json
//! {
//!     "access_checks": true,
//!     "caching": { "use_caching": true, "cache_delay": 3, "policy": "fixed" }
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::render::{AdaptiveDelay, CacheDelayPolicy, FixedDelay};

/// Graph-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Default access checking for new fields.
    pub access_checks: bool,
    pub caching: CachingOptions,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            access_checks: true,
            caching: CachingOptions::default(),
        }
    }
}

impl SceneConfig {
    /// Parse a configuration from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Display list settings, consulted by lists in [`crate::CacheMode::Options`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachingOptions {
    pub use_caching: bool,
    /// Uncached renders after a change before a list is rebuilt.
    pub cache_delay: u32,
    pub policy: DelayPolicyKind,
    /// Upper bound for the adaptive policy.
    #[serde(default = "default_max_delay")]
    pub max_delay: u32,
}

fn default_max_delay() -> u32 {
    48
}

impl Default for CachingOptions {
    fn default() -> Self {
        Self {
            use_caching: true,
            cache_delay: 3,
            policy: DelayPolicyKind::Fixed,
            max_delay: default_max_delay(),
        }
    }
}

impl CachingOptions {
    pub(crate) fn delay_policy(&self) -> Box<dyn CacheDelayPolicy> {
        match self.policy {
            DelayPolicyKind::Fixed => Box::new(FixedDelay(self.cache_delay)),
            DelayPolicyKind::Adaptive => Box::new(AdaptiveDelay {
                base: self.cache_delay,
                max: self.max_delay,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayPolicyKind {
    #[default]
    Fixed,
    Adaptive,
}
