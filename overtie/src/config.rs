//! Runtime configuration
//!
//! Read from TOML, every field optional:
//!
//! ```toml
//! max_call_depth = 10000
//! stack_red_zone = 131072
//! stack_grow_size = 4194304
//! ```
//!
//! `OVERTIE_MAX_CALL_DEPTH` in the environment overrides the file.

use crate::error::{MagicError, MagicResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding [`RuntimeConfig::max_call_depth`]
pub const MAX_CALL_DEPTH_ENV: &str = "OVERTIE_MAX_CALL_DEPTH";

/// Knobs for handler invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Maximum nesting of handler calls before `DeepRecursion`
    pub max_call_depth: usize,
    /// Remaining native stack that triggers growth
    pub stack_red_zone: usize,
    /// Size of each native stack extension
    pub stack_grow_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            max_call_depth: 10_000,
            stack_red_zone: 128 * 1024,
            stack_grow_size: 4 * 1024 * 1024,
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(source: &str) -> MagicResult<Self> {
        let config: RuntimeConfig =
            toml::from_str(source).map_err(|e| MagicError::config(e.to_string()))?;
        config.validate()
    }

    /// Load from a file, then apply environment overrides
    pub fn load(path: &Path) -> MagicResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| MagicError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)?.with_env_overrides()
    }

    pub fn with_env_overrides(self) -> MagicResult<Self> {
        match std::env::var(MAX_CALL_DEPTH_ENV) {
            Ok(raw) => self.with_max_call_depth_override(&raw),
            Err(_) => Ok(self),
        }
    }

    fn with_max_call_depth_override(mut self, raw: &str) -> MagicResult<Self> {
        self.max_call_depth = raw.trim().parse().map_err(|_| {
            MagicError::config(format!("{MAX_CALL_DEPTH_ENV}: not a number: {raw:?}"))
        })?;
        self.validate()
    }

    fn validate(self) -> MagicResult<Self> {
        if self.max_call_depth == 0 {
            return Err(MagicError::config("max_call_depth must be at least 1"));
        }
        if self.stack_grow_size < self.stack_red_zone {
            return Err(MagicError::config(
                "stack_grow_size must not be smaller than stack_red_zone",
            ));
        }
        Ok(self)
    }
}
