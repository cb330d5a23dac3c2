//! Rewrite Configuration
//!
//! Options of the contextual rewriter. A configuration is passed explicitly
//! to the rewrite pass; [`RewriteConfig::from_env`] is the only place that
//! reads the process environment.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `KERNELCTX_DEBUG_FALLBACK` | Emit the never-taken branch to the unrewritten original ("true"/"false") | false |
//! | `KERNELCTX_CONTRACT` | Fuse contracted multiply-add chains ("true"/"false") | true |
//! | `KERNELCTX_MAX_CALL_DEPTH` | Interpreter call depth limit | 256 |
//! | `KERNELCTX_MAX_INSTANCE_DEPTH` | Nesting limit of instances being specialized | 64 |
//!
//! # Example
//!
//! ```
//! use kernelctx::config::RewriteConfig;
//!
//! let config = RewriteConfig::builder()
//!     .debug_fallback(true)
//!     .max_call_depth(64)
//!     .build()
//!     .unwrap();
//! assert!(config.debug_fallback);
//! ```

use std::env;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Smallest accepted call depth limit. Deep enough for a wrapper around a
/// kernel that calls through a few helpers.
const MIN_CALL_DEPTH: usize = 4;

/// Options of the contextual rewriter and the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Guard the rewritten entry with a never-taken branch that calls the
    /// unrewritten original.
    pub debug_fallback: bool,
    /// Fuse contracted multiply feeding add/sub into a fused multiply-add.
    pub contraction: bool,
    /// Maximum interpreter call depth.
    pub max_call_depth: usize,
    /// Maximum number of instances being specialized at once, one inside
    /// the other.
    pub max_instance_depth: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            debug_fallback: false,
            contraction: true,
            max_call_depth: 256,
            max_instance_depth: 64,
        }
    }
}

impl RewriteConfig {
    pub fn builder() -> RewriteConfigBuilder {
        RewriteConfigBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their default values.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = parse_env_bool("KERNELCTX_DEBUG_FALLBACK") {
            config.debug_fallback = val;
        }

        if let Some(val) = parse_env_bool("KERNELCTX_CONTRACT") {
            config.contraction = val;
        }

        if let Some(val) = parse_env_usize("KERNELCTX_MAX_CALL_DEPTH") {
            if val >= MIN_CALL_DEPTH {
                config.max_call_depth = val;
            }
        }

        if let Some(val) = parse_env_usize("KERNELCTX_MAX_INSTANCE_DEPTH") {
            if val >= MIN_CALL_DEPTH {
                config.max_instance_depth = val;
            }
        }

        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_call_depth < MIN_CALL_DEPTH {
            return Err(ConfigError::InvalidValue {
                field: "max_call_depth".into(),
                message: format!("must be at least {}", MIN_CALL_DEPTH),
            });
        }
        if self.max_instance_depth < MIN_CALL_DEPTH {
            return Err(ConfigError::InvalidValue {
                field: "max_instance_depth".into(),
                message: format!("must be at least {}", MIN_CALL_DEPTH),
            });
        }
        Ok(())
    }
}

/// Builder for [`RewriteConfig`].
#[derive(Debug, Clone, Default)]
pub struct RewriteConfigBuilder {
    config: RewriteConfig,
}

impl RewriteConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debug_fallback(mut self, enabled: bool) -> Self {
        self.config.debug_fallback = enabled;
        self
    }

    pub fn contraction(mut self, enabled: bool) -> Self {
        self.config.contraction = enabled;
        self
    }

    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.config.max_call_depth = depth;
        self
    }

    pub fn max_instance_depth(mut self, depth: usize) -> Self {
        self.config.max_instance_depth = depth;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<RewriteConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

fn parse_env_usize(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

fn parse_env_bool(name: &str) -> Option<bool> {
    env::var(name).ok().and_then(|s| match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RewriteConfig::default();
        assert!(!config.debug_fallback);
        assert!(config.contraction);
        assert_eq!(config.max_call_depth, 256);
        assert_eq!(config.max_instance_depth, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RewriteConfig::builder()
            .debug_fallback(true)
            .contraction(false)
            .max_call_depth(32)
            .build()
            .unwrap();
        assert!(config.debug_fallback);
        assert!(!config.contraction);
        assert_eq!(config.max_call_depth, 32);
    }

    #[test]
    fn test_builder_validation() {
        let err = RewriteConfig::builder().max_call_depth(1).build().unwrap_err();
        assert!(err.to_string().contains("max_call_depth"));
        let err = RewriteConfig::builder().max_instance_depth(0).build().unwrap_err();
        assert!(err.to_string().contains("max_instance_depth"));
    }

    #[test]
    fn test_from_env() {
        // Only this test touches these variables.
        env::set_var("KERNELCTX_DEBUG_FALLBACK", "on");
        env::set_var("KERNELCTX_CONTRACT", "nonsense");
        env::set_var("KERNELCTX_MAX_CALL_DEPTH", "2");
        let config = RewriteConfig::from_env();
        assert!(config.debug_fallback);
        assert!(config.contraction);
        assert_eq!(config.max_call_depth, 256);

        env::set_var("KERNELCTX_MAX_CALL_DEPTH", " 40 ");
        env::set_var("KERNELCTX_MAX_INSTANCE_DEPTH", "12");
        env::set_var("KERNELCTX_CONTRACT", "0");
        let config = RewriteConfig::from_env();
        assert_eq!(config.max_call_depth, 40);
        assert_eq!(config.max_instance_depth, 12);
        assert!(!config.contraction);

        env::remove_var("KERNELCTX_DEBUG_FALLBACK");
        env::remove_var("KERNELCTX_CONTRACT");
        env::remove_var("KERNELCTX_MAX_CALL_DEPTH");
        env::remove_var("KERNELCTX_MAX_INSTANCE_DEPTH");
        assert_eq!(RewriteConfig::from_env(), RewriteConfig::default());
    }

    #[test]
    fn test_config_serializes() {
        let json = serde_json::to_string(&RewriteConfig::default()).unwrap();
        assert!(json.contains("\"debug_fallback\":false"));
    }
}
