//! Engine configuration and validation.

use std::error::Error;
use std::fmt;

/// Execution engine settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Steps smaller than this in magnitude trigger a one-time precision
    /// warning. Default: 1e-6.
    pub dt_epsilon: f64,
    /// Run entity passes on the rayon thread pool. Default: true.
    pub parallel: bool,
    /// Seed for per-entity random sources. Default: 0.
    pub seed: u64,
    /// Maximum recovery passes per `execute`; entities still unresolved
    /// afterwards are deleted. `None` = unbounded. Default: `None`.
    pub max_recovery_passes: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dt_epsilon: 1e-6,
            parallel: true,
            seed: 0,
            max_recovery_passes: None,
        }
    }
}

impl EngineConfig {
    /// Check structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.dt_epsilon.is_finite() || self.dt_epsilon < 0.0 {
            return Err(ConfigError::InvalidEpsilon {
                value: self.dt_epsilon,
            });
        }
        if self.max_recovery_passes == Some(0) {
            return Err(ConfigError::ZeroRecoveryPasses);
        }
        Ok(())
    }
}

/// Errors detected by [`EngineConfig::validate`].
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `dt_epsilon` is NaN, infinite or negative.
    InvalidEpsilon {
        /// The invalid value.
        value: f64,
    },
    /// `max_recovery_passes` is `Some(0)`.
    ZeroRecoveryPasses,
    /// A simulation step is zero, NaN or infinite.
    InvalidStep {
        /// The invalid value.
        value: f64,
    },
    /// The output interval is not finite and positive.
    InvalidOutputInterval {
        /// The invalid value.
        value: f64,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEpsilon { value } => {
                write!(f, "dt_epsilon must be finite and non-negative, got {value}")
            }
            Self::ZeroRecoveryPasses => write!(f, "max_recovery_passes must be at least 1"),
            Self::InvalidStep { value } => {
                write!(f, "dt must be finite and non-zero, got {value}")
            }
            Self::InvalidOutputInterval { value } => {
                write!(f, "output_dt must be finite and positive, got {value}")
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_bad_epsilon_and_zero_cap() {
        let mut c = EngineConfig {
            dt_epsilon: f64::NAN,
            ..EngineConfig::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::InvalidEpsilon { .. })));
        c.dt_epsilon = 1e-6;
        c.max_recovery_passes = Some(0);
        assert_eq!(c.validate(), Err(ConfigError::ZeroRecoveryPasses));
    }
}
