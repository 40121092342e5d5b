//! Controller-specific error types.
//!
//! Every startup failure is fatal: the process logs the failing stage and
//! exits non-zero, leaving restarts to the external supervisor.

use crate::selector::SelectorParseError;
use std::fmt;
use thiserror::Error;

/// Startup or run stage an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Required environment inputs
    Config,
    /// Watch namespace / label selector resolution
    Scope,
    /// Cluster connection configuration
    Connection,
    /// Manager construction
    Manager,
    /// Object cache construction
    Cache,
    /// Type schema registration
    Scheme,
    /// Reconciler construction and registration
    Reconciler,
    /// OS signal handler installation
    Signal,
    /// Manager run loop
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Config => "config",
            Self::Scope => "watch scope",
            Self::Connection => "connection",
            Self::Manager => "manager",
            Self::Cache => "cache",
            Self::Scheme => "scheme",
            Self::Reconciler => "reconciler",
            Self::Signal => "signal handler",
            Self::Run => "run loop",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while starting or running the operator.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// One or more required environment variables are absent
    #[error("Missing required configuration: {}", .0.join(", "))]
    MissingConfiguration(Vec<String>),

    /// The label selector directive could not be parsed
    #[error("Unable to parse label selector {selector:?}: {source}")]
    InvalidSelector {
        /// Raw selector string
        selector: String,
        /// Parse failure
        #[source]
        source: SelectorParseError,
    },

    /// No cluster connection configuration could be obtained
    #[error("Unable to get cluster connection config: {0}")]
    ConnectionUnavailable(String),

    /// Manager, cache, scheme or reconciler construction failed
    #[error("Unable to construct {stage}: {message}")]
    Construction {
        /// Component being constructed
        stage: Stage,
        /// Failure description
        message: String,
    },

    /// The manager run loop failed
    #[error("Manager run loop failed: {0}")]
    Runtime(String),
}

impl ControllerError {
    /// Shorthand for a construction failure in `stage`.
    pub fn construction(stage: Stage, message: impl Into<String>) -> Self {
        Self::Construction {
            stage,
            message: message.into(),
        }
    }

    /// Stage the failure belongs to, used in the fatal diagnostic.
    pub fn stage(&self) -> Stage {
        match self {
            Self::MissingConfiguration(_) => Stage::Config,
            Self::InvalidSelector { .. } => Stage::Scope,
            Self::ConnectionUnavailable(_) => Stage::Connection,
            Self::Construction { stage, .. } => *stage,
            Self::Runtime(_) => Stage::Run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_lists_every_name() {
        let err = ControllerError::MissingConfiguration(vec![
            "AGENT_IMAGE".to_string(),
            "READINESS_PROBE_IMAGE".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Missing required configuration: AGENT_IMAGE, READINESS_PROBE_IMAGE"
        );
        assert_eq!(err.stage(), Stage::Config);
    }

    #[test]
    fn test_construction_reports_its_stage() {
        let err = ControllerError::construction(Stage::Scheme, "conflicting registration");
        assert_eq!(err.stage(), Stage::Scheme);
        assert_eq!(err.to_string(), "Unable to construct scheme: conflicting registration");
    }
}
