//! Operator configuration.
//!
//! The environment is read exactly once, at the process boundary, into a
//! string map. Everything downstream works on the explicit [`OperatorConfig`]
//! built from that map, which keeps validation a pure function.

use crate::error::ControllerError;
use std::collections::HashMap;
use tracing::error;

/// Namespace to watch, or `*` for every namespace.
pub const WATCH_NAMESPACE_ENV: &str = "WATCH_NAMESPACE";
/// Optional label selector applied to MongoDBCommunity in cluster-wide mode.
pub const LABEL_SELECTOR_ENV: &str = "LABEL_SELECTOR";
/// MongoDB agent image.
pub const AGENT_IMAGE_ENV: &str = "AGENT_IMAGE";
/// Version upgrade post-start hook image.
pub const VERSION_UPGRADE_HOOK_IMAGE_ENV: &str = "VERSION_UPGRADE_HOOK_IMAGE";
/// Readiness probe image.
pub const READINESS_PROBE_IMAGE_ENV: &str = "READINESS_PROBE_IMAGE";

/// Ordered set of environment variables that must all be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredConfig {
    names: Vec<&'static str>,
}

impl RequiredConfig {
    /// Create a required set from `names`, keeping their order.
    pub fn new(names: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            names: names.into_iter().collect(),
        }
    }

    /// Image references the reconciler needs.
    pub fn operator_images() -> Self {
        Self::new([
            AGENT_IMAGE_ENV,
            VERSION_UPGRADE_HOOK_IMAGE_ENV,
            READINESS_PROBE_IMAGE_ENV,
        ])
    }

    /// Every required name absent from `env`, in declaration order.
    ///
    /// Presence is what counts: a variable set to the empty string is present.
    pub fn missing(&self, env: &HashMap<String, String>) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| !env.contains_key(**name))
            .map(|name| (*name).to_string())
            .collect()
    }

    /// Logs one error per missing variable and reports whether all are present.
    pub fn has_required_variables(&self, env: &HashMap<String, String>) -> bool {
        let missing = self.missing(env);
        for name in &missing {
            error!("required environment variable {} not found", name);
        }
        missing.is_empty()
    }
}

/// Container images handed to the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    /// MongoDB agent image
    pub agent: String,
    /// Version upgrade hook image
    pub version_upgrade_hook: String,
    /// Readiness probe image
    pub readiness_probe: String,
}

/// Validated operator configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    /// Raw `WATCH_NAMESPACE` directive; interpreted by the scope resolver
    pub watch_namespace: Option<String>,
    /// Raw `LABEL_SELECTOR` directive; interpreted by the scope resolver
    pub label_selector: Option<String>,
    /// Image references
    pub images: ImageConfig,
}

impl OperatorConfig {
    /// Build the configuration from a string map.
    ///
    /// Fails with [`ControllerError::MissingConfiguration`] naming every
    /// missing required variable, not just the first.
    pub fn from_env_map(env: &HashMap<String, String>) -> Result<Self, ControllerError> {
        let required = RequiredConfig::operator_images();
        if !required.has_required_variables(env) {
            return Err(ControllerError::MissingConfiguration(required.missing(env)));
        }

        let lookup = |name: &str| env.get(name).cloned().unwrap_or_default();
        Ok(Self {
            watch_namespace: env.get(WATCH_NAMESPACE_ENV).cloned(),
            label_selector: env.get(LABEL_SELECTOR_ENV).cloned(),
            images: ImageConfig {
                agent: lookup(AGENT_IMAGE_ENV),
                version_upgrade_hook: lookup(VERSION_UPGRADE_HOOK_IMAGE_ENV),
                readiness_probe: lookup(READINESS_PROBE_IMAGE_ENV),
            },
        })
    }
}
