//! Object references used by the MongoDBCommunity CRD
//!
//! Users, TLS material and CA bundles live in Secrets and ConfigMaps in the
//! same namespace as the referencing resource, so references carry a name
//! and, for Secrets, an optional key.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a key inside a Secret in the resource's namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeyReference {
    /// Name of the Secret
    pub name: String,

    /// Key inside the Secret (defaults to "password")
    #[serde(default = "default_password_key")]
    pub key: String,
}

fn default_password_key() -> String {
    "password".to_string()
}

impl SecretKeyReference {
    /// Create a reference to the default `password` key of a Secret
    pub fn password(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: default_password_key(),
        }
    }
}

/// Reference to a Secret or ConfigMap by name in the resource's namespace
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    /// Name of the referenced object
    pub name: String,
}
