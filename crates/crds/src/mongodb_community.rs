//! MongoDBCommunity CRD
//!
//! Declares a MongoDB replica set managed by the operator.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use crate::references::{LocalObjectReference, SecretKeyReference};

#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "mongodbcommunity.mongodb.com",
    version = "v1",
    kind = "MongoDBCommunity",
    plural = "mongodbcommunity",
    shortname = "mdbc",
    namespaced,
    status = "MongoDBCommunityStatus",
    printcolumn = r#"{"name":"Phase","type":"string","jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Version","type":"string","jsonPath":".status.version"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBCommunitySpec {
    /// Number of replica set members
    pub members: u32,

    /// Deployment type
    #[serde(rename = "type", default)]
    pub deployment_type: DeploymentType,

    /// MongoDB server version (e.g. "6.0.5")
    pub version: String,

    /// Number of arbiters added to the replica set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arbiters: Option<u32>,

    /// Feature compatibility version (defaults to the major.minor of `version`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_compatibility_version: Option<String>,

    /// Authentication and TLS settings
    #[serde(default)]
    pub security: Security,

    /// Database users to create
    #[serde(default)]
    pub users: Vec<MongoDBUser>,
}

impl MongoDBCommunitySpec {
    /// Feature compatibility version, falling back to the major.minor of `version`
    pub fn effective_feature_compatibility_version(&self) -> String {
        if let Some(fcv) = &self.feature_compatibility_version {
            return fcv.clone();
        }
        let mut parts = self.version.splitn(3, '.');
        match (parts.next(), parts.next()) {
            (Some(major), Some(minor)) => format!("{major}.{minor}"),
            _ => self.version.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum DeploymentType {
    /// Replica set deployment
    #[default]
    ReplicaSet,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    /// Authentication settings
    #[serde(default)]
    pub authentication: Authentication,

    /// TLS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<Tls>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Authentication {
    /// Enabled authentication mechanisms
    #[serde(default)]
    pub modes: Vec<AuthMode>,

    /// Keep users that exist in the deployment but not in `spec.users`
    #[serde(default)]
    pub ignore_unknown_users: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum AuthMode {
    #[serde(rename = "SCRAM")]
    Scram,
    #[serde(rename = "SCRAM-SHA-1")]
    ScramSha1,
    #[serde(rename = "SCRAM-SHA-256")]
    ScramSha256,
    #[serde(rename = "X509")]
    X509,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tls {
    /// Whether TLS is enabled
    pub enabled: bool,

    /// Accept non-TLS connections alongside TLS ones
    #[serde(default)]
    pub optional: bool,

    /// Secret holding the server certificate and key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_key_secret_ref: Option<LocalObjectReference>,

    /// ConfigMap holding the CA certificate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_config_map_ref: Option<LocalObjectReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBUser {
    /// User name
    pub name: String,

    /// Authentication database
    #[serde(default = "default_user_db")]
    pub db: String,

    /// Secret holding the user's password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_secret_ref: Option<SecretKeyReference>,

    /// Roles granted to the user
    #[serde(default)]
    pub roles: Vec<Role>,

    /// Name of the Secret the SCRAM credentials are written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scram_credentials_secret_name: Option<String>,
}

fn default_user_db() -> String {
    "admin".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Role {
    /// Role name
    pub name: String,

    /// Database the role applies to
    pub db: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Pending,
    Running,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct MongoDBCommunityStatus {
    /// Connection string for the replica set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongo_uri: Option<String>,

    /// Current phase
    #[serde(default)]
    pub phase: Phase,

    /// Version currently running
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Ready replicas of the backing StatefulSet
    #[serde(default)]
    pub current_stateful_set_replicas: u32,

    /// Members currently part of the replica set
    #[serde(default)]
    pub current_mongo_db_members: u32,

    /// Human-readable status message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
