//! Process bootstrap.
//!
//! Runs the startup sequence in order: cluster connection, manager, custom
//! type registration, reconciler registration. Each step short-circuits on
//! failure and nothing is started here; the returned manager is handed to
//! the lifecycle.

use crate::cache::{filtered_cache_builder, CachePrimitive};
use crate::config::OperatorConfig;
use crate::error::ControllerError;
use crate::manager::{Manager, ManagerOptions};
use crate::reconciler::MongoDbReconciler;
use crate::scheme::{add_builtin_types, add_to_scheme, SchemeRegistry};
use crate::scope::{resolve_watch_scope, WatchScope};
use std::collections::HashMap;
use tracing::{debug, info};

/// Source of cluster connection configuration.
#[async_trait::async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connection configuration for the target cluster.
    async fn connection_config(&self) -> Result<kube::Config, ControllerError>;
}

/// Infers the connection from the in-cluster service account, falling back
/// to the local kubeconfig.
#[derive(Debug, Clone, Copy, Default)]
pub struct InferredConnector;

#[async_trait::async_trait]
impl ClusterConnector for InferredConnector {
    async fn connection_config(&self) -> Result<kube::Config, ControllerError> {
        kube::Config::infer()
            .await
            .map_err(|e| ControllerError::ConnectionUnavailable(e.to_string()))
    }
}

/// Build a manager for `scope` with the reconciler registered.
pub async fn bootstrap(
    config: &OperatorConfig,
    scope: &WatchScope,
    connector: &dyn ClusterConnector,
    primitive: &dyn CachePrimitive,
) -> Result<Manager, ControllerError> {
    let connection = connector.connection_config().await?;
    info!("Connected to cluster at {}", connection.cluster_url);

    let mut scheme = SchemeRegistry::new();
    add_builtin_types(&mut scheme)?;

    let mut manager = Manager::new(
        connection,
        ManagerOptions {
            namespace: scope.namespace().to_string(),
            scheme,
            new_cache: filtered_cache_builder(scope),
        },
        primitive,
    )?;

    info!("Registering components");
    add_to_scheme(manager.scheme_mut())?;
    debug!("Scheme holds {} kinds", manager.scheme().kind_count());

    MongoDbReconciler::new(&manager, config.images.clone()).setup_with_manager(&mut manager)?;

    Ok(manager)
}

/// Validate the environment, resolve the watch scope and bootstrap.
///
/// Configuration and scope problems are reported before the cluster is
/// contacted.
pub async fn startup(
    env: &HashMap<String, String>,
    connector: &dyn ClusterConnector,
    primitive: &dyn CachePrimitive,
) -> Result<(WatchScope, Manager), ControllerError> {
    let config = OperatorConfig::from_env_map(env)?;
    info!(
        "Images: agent {}, version upgrade hook {}, readiness probe {}",
        config.images.agent, config.images.version_upgrade_hook, config.images.readiness_probe
    );
    let scope = resolve_watch_scope(config.watch_namespace.as_deref(), config.label_selector.as_deref())?;
    let manager = bootstrap(&config, &scope, connector, primitive).await?;
    Ok((scope, manager))
}
