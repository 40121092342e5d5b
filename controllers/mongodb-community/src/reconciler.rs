//! MongoDBCommunity reconciler registration.
//!
//! Binds the reconciler to a manager: the reconciler takes its `Api` handles
//! and watch configurations from the manager's cache, so the watch scope and
//! any label selector chosen at startup apply without it knowing about them.
//!
//! Watching is driven by `kube_runtime::Controller`, which handles
//! reconnection and backoff of the watch streams; the controller stops
//! gracefully when the manager's shutdown token is cancelled.

use crate::config::ImageConfig;
use crate::error::{ControllerError, Stage};
use crate::manager::{Manager, Runnable};
use crate::selector::LabelSelector;
use crds::MongoDBCommunity;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::StatefulSet;
use kube::{Api, ResourceExt};
use kube_runtime::{Controller, controller::{Action, Config as ControllerConfig}, watcher};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Shared state handed to every reconcile call.
#[derive(Debug)]
pub struct ReconcileContext {
    /// Images used when building MongoDB pods
    pub images: ImageConfig,
    /// Label selector the MongoDBCommunity watch is restricted to
    pub selector: Option<LabelSelector>,
}

impl ReconcileContext {
    /// Requirements of the watch selector that `labels` does not satisfy.
    ///
    /// Empty when there is no selector or every requirement holds.
    pub fn unmet_requirements(&self, labels: &BTreeMap<String, String>) -> Vec<String> {
        match &self.selector {
            Some(selector) if !selector.matches(labels) => selector
                .requirements()
                .iter()
                .filter(|requirement| !requirement.matches(labels))
                .map(ToString::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Reconciler for MongoDBCommunity resources.
pub struct MongoDbReconciler {
    api: Api<MongoDBCommunity>,
    watcher_config: watcher::Config,
    statefulsets: Api<StatefulSet>,
    statefulset_watcher_config: watcher::Config,
    context: Arc<ReconcileContext>,
}

impl fmt::Debug for MongoDbReconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbReconciler")
            .field("watcher_config", &self.watcher_config)
            .field("statefulset_watcher_config", &self.statefulset_watcher_config)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

impl MongoDbReconciler {
    /// Create a reconciler bound to `manager`'s cache.
    pub fn new(manager: &Manager, images: ImageConfig) -> Self {
        let cache = manager.cache();
        Self {
            api: cache.api::<MongoDBCommunity>(),
            watcher_config: cache.watcher_config_for::<MongoDBCommunity>(),
            statefulsets: cache.api::<StatefulSet>(),
            statefulset_watcher_config: cache.watcher_config_for::<StatefulSet>(),
            context: Arc::new(ReconcileContext {
                images,
                selector: cache.selector_for::<MongoDBCommunity>().cloned(),
            }),
        }
    }

    /// Label selector applied to MongoDBCommunity watches, if any.
    pub fn label_selector(&self) -> Option<&str> {
        self.watcher_config.label_selector.as_deref()
    }

    /// Register with `manager`.
    ///
    /// Fails if the kinds this reconciler watches are missing from the
    /// manager's scheme.
    pub fn setup_with_manager(self, manager: &mut Manager) -> Result<(), ControllerError> {
        if !manager.scheme().is_registered::<MongoDBCommunity>() {
            return Err(ControllerError::construction(
                Stage::Reconciler,
                "MongoDBCommunity is not registered in the scheme",
            ));
        }
        if !manager.scheme().is_registered::<StatefulSet>() {
            return Err(ControllerError::construction(
                Stage::Reconciler,
                "StatefulSet is not registered in the scheme",
            ));
        }
        manager.add(Box::new(self))
    }
}

/// Observe a MongoDBCommunity change.
///
/// Deployment logic (StatefulSet and automation config generation) lives
/// outside this crate; here the object is only recorded. Objects outside
/// the watch selector are skipped.
async fn reconcile(resource: Arc<MongoDBCommunity>, ctx: Arc<ReconcileContext>) -> Result<Action, ControllerError> {
    let unmet = ctx.unmet_requirements(resource.labels());
    if !unmet.is_empty() {
        debug!(
            "Skipping MongoDBCommunity {}: labels do not satisfy {}",
            resource.name_any(),
            unmet.join(", ")
        );
        return Ok(Action::await_change());
    }

    debug!(
        "Reconciling MongoDBCommunity {}/{}: {} members, version {}, agent image {}",
        resource.namespace().unwrap_or_default(),
        resource.name_any(),
        resource.spec.members,
        resource.spec.version,
        ctx.images.agent
    );
    Ok(Action::await_change())
}

/// Requeue after a fixed delay on errors.
fn error_policy(resource: Arc<MongoDBCommunity>, error: &ControllerError, _ctx: Arc<ReconcileContext>) -> Action {
    error!("Reconciliation error for MongoDBCommunity {}: {}", resource.name_any(), error);
    Action::requeue(Duration::from_secs(60))
}

#[async_trait::async_trait]
impl Runnable for MongoDbReconciler {
    fn name(&self) -> &str {
        "MongoDBCommunity controller"
    }

    async fn start(self: Box<Self>, shutdown: CancellationToken) -> Result<(), ControllerError> {
        info!(
            "Starting MongoDBCommunity watcher (label selector: {})",
            self.label_selector().unwrap_or("none")
        );

        // Debounce batches bursts of status updates into one reconcile
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(5))
            .concurrency(3);

        Controller::new(self.api, self.watcher_config)
            .owns(self.statefulsets, self.statefulset_watcher_config)
            .with_config(controller_config)
            .graceful_shutdown_on(shutdown.cancelled_owned())
            .run(reconcile, error_policy, self.context)
            .for_each(|res| async move {
                match res {
                    Ok((object, _)) => debug!("Reconciled {}", object),
                    Err(e) => error!("Controller error for MongoDBCommunity: {}", e),
                }
            })
            .await;

        info!("MongoDBCommunity watcher stopped");
        Ok(())
    }
}
