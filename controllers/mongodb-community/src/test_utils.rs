//! Test utilities for unit testing the startup path
//!
//! Provides environment fixtures and stand-ins for the cluster connection
//! and cache-construction seams, so bootstrap can be exercised without a
//! running API server.

use crate::bootstrap::ClusterConnector;
use crate::cache::{CacheOptions, CachePrimitive, ObjectCache};
use crate::config::{
    AGENT_IMAGE_ENV, LABEL_SELECTOR_ENV, READINESS_PROBE_IMAGE_ENV, VERSION_UPGRADE_HOOK_IMAGE_ENV,
    WATCH_NAMESPACE_ENV,
};
use crate::error::{ControllerError, Stage};
use crate::manager::Runnable;
use kube::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Environment with every required image set.
pub fn operator_env(namespace: &str, label_selector: Option<&str>) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert(WATCH_NAMESPACE_ENV.to_string(), namespace.to_string());
    env.insert(
        AGENT_IMAGE_ENV.to_string(),
        "quay.io/mongodb/mongodb-agent:12.0.25".to_string(),
    );
    env.insert(
        VERSION_UPGRADE_HOOK_IMAGE_ENV.to_string(),
        "quay.io/mongodb/mongodb-kubernetes-operator-version-upgrade-post-start-hook:1.0.7".to_string(),
    );
    env.insert(
        READINESS_PROBE_IMAGE_ENV.to_string(),
        "quay.io/mongodb/mongodb-kubernetes-readinessprobe:1.0.14".to_string(),
    );
    if let Some(selector) = label_selector {
        env.insert(LABEL_SELECTOR_ENV.to_string(), selector.to_string());
    }
    env
}

/// Connection config pointing at an address nothing listens on.
pub fn test_connection_config() -> kube::Config {
    kube::Config::new("http://127.0.0.1:6443".parse().unwrap())
}

/// Client for `config`. Needs a Tokio runtime.
pub fn test_client(config: kube::Config) -> Client {
    let _ = rustls::crypto::ring::default_provider().install_default();
    Client::try_from(config).unwrap()
}

/// Connector returning a fixed config and counting calls.
#[derive(Debug, Default)]
pub struct StaticConnector {
    calls: AtomicUsize,
}

impl StaticConnector {
    /// Number of times the connection config was requested.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ClusterConnector for StaticConnector {
    async fn connection_config(&self) -> Result<kube::Config, ControllerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(test_connection_config())
    }
}

/// Connector that never finds credentials.
#[derive(Debug, Default)]
pub struct FailingConnector;

#[async_trait::async_trait]
impl ClusterConnector for FailingConnector {
    async fn connection_config(&self) -> Result<kube::Config, ControllerError> {
        Err(ControllerError::ConnectionUnavailable(
            "no in-cluster service account and no kubeconfig".to_string(),
        ))
    }
}

/// Cache primitive recording the options it was called with.
#[derive(Debug, Clone, Default)]
pub struct RecordingCachePrimitive {
    calls: Arc<Mutex<Vec<CacheOptions>>>,
}

impl RecordingCachePrimitive {
    /// Options of every call so far.
    pub fn recorded(&self) -> Vec<CacheOptions> {
        self.calls.lock().unwrap().clone()
    }
}

impl CachePrimitive for RecordingCachePrimitive {
    fn new_cache(&self, config: kube::Config, options: CacheOptions) -> Result<ObjectCache, ControllerError> {
        self.calls.lock().unwrap().push(options.clone());
        Ok(ObjectCache::new(test_client(config), options))
    }
}

/// Cache primitive that always fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingCachePrimitive;

impl FailingCachePrimitive {
    /// Message carried by the error.
    pub const MESSAGE: &'static str = "connection refused";
}

impl CachePrimitive for FailingCachePrimitive {
    fn new_cache(&self, _config: kube::Config, _options: CacheOptions) -> Result<ObjectCache, ControllerError> {
        Err(ControllerError::construction(Stage::Cache, Self::MESSAGE))
    }
}

/// What a [`TestRunnable`] does once started.
#[derive(Debug, Clone)]
pub enum TestBehavior {
    /// Wait for shutdown, then return `Ok`
    UntilShutdown,
    /// Fail immediately
    Fail(String),
    /// Return `Ok` without waiting for shutdown
    ExitEarly,
}

/// Runnable with scripted behavior that records whether it was started.
#[derive(Debug, Clone)]
pub struct TestRunnable {
    name: String,
    behavior: TestBehavior,
    started: Arc<AtomicUsize>,
}

impl TestRunnable {
    /// New runnable and the counter of its starts.
    pub fn new(name: &str, behavior: TestBehavior) -> (Self, Arc<AtomicUsize>) {
        let started = Arc::new(AtomicUsize::new(0));
        let runnable = Self {
            name: name.to_string(),
            behavior,
            started: started.clone(),
        };
        (runnable, started)
    }
}

#[async_trait::async_trait]
impl Runnable for TestRunnable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(self: Box<Self>, shutdown: CancellationToken) -> Result<(), ControllerError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            TestBehavior::UntilShutdown => {
                shutdown.cancelled().await;
                Ok(())
            }
            TestBehavior::Fail(message) => Err(ControllerError::Runtime(message)),
            TestBehavior::ExitEarly => Ok(()),
        }
    }
}
