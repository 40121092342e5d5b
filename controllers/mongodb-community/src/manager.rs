//! Manager implementation.
//!
//! The `Manager` owns everything the run loop needs: the namespace it was
//! scoped to, the object cache, the type schema registry and the registered
//! runnables. It is built once during bootstrap and started once.

use crate::cache::{CacheBuilder, CacheOptions, CachePrimitive, ObjectCache};
use crate::error::{ControllerError, Stage};
use crate::scheme::SchemeRegistry;
use std::fmt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Long-running component started by the manager.
///
/// `start` must return once `shutdown` is cancelled.
#[async_trait::async_trait]
pub trait Runnable: Send {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Run until `shutdown` is cancelled or an unrecoverable error occurs.
    async fn start(self: Box<Self>, shutdown: CancellationToken) -> Result<(), ControllerError>;
}

/// Options for [`Manager::new`].
#[derive(Debug, Default)]
pub struct ManagerOptions {
    /// Namespace to watch; the empty string means all namespaces
    pub namespace: String,
    /// Registry of known kinds
    pub scheme: SchemeRegistry,
    /// Custom cache construction, used instead of the default when present
    pub new_cache: Option<CacheBuilder>,
}

/// Owns the cache, scheme and runnables of the process.
pub struct Manager {
    namespace: String,
    scheme: SchemeRegistry,
    cache: ObjectCache,
    runnables: Vec<Box<dyn Runnable>>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runnables: Vec<&str> = self.runnables.iter().map(|r| r.name()).collect();
        f.debug_struct("Manager")
            .field("namespace", &self.namespace)
            .field("scheme", &self.scheme)
            .field("cache", &self.cache)
            .field("runnables", &runnables)
            .finish()
    }
}

impl Manager {
    /// Build the manager and its cache.
    pub fn new(
        config: kube::Config,
        options: ManagerOptions,
        primitive: &dyn CachePrimitive,
    ) -> Result<Self, ControllerError> {
        let cache_options = CacheOptions::for_namespace(&options.namespace);
        let cache = match options.new_cache {
            Some(builder) => builder.build(config, cache_options, primitive)?,
            None => primitive.new_cache(config, cache_options)?,
        };

        Ok(Self {
            namespace: options.namespace,
            scheme: options.scheme,
            cache,
            runnables: Vec::new(),
        })
    }

    /// Namespace the manager was scoped to (`""` for all namespaces).
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Object cache shared by reconcilers.
    pub fn cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Type schema registry.
    pub fn scheme(&self) -> &SchemeRegistry {
        &self.scheme
    }

    /// Mutable access to the type schema registry, for registration.
    pub fn scheme_mut(&mut self) -> &mut SchemeRegistry {
        &mut self.scheme
    }

    /// Register a runnable to be started with the manager.
    ///
    /// Names must be unique within a manager.
    pub fn add(&mut self, runnable: Box<dyn Runnable>) -> Result<(), ControllerError> {
        if self.runnables.iter().any(|r| r.name() == runnable.name()) {
            return Err(ControllerError::construction(
                Stage::Manager,
                format!("runnable {} is already registered", runnable.name()),
            ));
        }
        info!("Registered runnable {}", runnable.name());
        self.runnables.push(runnable);
        Ok(())
    }

    /// Number of registered runnables.
    pub fn runnable_count(&self) -> usize {
        self.runnables.len()
    }

    /// Start every runnable and block until shutdown or failure.
    ///
    /// Cancelling `shutdown` stops all runnables and returns `Ok` once they
    /// have finished. The first runnable that fails, or that returns before
    /// shutdown was requested, cancels the rest and its error is returned.
    pub async fn start(self, shutdown: CancellationToken) -> Result<(), ControllerError> {
        let scope = match self.namespace() {
            "" => "all namespaces",
            namespace => namespace,
        };
        if self.runnable_count() == 0 {
            info!("No runnables registered for {}, waiting for shutdown", scope);
            shutdown.cancelled().await;
            return Ok(());
        }
        info!("Starting {} runnable(s) for {}", self.runnable_count(), scope);

        let mut tasks = JoinSet::new();
        for runnable in self.runnables {
            let name = runnable.name().to_string();
            let token = shutdown.clone();
            tasks.spawn(async move { (name, runnable.start(token).await) });
        }

        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            let error = match joined {
                Ok((_, Ok(()))) if shutdown.is_cancelled() => continue,
                Ok((name, Ok(()))) => ControllerError::Runtime(format!("{name} stopped before shutdown was requested")),
                Ok((name, Err(e))) => ControllerError::Runtime(format!("{name} failed: {e}")),
                Err(e) => ControllerError::Runtime(format!("runnable panicked: {e}")),
            };
            error!("{}", error);
            shutdown.cancel();
            failure.get_or_insert(error);
        }

        match failure {
            Some(error) => Err(error),
            None => {
                info!("All runnables stopped");
                Ok(())
            }
        }
    }
}
