//! Object cache construction.
//!
//! The manager builds one [`ObjectCache`] per process. Reconcilers ask it for
//! the `Api` and `watcher::Config` of each kind they watch, so a per-kind
//! label selector set here reaches every watch of that kind and no other.
//!
//! Filtering is only wired in when the watch scope asks for it: a
//! [`CacheBuilder`] carries the parsed selector and the one kind it applies
//! to, and is handed to the manager in place of the default construction.
//! The parsed selector is kept alongside the watch configuration so
//! reconcilers can evaluate it against the objects they receive.

use crate::error::{ControllerError, Stage};
use crate::scheme::gvk_of;
use crate::scope::WatchScope;
use crate::selector::LabelSelector;
use crds::MongoDBCommunity;
use k8s_openapi::NamespaceResourceScope;
use kube::core::GroupVersionKind;
use kube::{Api, Client, Resource};
use kube_runtime::watcher;
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// Generic cache options.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Restrict every watch to this namespace; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Watch configuration for kinds without a selector
    pub default_watcher: watcher::Config,
    /// Per-kind label selectors
    pub selectors_by_object: HashMap<GroupVersionKind, LabelSelector>,
}

impl CacheOptions {
    /// Options for the manager namespace sentinel (`""` means all namespaces).
    pub fn for_namespace(namespace: &str) -> Self {
        Self {
            namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
            ..Self::default()
        }
    }

    /// Label selector for `gvk`, if one was set.
    pub fn selector(&self, gvk: &GroupVersionKind) -> Option<&LabelSelector> {
        self.selectors_by_object.get(gvk)
    }

    /// Effective watch configuration for `gvk`.
    ///
    /// An empty selector matches everything and leaves the default untouched.
    pub fn watcher_config(&self, gvk: &GroupVersionKind) -> watcher::Config {
        match self.selector(gvk) {
            Some(selector) if !selector.is_empty() => self.default_watcher.clone().labels(&selector.to_string()),
            _ => self.default_watcher.clone(),
        }
    }
}

/// Object cache handed to reconcilers.
#[derive(Clone)]
pub struct ObjectCache {
    client: Client,
    options: CacheOptions,
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ObjectCache {
    /// Cache over `client` configured by `options`.
    pub fn new(client: Client, options: CacheOptions) -> Self {
        Self { client, options }
    }

    /// Label selector restricting `K`, if any.
    pub fn selector_for<K>(&self) -> Option<&LabelSelector>
    where
        K: Resource<DynamicType = ()>,
    {
        self.options.selector(&gvk_of::<K>())
    }

    /// Watch configuration for `K`.
    pub fn watcher_config_for<K>(&self) -> watcher::Config
    where
        K: Resource<DynamicType = ()>,
    {
        self.options.watcher_config(&gvk_of::<K>())
    }

    /// `Api` for `K` honoring the cache namespace.
    pub fn api<K>(&self) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        match &self.options.namespace {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

/// Cache-construction primitive.
///
/// Implemented by [`KubeCachePrimitive`] in production; tests substitute a
/// recording implementation.
pub trait CachePrimitive: Send + Sync {
    /// Build a cache from connection configuration and options.
    fn new_cache(&self, config: kube::Config, options: CacheOptions) -> Result<ObjectCache, ControllerError>;
}

/// Builds caches backed by a real `kube::Client`.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeCachePrimitive;

impl CachePrimitive for KubeCachePrimitive {
    fn new_cache(&self, config: kube::Config, options: CacheOptions) -> Result<ObjectCache, ControllerError> {
        let client = Client::try_from(config)
            .map_err(|e| ControllerError::construction(Stage::Cache, format!("failed to create Kubernetes client: {e}")))?;
        Ok(ObjectCache::new(client, options))
    }
}

/// Builds a cache whose watches of one kind are filtered by a label selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBuilder {
    selector: LabelSelector,
    target: GroupVersionKind,
}

impl CacheBuilder {
    /// Builder filtering `K` by `selector`.
    pub fn for_resource<K>(selector: LabelSelector) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            selector,
            target: gvk_of::<K>(),
        }
    }

    /// Add the selector for the target kind; nothing else changes.
    pub fn restrict(&self, mut options: CacheOptions) -> CacheOptions {
        options
            .selectors_by_object
            .insert(self.target.clone(), self.selector.clone());
        options
    }

    /// Restrict `options` and delegate to `primitive`.
    ///
    /// Errors from the primitive are returned unchanged.
    pub fn build(
        self,
        config: kube::Config,
        options: CacheOptions,
        primitive: &dyn CachePrimitive,
    ) -> Result<ObjectCache, ControllerError> {
        info!("Creating cache with label selector: {}", self.selector);
        primitive.new_cache(config, self.restrict(options))
    }
}

/// Cache builder for `scope`: present only for cluster-wide filtered watching.
pub fn filtered_cache_builder(scope: &WatchScope) -> Option<CacheBuilder> {
    scope
        .selector()
        .map(|selector| CacheBuilder::for_resource::<MongoDBCommunity>(selector.clone()))
}
