//! Type schema registry.
//!
//! Records which Kubernetes kinds the process can watch and deserialize.
//! The registry is an ordinary value built during bootstrap and handed to
//! the manager; there is no process-wide instance.

use crate::error::{ControllerError, Stage};
use crds::MongoDBCommunity;
use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::{ConfigMap, Pod, Secret, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::core::GroupVersionKind;
use kube::Resource;
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use tracing::debug;

/// Group/version/kind of a statically typed resource.
pub fn gvk_of<K>() -> GroupVersionKind
where
    K: Resource<DynamicType = ()>,
{
    GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RegisteredType {
    type_id: TypeId,
    type_name: &'static str,
    plural: String,
}

/// Registry mapping group/version/kind to the Rust type that represents it.
#[derive(Debug, Clone, Default)]
pub struct SchemeRegistry {
    known_types: HashMap<GroupVersionKind, RegisteredType>,
}

impl SchemeRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `K`.
    ///
    /// Registering the same type twice is a no-op; registering a different
    /// type under an already known group/version/kind is an error.
    pub fn add_known_type<K>(&mut self) -> Result<(), ControllerError>
    where
        K: Resource<DynamicType = ()> + 'static,
    {
        let gvk = gvk_of::<K>();
        let entry = RegisteredType {
            type_id: TypeId::of::<K>(),
            type_name: type_name::<K>(),
            plural: K::plural(&()).into_owned(),
        };
        match self.known_types.get(&gvk) {
            Some(existing) if existing.type_id == entry.type_id => Ok(()),
            Some(existing) => Err(ControllerError::construction(
                Stage::Scheme,
                format!(
                    "{}/{} {} is already registered as {}, refusing to register {}",
                    gvk.group, gvk.version, gvk.kind, existing.type_name, entry.type_name
                ),
            )),
            None => {
                debug!("Registered {}/{} {} ({})", gvk.group, gvk.version, gvk.kind, entry.plural);
                self.known_types.insert(gvk, entry);
                Ok(())
            }
        }
    }

    /// Whether `K` is registered.
    pub fn is_registered<K>(&self) -> bool
    where
        K: Resource<DynamicType = ()> + 'static,
    {
        self.known_types
            .get(&gvk_of::<K>())
            .is_some_and(|entry| entry.type_id == TypeId::of::<K>())
    }

    /// Number of registered kinds.
    pub fn kind_count(&self) -> usize {
        self.known_types.len()
    }
}

/// Register the built-in Kubernetes kinds the reconciler reads or owns.
pub fn add_builtin_types(scheme: &mut SchemeRegistry) -> Result<(), ControllerError> {
    scheme.add_known_type::<Pod>()?;
    scheme.add_known_type::<Service>()?;
    scheme.add_known_type::<Secret>()?;
    scheme.add_known_type::<ConfigMap>()?;
    scheme.add_known_type::<ServiceAccount>()?;
    scheme.add_known_type::<StatefulSet>()?;
    scheme.add_known_type::<Role>()?;
    scheme.add_known_type::<RoleBinding>()?;
    Ok(())
}

/// Register the MongoDBCommunity custom resource.
pub fn add_to_scheme(scheme: &mut SchemeRegistry) -> Result<(), ControllerError> {
    scheme.add_known_type::<MongoDBCommunity>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut scheme = SchemeRegistry::new();
        assert_eq!(scheme.kind_count(), 0);
        add_to_scheme(&mut scheme).unwrap();

        assert_eq!(scheme.kind_count(), 1);
        assert!(scheme.is_registered::<MongoDBCommunity>());
        assert!(!scheme.is_registered::<StatefulSet>());
        assert_eq!(
            gvk_of::<MongoDBCommunity>(),
            GroupVersionKind::gvk("mongodbcommunity.mongodb.com", "v1", "MongoDBCommunity")
        );
    }

    #[test]
    fn test_registration_is_idempotent() {
        let mut scheme = SchemeRegistry::new();
        add_builtin_types(&mut scheme).unwrap();
        add_to_scheme(&mut scheme).unwrap();
        let count = scheme.kind_count();

        add_builtin_types(&mut scheme).unwrap();
        add_to_scheme(&mut scheme).unwrap();
        assert_eq!(scheme.kind_count(), count);
        assert_eq!(count, 9);
    }

    /// Different Rust type claiming the MongoDBCommunity kind.
    struct Impostor {
        metadata: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta,
    }

    impl Resource for Impostor {
        type DynamicType = ();
        type Scope = k8s_openapi::NamespaceResourceScope;

        fn kind(_: &()) -> std::borrow::Cow<'_, str> {
            "MongoDBCommunity".into()
        }
        fn group(_: &()) -> std::borrow::Cow<'_, str> {
            "mongodbcommunity.mongodb.com".into()
        }
        fn version(_: &()) -> std::borrow::Cow<'_, str> {
            "v1".into()
        }
        fn plural(_: &()) -> std::borrow::Cow<'_, str> {
            "mongodbcommunity".into()
        }
        fn meta(&self) -> &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            &self.metadata
        }
        fn meta_mut(&mut self) -> &mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta {
            &mut self.metadata
        }
    }

    #[test]
    fn test_conflicting_registration_is_rejected() {
        let mut scheme = SchemeRegistry::new();
        add_to_scheme(&mut scheme).unwrap();

        let err = scheme.add_known_type::<Impostor>().unwrap_err();
        assert_eq!(err.stage(), Stage::Scheme);
        assert!(scheme.is_registered::<MongoDBCommunity>());
        assert!(!scheme.is_registered::<Impostor>());
    }

    #[test]
    fn test_core_gvk_has_empty_group() {
        let gvk = gvk_of::<Pod>();
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Pod");
    }
}
