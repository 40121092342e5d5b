//! Watch scope resolution.
//!
//! Turns the namespace and label-selector directives into the one scope the
//! process watches for its whole lifetime.

use crate::config::{LABEL_SELECTOR_ENV, WATCH_NAMESPACE_ENV};
use crate::error::ControllerError;
use crate::selector::LabelSelector;
use std::fmt;
use tracing::{info, warn};

/// Namespace directive selecting every namespace.
pub const ALL_NAMESPACES: &str = "*";

/// What the operator watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchScope {
    /// Exactly one namespace
    Single(String),
    /// Every namespace, no object filtering
    AllUnfiltered,
    /// Every namespace; MongoDBCommunity objects restricted to the selector
    AllFiltered(LabelSelector),
}

impl WatchScope {
    /// Namespace passed to the manager; the empty string means all namespaces.
    pub fn namespace(&self) -> &str {
        match self {
            Self::Single(namespace) => namespace,
            Self::AllUnfiltered | Self::AllFiltered(_) => "",
        }
    }

    /// Selector restricting the managed type, if any.
    pub fn selector(&self) -> Option<&LabelSelector> {
        match self {
            Self::AllFiltered(selector) => Some(selector),
            Self::Single(_) | Self::AllUnfiltered => None,
        }
    }
}

impl fmt::Display for WatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(namespace) => write!(f, "namespace {namespace}"),
            Self::AllUnfiltered => f.write_str("all namespaces"),
            Self::AllFiltered(selector) => write!(f, "all namespaces matching '{selector}'"),
        }
    }
}

/// Resolve the watch scope from the raw directives.
///
/// A missing or blank namespace is fatal. Only the exact directive `*`
/// selects every namespace, and then a present selector must parse: an
/// invalid one never degrades to unfiltered watching. Any other directive is
/// taken verbatim as the one namespace to watch, and the selector is ignored.
pub fn resolve_watch_scope(
    namespace: Option<&str>,
    label_selector: Option<&str>,
) -> Result<WatchScope, ControllerError> {
    let namespace = match namespace {
        Some(namespace) if !namespace.trim().is_empty() => namespace,
        _ => {
            return Err(ControllerError::MissingConfiguration(vec![
                WATCH_NAMESPACE_ENV.to_string(),
            ]));
        }
    };

    if namespace != ALL_NAMESPACES {
        if let Some(selector) = label_selector {
            warn!(
                "{} {:?} is ignored when watching a single namespace",
                LABEL_SELECTOR_ENV, selector
            );
        }
        info!("Watching namespace: {}", namespace);
        return Ok(WatchScope::Single(namespace.to_string()));
    }

    info!("Watching all namespaces");
    let Some(raw) = label_selector else {
        return Ok(WatchScope::AllUnfiltered);
    };
    info!("Watching resources with label selector: {}", raw);
    let selector = LabelSelector::parse(raw).map_err(|source| ControllerError::InvalidSelector {
        selector: raw.to_string(),
        source,
    })?;
    Ok(WatchScope::AllFiltered(selector))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_wildcard_without_selector_is_unfiltered() {
        let scope = resolve_watch_scope(Some("*"), None).unwrap();
        assert_eq!(scope, WatchScope::AllUnfiltered);
        assert_eq!(scope.namespace(), "");
        assert!(scope.selector().is_none());
    }

    #[test]
    fn test_wildcard_with_selector_is_filtered() {
        let scope = resolve_watch_scope(Some("*"), Some("app=mongodb")).unwrap();
        let selector = scope.selector().unwrap();
        assert_eq!(scope.namespace(), "");
        assert_eq!(selector, &LabelSelector::parse("app=mongodb").unwrap());

        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "mongodb".to_string());
        assert!(selector.matches(&labels));
        labels.insert("app".to_string(), "other".to_string());
        assert!(!selector.matches(&labels));
    }

    #[test]
    fn test_wildcard_with_malformed_selector_is_fatal() {
        match resolve_watch_scope(Some("*"), Some("app===")) {
            Err(ControllerError::InvalidSelector { selector, .. }) => assert_eq!(selector, "app==="),
            other => panic!("expected InvalidSelector, got {other:?}"),
        }
    }

    #[test]
    fn test_single_namespace_ignores_selector() {
        for selector in [None, Some("app=mongodb"), Some("app==="), Some("")] {
            assert_eq!(
                resolve_watch_scope(Some("team-a"), selector).unwrap(),
                WatchScope::Single("team-a".to_string())
            );
        }
        assert_eq!(
            WatchScope::Single("team-a".to_string()).namespace(),
            "team-a"
        );
    }

    #[test]
    fn test_missing_or_blank_namespace_is_fatal() {
        for namespace in [None, Some(""), Some("  ")] {
            match resolve_watch_scope(namespace, Some("app=mongodb")) {
                Err(ControllerError::MissingConfiguration(names)) => {
                    assert_eq!(names, vec![WATCH_NAMESPACE_ENV.to_string()]);
                }
                other => panic!("expected MissingConfiguration, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_only_exact_wildcard_selects_all_namespaces() {
        for namespace in [" * ", "* ", "**", "*,prod"] {
            let scope = resolve_watch_scope(Some(namespace), None).unwrap();
            assert_eq!(scope, WatchScope::Single(namespace.to_string()));
            assert_eq!(scope.namespace(), namespace);
        }
    }

    #[test]
    fn test_namespace_directive_is_passed_through_unchanged() {
        assert_eq!(
            resolve_watch_scope(Some(" prod "), None).unwrap(),
            WatchScope::Single(" prod ".to_string())
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let first = resolve_watch_scope(Some("*"), Some("tier in (db,cache)")).unwrap();
        let second = resolve_watch_scope(Some("*"), Some("tier in (db,cache)")).unwrap();
        assert_eq!(first, second);
    }
}
