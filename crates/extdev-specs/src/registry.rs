//! Merged registry of extension specifications.
//!
//! Built once at startup from every provider's contribution, read-only
//! afterwards. Identifiers are unique; a second registration of the same
//! identifier is accepted only when it is equivalent to the first.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::{Result, SpecificationError};
use crate::specification::ExtensionSpecification;

struct SpecEntry {
    spec: Arc<ExtensionSpecification>,
    plugin: String,
}

/// Registry of extension specifications keyed by identifier.
#[derive(Default)]
pub struct SpecificationRegistry {
    specs: HashMap<String, SpecEntry>,
}

impl SpecificationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `spec` on behalf of `plugin`.
    ///
    /// Returns `true` when the spec was inserted, `false` when an equivalent
    /// spec was already registered.
    pub fn register(&mut self, spec: ExtensionSpecification, plugin: &str) -> Result<bool> {
        spec.validate()?;

        if let Some(existing) = self.specs.get(&spec.identifier) {
            if existing.spec.is_equivalent(&spec) {
                debug!(
                    identifier = %spec.identifier,
                    first_plugin = %existing.plugin,
                    plugin,
                    "equivalent specification already registered"
                );
                return Ok(false);
            }
            warn!(
                identifier = %spec.identifier,
                first_plugin = %existing.plugin,
                plugin,
                "conflicting specification"
            );
            return Err(SpecificationError::DuplicateSpecification {
                identifier: spec.identifier,
                first_plugin: existing.plugin.clone(),
                second_plugin: plugin.to_owned(),
            });
        }

        let _ = self.specs.insert(
            spec.identifier.clone(),
            SpecEntry {
                spec: Arc::new(spec),
                plugin: plugin.to_owned(),
            },
        );
        Ok(true)
    }

    /// Build a registry from each plugin's list of optional specifications.
    ///
    /// Plugins are processed in name order so the "first" plugin of a
    /// duplicate is deterministic.
    pub fn aggregate(
        plugin_results: BTreeMap<String, Vec<Option<ExtensionSpecification>>>,
    ) -> Result<Self> {
        let mut registry = Self::new();
        for (plugin, specs) in plugin_results {
            for spec in specs.into_iter().flatten() {
                let _ = registry.register(spec, &plugin)?;
            }
        }
        debug!(count = registry.len(), "specification registry built");
        Ok(registry)
    }

    /// Look up a specification by identifier.
    pub fn get_by_identifier(&self, identifier: &str) -> Result<Arc<ExtensionSpecification>> {
        self.specs
            .get(identifier)
            .map(|e| Arc::clone(&e.spec))
            .ok_or_else(|| SpecificationError::NotFound(identifier.to_owned()))
    }

    /// Resolve an extension `type` against identifiers, then external identifiers.
    pub fn spec_for_type(&self, extension_type: &str) -> Option<Arc<ExtensionSpecification>> {
        if let Some(entry) = self.specs.get(extension_type) {
            return Some(Arc::clone(&entry.spec));
        }
        self.list_all()
            .into_iter()
            .find(|s| s.external_identifier == extension_type)
    }

    /// Every specification, sorted by identifier.
    pub fn list_all(&self) -> Vec<Arc<ExtensionSpecification>> {
        let mut specs: Vec<Arc<ExtensionSpecification>> =
            self.specs.values().map(|e| Arc::clone(&e.spec)).collect();
        specs.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        specs
    }

    /// Plugin that contributed `identifier`.
    pub fn source(&self, identifier: &str) -> Option<&str> {
        self.specs.get(identifier).map(|e| e.plugin.as_str())
    }

    /// Number of registered specifications.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

impl std::fmt::Debug for SpecificationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("SpecificationRegistry")
            .field("identifiers", &ids)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specification::SpecificationKind;
    use serde_json::json;

    fn spec(id: &str) -> ExtensionSpecification {
        ExtensionSpecification::new(id, id, id, "admin", SpecificationKind::Ui)
    }

    fn results(
        entries: Vec<(&str, Vec<Option<ExtensionSpecification>>)>,
    ) -> BTreeMap<String, Vec<Option<ExtensionSpecification>>> {
        entries
            .into_iter()
            .map(|(plugin, specs)| (plugin.to_owned(), specs))
            .collect()
    }

    #[test]
    fn register_and_get() {
        let mut registry = SpecificationRegistry::new();
        assert!(registry.register(spec("ui_extension"), "ui").unwrap());
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get_by_identifier("ui_extension").unwrap().identifier,
            "ui_extension"
        );
        assert_eq!(registry.source("ui_extension"), Some("ui"));
    }

    #[test]
    fn get_missing_is_not_found() {
        let registry = SpecificationRegistry::new();
        assert!(matches!(
            registry.get_by_identifier("nope"),
            Err(SpecificationError::NotFound(id)) if id == "nope"
        ));
    }

    #[test]
    fn register_rejects_invalid() {
        let mut registry = SpecificationRegistry::new();
        let err = registry.register(spec(""), "ui").unwrap_err();
        assert!(matches!(err, SpecificationError::InvalidSpecification { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn aggregate_drops_none_and_sorts() {
        let registry = SpecificationRegistry::aggregate(results(vec![
            ("ui", vec![Some(spec("ui_extension")), None]),
            ("function", vec![Some(spec("delivery_customization"))]),
            ("empty", vec![None]),
        ]))
        .unwrap();

        let ids: Vec<String> = registry
            .list_all()
            .iter()
            .map(|s| s.identifier.clone())
            .collect();
        assert_eq!(ids, vec!["delivery_customization", "ui_extension"]);
    }

    #[test]
    fn identical_duplicate_keeps_first() {
        let mut renamed = spec("theme");
        renamed.external_name = "Theme app extension".into();
        let registry = SpecificationRegistry::aggregate(results(vec![
            ("a", vec![Some(spec("theme"))]),
            ("b", vec![Some(renamed)]),
        ]))
        .unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.source("theme"), Some("a"));
        assert_eq!(registry.get_by_identifier("theme").unwrap().external_name, "theme");
    }

    #[test]
    fn conflicting_duplicate_fails() {
        let conflicting = spec("theme").with_schema(json!({"type": "object", "required": ["x"]}));
        let err = SpecificationRegistry::aggregate(results(vec![
            ("a", vec![Some(spec("theme"))]),
            ("b", vec![Some(conflicting)]),
        ]))
        .unwrap_err();

        match err {
            SpecificationError::DuplicateSpecification {
                identifier,
                first_plugin,
                second_plugin,
            } => {
                assert_eq!(identifier, "theme");
                assert_eq!(first_plugin, "a");
                assert_eq!(second_plugin, "b");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn spec_for_type_matches_external_identifier() {
        let mut registry = SpecificationRegistry::new();
        let checkout = ExtensionSpecification::new(
            "checkout_ui_extension",
            "checkout_ui",
            "Checkout UI",
            "checkout",
            SpecificationKind::Ui,
        );
        let _ = registry.register(checkout, "ui").unwrap();

        assert!(registry.spec_for_type("checkout_ui_extension").is_some());
        assert_eq!(
            registry.spec_for_type("checkout_ui").unwrap().identifier,
            "checkout_ui_extension"
        );
        assert!(registry.spec_for_type("web_pixel").is_none());
    }
}
