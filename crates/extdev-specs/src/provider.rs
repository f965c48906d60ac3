//! Specification providers and startup loading.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, error, info};

use crate::errors::{Result, SpecificationError};
use crate::registry::SpecificationRegistry;
use crate::specification::ExtensionSpecification;

/// Source of extension specifications, usually one per plugin.
#[async_trait]
pub trait SpecificationProvider: Send + Sync {
    /// Plugin name, used in conflict reports.
    fn name(&self) -> &str;

    /// Contributed specifications. `None` entries are skipped.
    async fn specifications(&self) -> Result<Vec<Option<ExtensionSpecification>>>;
}

/// Query every provider concurrently and merge the results.
///
/// A failing provider or a conflicting identifier aborts loading.
pub async fn load_from_providers(
    providers: &[Arc<dyn SpecificationProvider>],
) -> Result<SpecificationRegistry> {
    let results = join_all(providers.iter().map(|p| async move {
        let name = p.name().to_owned();
        let specs = p.specifications().await;
        (name, specs)
    }))
    .await;

    let mut by_plugin: BTreeMap<String, Vec<Option<ExtensionSpecification>>> = BTreeMap::new();
    for (plugin, specs) in results {
        let specs = specs.map_err(|e| {
            error!(plugin = %plugin, error = %e, "specification provider failed");
            match e {
                SpecificationError::Provider { .. } => e,
                other => SpecificationError::Provider {
                    plugin: plugin.clone(),
                    message: other.to_string(),
                },
            }
        })?;
        debug!(plugin = %plugin, count = specs.len(), "provider contributed specifications");
        by_plugin.entry(plugin).or_default().extend(specs);
    }

    let registry = SpecificationRegistry::aggregate(by_plugin)?;
    info!(count = registry.len(), providers = providers.len(), "specifications loaded");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::specification::SpecificationKind;

    struct StaticProvider {
        name: &'static str,
        ids: Vec<&'static str>,
    }

    #[async_trait]
    impl SpecificationProvider for StaticProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn specifications(&self) -> Result<Vec<Option<ExtensionSpecification>>> {
            Ok(self
                .ids
                .iter()
                .map(|id| {
                    Some(ExtensionSpecification::new(
                        *id,
                        *id,
                        *id,
                        "admin",
                        SpecificationKind::Ui,
                    ))
                })
                .chain(std::iter::once(None))
                .collect())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl SpecificationProvider for FailingProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn specifications(&self) -> Result<Vec<Option<ExtensionSpecification>>> {
            Err(SpecificationError::NotFound("manifest".into()))
        }
    }

    #[tokio::test]
    async fn merges_all_providers() {
        let providers: Vec<Arc<dyn SpecificationProvider>> = vec![
            Arc::new(StaticProvider {
                name: "ui",
                ids: vec!["ui_extension", "pos_ui_extension"],
            }),
            Arc::new(StaticProvider {
                name: "theme",
                ids: vec!["theme"],
            }),
        ];
        let registry = load_from_providers(&providers).await.unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.source("theme"), Some("theme"));
    }

    #[tokio::test]
    async fn no_providers_yields_empty_registry() {
        let registry = load_from_providers(&[]).await.unwrap();
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn provider_failure_is_fatal() {
        let providers: Vec<Arc<dyn SpecificationProvider>> = vec![
            Arc::new(StaticProvider {
                name: "ui",
                ids: vec!["ui_extension"],
            }),
            Arc::new(FailingProvider),
        ];
        let err = load_from_providers(&providers).await.unwrap_err();
        match err {
            SpecificationError::Provider { plugin, message } => {
                assert_eq!(plugin, "broken");
                assert!(message.contains("manifest"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn conflict_across_providers_is_fatal() {
        struct Conflicting;

        #[async_trait]
        impl SpecificationProvider for Conflicting {
            fn name(&self) -> &str {
                "retail"
            }

            async fn specifications(&self) -> Result<Vec<Option<ExtensionSpecification>>> {
                Ok(vec![Some(ExtensionSpecification::new(
                    "ui_extension",
                    "something_else",
                    "Other",
                    "pos",
                    SpecificationKind::Ui,
                ))])
            }
        }

        let providers: Vec<Arc<dyn SpecificationProvider>> = vec![
            Arc::new(StaticProvider {
                name: "ui",
                ids: vec!["ui_extension"],
            }),
            Arc::new(Conflicting),
        ];
        let err = load_from_providers(&providers).await.unwrap_err();
        assert!(matches!(
            err,
            SpecificationError::DuplicateSpecification { ref first_plugin, ref second_plugin, .. }
                if first_plugin == "retail" && second_plugin == "ui"
        ));
    }
}
