//! UI extension specifications.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::errors::{Result, SpecificationError};
use crate::package::dependency_version;
use crate::provider::SpecificationProvider;
use crate::specification::{
    Dependency, ExtensionSpecification, PreviewContext, SpecificationHooks, SpecificationKind,
};

/// Hooks for UI extensions that render with an npm renderer package.
///
/// `deploy_config` reports the renderer version found in the extension
/// directory and fails when the package is not a dependency.
#[derive(Clone, Debug)]
pub struct RendererHooks {
    dependency: Dependency,
    preview: bool,
}

impl RendererHooks {
    /// Hooks for `dependency`; `preview` controls whether a preview link is printed.
    pub fn new(dependency: Dependency, preview: bool) -> Self {
        Self {
            dependency,
            preview,
        }
    }
}

#[async_trait]
impl SpecificationHooks for RendererHooks {
    async fn deploy_config(&self, spec: &ExtensionSpecification, directory: &Path) -> Result<Value> {
        let version = dependency_version(&self.dependency.name, directory)
            .await
            .ok_or_else(|| SpecificationError::DeployConfig {
                identifier: spec.identifier.clone(),
                message: format!("dependency {} not found", self.dependency.name),
            })?;
        Ok(json!({ "renderer_version": version }))
    }

    fn preview_message(&self, _spec: &ExtensionSpecification, ctx: &PreviewContext<'_>) -> Option<String> {
        self.preview
            .then(|| format!("Preview link: {}/extensions/{}", ctx.host, ctx.uuid))
    }
}

fn base_ui_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "type": {"type": "string"},
            "extension_points": {"type": "array", "items": {"type": "string"}},
            "capabilities": {"type": "object"},
            "metafields": {"type": "array"}
        },
        "required": ["name", "type"]
    })
}

fn with_renderer(spec: ExtensionSpecification, dependency: Dependency, preview: bool) -> ExtensionSpecification {
    spec.with_dependency(dependency.clone())
        .with_hooks(Arc::new(RendererHooks::new(dependency, preview)))
}

/// Built-in UI specifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct UiSpecifications;

impl UiSpecifications {
    fn all() -> Vec<ExtensionSpecification> {
        let pos = with_renderer(
            ExtensionSpecification::new("pos_ui_extension", "pos_ui", "POS UI", "pos", SpecificationKind::Ui)
                .with_schema(base_ui_schema()),
            Dependency::new("@shopify/retail-ui-extensions-react", "^0.38.0"),
            false,
        );

        let checkout = with_renderer(
            ExtensionSpecification::new(
                "checkout_ui_extension",
                "checkout_ui",
                "Checkout UI",
                "checkout",
                SpecificationKind::Ui,
            )
            .with_schema(base_ui_schema()),
            Dependency::new("@shopify/checkout-ui-extensions-react", "^0.20.0"),
            true,
        );

        let subscription = with_renderer(
            ExtensionSpecification::new(
                "product_subscription",
                "subscription_ui",
                "Subscription UI",
                "admin",
                SpecificationKind::Ui,
            )
            .with_partners_web_identifier("product_subscription")
            .with_graphql_type("subscription_management")
            .with_schema(base_ui_schema()),
            Dependency::new("@shopify/admin-ui-extensions-react", "^1.0.1"),
            true,
        );

        let ui = ExtensionSpecification::new(
            "ui_extension",
            "ui_extension",
            "UI Extension",
            "checkout",
            SpecificationKind::Ui,
        )
        .with_schema(base_ui_schema())
        .hidden();

        vec![pos, checkout, subscription, ui]
    }
}

#[async_trait]
impl SpecificationProvider for UiSpecifications {
    fn name(&self) -> &str {
        "ui"
    }

    async fn specifications(&self) -> Result<Vec<Option<ExtensionSpecification>>> {
        Ok(Self::all().into_iter().map(Some).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extdev_core::ExtensionUuid;

    fn find(id: &str) -> ExtensionSpecification {
        UiSpecifications::all()
            .into_iter()
            .find(|s| s.identifier == id)
            .unwrap()
    }

    #[tokio::test]
    async fn pos_deploy_config_reports_renderer_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"@shopify/retail-ui-extensions-react": "^0.38.0"}}"#,
        )
        .unwrap();

        let config = find("pos_ui_extension").deploy_config(dir.path()).await.unwrap();
        assert_eq!(config, json!({"renderer_version": "^0.38.0"}));
    }

    #[tokio::test]
    async fn pos_deploy_config_fails_without_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let err = find("pos_ui_extension")
            .deploy_config(dir.path())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpecificationError::DeployConfig { ref identifier, .. } if identifier == "pos_ui_extension"
        ));
        assert!(err.to_string().contains("@shopify/retail-ui-extensions-react"));
    }

    #[test]
    fn pos_has_no_preview_but_checkout_does() {
        let uuid = ExtensionUuid::from_raw("dev-1");
        let config = json!({});
        let ctx = PreviewContext {
            host: "https://tunnel.example",
            uuid: &uuid,
            config: &config,
            store_fqdn: "shop.myshopify.com",
        };
        assert!(find("pos_ui_extension").preview_message(&ctx).is_none());
        assert_eq!(
            find("checkout_ui_extension").preview_message(&ctx).as_deref(),
            Some("Preview link: https://tunnel.example/extensions/dev-1")
        );
    }

    #[test]
    fn subscription_graphql_type() {
        assert_eq!(find("product_subscription").graphql_type(), "SUBSCRIPTION_MANAGEMENT");
        assert!(!find("ui_extension").show_in_cli_help);
    }
}
