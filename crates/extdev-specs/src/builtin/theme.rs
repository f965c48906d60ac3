//! Theme app extension specification.

use async_trait::async_trait;
use serde_json::json;

use crate::errors::Result;
use crate::provider::SpecificationProvider;
use crate::specification::{ExtensionSpecification, SpecificationKind};

/// Built-in theme specification.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThemeSpecifications;

#[async_trait]
impl SpecificationProvider for ThemeSpecifications {
    fn name(&self) -> &str {
        "theme"
    }

    async fn specifications(&self) -> Result<Vec<Option<ExtensionSpecification>>> {
        let theme = ExtensionSpecification::new(
            "theme",
            "theme_app_extension",
            "Theme app extension",
            "online_store",
            SpecificationKind::Theme,
        )
        .with_partners_web_identifier("theme_app_extension")
        .with_graphql_type("theme_app_extension")
        .with_schema(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "type": {"type": "string"}
            },
            "required": ["name", "type"]
        }));
        Ok(vec![Some(theme)])
    }
}
