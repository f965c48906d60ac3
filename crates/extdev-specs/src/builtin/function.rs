//! Function specifications.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::errors::Result;
use crate::provider::SpecificationProvider;
use crate::specification::{
    ExtensionSpecification, PreviewContext, SpecificationHooks, SpecificationKind,
};

/// Functions have nothing to preview in a browser.
#[derive(Clone, Copy, Debug, Default)]
struct FunctionHooks;

#[async_trait]
impl SpecificationHooks for FunctionHooks {
    fn preview_message(&self, _spec: &ExtensionSpecification, _ctx: &PreviewContext<'_>) -> Option<String> {
        None
    }
}

fn function_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": {"type": "string"},
            "type": {"type": "string"},
            "api_version": {"type": "string"},
            "build": {
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "path": {"type": "string"}
                }
            },
            "ui": {
                "type": "object",
                "properties": {"paths": {"type": "object"}}
            }
        },
        "required": ["name", "type", "api_version"]
    })
}

fn function(identifier: &str, external_name: &str) -> ExtensionSpecification {
    ExtensionSpecification::new(
        identifier,
        identifier,
        external_name,
        "checkout",
        SpecificationKind::Function,
    )
    .with_schema(function_schema())
    .with_hooks(std::sync::Arc::new(FunctionHooks))
}

/// Built-in function specifications.
#[derive(Clone, Copy, Debug, Default)]
pub struct FunctionSpecifications;

#[async_trait]
impl SpecificationProvider for FunctionSpecifications {
    fn name(&self) -> &str {
        "function"
    }

    async fn specifications(&self) -> Result<Vec<Option<ExtensionSpecification>>> {
        Ok(vec![
            Some(function("payment_customization", "Payment customization")),
            Some(function("delivery_customization", "Delivery customization")),
        ])
    }
}
