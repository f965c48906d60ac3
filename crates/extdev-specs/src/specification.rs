//! Extension capability descriptors.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use extdev_core::ExtensionUuid;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{Result, SpecificationError};

/// npm package an extension type renders with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    /// Package name.
    pub name: String,
    /// Semver range.
    pub version: String,
}

impl Dependency {
    /// Create a dependency descriptor.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Family a specification belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecificationKind {
    /// Renders into a host UI surface.
    Ui,
    /// Server-side function (checkout/POS customizations).
    Function,
    /// Theme app extension.
    Theme,
}

/// Inputs available when rendering a preview message.
#[derive(Clone, Copy, Debug)]
pub struct PreviewContext<'a> {
    /// Public URL of the dev server.
    pub host: &'a str,
    /// Development uuid of the extension.
    pub uuid: &'a ExtensionUuid,
    /// Extension configuration.
    pub config: &'a Value,
    /// Development store domain.
    pub store_fqdn: &'a str,
}

/// Per-specification behaviour.
#[async_trait]
pub trait SpecificationHooks: Send + Sync {
    /// Configuration submitted on deploy for an extension living in `directory`.
    async fn deploy_config(&self, _spec: &ExtensionSpecification, _directory: &Path) -> Result<Value> {
        Ok(Value::Object(serde_json::Map::new()))
    }

    /// Message printed when the dev server starts, `None` to stay silent.
    fn preview_message(&self, _spec: &ExtensionSpecification, ctx: &PreviewContext<'_>) -> Option<String> {
        Some(format!("Preview link: {}/extensions/{}", ctx.host, ctx.uuid))
    }
}

/// Hooks with the default behaviour.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultHooks;

#[async_trait]
impl SpecificationHooks for DefaultHooks {}

/// Capability descriptor for one extension type. Immutable once registered.
#[derive(Clone)]
pub struct ExtensionSpecification {
    /// Unique key in the registry.
    pub identifier: String,
    /// Identifier used by the remote platform.
    pub external_identifier: String,
    /// Human readable name.
    pub external_name: String,
    /// Identifier used in partner dashboard URLs.
    pub partners_web_identifier: String,
    /// Host surface.
    pub surface: String,
    /// Family.
    pub kind: SpecificationKind,
    /// Whether the type is offered by scaffolding commands.
    pub show_in_cli_help: bool,
    /// Remote GraphQL type override.
    pub graphql_type: Option<String>,
    /// Renderer package, if any.
    pub dependency: Option<Dependency>,
    /// JSON Schema for the extension configuration.
    pub schema: Value,
    hooks: Arc<dyn SpecificationHooks>,
}

impl ExtensionSpecification {
    /// Create a specification with default hooks and an empty object schema.
    pub fn new(
        identifier: impl Into<String>,
        external_identifier: impl Into<String>,
        external_name: impl Into<String>,
        surface: impl Into<String>,
        kind: SpecificationKind,
    ) -> Self {
        let identifier = identifier.into();
        Self {
            partners_web_identifier: identifier.clone(),
            identifier,
            external_identifier: external_identifier.into(),
            external_name: external_name.into(),
            surface: surface.into(),
            kind,
            show_in_cli_help: true,
            graphql_type: None,
            dependency: None,
            schema: serde_json::json!({"type": "object"}),
            hooks: Arc::new(DefaultHooks),
        }
    }

    /// Set the configuration schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Set the renderer dependency.
    #[must_use]
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependency = Some(dependency);
        self
    }

    /// Override the partners dashboard identifier.
    #[must_use]
    pub fn with_partners_web_identifier(mut self, id: impl Into<String>) -> Self {
        self.partners_web_identifier = id.into();
        self
    }

    /// Override the remote GraphQL type.
    #[must_use]
    pub fn with_graphql_type(mut self, graphql_type: impl Into<String>) -> Self {
        self.graphql_type = Some(graphql_type.into());
        self
    }

    /// Hide from scaffolding help.
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.show_in_cli_help = false;
        self
    }

    /// Replace the behaviour hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: Arc<dyn SpecificationHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Upper-cased GraphQL type, defaulting to the identifier.
    pub fn graphql_type(&self) -> String {
        self.graphql_type
            .as_deref()
            .unwrap_or(&self.identifier)
            .to_uppercase()
    }

    /// Run the `deploy_config` hook.
    pub async fn deploy_config(&self, directory: &Path) -> Result<Value> {
        self.hooks.deploy_config(self, directory).await
    }

    /// Run the `preview_message` hook.
    pub fn preview_message(&self, ctx: &PreviewContext<'_>) -> Option<String> {
        self.hooks.preview_message(self, ctx)
    }

    /// Check the required fields.
    pub fn validate(&self) -> Result<()> {
        let missing = if self.identifier.trim().is_empty() {
            Some("identifier")
        } else if self.external_identifier.trim().is_empty() {
            Some("external_identifier")
        } else if self.schema.is_null() {
            Some("schema")
        } else {
            None
        };
        match missing {
            Some(field) => Err(SpecificationError::InvalidSpecification {
                identifier: self.identifier.clone(),
                field,
            }),
            None => Ok(()),
        }
    }

    /// Whether a re-registration of `other` under the same identifier is harmless.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.identifier == other.identifier
            && self.external_identifier == other.external_identifier
            && self.schema == other.schema
    }
}

impl fmt::Debug for ExtensionSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionSpecification")
            .field("identifier", &self.identifier)
            .field("external_identifier", &self.external_identifier)
            .field("external_name", &self.external_name)
            .field("surface", &self.surface)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Serializable summary of a specification, as listed over HTTP.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationSummary {
    /// Unique key.
    pub identifier: String,
    /// Remote identifier.
    pub external_identifier: String,
    /// Human readable name.
    pub external_name: String,
    /// Host surface.
    pub surface: String,
    /// Family.
    pub kind: SpecificationKind,
    /// Whether offered by scaffolding.
    pub show_in_cli_help: bool,
    /// Renderer package.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<Dependency>,
}

impl From<&ExtensionSpecification> for SpecificationSummary {
    fn from(spec: &ExtensionSpecification) -> Self {
        Self {
            identifier: spec.identifier.clone(),
            external_identifier: spec.external_identifier.clone(),
            external_name: spec.external_name.clone(),
            surface: spec.surface.clone(),
            kind: spec.kind,
            show_in_cli_help: spec.show_in_cli_help,
            dependency: spec.dependency.clone(),
        }
    }
}
