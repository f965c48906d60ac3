//! Specifications shipped with the dev server.

mod function;
mod theme;
mod ui;

use std::sync::Arc;

use crate::provider::SpecificationProvider;

pub use function::FunctionSpecifications;
pub use theme::ThemeSpecifications;
pub use ui::{RendererHooks, UiSpecifications};

/// Every built-in provider, in load order.
pub fn all_providers() -> Vec<Arc<dyn SpecificationProvider>> {
    vec![
        Arc::new(UiSpecifications),
        Arc::new(FunctionSpecifications),
        Arc::new(ThemeSpecifications),
    ]
}
