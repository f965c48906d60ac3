//! # extdev-specs
//!
//! Extension specification registry.
//!
//! Each plugin contributes [`ExtensionSpecification`]s through a
//! [`SpecificationProvider`]. At startup [`load_from_providers`] queries them
//! all and merges the results into a [`SpecificationRegistry`]; conflicting
//! identifiers abort startup. The [`builtin`] module ships the UI, function
//! and theme specifications.

#![deny(unsafe_code)]

pub mod builtin;
pub mod errors;
pub mod package;
pub mod provider;
pub mod registry;
pub mod specification;

pub use errors::{Result, SpecificationError};
pub use provider::{SpecificationProvider, load_from_providers};
pub use registry::SpecificationRegistry;
pub use specification::{
    DefaultHooks, Dependency, ExtensionSpecification, PreviewContext, SpecificationHooks,
    SpecificationKind, SpecificationSummary,
};
