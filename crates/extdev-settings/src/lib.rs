//! # extdev-settings
//!
//! Layered configuration for the extension development server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** ([`ExtDevSettings::default()`])
//! 2. **Settings file** (`~/.extdev/settings.json`, deep-merged over defaults)
//! 3. **Environment variables** (`EXTDEV_*` overrides)
//!
//! Command-line flags are applied on top by the binary.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path, validate};
pub use types::{ExtDevSettings, LogLevel, ServerSettings};
