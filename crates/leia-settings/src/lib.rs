//! # leia-settings
//!
//! Configuration for the Leia telemetry pipeline.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`LeiaSettings::default()`]
//! 2. **User file**: `~/.leia/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `LEIA_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, leia_home, load_settings, load_settings_from_path, settings_path};
pub use types::*;
