//! # relay-settings
//!
//! Configuration for the relay, loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`RelaySettings::default()`]
//! 2. **Settings file**: JSON, deep-merged over defaults
//! 3. **Environment variables**: highest priority
//!
//! Required values (feed URL, target, lookup URL, webhook URL) have no
//! defaults; [`RelaySettings::validate`] reports which one is missing.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    IgnoredOverride, deep_merge, load_settings, load_settings_from_path, settings_path,
};
pub use types::*;
