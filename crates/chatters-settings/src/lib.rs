//! # chatters-settings
//!
//! Configuration with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`ChattersSettings::default()`]
//! 2. **Settings file** — `--config`, `$CHATTERS_CONFIG`, or `./chatters.json`
//!    (deep-merged over defaults)
//! 3. **Environment variables** — `CHATTERS_*` overrides (highest priority)
//!
//! Unlike a process-global, the loaded value is passed explicitly to whoever
//! needs it.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_from, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let settings = ChattersSettings::default();
        assert_eq!(settings.server.port, 8080);
        let _path = settings_path();
    }

    #[test]
    fn deep_merge_re_exported() {
        let merged = deep_merge(serde_json::json!({"x": 1}), serde_json::json!({"y": 2}));
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
