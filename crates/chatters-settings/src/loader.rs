//! Where settings come from.
//!
//! Compiled defaults are serialized to JSON, the settings file (if any) is
//! layered on top, and `CHATTERS_*` variables win over both. Layering is
//! per-key for objects; arrays and scalars from the file replace the default
//! wholesale, and an explicit `null` in the file leaves the default alone.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ChattersSettings;

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV: &str = "CHATTERS_CONFIG";

/// Resolve the settings file: `$CHATTERS_CONFIG` or `./chatters.json`.
pub fn settings_path() -> PathBuf {
    std::env::var(CONFIG_ENV)
        .ok()
        .filter(|v| !v.is_empty())
        .map_or_else(|| PathBuf::from("chatters.json"), PathBuf::from)
}

/// [`load_settings_from_path`] on [`settings_path`].
pub fn load_settings() -> Result<ChattersSettings> {
    load_settings_from_path(&settings_path())
}

/// Defaults, then `path` if it exists, then the environment.
///
/// A missing file is not an error; unreadable or malformed JSON is.
pub fn load_settings_from_path(path: &Path) -> Result<ChattersSettings> {
    let mut layered = serde_json::to_value(ChattersSettings::default())?;

    if path.is_file() {
        let raw = std::fs::read_to_string(path)?;
        layered = deep_merge(layered, serde_json::from_str(&raw)?);
        debug!(path = %path.display(), "settings file applied");
    } else {
        debug!(path = %path.display(), "no settings file, using defaults");
    }

    let mut settings: ChattersSettings = serde_json::from_value(layered)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Layer `overlay` onto `base` using the rules in the module docs.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => Value::Object(merge_objects(base, overlay)),
        (_, overlay) => overlay,
    }
}

fn merge_objects(mut base: Map<String, Value>, overlay: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in overlay.into_iter().filter(|(_, v)| !v.is_null()) {
        let layered = match base.remove(&key) {
            Some(existing) => deep_merge(existing, value),
            None => value,
        };
        let _ = base.insert(key, layered);
    }
    base
}

/// Apply `CHATTERS_*` overrides from the process environment.
pub fn apply_env_overrides(settings: &mut ChattersSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply `CHATTERS_*` overrides from an arbitrary lookup.
///
/// Values are strictly parsed; anything invalid is ignored with a warning and
/// the file/default value stays in place.
pub fn apply_overrides_from<F>(settings: &mut ChattersSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.text("CHATTERS_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.number("CHATTERS_PORT", 0u16..=u16::MAX) {
        settings.server.port = v;
    }
    if let Some(v) = env.number("CHATTERS_OUTBOUND_QUEUE", 1usize..=1_000_000) {
        settings.server.outbound_queue_capacity = v;
    }

    if let Some(v) = env.text("CHATTERS_JWT_SECRET") {
        settings.auth.jwt_secret = v;
    }
    if let Some(v) = env.number("CHATTERS_TOKEN_TTL_HOURS", 1u64..=24 * 365) {
        settings.auth.token_ttl_hours = v;
    }

    if let Some(v) = env.text("CHATTERS_DB_PATH") {
        settings.storage.database_path = v;
    }
    if let Some(v) = env.text("CHATTERS_UPLOAD_DIR") {
        settings.storage.upload_dir = v;
    }

    if let Some(v) = env.text("CHATTERS_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.flag("CHATTERS_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Interpret an on/off switch. Case-insensitive `true/1/yes/on` and
/// `false/0/no/off`; anything else is `None`.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a number and accept it only inside `range`.
pub fn parse_in_range<T>(raw: &str, range: std::ops::RangeInclusive<T>) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    raw.trim().parse().ok().filter(|n| range.contains(n))
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn text(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn checked<T>(&self, name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
        let raw = (self.lookup)(name)?;
        let parsed = parse(&raw);
        if parsed.is_none() {
            warn!(key = name, value = %raw, "ignoring unusable environment override");
        }
        parsed
    }

    fn flag(&self, name: &str) -> Option<bool> {
        self.checked(name, parse_flag)
    }

    fn number<T>(&self, name: &str, range: std::ops::RangeInclusive<T>) -> Option<T>
    where
        T: FromStr + PartialOrd,
    {
        self.checked(name, |raw| parse_in_range(raw, range))
    }
}
