//! Layered settings resolution.
//!
//! Compiled defaults, then `~/.leia/settings.json` merged on top, then any
//! `LEIA_*` environment variables. When merging the file, JSON objects are
//! combined key by key while arrays and scalars from the file win outright.
//! A `null` in the file leaves the underlying value alone.

use std::io::ErrorKind;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::LeiaSettings;

/// Data directory: `$HOME/.leia`, or `/tmp/.leia` without a home.
pub fn leia_home() -> PathBuf {
    std::env::var_os("HOME")
        .map_or_else(|| PathBuf::from("/tmp"), PathBuf::from)
        .join(".leia")
}

/// `settings.json` inside [`leia_home`].
pub fn settings_path() -> PathBuf {
    leia_home().join("settings.json")
}

/// Resolve settings from [`settings_path`] and the process environment.
pub fn load_settings() -> Result<LeiaSettings> {
    load_settings_from_path(&settings_path())
}

/// Resolve settings from `path` and the process environment.
///
/// A missing file means defaults. An unreadable or malformed one is an error.
pub fn load_settings_from_path(path: &Path) -> Result<LeiaSettings> {
    let mut settings = read_layered(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn read_layered(path: &Path) -> Result<LeiaSettings> {
    let mut merged = serde_json::to_value(LeiaSettings::default()).map_err(SettingsError::Defaults)?;
    let parse_error = |source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    };

    match std::fs::read_to_string(path) {
        Ok(text) => {
            let overlay: Value = serde_json::from_str(&text).map_err(parse_error)?;
            debug!(path = %path.display(), "merging settings file");
            merge_into(&mut merged, overlay);
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    serde_json::from_value(merged).map_err(parse_error)
}

/// Merge `overlay` over `base` and return the result.
pub fn deep_merge(mut base: Value, overlay: Value) -> Value {
    merge_into(&mut base, overlay);
    base
}

fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(into), Value::Object(from)) => {
            for (key, value) in from {
                if value.is_null() {
                    continue;
                }
                match into.get_mut(&key) {
                    Some(slot) => merge_into(slot, value),
                    None => {
                        let _ = into.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply `LEIA_*` variables from the process environment.
pub fn apply_env_overrides(settings: &mut LeiaSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

type Setter = fn(&mut LeiaSettings, &str) -> bool;

/// Variable name and how to apply its raw value. A setter returns `false`
/// when the value is rejected and the setting is left as it was.
const OVERRIDES: &[(&str, Setter)] = &[
    ("LEIA_ENDPOINT", |s, raw| store(&mut s.telemetry.endpoint, non_empty(raw))),
    ("LEIA_API_KEY", |s, raw| store(&mut s.telemetry.api_key, non_empty(raw).map(Some))),
    ("LEIA_SYNC_INTERVAL_MS", |s, raw| {
        store(&mut s.telemetry.sync_interval_ms, bounded(raw, 1_000..=86_400_000))
    }),
    ("LEIA_FLUSH_THRESHOLD", |s, raw| {
        store(&mut s.telemetry.flush_threshold, bounded(raw, 1..=100_000))
    }),
    ("LEIA_MAX_QUEUE_LEN", |s, raw| {
        store(&mut s.telemetry.max_queue_len, bounded(raw, 1..=10_000_000))
    }),
    ("LEIA_REQUEST_TIMEOUT_MS", |s, raw| {
        store(&mut s.telemetry.request_timeout_ms, bounded(raw, 100..=600_000))
    }),
    ("LEIA_DB_PATH", |s, raw| store(&mut s.storage.db_path, non_empty(raw))),
    ("LEIA_LOG_LEVEL", |s, raw| store(&mut s.logging.level, non_empty(raw))),
    ("LEIA_LOG_JSON", |s, raw| store(&mut s.logging.json, parse_flag(raw))),
];

/// Apply `LEIA_*` overrides read through `lookup`. Rejected values are
/// logged and skipped.
pub fn apply_overrides_from(settings: &mut LeiaSettings, lookup: impl Fn(&str) -> Option<String>) {
    for (name, set) in OVERRIDES {
        let Some(raw) = lookup(name) else { continue };
        if !set(settings, &raw) {
            warn!(var = *name, value = %raw, "ignoring invalid environment override");
        }
    }
}

fn store<T>(slot: &mut T, parsed: Option<T>) -> bool {
    parsed.map(|value| *slot = value).is_some()
}

fn non_empty(raw: &str) -> Option<String> {
    (!raw.is_empty()).then(|| raw.to_owned())
}

/// `true`/`yes`/`on`/`1` or `false`/`no`/`off`/`0`, ignoring case.
pub fn parse_flag(raw: &str) -> Option<bool> {
    const TRUTHY: [&str; 4] = ["true", "yes", "on", "1"];
    const FALSY: [&str; 4] = ["false", "no", "off", "0"];
    if TRUTHY.iter().any(|t| raw.eq_ignore_ascii_case(t)) {
        Some(true)
    } else if FALSY.iter().any(|f| raw.eq_ignore_ascii_case(f)) {
        Some(false)
    } else {
        None
    }
}

/// Parse `raw` and accept it only inside `range`.
pub fn bounded<T: FromStr + PartialOrd>(raw: &str, range: RangeInclusive<T>) -> Option<T> {
    raw.trim().parse().ok().filter(|n| range.contains(n))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::types::OverflowPolicy;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn write(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("settings.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn merge_combines_objects_and_replaces_the_rest() {
        let merged = deep_merge(
            json!({"telemetry": {"flushThreshold": 10, "endpoint": "a"}, "tags": [1, 2], "x": {"y": 1}}),
            json!({"telemetry": {"flushThreshold": 3}, "tags": [9], "x": 5}),
        );
        assert_eq!(
            merged,
            json!({"telemetry": {"flushThreshold": 3, "endpoint": "a"}, "tags": [9], "x": 5})
        );
    }

    #[test]
    fn merge_skips_nulls_and_adds_new_keys() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null, "b": {"c": true}}));
        assert_eq!(merged, json!({"a": 1, "b": {"c": true}}));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_layered(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.telemetry.flush_threshold, 10);
    }

    #[test]
    fn file_values_override_nested_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            r#"{"telemetry": {"syncIntervalMs": 60000, "priorityEvents": ["USER_LOGIN"],
                "backoff": {"maxDelayMs": 120000}}}"#,
        );

        let t = read_layered(&path).unwrap().telemetry;
        assert_eq!(t.sync_interval_ms, 60_000);
        assert_eq!(t.priority_events, ["USER_LOGIN"]);
        assert_eq!(t.backoff.max_delay_ms, 120_000);
        assert_eq!(t.backoff.base_delay_ms, 30_000);
        assert_eq!(t.flush_threshold, 10);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "not valid json");
        assert_matches!(read_layered(&path), Err(SettingsError::Parse { path: p, .. }) if p == path);

        let path = write(&dir, r#"{"telemetry": {"flushThreshold": "many"}}"#);
        assert_matches!(read_layered(&path), Err(SettingsError::Parse { .. }));
    }

    #[test]
    fn unreadable_path_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(read_layered(dir.path()), Err(SettingsError::Read { .. }));
    }

    #[test]
    fn every_variable_is_applied() {
        let mut settings = LeiaSettings::default();
        apply_overrides_from(
            &mut settings,
            vars(&[
                ("LEIA_ENDPOINT", "https://ingest.example.edu/api/analytics"),
                ("LEIA_API_KEY", "k-123"),
                ("LEIA_SYNC_INTERVAL_MS", "60000"),
                ("LEIA_FLUSH_THRESHOLD", "25"),
                ("LEIA_MAX_QUEUE_LEN", "500"),
                ("LEIA_REQUEST_TIMEOUT_MS", "2000"),
                ("LEIA_DB_PATH", "/tmp/leia.db"),
                ("LEIA_LOG_LEVEL", "debug"),
                ("LEIA_LOG_JSON", "yes"),
            ]),
        );
        let t = &settings.telemetry;
        assert_eq!(t.endpoint, "https://ingest.example.edu/api/analytics");
        assert_eq!(t.api_key.as_deref(), Some("k-123"));
        assert_eq!((t.sync_interval_ms, t.flush_threshold), (60_000, 25));
        assert_eq!((t.max_queue_len, t.request_timeout_ms), (500, 2_000));
        assert_eq!(t.overflow_policy, OverflowPolicy::DropOldest);
        assert_eq!(settings.storage.db_path, "/tmp/leia.db");
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn rejected_values_keep_previous_settings() {
        let mut settings = LeiaSettings::default();
        apply_overrides_from(
            &mut settings,
            vars(&[
                ("LEIA_FLUSH_THRESHOLD", "0"),
                ("LEIA_SYNC_INTERVAL_MS", "soon"),
                ("LEIA_LOG_JSON", "maybe"),
                ("LEIA_ENDPOINT", ""),
            ]),
        );
        let defaults = LeiaSettings::default();
        assert_eq!(settings.telemetry.flush_threshold, defaults.telemetry.flush_threshold);
        assert_eq!(settings.telemetry.sync_interval_ms, defaults.telemetry.sync_interval_ms);
        assert_eq!(settings.telemetry.endpoint, defaults.telemetry.endpoint);
        assert_eq!(settings.logging.json, defaults.logging.json);
    }

    #[test]
    fn flags_and_ranges() {
        assert_eq!(parse_flag("ON"), Some(true));
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("2"), None);
        assert_eq!(bounded(" 1000 ", 1000..=600_000_u64), Some(1000));
        assert_eq!(bounded("999", 1000..=600_000_u64), None);
        assert_eq!(bounded::<usize>("-1", 0..=10), None);
    }

    #[test]
    fn settings_file_lives_in_data_dir() {
        assert!(leia_home().ends_with(".leia"));
        assert_eq!(settings_path().parent(), Some(leia_home().as_path()));
    }
}
