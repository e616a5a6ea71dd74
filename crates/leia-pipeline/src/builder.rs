//! Event record construction.

use chrono::{DateTime, Utc};
use leia_core::{EventRecord, EventType, Identity, PlatformInfo, SessionId};
use serde_json::{Map, Value};
use tracing::warn;

/// Who an event is attributed to and which session it belongs to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityContext {
    /// Authenticated principal, if any.
    pub identity: Identity,
    /// Active session, if any.
    pub session_id: Option<SessionId>,
}

/// Turns `(type, payload, context)` into a fully-populated [`EventRecord`].
///
/// Platform metadata is captured once at construction and stamped on every
/// record. Building never fails.
#[derive(Clone, Debug)]
pub struct RecordBuilder {
    platform: PlatformInfo,
}

impl RecordBuilder {
    /// Builder stamping `platform` on every record.
    pub fn new(platform: PlatformInfo) -> Self {
        Self { platform }
    }

    /// Collect platform metadata from host-provided versions.
    ///
    /// Missing or blank values are replaced by `"unknown"` and logged.
    pub fn from_host(host_version: Option<&str>, extension_version: Option<&str>) -> Self {
        let mut platform = PlatformInfo {
            host_version: PlatformInfo::UNKNOWN.to_string(),
            extension_version: PlatformInfo::UNKNOWN.to_string(),
            os: PlatformInfo::os_family().to_string(),
        };
        match host_version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => platform.host_version = v.to_string(),
            None => warn!(field = "host_version", "platform metadata unavailable, using default"),
        }
        match extension_version.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => platform.extension_version = v.to_string(),
            None => warn!(field = "extension_version", "platform metadata unavailable, using default"),
        }
        Self::new(platform)
    }

    /// Platform metadata stamped on records.
    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    /// Build a record timestamped now.
    pub fn build(&self, event_type: EventType, payload: Value, ctx: &IdentityContext) -> EventRecord {
        self.build_at(event_type, payload, ctx, Utc::now())
    }

    /// Build a record with an explicit timestamp.
    ///
    /// Without an active session the record gets a freshly minted session id
    /// and the anonymous identity.
    pub fn build_at(
        &self,
        event_type: EventType,
        payload: Value,
        ctx: &IdentityContext,
        at: DateTime<Utc>,
    ) -> EventRecord {
        let (identity, session_id) = match &ctx.session_id {
            Some(id) => (ctx.identity.clone(), id.clone()),
            None => (Identity::Anonymous, SessionId::minted_at(at)),
        };
        EventRecord::new(
            event_type,
            at,
            identity,
            session_id,
            self.platform.clone(),
            payload_map(payload),
        )
    }
}

/// Objects are used as-is, `null` becomes empty, anything else is wrapped as `{"value": ..}`.
fn payload_map(payload: Value) -> Map<String, Value> {
    match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            let _ = map.insert("value".to_string(), other);
            map
        }
    }
}
