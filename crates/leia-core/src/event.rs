//! Event record model and its wire representation.
//!
//! An [`EventRecord`] is immutable once built: fields are private and only
//! readable through accessors. The serialized shape is the wire format the
//! ingestion endpoint expects and the on-disk image of the durable queue:
//!
//! ```json
//! {
//!   "event_type": "USER_LOGIN",
//!   "timestamp": "2025-01-15T12:00:00.000Z",
//!   "user_email": "student@example.edu",
//!   "session_id": "session_1736942400000_3f2a9c1d",
//!   "platform_info": { "vscode_version": "1.96.0", "extension_version": "0.3.1", "os": "linux" },
//!   "data": { "method": "email" }
//! }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::ids::SessionId;

/// Sentinel identity for events emitted without an authenticated principal.
pub const ANONYMOUS: &str = "anonymous";

// ─────────────────────────────────────────────────────────────────────────────
// Event types
// ─────────────────────────────────────────────────────────────────────────────

macro_rules! event_types {
    ($($(#[$meta:meta])* $variant:ident => $wire:literal,)*) => {
        /// Event tag. Well-known tags get a variant; anything else is `Custom`.
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum EventType {
            $($(#[$meta])* $variant,)*
            /// Producer-defined tag outside the well-known set.
            Custom(String),
        }

        impl EventType {
            /// Wire representation of the tag.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $wire,)*
                    Self::Custom(tag) => tag,
                }
            }

            fn from_wire(tag: &str) -> Self {
                match tag {
                    $($wire => Self::$variant,)*
                    other => Self::Custom(other.to_string()),
                }
            }
        }
    };
}

event_types! {
    /// Successful authentication.
    UserLogin => "USER_LOGIN",
    /// Explicit logout.
    UserLogout => "USER_LOGOUT",
    /// Authentication attempted (may fail).
    UserLoginAttempt => "USER_LOGIN_ATTEMPT",
    /// A correlation session started.
    SessionStart => "SESSION_START",
    /// A correlation session ended.
    SessionEnd => "SESSION_END",
    /// Chat message sent or received.
    ChatInteraction => "CHAT_INTERACTION",
    /// Pair programming session started.
    PairSessionStart => "PAIR_SESSION_START",
    /// Pair programming session ended.
    PairSessionEnd => "PAIR_SESSION_END",
    /// Driver/navigator roles swapped.
    PairRoleSwitch => "PAIR_ROLE_SWITCH",
    /// Pair programming status polled.
    PairSessionStatusCheck => "PAIR_SESSION_STATUS_CHECK",
    /// Task added to a pair session.
    TaskCreate => "TASK_CREATE",
    /// Task completed in a pair session.
    TaskComplete => "TASK_COMPLETE",
    /// Code snapshot analyzed.
    CodeAnalysis => "CODE_ANALYSIS",
    /// Code metrics computed.
    CodeMetrics => "CODE_METRICS",
    /// Code issues detected.
    CodeIssuesDetected => "CODE_ISSUES_DETECTED",
    /// Outbound API request.
    ApiRequest => "API_REQUEST",
    /// API response received.
    ApiResponse => "API_RESPONSE",
    /// API call failed.
    ApiError => "API_ERROR",
    /// API latency sample.
    ApiResponseTime => "API_RESPONSE_TIME",
    /// Host extension activated.
    ExtensionActivated => "EXTENSION_ACTIVATED",
    /// Host extension deactivated.
    ExtensionDeactivated => "EXTENSION_DEACTIVATED",
    /// Sidebar view opened.
    SidebarView => "SIDEBAR_VIEW",
    /// Active document changed.
    DocumentChanged => "DOCUMENT_CHANGED",
}

impl EventType {
    /// Whether the tag is empty (producers must supply a non-empty tag).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }

    /// Whether the tag belongs to the `prefix` family (e.g. `"PAIR_"`).
    #[must_use]
    pub fn has_prefix(&self, prefix: &str) -> bool {
        self.as_str().starts_with(prefix)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(tag: &str) -> Self {
        Self::from_wire(tag)
    }
}

impl From<String> for EventType {
    fn from(tag: String) -> Self {
        Self::from_wire(&tag)
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_wire(&tag))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Principal an event is attributed to.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Authenticated user, identified by email.
    Authenticated(String),
    /// No authenticated principal.
    #[default]
    Anonymous,
}

impl Identity {
    /// Build from an optional email; empty or missing means anonymous.
    #[must_use]
    pub fn from_email(email: Option<String>) -> Self {
        match email {
            Some(email) if !email.trim().is_empty() && email != ANONYMOUS => {
                Self::Authenticated(email)
            }
            _ => Self::Anonymous,
        }
    }

    /// Wire representation (`"anonymous"` for the sentinel).
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Authenticated(email) => email,
            Self::Anonymous => ANONYMOUS,
        }
    }

    /// Whether this is the anonymous sentinel.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(Self::from_email(raw))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Platform metadata
// ─────────────────────────────────────────────────────────────────────────────

/// Host platform metadata, captured once per process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    /// Version of the host application.
    #[serde(rename = "vscode_version")]
    pub host_version: String,
    /// Version of the extension emitting events.
    pub extension_version: String,
    /// OS family, in host-runtime naming (`darwin`, `win32`, `linux`).
    pub os: String,
}

impl PlatformInfo {
    /// Placeholder for metadata that could not be collected.
    pub const UNKNOWN: &'static str = "unknown";

    /// Metadata with every field unknown.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            host_version: Self::UNKNOWN.to_string(),
            extension_version: Self::UNKNOWN.to_string(),
            os: Self::UNKNOWN.to_string(),
        }
    }

    /// OS family of the running process, in host-runtime naming.
    #[must_use]
    pub fn os_family() -> &'static str {
        match std::env::consts::OS {
            "macos" => "darwin",
            "windows" => "win32",
            other => other,
        }
    }
}

impl Default for PlatformInfo {
    fn default() -> Self {
        Self::unknown()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timestamp codec
// ─────────────────────────────────────────────────────────────────────────────

/// ISO-8601 UTC timestamps with millisecond precision (`2025-01-15T12:00:00.000Z`).
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Format an instant the way the wire expects.
    #[must_use]
    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Drop sub-millisecond precision so a value survives a wire round trip.
    #[must_use]
    pub fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
    }

    /// Serde serializer.
    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    /// Serde deserializer (accepts any RFC 3339 offset).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Event record
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable, fully-populated usage event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    event_type: EventType,
    #[serde(with = "iso_millis")]
    timestamp: DateTime<Utc>,
    #[serde(rename = "user_email", default)]
    identity: Identity,
    session_id: SessionId,
    #[serde(default)]
    platform_info: PlatformInfo,
    #[serde(default)]
    data: Map<String, Value>,
}

impl EventRecord {
    /// Assemble a record. The timestamp is truncated to milliseconds.
    #[must_use]
    pub fn new(
        event_type: EventType,
        timestamp: DateTime<Utc>,
        identity: Identity,
        session_id: SessionId,
        platform_info: PlatformInfo,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            event_type,
            timestamp: iso_millis::truncate(timestamp),
            identity,
            session_id,
            platform_info,
            data,
        }
    }

    /// Event tag.
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Creation instant.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Attributed principal.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Correlation session.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Host platform metadata.
    pub fn platform_info(&self) -> &PlatformInfo {
        &self.platform_info
    }

    /// Producer-defined payload.
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
