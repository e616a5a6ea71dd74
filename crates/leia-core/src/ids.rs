//! Session correlation identifiers.
//!
//! Freshly minted ids look like `session_1736942400000_3f2a9c1d`: the mint
//! instant in Unix milliseconds, then eight hex characters of a v4 UUID.
//! Keeping the instant in the id lets a restored session report its
//! duration. Any other string read back from storage is kept as is.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier shared by every event of one session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    const PREFIX: &'static str = "session_";

    /// Mint an id stamped with the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self::minted_at(Utc::now())
    }

    /// Mint an id stamped with `at`.
    #[must_use]
    pub fn minted_at(at: DateTime<Utc>) -> Self {
        let uuid = Uuid::new_v4().simple().to_string();
        let suffix = uuid.get(..8).unwrap_or(&uuid);
        Self(format!("{}{}_{suffix}", Self::PREFIX, at.timestamp_millis()))
    }

    /// The id text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// When a minted id was created; `None` for ids of any other shape.
    #[must_use]
    pub fn minted_instant(&self) -> Option<DateTime<Utc>> {
        let (millis, _suffix) = self.0.strip_prefix(Self::PREFIX)?.split_once('_')?;
        DateTime::from_timestamp_millis(millis.parse().ok()?)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl From<&str> for SessionId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}
