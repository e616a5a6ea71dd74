//! Well-known keys in the host key/value store.

/// JSON array of pending event records (the durable queue's on-disk image).
pub const PENDING_EVENTS: &str = "analytics-pending-events";

/// Current session id; absent when no session is active.
pub const CURRENT_SESSION_ID: &str = "current-session-id";

/// Authenticated email, owned by the authentication collaborator.
pub const AUTHENTICATED_EMAIL: &str = "authenticatedEmail";
