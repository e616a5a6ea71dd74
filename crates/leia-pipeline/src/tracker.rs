//! Producer-facing handle.
//!
//! Recording an event never returns an error and never waits on I/O: the
//! record is built, appended in memory, and the persister and sync engine are
//! poked. Everything that can go wrong afterwards is logged inside the
//! pipeline.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use leia_core::event::iso_millis;
use leia_core::{EventType, Identity, QueryCategory, classify_query};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::builder::RecordBuilder;
use crate::engine::{SyncHandle, Trigger};
use crate::queue::DurableQueue;
use crate::session::{Session, SessionCorrelator};

/// Message type whose content is classified into a [`QueryCategory`].
pub const USER_QUERY: &str = "user_query";

struct TrackerInner {
    builder: RecordBuilder,
    queue: Arc<DurableQueue>,
    sessions: Arc<SessionCorrelator>,
    sync: SyncHandle,
    persist: Arc<Notify>,
    flush_threshold: usize,
    priority: HashSet<EventType>,
}

/// Cloneable producer handle; every clone feeds the same queue.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

impl Tracker {
    pub(crate) fn new(
        builder: RecordBuilder,
        queue: Arc<DurableQueue>,
        sessions: Arc<SessionCorrelator>,
        sync: SyncHandle,
        persist: Arc<Notify>,
        flush_threshold: usize,
        priority: HashSet<EventType>,
    ) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                builder,
                queue,
                sessions,
                sync,
                persist,
                flush_threshold: flush_threshold.max(1),
                priority,
            }),
        }
    }

    /// Record one event.
    ///
    /// A blank event type or a payload that cannot be serialized is
    /// dropped with a warning. After the append, a priority event type
    /// requests an immediate flush; otherwise reaching the flush threshold
    /// does.
    pub fn track(&self, event_type: impl Into<EventType>, payload: impl Serialize) {
        let event_type = event_type.into();
        if event_type.as_str().trim().is_empty() {
            warn!("dropping event with blank type");
            return;
        }
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(%event_type, error = %e, "dropping event with unserializable payload");
                return;
            }
        };
        self.enqueue(event_type, payload);
    }

    fn enqueue(&self, event_type: EventType, payload: Value) {
        let inner = &self.inner;
        let ctx = inner.sessions.identity_context();
        let record = inner.builder.build(event_type.clone(), payload, &ctx);
        let outcome = inner.queue.enqueue(record);
        if !outcome.accepted {
            return;
        }
        inner.persist.notify_one();
        debug!(%event_type, queue_len = outcome.len, "event queued");

        let trigger = if inner.priority.contains(&event_type) {
            Some(Trigger::Priority)
        } else if outcome.len >= inner.flush_threshold {
            Some(Trigger::Threshold)
        } else {
            None
        };
        if let Some(trigger) = trigger {
            if !inner.sync.request(trigger) {
                debug!(%trigger, "sync engine stopped, flush request ignored");
            }
        }
    }

    /// Start a session for `identity` and record `SESSION_START`.
    pub async fn start_session(&self, identity: Identity) -> Session {
        let session = self.inner.sessions.start_session(identity).await;
        self.track(
            EventType::SessionStart,
            json!({
                "user_email": session.identity.as_str(),
                "session_id": session.id.as_str(),
            }),
        );
        session
    }

    /// Record `SESSION_END` and clear the session. No-op without a session.
    pub async fn end_session(&self) -> Option<Session> {
        let current = self.inner.sessions.current()?;
        let duration_ms = (Utc::now() - current.started_at).num_milliseconds().max(0);
        self.track(
            EventType::SessionEnd,
            json!({
                "session_id": current.id.as_str(),
                "duration_ms": duration_ms,
            }),
        );
        self.inner.sessions.end_session().await
    }

    /// Record an authenticated login and start its session.
    pub async fn login(&self, email: impl Into<String>) -> Session {
        let identity = Identity::from_email(Some(email.into()));
        self.inner.sessions.set_authenticated(identity.clone()).await;
        let session = self.start_session(identity.clone()).await;
        self.track(
            EventType::UserLogin,
            json!({
                "user_email": identity.as_str(),
                "timestamp": iso_millis::format(&Utc::now()),
            }),
        );
        session
    }

    /// Record a logout, end the session, and forget the identity.
    pub async fn logout(&self) {
        let identity = self.inner.sessions.identity_context().identity;
        self.track(
            EventType::UserLogout,
            json!({
                "user_email": identity.as_str(),
                "timestamp": iso_millis::format(&Utc::now()),
            }),
        );
        let _ = self.end_session().await;
        self.inner.sessions.set_authenticated(Identity::Anonymous).await;
    }

    /// Record a chat message without its content.
    ///
    /// `user_query` messages also carry the keyword category of the content.
    /// Chat messages are batched like any other event. Hosts that need each
    /// message synced immediately add `CHAT_INTERACTION` to
    /// `telemetry.priorityEvents`.
    pub fn track_chat_interaction(&self, message_type: &str, content: &str, included_code: bool) {
        let mut data = json!({
            "message_type": message_type,
            "message_length": content.chars().count(),
            "included_code": included_code,
            "timestamp": iso_millis::format(&Utc::now()),
        });
        if message_type == USER_QUERY {
            let category: QueryCategory = classify_query(content);
            data["query_category"] = json!(category.as_str());
        }
        self.track(EventType::ChatInteraction, data);
    }

    /// Record `PAIR_<kind>`.
    pub fn track_pair_event(&self, kind: &str, data: impl Serialize) {
        self.track(prefixed("PAIR_", kind), data);
    }

    /// Record `TASK_<kind>`.
    pub fn track_task_event(&self, kind: &str, data: impl Serialize) {
        self.track(prefixed("TASK_", kind), data);
    }

    /// Record `EXTENSION_ACTIVATED` when the host starts using the pipeline.
    /// `workspace_type` is `single-root`, `multi-root` or `no-workspace`.
    pub fn track_activation(&self, workspace_type: &str) {
        self.track(
            EventType::ExtensionActivated,
            json!({
                "activation_time": iso_millis::format(&Utc::now()),
                "workspace_type": workspace_type,
            }),
        );
    }

    /// Record `EXTENSION_DEACTIVATED`; call before [`Pipeline::shutdown`]
    /// so the final flush carries it.
    ///
    /// [`Pipeline::shutdown`]: crate::Pipeline::shutdown
    pub fn track_deactivation(&self) {
        self.track(
            EventType::ExtensionDeactivated,
            json!({ "deactivation_time": iso_millis::format(&Utc::now()) }),
        );
    }

    /// Ask the engine for a flush without waiting for it.
    pub fn request_flush(&self) -> bool {
        self.inner.sync.request(Trigger::Manual)
    }

    /// Pending records.
    pub fn queue_len(&self) -> usize {
        self.inner.queue.len()
    }

    /// Current session, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.inner.sessions.current()
    }
}

fn prefixed(prefix: &str, kind: &str) -> EventType {
    let kind = kind.trim();
    if kind.is_empty() {
        return EventType::from("");
    }
    EventType::from(format!("{prefix}{}", kind.to_ascii_uppercase()))
}
