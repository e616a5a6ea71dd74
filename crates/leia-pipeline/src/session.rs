//! Session correlation.
//!
//! Holds at most one live session id. Starting a session always replaces
//! the previous one, even if it was never ended. The id is mirrored under
//! [`keys::CURRENT_SESSION_ID`] so a restarted process keeps correlating.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use leia_core::{Identity, SessionId};
use leia_store::{KeyValueStore, keys};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::builder::IdentityContext;

/// A live correlation session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Correlation id stamped on events.
    pub id: SessionId,
    /// Principal the session was started for.
    pub identity: Identity,
    /// When the session started.
    pub started_at: DateTime<Utc>,
}

/// Process-wide holder of the current session and authenticated identity.
pub struct SessionCorrelator {
    current: RwLock<Option<Session>>,
    authenticated: RwLock<Identity>,
    store: Arc<dyn KeyValueStore>,
}

impl SessionCorrelator {
    /// Correlator with no session.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            current: RwLock::new(None),
            authenticated: RwLock::new(Identity::Anonymous),
            store,
        }
    }

    /// Restore the persisted session id and authenticated identity.
    ///
    /// Read failures are logged and leave the correlator empty.
    pub async fn hydrate(store: Arc<dyn KeyValueStore>) -> Self {
        let correlator = Self::new(Arc::clone(&store));

        let identity = match store.get(keys::AUTHENTICATED_EMAIL).await {
            Ok(Some(Value::String(email))) => Identity::from_email(Some(email)),
            Ok(_) => Identity::Anonymous,
            Err(e) => {
                warn!(error = %e, "failed to read authenticated identity");
                Identity::Anonymous
            }
        };
        *correlator.authenticated.write() = identity.clone();

        match store.get(keys::CURRENT_SESSION_ID).await {
            Ok(Some(Value::String(raw))) if !raw.is_empty() => {
                let id = SessionId::from(raw);
                let started_at = id.minted_instant().unwrap_or_else(Utc::now);
                debug!(session_id = %id, "session restored");
                *correlator.current.write() = Some(Session {
                    id,
                    identity,
                    started_at,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to read current session id"),
        }

        correlator
    }

    /// Start a fresh session for `identity`, replacing any current one.
    pub async fn start_session(&self, identity: Identity) -> Session {
        let started_at = Utc::now();
        let session = Session {
            id: SessionId::minted_at(started_at),
            identity,
            started_at,
        };
        let previous = self.current.write().replace(session.clone());
        if let Some(previous) = previous {
            debug!(previous = %previous.id, "replacing session that was never ended");
        }
        info!(session_id = %session.id, "session started");

        if let Err(e) = self
            .store
            .put(keys::CURRENT_SESSION_ID, Value::String(session.id.to_string()))
            .await
        {
            warn!(session_id = %session.id, error = %e, "failed to persist session id");
        }
        session
    }

    /// Clear the current session, returning it.
    pub async fn end_session(&self) -> Option<Session> {
        let ended = self.current.write().take()?;
        info!(session_id = %ended.id, "session ended");
        if let Err(e) = self.store.delete(keys::CURRENT_SESSION_ID).await {
            warn!(session_id = %ended.id, error = %e, "failed to clear persisted session id");
        }
        Some(ended)
    }

    /// Record the authenticated identity (or its absence) on behalf of the
    /// authentication collaborator.
    pub async fn set_authenticated(&self, identity: Identity) {
        *self.authenticated.write() = identity.clone();
        let result = match &identity {
            Identity::Authenticated(email) => {
                self.store
                    .put(keys::AUTHENTICATED_EMAIL, Value::String(email.clone()))
                    .await
            }
            Identity::Anonymous => self.store.delete(keys::AUTHENTICATED_EMAIL).await,
        };
        if let Err(e) = result {
            warn!(error = %e, "failed to persist authenticated identity");
        }
    }

    /// Current session id, if a session is active.
    pub fn current_session_id(&self) -> Option<SessionId> {
        self.current.read().as_ref().map(|s| s.id.clone())
    }

    /// Current session, if any.
    pub fn current(&self) -> Option<Session> {
        self.current.read().clone()
    }

    /// Context handed to the record builder.
    pub fn identity_context(&self) -> IdentityContext {
        let current = self.current.read();
        match current.as_ref() {
            Some(session) => IdentityContext {
                identity: if session.identity.is_anonymous() {
                    self.authenticated.read().clone()
                } else {
                    session.identity.clone()
                },
                session_id: Some(session.id.clone()),
            },
            None => IdentityContext::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use leia_store::MemoryStore;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn start_replaces_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionCorrelator::new(store.clone());
        assert!(sessions.current_session_id().is_none());

        let first = sessions.start_session(Identity::Authenticated("a@x.edu".into())).await;
        let second = sessions.start_session(Identity::Authenticated("a@x.edu".into())).await;
        assert_ne!(first.id, second.id);
        assert_eq!(sessions.current_session_id(), Some(second.id.clone()));
        assert_eq!(store.peek(keys::CURRENT_SESSION_ID), Some(json!(second.id.as_str())));
    }

    #[tokio::test]
    async fn end_clears_memory_and_storage() {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionCorrelator::new(store.clone());
        let started = sessions.start_session(Identity::Anonymous).await;

        let ended = sessions.end_session().await.unwrap();
        assert_eq!(ended.id, started.id);
        assert!(sessions.current_session_id().is_none());
        assert_eq!(store.peek(keys::CURRENT_SESSION_ID), None);
        assert!(sessions.end_session().await.is_none());
    }

    #[tokio::test]
    async fn hydrate_restores_session_and_identity() {
        let store = Arc::new(MemoryStore::with_entries([
            (keys::CURRENT_SESSION_ID.to_string(), json!("session_1700000000000_abcdef01")),
            (keys::AUTHENTICATED_EMAIL.to_string(), json!("b@x.edu")),
        ]));
        let sessions = SessionCorrelator::hydrate(store).await;
        let session = sessions.current().unwrap();
        assert_eq!(session.id.as_str(), "session_1700000000000_abcdef01");
        assert_eq!(session.started_at.timestamp_millis(), 1_700_000_000_000);

        let ctx = sessions.identity_context();
        assert_eq!(ctx.identity, Identity::Authenticated("b@x.edu".into()));
        assert_eq!(ctx.session_id, Some(session.id));
    }

    #[tokio::test]
    async fn no_session_context_is_empty() {
        let store = Arc::new(MemoryStore::with_entries([(
            keys::AUTHENTICATED_EMAIL.to_string(),
            json!("b@x.edu"),
        )]));
        let sessions = SessionCorrelator::hydrate(store).await;
        assert_eq!(sessions.identity_context(), IdentityContext::default());
    }

    #[tokio::test]
    async fn persistence_failure_keeps_session_in_memory() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let sessions = SessionCorrelator::new(store.clone());
        let session = sessions.start_session(Identity::Anonymous).await;
        assert_eq!(sessions.current_session_id(), Some(session.id));
        assert_eq!(store.peek(keys::CURRENT_SESSION_ID), None);
    }

    #[tokio::test]
    async fn set_authenticated_round_trip() {
        let store = Arc::new(MemoryStore::new());
        let sessions = SessionCorrelator::new(store.clone());
        sessions.set_authenticated(Identity::Authenticated("c@x.edu".into())).await;
        assert_eq!(store.peek(keys::AUTHENTICATED_EMAIL), Some(json!("c@x.edu")));
        sessions.set_authenticated(Identity::Anonymous).await;
        assert_eq!(store.peek(keys::AUTHENTICATED_EMAIL), None);
    }
}
