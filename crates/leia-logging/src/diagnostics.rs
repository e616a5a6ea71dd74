use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, Row, named_params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber, span};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;

const DEFAULT_QUERY_LIMIT: u32 = 100;

const SCHEMA: &str = "
    PRAGMA journal_mode = WAL;
    CREATE TABLE IF NOT EXISTS log_entries (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        recorded_at TEXT NOT NULL,
        severity    TEXT NOT NULL,
        module      TEXT NOT NULL,
        body        TEXT NOT NULL,
        extra       TEXT,
        session_id  TEXT
    );
    CREATE INDEX IF NOT EXISTS log_entries_by_time ON log_entries(recorded_at);
";

const SELECT: &str = "
    SELECT id, recorded_at, severity, module, body, extra, session_id
      FROM log_entries
     WHERE (:level IS NULL OR severity = :level)
       AND (:target IS NULL OR module LIKE :target)
       AND (:since IS NULL OR recorded_at >= :since)
     ORDER BY id DESC
     LIMIT :limit
";

/// One persisted WARN or ERROR event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    /// Insertion order.
    pub id: i64,
    /// UTC instant, RFC 3339 with milliseconds.
    pub timestamp: String,
    /// `WARN` or `ERROR`.
    pub level: String,
    /// Module path of the emitting code.
    pub target: String,
    /// Rendered message.
    pub message: String,
    /// Other event fields as a JSON object.
    pub fields: Option<String>,
    /// `session_id` from the event or an enclosing span.
    pub session_id: Option<String>,
}

impl DiagnosticRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            timestamp: row.get("recorded_at")?,
            level: row.get("severity")?,
            target: row.get("module")?,
            message: row.get("body")?,
            fields: row.get("extra")?,
            session_id: row.get("session_id")?,
        })
    }
}

/// Filter for [`DiagnosticsSink::query`]. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct DiagnosticsQuery {
    /// Level name, any case.
    pub level: Option<String>,
    /// Substring of the target.
    pub target: Option<String>,
    /// Only rows recorded at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Row cap, 100 when unset.
    pub limit: Option<u32>,
}

/// SQLite table of warnings and errors.
pub struct DiagnosticsSink {
    conn: Mutex<Connection>,
}

impl DiagnosticsSink {
    /// Open (creating parent directories and schema as needed) the database at `path`.
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Sink backed by a private in-memory database.
    pub fn in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn append(&self, at: DateTime<Utc>, level: Level, target: &str, captured: Captured) {
        let extra = (!captured.fields.is_empty())
            .then(|| serde_json::to_string(&captured.fields).ok())
            .flatten();
        // A failed write cannot be logged from inside the subscriber.
        let _ = self.conn.lock().execute(
            "INSERT INTO log_entries (recorded_at, severity, module, body, extra, session_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            (
                at.to_rfc3339_opts(SecondsFormat::Millis, true),
                level.as_str(),
                target,
                captured.message.unwrap_or_default(),
                extra,
                captured.session_id,
            ),
        );
    }

    /// Rows matching `filter`, newest first.
    pub fn query(&self, filter: &DiagnosticsQuery) -> rusqlite::Result<Vec<DiagnosticRecord>> {
        let level = filter.level.as_deref().map(str::to_uppercase);
        let target = filter.target.as_deref().map(|t| format!("%{t}%"));
        let since = filter
            .since
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true));
        let limit = filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(SELECT)?;
        let rows = stmt.query_map(
            named_params! {
                ":level": level,
                ":target": target,
                ":since": since,
                ":limit": limit,
            },
            DiagnosticRecord::from_row,
        )?;
        rows.collect()
    }

    /// Rows stored so far.
    pub fn count(&self) -> rusqlite::Result<u64> {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM log_entries", [], |row| row.get(0))
    }
}

/// `tracing` layer feeding WARN and ERROR events into a [`DiagnosticsSink`].
pub struct DiagnosticsLayer {
    sink: Arc<DiagnosticsSink>,
}

impl DiagnosticsLayer {
    /// Layer appending to `sink`.
    pub fn new(sink: Arc<DiagnosticsSink>) -> Self {
        Self { sink }
    }
}

/// Fields pulled off an event or span.
#[derive(Default)]
struct Captured {
    message: Option<String>,
    session_id: Option<String>,
    fields: Map<String, Value>,
}

impl Captured {
    fn put(&mut self, field: &Field, value: Value) {
        match (field.name(), value) {
            ("message", Value::String(s)) => self.message = Some(s),
            ("session_id", Value::String(s)) => self.session_id = Some(s),
            (name, other) => {
                let _ = self.fields.insert(name.to_owned(), other);
            }
        }
    }
}

impl Visit for Captured {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        // `%`-captured strings arrive quoted through Debug.
        let rendered = if field.name() == "session_id" {
            rendered.trim_matches('"').to_owned()
        } else {
            rendered
        };
        self.put(field, Value::String(rendered));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = Number::from_f64(value) {
            self.put(field, Value::Number(n));
        }
    }
}

/// Span extension carrying a `session_id` for events emitted inside it.
struct SpanSession(String);

fn enclosing_session<S>(event: &Event<'_>, ctx: &Context<'_, S>) -> Option<String>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    ctx.event_scope(event)?
        .find_map(|span| span.extensions().get::<SpanSession>().map(|s| s.0.clone()))
}

impl<S> Layer<S> for DiagnosticsLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut captured = Captured::default();
        attrs.record(&mut captured);
        let Some(session_id) = captured.session_id else {
            return;
        };
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanSession(session_id));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > Level::WARN {
            return;
        }
        let mut captured = Captured::default();
        event.record(&mut captured);
        if captured.session_id.is_none() {
            captured.session_id = enclosing_session(event, &ctx);
        }
        self.sink.append(Utc::now(), *meta.level(), meta.target(), captured);
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 14, 12, minute, second).unwrap()
    }

    fn append(sink: &DiagnosticsSink, when: DateTime<Utc>, level: Level, target: &str, message: &str) {
        let captured = Captured {
            message: Some(message.to_owned()),
            ..Captured::default()
        };
        sink.append(when, level, target, captured);
    }

    #[test]
    fn filters_by_level_and_target() {
        let sink = DiagnosticsSink::in_memory().unwrap();
        append(&sink, at(0, 0), Level::WARN, "leia_pipeline::engine", "flush failed");
        append(&sink, at(0, 1), Level::ERROR, "leia_store::sqlite", "db locked");

        let errors = sink
            .query(&DiagnosticsQuery { level: Some("error".into()), ..Default::default() })
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "db locked");
        assert_eq!(errors[0].timestamp, "2026-02-14T12:00:01.000Z");

        let engine = sink
            .query(&DiagnosticsQuery { target: Some("engine".into()), ..Default::default() })
            .unwrap();
        assert_eq!(engine.len(), 1);
        assert_eq!(engine[0].level, "WARN");
    }

    #[test]
    fn newest_rows_first_up_to_limit() {
        let sink = DiagnosticsSink::in_memory().unwrap();
        for i in 0..10 {
            append(&sink, at(1, i), Level::WARN, "t", &format!("msg {i}"));
        }
        let rows = sink
            .query(&DiagnosticsQuery { limit: Some(3), ..Default::default() })
            .unwrap();
        let messages: Vec<_> = rows.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["msg 9", "msg 8", "msg 7"]);
        assert_eq!(sink.count().unwrap(), 10);
    }

    #[test]
    fn since_is_inclusive() {
        let sink = DiagnosticsSink::in_memory().unwrap();
        append(&sink, at(0, 0), Level::WARN, "t", "old");
        append(&sink, at(5, 0), Level::WARN, "t", "boundary");
        append(&sink, at(9, 0), Level::WARN, "t", "new");
        let rows = sink
            .query(&DiagnosticsQuery { since: Some(at(5, 0)), ..Default::default() })
            .unwrap();
        let messages: Vec<_> = rows.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["new", "boundary"]);
    }

    #[test]
    fn layer_keeps_warnings_fields_and_span_session() {
        let sink = Arc::new(DiagnosticsSink::in_memory().unwrap());
        let subscriber = tracing_subscriber::registry().with(DiagnosticsLayer::new(Arc::clone(&sink)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("ignored");
            tracing::warn!(status = 503_u64, retryable = true, "flush failed");
            let span = tracing::info_span!("sync", session_id = "session_1_abcdef01");
            let _entered = span.enter();
            tracing::error!("persist failed");
        });

        let rows = sink.query(&DiagnosticsQuery::default()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].message, "persist failed");
        assert_eq!(rows[0].level, "ERROR");
        assert_eq!(rows[0].session_id.as_deref(), Some("session_1_abcdef01"));

        let fields: Value = serde_json::from_str(rows[1].fields.as_deref().unwrap()).unwrap();
        assert_eq!(fields["status"], 503);
        assert_eq!(fields["retryable"], true);
        assert!(rows[1].session_id.is_none());
    }

    #[test]
    fn open_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("diagnostics.db");
        let sink = DiagnosticsSink::open(&path).unwrap();
        assert_eq!(sink.count().unwrap(), 0);
        assert!(path.exists());
    }
}
