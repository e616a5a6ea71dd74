//! Aggregate statistics over a snapshot of records.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use leia_core::{EventRecord, EventType};
use serde::Serialize;

/// How many event types [`Summary::top_event_types`] keeps.
pub const TOP_EVENT_TYPES: usize = 10;

/// Headline counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SummaryStats {
    /// All records.
    pub total_events: usize,
    /// Distinct identities, anonymous included.
    pub unique_users: usize,
    /// `CHAT_INTERACTION` records.
    pub chat_interactions: usize,
    /// `PAIR_SESSION_START` records.
    pub pair_sessions: usize,
    /// `CODE_ANALYSIS` records.
    pub code_analyses: usize,
    /// `TASK_COMPLETE` records.
    pub task_completions: usize,
    /// Records stamped within 24 hours before `now`.
    pub last_24h: usize,
}

/// Records per broad activity group.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CategoryCounts {
    /// Login and logout.
    pub user: usize,
    /// Chat interactions.
    pub chat: usize,
    /// Anything tagged `PAIR_*`.
    pub pair: usize,
    /// Anything tagged `CODE_*`.
    pub code: usize,
}

/// One row of the top event types table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TypeCount {
    /// Event tag.
    pub event_type: String,
    /// Records with that tag.
    pub count: usize,
}

/// Result of [`summarize`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Headline counters.
    pub stats: SummaryStats,
    /// Records per event tag.
    pub by_type: BTreeMap<String, usize>,
    /// Records per identity.
    pub by_identity: BTreeMap<String, usize>,
    /// Most frequent tags, count descending then tag ascending.
    pub top_event_types: Vec<TypeCount>,
    /// Records per `data.language` value.
    pub languages: BTreeMap<String, usize>,
    /// Records per activity group.
    pub categories: CategoryCounts,
}

/// Aggregate `events` relative to `now`. Pure; the input is not touched.
pub fn summarize(events: &[EventRecord], now: DateTime<Utc>) -> Summary {
    let mut summary = Summary::default();
    let since = now - Duration::hours(24);

    for event in events {
        let event_type = event.event_type();
        *summary.by_type.entry(event_type.to_string()).or_default() += 1;
        *summary
            .by_identity
            .entry(event.identity().as_str().to_string())
            .or_default() += 1;

        match event_type {
            EventType::ChatInteraction => summary.stats.chat_interactions += 1,
            EventType::PairSessionStart => summary.stats.pair_sessions += 1,
            EventType::CodeAnalysis => summary.stats.code_analyses += 1,
            EventType::TaskComplete => summary.stats.task_completions += 1,
            _ => {}
        }

        match event_type {
            EventType::UserLogin | EventType::UserLogout => summary.categories.user += 1,
            EventType::ChatInteraction => summary.categories.chat += 1,
            t if t.has_prefix("PAIR_") => summary.categories.pair += 1,
            t if t.has_prefix("CODE_") => summary.categories.code += 1,
            _ => {}
        }

        if event.timestamp() >= since {
            summary.stats.last_24h += 1;
        }

        if let Some(language) = event.data().get("language").and_then(|v| v.as_str()) {
            *summary.languages.entry(language.to_string()).or_default() += 1;
        }
    }

    summary.stats.total_events = events.len();
    summary.stats.unique_users = summary.by_identity.len();
    summary.top_event_types = top_types(&summary.by_type);
    summary
}

fn top_types(by_type: &BTreeMap<String, usize>) -> Vec<TypeCount> {
    let mut rows: Vec<TypeCount> = by_type
        .iter()
        .map(|(event_type, count)| TypeCount {
            event_type: event_type.clone(),
            count: *count,
        })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.event_type.cmp(&b.event_type)));
    rows.truncate(TOP_EVENT_TYPES);
    rows
}
