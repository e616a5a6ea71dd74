//! Markdown rendering of a [`Summary`].

use std::fmt::Write as _;

use crate::summary::Summary;

/// Render `summary` as a markdown report.
pub fn render_markdown(summary: &Summary) -> String {
    let stats = &summary.stats;
    let mut out = String::from("# Leia analytics summary\n\n");

    out.push_str("| Metric | Value |\n|---|---:|\n");
    for (label, value) in [
        ("Total events", stats.total_events),
        ("Unique users", stats.unique_users),
        ("Chat interactions", stats.chat_interactions),
        ("Pair sessions", stats.pair_sessions),
        ("Code analyses", stats.code_analyses),
        ("Completed tasks", stats.task_completions),
        ("Last 24 hours", stats.last_24h),
    ] {
        let _ = writeln!(out, "| {label} | {value} |");
    }

    let categories = &summary.categories;
    out.push_str("\n## Activity\n\n");
    let _ = writeln!(out, "- User: {}", categories.user);
    let _ = writeln!(out, "- Chat: {}", categories.chat);
    let _ = writeln!(out, "- Pair programming: {}", categories.pair);
    let _ = writeln!(out, "- Code: {}", categories.code);

    if !summary.top_event_types.is_empty() {
        out.push_str("\n## Top event types\n\n| Event type | Count |\n|---|---:|\n");
        for row in &summary.top_event_types {
            let _ = writeln!(out, "| `{}` | {} |", row.event_type, row.count);
        }
    }

    if !summary.by_identity.is_empty() {
        out.push_str("\n## Users\n\n| User | Events |\n|---|---:|\n");
        for (identity, count) in &summary.by_identity {
            let _ = writeln!(out, "| {identity} | {count} |");
        }
    }

    if !summary.languages.is_empty() {
        out.push_str("\n## Languages\n\n");
        for (language, count) in &summary.languages {
            let _ = writeln!(out, "- {language}: {count}");
        }
    }

    out
}
