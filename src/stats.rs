//! Knowledge-base statistics report.
//!
//! Renders [`KbStats`] as the human-readable summary printed by `kb stats`
//! and `kb simulate`: per-source counts and sizes, quota usage, and training
//! state. The store only hands out raw byte counts; all formatting lives
//! here.

use chrono::{DateTime, Utc};
use helpdesk_kb_core::models::{KbStats, TrainingRun, TrainingStatus};

/// Render a stats summary for one agent.
pub fn render_stats(agent_id: &str, stats: &KbStats, last_run: Option<&TrainingRun>) -> String {
    let mut out = String::new();
    out.push_str(&format!("Knowledge Base: {}\n", agent_id));
    out.push_str("================================\n\n");

    out.push_str(&format!("  {:<12} {:>6} {:>10}\n", "SOURCE", "COUNT", "SIZE"));
    out.push_str(&format!("  {}\n", "-".repeat(30)));
    let rows = [
        ("snippets", stats.snippet_count, stats.snippet_size),
        ("files", stats.file_count, stats.file_size),
        ("websites", stats.website_count, stats.website_size),
        ("qa", stats.qa_count, stats.qa_size),
    ];
    for (label, count, size) in rows {
        out.push_str(&format!(
            "  {:<12} {:>6} {:>10}\n",
            label,
            count,
            format_bytes(size)
        ));
    }
    out.push('\n');

    out.push_str(&format!(
        "  Used:        {} / {} ({}%)\n",
        format_bytes(stats.total_size),
        format_bytes(stats.limit_size),
        stats.usage_percent()
    ));
    if stats.is_over_limit() {
        out.push_str("  Warning:     knowledge base is over its size limit\n");
    }
    out.push_str(&format!(
        "  Training:    {}\n",
        if stats.needs_training {
            "needs training"
        } else {
            "up to date"
        }
    ));
    let last = match last_run {
        Some(run) => describe_run(run),
        None => "never".to_string(),
    };
    out.push_str(&format!("  Last run:    {}\n", last));
    out
}

fn describe_run(run: &TrainingRun) -> String {
    match run.status {
        TrainingStatus::Pending => "pending".to_string(),
        TrainingStatus::Running => format!("running since {}", format_ts(run.started_at)),
        TrainingStatus::Success => format!(
            "succeeded at {}",
            format_ts(run.finished_at.unwrap_or(run.started_at))
        ),
        TrainingStatus::Failed => format!(
            "failed: {}",
            run.error.as_deref().unwrap_or("unknown error")
        ),
    }
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stats() -> KbStats {
        KbStats {
            snippet_count: 2,
            snippet_size: 300,
            file_count: 0,
            file_size: 0,
            website_count: 1,
            website_size: 15_000,
            qa_count: 1,
            qa_size: 85,
            total_size: 15_385,
            limit_size: 400 * 1024,
            needs_training: true,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(400 * 1024), "400.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.00 GB");
    }

    #[test]
    fn test_render_lists_every_source() {
        let out = render_stats("agent-1", &stats(), None);
        assert!(out.contains("Knowledge Base: agent-1"));
        assert!(out.contains("snippets"));
        assert!(out.contains("websites"));
        assert!(out.contains("14.6 KB"));
        assert!(out.contains("needs training"));
        assert!(out.contains("Last run:    never"));
        assert!(!out.contains("Warning"));
    }

    #[test]
    fn test_render_over_limit_and_finished_run() {
        let over = KbStats {
            limit_size: 1024,
            needs_training: false,
            ..stats()
        };
        let started = Utc.with_ymd_and_hms(2025, 11, 7, 9, 0, 0).unwrap();
        let run = TrainingRun {
            id: 1,
            agent_id: "agent-1".to_string(),
            status: TrainingStatus::Success,
            started_at: started,
            finished_at: Some(started + chrono::Duration::seconds(3)),
            error: None,
        };
        let out = render_stats("agent-1", &over, Some(&run));
        assert!(out.contains("Warning"));
        assert!(out.contains("up to date"));
        assert!(out.contains("succeeded at 2025-11-07 09:00:03"));
    }

    #[test]
    fn test_render_huge_sizes() {
        let huge = KbStats {
            file_count: 1,
            file_size: 1 << 60,
            total_size: (1 << 60) + 15_385,
            ..stats()
        };
        let out = render_stats("agent-1", &huge, None);
        assert!(out.contains("(100%)"));
        assert!(out.contains("Warning"));
    }
}
