//! Knowledge-source records and derived statistics.
//!
//! Every record belongs to one agent. Sizes are UTF-8 byte counts of the
//! textual payload (files carry the uploaded byte size).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-collection record id. Assigned from a counter, so ids grow with
/// creation order.
pub type RecordId = u64;

/// The four kinds of knowledge source an agent can be trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    Text,
    File,
    Website,
    Qa,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Text,
        SourceKind::File,
        SourceKind::Website,
        SourceKind::Qa,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Text => "snippet",
            SourceKind::File => "file",
            SourceKind::Website => "website",
            SourceKind::Qa => "qa",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form text the agent can cite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSnippet {
    pub id: RecordId,
    pub agent_id: String,
    pub title: String,
    pub content: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An uploaded document. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: RecordId,
    pub agent_id: String,
    pub filename: String,
    /// Synthetic location; nothing is written to disk.
    pub storage_path: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebsiteStatus {
    Pending,
    Crawling,
    Ready,
    Failed,
}

impl WebsiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebsiteStatus::Pending => "pending",
            WebsiteStatus::Crawling => "crawling",
            WebsiteStatus::Ready => "ready",
            WebsiteStatus::Failed => "failed",
        }
    }

    /// Whether a crawl can still change this record.
    pub fn is_settled(&self) -> bool {
        matches!(self, WebsiteStatus::Ready | WebsiteStatus::Failed)
    }
}

/// A crawled site. Only the crawl fields change after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebsiteSource {
    pub id: RecordId,
    pub agent_id: String,
    pub url: String,
    pub status: WebsiteStatus,
    pub pages_count: u32,
    pub size_bytes: u64,
    pub last_crawled_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaEntry {
    pub id: RecordId,
    pub agent_id: String,
    pub question: String,
    pub answer: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields for creating or replacing a text snippet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetInput {
    pub title: String,
    pub content: String,
}

/// Fields for registering an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInput {
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Fields for creating or replacing a Q&A pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QaInput {
    pub question: String,
    pub answer: String,
}

/// Result of a successful crawl.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlOutcome {
    pub pages_count: u32,
    pub size_bytes: u64,
}

/// Aggregate counts and sizes, recomputed on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbStats {
    pub snippet_count: usize,
    pub snippet_size: u64,
    pub file_count: usize,
    pub file_size: u64,
    pub website_count: usize,
    pub website_size: u64,
    pub qa_count: usize,
    pub qa_size: u64,
    pub total_size: u64,
    pub limit_size: u64,
    pub needs_training: bool,
}

impl KbStats {
    pub fn remaining(&self) -> u64 {
        self.limit_size.saturating_sub(self.total_size)
    }

    pub fn is_over_limit(&self) -> bool {
        self.total_size > self.limit_size
    }

    /// Percentage of the quota in use, clamped to 100.
    pub fn usage_percent(&self) -> u64 {
        if self.limit_size == 0 {
            return 100;
        }
        let percent = u128::from(self.total_size) * 100 / u128::from(self.limit_size);
        percent.min(100) as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl TrainingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingStatus::Pending => "pending",
            TrainingStatus::Running => "running",
            TrainingStatus::Success => "success",
            TrainingStatus::Failed => "failed",
        }
    }
}

/// One training run of an agent's knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingRun {
    pub id: RecordId,
    pub agent_id: String,
    pub status: TrainingStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

/// UTF-8 byte length of one or more text fields.
pub fn utf8_size(parts: &[&str]) -> u64 {
    parts.iter().map(|p| p.len() as u64).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf8_size_counts_bytes_not_chars() {
        assert_eq!(utf8_size(&["ABC"]), 3);
        // 'Ö' and 'ü' are two bytes each
        assert_eq!(utf8_size(&["Öffnungszeiten"]), 15);
        assert_eq!(utf8_size(&["Wie?", "Grüß"]), 4 + 6);
        assert_eq!(utf8_size(&[]), 0);
    }

    #[test]
    fn test_source_kind_serialization() {
        let json = serde_json::to_string(&SourceKind::Qa).unwrap();
        assert_eq!(json, "\"QA\"");
        let kind: SourceKind = serde_json::from_str("\"WEBSITE\"").unwrap();
        assert_eq!(kind, SourceKind::Website);
        assert_eq!(SourceKind::Text.to_string(), "snippet");
    }

    #[test]
    fn test_website_status_serialization() {
        let json = serde_json::to_string(&WebsiteStatus::Pending).unwrap();
        assert_eq!(json, "\"pending\"");
        assert!(WebsiteStatus::Ready.is_settled());
        assert!(WebsiteStatus::Failed.is_settled());
        assert!(!WebsiteStatus::Pending.is_settled());
    }

    #[test]
    fn test_stats_quota_helpers() {
        let stats = KbStats {
            snippet_count: 1,
            snippet_size: 300,
            file_count: 0,
            file_size: 0,
            website_count: 0,
            website_size: 0,
            qa_count: 0,
            qa_size: 0,
            total_size: 300,
            limit_size: 1000,
            needs_training: true,
        };
        assert_eq!(stats.remaining(), 700);
        assert_eq!(stats.usage_percent(), 30);
        assert!(!stats.is_over_limit());

        let full = KbStats {
            total_size: 1500,
            ..stats.clone()
        };
        assert_eq!(full.remaining(), 0);
        assert_eq!(full.usage_percent(), 100);
        assert!(full.is_over_limit());

        let huge = KbStats {
            file_size: 1 << 60,
            total_size: 1 << 60,
            ..stats.clone()
        };
        assert_eq!(huge.usage_percent(), 100);

        let huge_limit = KbStats {
            total_size: u64::MAX / 2,
            limit_size: u64::MAX,
            ..stats
        };
        assert_eq!(huge_limit.usage_percent(), 49);
    }
}
