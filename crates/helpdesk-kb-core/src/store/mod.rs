//! Storage abstraction for agent knowledge bases.
//!
//! The [`KnowledgeStore`] trait covers the four knowledge-source collections,
//! the derived statistics, and the dirty-flag bookkeeping that training
//! relies on. One store instance holds exactly one agent's records.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::KbResult;
use crate::models::{
    CrawlOutcome, FileInput, FileRecord, KbStats, QaEntry, QaInput, RecordId, SnippetInput,
    TextSnippet, WebsiteSource,
};

/// Default size limit for one agent's knowledge base (400 KiB).
pub const DEFAULT_LIMIT_BYTES: u64 = 400 * 1024;

/// Largest size a single uploaded file may declare (1 TiB).
pub const MAX_FILE_BYTES: u64 = 1 << 40;

/// What happens when content would push `total_size` past the limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaPolicy {
    /// Report the limit in stats but never reject content.
    #[default]
    Track,
    /// Reject creates and updates that would exceed the limit.
    Enforce,
}

/// Abstract knowledge-base backend for a single agent.
///
/// All operations are async (via `async-trait`) so remote backends can be
/// plugged in later. The in-memory implementation returns immediately-ready
/// futures.
///
/// # Operations
///
/// | Collection | list | get | create | update | delete |
/// |------------|------|-----|--------|--------|--------|
/// | snippets   | ✓ | ✓ | ✓ | ✓ | ✓ |
/// | files      | ✓ | ✓ | ✓ |   | ✓ |
/// | websites   | ✓ | ✓ | ✓ | crawl only | ✓ |
/// | Q&A        | ✓ | ✓ | ✓ | ✓ | ✓ |
///
/// Every successful mutation, including crawl completion, sets
/// `needs_training` and bumps [`revision`](KnowledgeStore::revision).
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Agent that owns every record in this store.
    fn agent_id(&self) -> &str;

    async fn list_snippets(&self) -> Vec<TextSnippet>;
    async fn get_snippet(&self, id: RecordId) -> KbResult<TextSnippet>;
    async fn create_snippet(&self, input: SnippetInput) -> KbResult<TextSnippet>;
    async fn update_snippet(&self, id: RecordId, input: SnippetInput) -> KbResult<TextSnippet>;
    async fn delete_snippet(&self, id: RecordId) -> KbResult<()>;

    async fn list_files(&self) -> Vec<FileRecord>;
    async fn get_file(&self, id: RecordId) -> KbResult<FileRecord>;
    async fn create_file(&self, input: FileInput) -> KbResult<FileRecord>;
    async fn delete_file(&self, id: RecordId) -> KbResult<()>;

    async fn list_websites(&self) -> Vec<WebsiteSource>;
    async fn get_website(&self, id: RecordId) -> KbResult<WebsiteSource>;

    /// Insert a website in `pending` state with no pages and no bytes.
    async fn create_website(&self, url: &str) -> KbResult<WebsiteSource>;

    /// Mark a crawl as finished. Returns `NotFound` if the website was
    /// deleted in the meantime; the record is not recreated.
    async fn complete_crawl(
        &self,
        id: RecordId,
        outcome: CrawlOutcome,
        at: DateTime<Utc>,
    ) -> KbResult<WebsiteSource>;

    /// Mark a crawl as failed. Same deletion semantics as `complete_crawl`.
    async fn fail_crawl(
        &self,
        id: RecordId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> KbResult<WebsiteSource>;

    async fn delete_website(&self, id: RecordId) -> KbResult<()>;

    async fn list_qas(&self) -> Vec<QaEntry>;
    async fn get_qa(&self, id: RecordId) -> KbResult<QaEntry>;
    async fn create_qa(&self, input: QaInput) -> KbResult<QaEntry>;
    async fn update_qa(&self, id: RecordId, input: QaInput) -> KbResult<QaEntry>;
    async fn delete_qa(&self, id: RecordId) -> KbResult<()>;

    /// Counts, byte totals, quota, and the training flag.
    async fn stats(&self) -> KbStats;

    /// Content revision; increases with every successful mutation.
    async fn revision(&self) -> u64;

    /// Clear `needs_training` if no mutation happened since `revision` was
    /// read. Returns whether the flag was cleared.
    async fn mark_trained(&self, revision: u64) -> bool;
}
