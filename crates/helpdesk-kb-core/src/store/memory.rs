//! In-memory [`KnowledgeStore`] implementation.
//!
//! All four collections, the id counters, and the training flag live in one
//! `State` behind a `std::sync::RwLock`, so a mutation and its dirty-flag
//! update are observed together. Collections are kept newest first.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::clock::{Clock, SystemClock};
use crate::error::{KbError, KbResult};
use crate::models::{
    utf8_size, CrawlOutcome, FileInput, FileRecord, KbStats, QaEntry, QaInput, RecordId,
    SnippetInput, SourceKind, TextSnippet, WebsiteSource, WebsiteStatus,
};

use super::{KnowledgeStore, QuotaPolicy, DEFAULT_LIMIT_BYTES, MAX_FILE_BYTES};

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

#[derive(Default)]
struct State {
    snippets: Vec<TextSnippet>,
    files: Vec<FileRecord>,
    websites: Vec<WebsiteSource>,
    qas: Vec<QaEntry>,
    last_ids: [RecordId; 4],
    needs_training: bool,
    revision: u64,
}

impl State {
    fn next_id(&mut self, kind: SourceKind) -> RecordId {
        let slot = match kind {
            SourceKind::Text => 0,
            SourceKind::File => 1,
            SourceKind::Website => 2,
            SourceKind::Qa => 3,
        };
        self.last_ids[slot] += 1;
        self.last_ids[slot]
    }

    fn touch(&mut self) {
        self.needs_training = true;
        self.revision += 1;
    }

    /// Byte totals for snippets, files, websites and Q&A, in that order.
    fn collection_sizes(&self) -> [u64; 4] {
        [
            byte_total(self.snippets.iter().map(|s| s.size_bytes)),
            byte_total(self.files.iter().map(|f| f.size_bytes)),
            byte_total(self.websites.iter().map(|w| w.size_bytes)),
            byte_total(self.qas.iter().map(|q| q.size_bytes)),
        ]
    }

    fn total_size(&self) -> u64 {
        byte_total(self.collection_sizes())
    }
}

/// Sum of byte counts, saturating at `u64::MAX`.
fn byte_total(sizes: impl IntoIterator<Item = u64>) -> u64 {
    sizes.into_iter().fold(0, u64::saturating_add)
}

/// In-memory knowledge base for one agent.
pub struct InMemoryKnowledgeStore {
    agent_id: String,
    limit_bytes: u64,
    quota: QuotaPolicy,
    clock: Arc<dyn Clock>,
    state: RwLock<State>,
}

impl InMemoryKnowledgeStore {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            limit_bytes: DEFAULT_LIMIT_BYTES,
            quota: QuotaPolicy::default(),
            clock: Arc::new(SystemClock),
            state: RwLock::new(State::default()),
        }
    }

    pub fn with_limit(mut self, limit_bytes: u64) -> Self {
        self.limit_bytes = limit_bytes;
        self
    }

    pub fn with_quota_policy(mut self, quota: QuotaPolicy) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    pub fn quota_policy(&self) -> QuotaPolicy {
        self.quota
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Check that replacing `removed` bytes with `added` bytes stays within
    /// the limit. Shrinking is always allowed.
    fn check_quota(&self, state: &State, removed: u64, added: u64) -> KbResult<()> {
        if self.quota == QuotaPolicy::Track || added <= removed {
            return Ok(());
        }
        let base = state.total_size().saturating_sub(removed);
        match base.checked_add(added) {
            Some(total) if total <= self.limit_bytes => Ok(()),
            _ => Err(KbError::QuotaExceeded {
                requested: added,
                available: self.limit_bytes.saturating_sub(base),
                limit: self.limit_bytes,
            }),
        }
    }
}

fn require(field: &str, value: &str) -> KbResult<()> {
    if value.trim().is_empty() {
        return Err(KbError::invalid(format!("{} must not be empty", field)));
    }
    Ok(())
}

fn remove_by_id<T>(
    items: &mut Vec<T>,
    id: RecordId,
    kind: SourceKind,
    id_of: impl Fn(&T) -> RecordId,
) -> KbResult<T> {
    let pos = items
        .iter()
        .position(|item| id_of(item) == id)
        .ok_or(KbError::not_found(kind, id))?;
    Ok(items.remove(pos))
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    // ============ Snippets ============

    async fn list_snippets(&self) -> Vec<TextSnippet> {
        self.read().snippets.clone()
    }

    async fn get_snippet(&self, id: RecordId) -> KbResult<TextSnippet> {
        self.read()
            .snippets
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(KbError::not_found(SourceKind::Text, id))
    }

    async fn create_snippet(&self, input: SnippetInput) -> KbResult<TextSnippet> {
        require("title", &input.title)?;
        require("content", &input.content)?;
        let size_bytes = utf8_size(&[&input.content]);
        let now = self.clock.now();

        let mut state = self.write();
        self.check_quota(&state, 0, size_bytes)?;
        let snippet = TextSnippet {
            id: state.next_id(SourceKind::Text),
            agent_id: self.agent_id.clone(),
            title: input.title,
            content: input.content,
            size_bytes,
            created_at: now,
            updated_at: now,
        };
        state.snippets.insert(0, snippet.clone());
        state.touch();
        Ok(snippet)
    }

    async fn update_snippet(&self, id: RecordId, input: SnippetInput) -> KbResult<TextSnippet> {
        require("title", &input.title)?;
        require("content", &input.content)?;
        let size_bytes = utf8_size(&[&input.content]);
        let now = self.clock.now();

        let mut state = self.write();
        let old_size = state
            .snippets
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.size_bytes)
            .ok_or(KbError::not_found(SourceKind::Text, id))?;
        self.check_quota(&state, old_size, size_bytes)?;

        let snippet = state
            .snippets
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(KbError::not_found(SourceKind::Text, id))?;
        snippet.title = input.title;
        snippet.content = input.content;
        snippet.size_bytes = size_bytes;
        snippet.updated_at = now;
        let updated = snippet.clone();
        state.touch();
        Ok(updated)
    }

    async fn delete_snippet(&self, id: RecordId) -> KbResult<()> {
        let mut state = self.write();
        remove_by_id(&mut state.snippets, id, SourceKind::Text, |s| s.id)?;
        state.touch();
        Ok(())
    }

    // ============ Files ============

    async fn list_files(&self) -> Vec<FileRecord> {
        self.read().files.clone()
    }

    async fn get_file(&self, id: RecordId) -> KbResult<FileRecord> {
        self.read()
            .files
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .ok_or(KbError::not_found(SourceKind::File, id))
    }

    async fn create_file(&self, input: FileInput) -> KbResult<FileRecord> {
        require("filename", &input.filename)?;
        if input.filename.contains(['/', '\\']) {
            return Err(KbError::invalid("filename must not contain path separators"));
        }
        if input.size_bytes > MAX_FILE_BYTES {
            return Err(KbError::invalid(format!(
                "file size {} exceeds the maximum of {} bytes",
                input.size_bytes, MAX_FILE_BYTES
            )));
        }
        let mime_type = if input.mime_type.trim().is_empty() {
            DEFAULT_MIME_TYPE.to_string()
        } else {
            input.mime_type
        };
        let now = self.clock.now();

        let mut state = self.write();
        self.check_quota(&state, 0, input.size_bytes)?;
        let file = FileRecord {
            id: state.next_id(SourceKind::File),
            agent_id: self.agent_id.clone(),
            storage_path: format!("/kb/{}/{}", self.agent_id, input.filename),
            filename: input.filename,
            mime_type,
            size_bytes: input.size_bytes,
            created_at: now,
        };
        state.files.insert(0, file.clone());
        state.touch();
        Ok(file)
    }

    async fn delete_file(&self, id: RecordId) -> KbResult<()> {
        let mut state = self.write();
        remove_by_id(&mut state.files, id, SourceKind::File, |f| f.id)?;
        state.touch();
        Ok(())
    }

    // ============ Websites ============

    async fn list_websites(&self) -> Vec<WebsiteSource> {
        self.read().websites.clone()
    }

    async fn get_website(&self, id: RecordId) -> KbResult<WebsiteSource> {
        self.read()
            .websites
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or(KbError::not_found(SourceKind::Website, id))
    }

    async fn create_website(&self, url: &str) -> KbResult<WebsiteSource> {
        require("url", url)?;
        let now = self.clock.now();

        let mut state = self.write();
        let website = WebsiteSource {
            id: state.next_id(SourceKind::Website),
            agent_id: self.agent_id.clone(),
            url: url.trim().to_string(),
            status: WebsiteStatus::Pending,
            pages_count: 0,
            size_bytes: 0,
            last_crawled_at: None,
            last_error: None,
            created_at: now,
        };
        state.websites.insert(0, website.clone());
        state.touch();
        Ok(website)
    }

    async fn complete_crawl(
        &self,
        id: RecordId,
        outcome: CrawlOutcome,
        at: DateTime<Utc>,
    ) -> KbResult<WebsiteSource> {
        let mut state = self.write();
        let old_size = state
            .websites
            .iter()
            .find(|w| w.id == id)
            .map(|w| w.size_bytes)
            .ok_or(KbError::not_found(SourceKind::Website, id))?;
        let quota = self.check_quota(&state, old_size, outcome.size_bytes);

        let website = state
            .websites
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(KbError::not_found(SourceKind::Website, id))?;
        website.last_crawled_at = Some(at);
        match quota {
            Ok(()) => {
                website.status = WebsiteStatus::Ready;
                website.pages_count = outcome.pages_count;
                website.size_bytes = outcome.size_bytes;
                website.last_error = None;
            }
            Err(e) => {
                website.status = WebsiteStatus::Failed;
                website.last_error = Some(e.to_string());
            }
        }
        let updated = website.clone();
        state.touch();
        Ok(updated)
    }

    async fn fail_crawl(
        &self,
        id: RecordId,
        reason: &str,
        at: DateTime<Utc>,
    ) -> KbResult<WebsiteSource> {
        let mut state = self.write();
        let website = state
            .websites
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or(KbError::not_found(SourceKind::Website, id))?;
        website.status = WebsiteStatus::Failed;
        website.last_crawled_at = Some(at);
        website.last_error = Some(reason.to_string());
        let updated = website.clone();
        state.touch();
        Ok(updated)
    }

    async fn delete_website(&self, id: RecordId) -> KbResult<()> {
        let mut state = self.write();
        remove_by_id(&mut state.websites, id, SourceKind::Website, |w| w.id)?;
        state.touch();
        Ok(())
    }

    // ============ Q&A ============

    async fn list_qas(&self) -> Vec<QaEntry> {
        self.read().qas.clone()
    }

    async fn get_qa(&self, id: RecordId) -> KbResult<QaEntry> {
        self.read()
            .qas
            .iter()
            .find(|q| q.id == id)
            .cloned()
            .ok_or(KbError::not_found(SourceKind::Qa, id))
    }

    async fn create_qa(&self, input: QaInput) -> KbResult<QaEntry> {
        require("question", &input.question)?;
        require("answer", &input.answer)?;
        let size_bytes = utf8_size(&[&input.question, &input.answer]);
        let now = self.clock.now();

        let mut state = self.write();
        self.check_quota(&state, 0, size_bytes)?;
        let qa = QaEntry {
            id: state.next_id(SourceKind::Qa),
            agent_id: self.agent_id.clone(),
            question: input.question,
            answer: input.answer,
            size_bytes,
            created_at: now,
            updated_at: now,
        };
        state.qas.insert(0, qa.clone());
        state.touch();
        Ok(qa)
    }

    async fn update_qa(&self, id: RecordId, input: QaInput) -> KbResult<QaEntry> {
        require("question", &input.question)?;
        require("answer", &input.answer)?;
        let size_bytes = utf8_size(&[&input.question, &input.answer]);
        let now = self.clock.now();

        let mut state = self.write();
        let old_size = state
            .qas
            .iter()
            .find(|q| q.id == id)
            .map(|q| q.size_bytes)
            .ok_or(KbError::not_found(SourceKind::Qa, id))?;
        self.check_quota(&state, old_size, size_bytes)?;

        let qa = state
            .qas
            .iter_mut()
            .find(|q| q.id == id)
            .ok_or(KbError::not_found(SourceKind::Qa, id))?;
        qa.question = input.question;
        qa.answer = input.answer;
        qa.size_bytes = size_bytes;
        qa.updated_at = now;
        let updated = qa.clone();
        state.touch();
        Ok(updated)
    }

    async fn delete_qa(&self, id: RecordId) -> KbResult<()> {
        let mut state = self.write();
        remove_by_id(&mut state.qas, id, SourceKind::Qa, |q| q.id)?;
        state.touch();
        Ok(())
    }

    // ============ Stats & training ============

    async fn stats(&self) -> KbStats {
        let state = self.read();
        let [snippet_size, file_size, website_size, qa_size] = state.collection_sizes();

        KbStats {
            snippet_count: state.snippets.len(),
            snippet_size,
            file_count: state.files.len(),
            file_size,
            website_count: state.websites.len(),
            website_size,
            qa_count: state.qas.len(),
            qa_size,
            total_size: byte_total([snippet_size, file_size, website_size, qa_size]),
            limit_size: self.limit_bytes,
            needs_training: state.needs_training,
        }
    }

    async fn revision(&self) -> u64 {
        self.read().revision
    }

    async fn mark_trained(&self, revision: u64) -> bool {
        let mut state = self.write();
        if state.revision != revision {
            return false;
        }
        state.needs_training = false;
        true
    }
}
