//! Agent knowledge base service.
//!
//! [`KnowledgeBase`] wraps a [`KnowledgeStore`] with the two asynchronous
//! workflows the store cannot run on its own:
//!
//! - **Website crawls**: [`add_website`](KnowledgeBase::add_website) inserts a
//!   `pending` record and returns immediately; a background task runs the
//!   [`Crawler`] and settles the record as `ready` or `failed`.
//! - **Training**: [`start_training`](KnowledgeBase::start_training) runs the
//!   [`Trainer`] on a background task and clears `needs_training` when it
//!   finishes, unless the knowledge changed while it ran.
//!
//! ```text
//! add_website ──▶ store: pending ──(crawl delay)──▶ store: ready | failed
//!                                                   (no-op if deleted)
//!
//! start_training ──▶ run: running ──(train delay)──▶ mark_trained(revision)
//!        │                                           run: success | failed
//!        └─ second call while running ──▶ AlreadyInProgress
//! ```
//!
//! Both tasks sleep on the tokio timer, so tests drive them with
//! `#[tokio::test(start_paused = true)]`.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use helpdesk_kb_core::clock::{Clock, SystemClock};
use helpdesk_kb_core::models::{
    FileInput, FileRecord, KbStats, QaEntry, QaInput, RecordId, SnippetInput, TextSnippet,
    TrainingRun, TrainingStatus, WebsiteSource,
};
use helpdesk_kb_core::store::memory::InMemoryKnowledgeStore;
use helpdesk_kb_core::store::KnowledgeStore;
use helpdesk_kb_core::{KbError, KbResult};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::Config;
use crate::crawler::{parse_website_url, Crawler, SimulatedCrawler};
use crate::trainer::{SimulatedTrainer, Trainer};

#[derive(Default)]
struct TrainingState {
    in_flight: bool,
    last_run_id: RecordId,
    last: Option<TrainingRun>,
}

type SharedTraining = Arc<Mutex<TrainingState>>;

fn lock_training(state: &SharedTraining) -> MutexGuard<'_, TrainingState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// One agent's knowledge base with its crawl and training workflows.
pub struct KnowledgeBase {
    store: Arc<dyn KnowledgeStore>,
    crawler: Arc<dyn Crawler>,
    trainer: Arc<dyn Trainer>,
    clock: Arc<dyn Clock>,
    training: SharedTraining,
}

impl KnowledgeBase {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        crawler: Arc<dyn Crawler>,
        trainer: Arc<dyn Trainer>,
    ) -> Self {
        Self {
            store,
            crawler,
            trainer,
            clock: Arc::new(SystemClock),
            training: Arc::new(Mutex::new(TrainingState::default())),
        }
    }

    /// Clock used for crawl and training timestamps. Should be the same
    /// clock the store uses.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build an in-memory knowledge base with simulated crawler and trainer
    /// configured from `config`.
    pub fn from_config(agent_id: &str, config: &Config) -> Self {
        let store = InMemoryKnowledgeStore::new(agent_id)
            .with_limit(config.knowledge.limit_bytes)
            .with_quota_policy(config.knowledge.quota);
        Self::new(
            Arc::new(store),
            Arc::new(SimulatedCrawler::from_config(&config.crawl)),
            Arc::new(SimulatedTrainer::new(config.training.delay())),
        )
    }

    pub fn agent_id(&self) -> &str {
        self.store.agent_id()
    }

    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub async fn stats(&self) -> KbStats {
        self.store.stats().await
    }

    // ============ Snippets ============

    pub async fn list_snippets(&self) -> Vec<TextSnippet> {
        self.store.list_snippets().await
    }

    pub async fn get_snippet(&self, id: RecordId) -> KbResult<TextSnippet> {
        self.store.get_snippet(id).await
    }

    pub async fn create_snippet(&self, input: SnippetInput) -> KbResult<TextSnippet> {
        let snippet = self.store.create_snippet(input).await?;
        tracing::info!(
            agent = self.agent_id(),
            id = snippet.id,
            size_bytes = snippet.size_bytes,
            "snippet created"
        );
        Ok(snippet)
    }

    pub async fn update_snippet(&self, id: RecordId, input: SnippetInput) -> KbResult<TextSnippet> {
        let snippet = self.store.update_snippet(id, input).await?;
        tracing::info!(agent = self.agent_id(), id, "snippet updated");
        Ok(snippet)
    }

    pub async fn delete_snippet(&self, id: RecordId) -> KbResult<()> {
        self.store.delete_snippet(id).await?;
        tracing::info!(agent = self.agent_id(), id, "snippet deleted");
        Ok(())
    }

    // ============ Files ============

    pub async fn list_files(&self) -> Vec<FileRecord> {
        self.store.list_files().await
    }

    pub async fn get_file(&self, id: RecordId) -> KbResult<FileRecord> {
        self.store.get_file(id).await
    }

    pub async fn upload_file(&self, input: FileInput) -> KbResult<FileRecord> {
        let file = self.store.create_file(input).await?;
        tracing::info!(
            agent = self.agent_id(),
            id = file.id,
            filename = %file.filename,
            size_bytes = file.size_bytes,
            "file uploaded"
        );
        Ok(file)
    }

    pub async fn delete_file(&self, id: RecordId) -> KbResult<()> {
        self.store.delete_file(id).await?;
        tracing::info!(agent = self.agent_id(), id, "file deleted");
        Ok(())
    }

    // ============ Websites ============

    pub async fn list_websites(&self) -> Vec<WebsiteSource> {
        self.store.list_websites().await
    }

    pub async fn get_website(&self, id: RecordId) -> KbResult<WebsiteSource> {
        self.store.get_website(id).await
    }

    /// Insert a `pending` website and start crawling it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn add_website(&self, url: &str) -> KbResult<PendingCrawl> {
        let parsed = parse_website_url(url)?;
        let website = self.store.create_website(url.trim()).await?;
        tracing::info!(
            agent = self.agent_id(),
            id = website.id,
            url = %website.url,
            "website added, crawl scheduled"
        );

        let handle = tokio::spawn(run_crawl(
            self.store.clone(),
            self.crawler.clone(),
            self.clock.clone(),
            website.id,
            parsed,
        ));
        Ok(PendingCrawl { website, handle })
    }

    pub async fn delete_website(&self, id: RecordId) -> KbResult<()> {
        self.store.delete_website(id).await?;
        tracing::info!(agent = self.agent_id(), id, "website deleted");
        Ok(())
    }

    // ============ Q&A ============

    pub async fn list_qas(&self) -> Vec<QaEntry> {
        self.store.list_qas().await
    }

    pub async fn get_qa(&self, id: RecordId) -> KbResult<QaEntry> {
        self.store.get_qa(id).await
    }

    pub async fn create_qa(&self, input: QaInput) -> KbResult<QaEntry> {
        let qa = self.store.create_qa(input).await?;
        tracing::info!(
            agent = self.agent_id(),
            id = qa.id,
            size_bytes = qa.size_bytes,
            "qa created"
        );
        Ok(qa)
    }

    pub async fn update_qa(&self, id: RecordId, input: QaInput) -> KbResult<QaEntry> {
        let qa = self.store.update_qa(id, input).await?;
        tracing::info!(agent = self.agent_id(), id, "qa updated");
        Ok(qa)
    }

    pub async fn delete_qa(&self, id: RecordId) -> KbResult<()> {
        self.store.delete_qa(id).await?;
        tracing::info!(agent = self.agent_id(), id, "qa deleted");
        Ok(())
    }

    // ============ Training ============

    /// Start a training run in the background.
    ///
    /// Returns [`KbError::AlreadyInProgress`] if a run is still in flight.
    /// The run clears `needs_training` only if no content changed between
    /// this call and its completion.
    pub async fn start_training(&self) -> KbResult<TrainingHandle> {
        // Read the revision before the snapshot: a change landing in between
        // keeps the flag set rather than being lost.
        let revision = self.store.revision().await;
        let snapshot = self.store.stats().await;

        let run = {
            let mut training = lock_training(&self.training);
            if training.in_flight {
                return Err(KbError::AlreadyInProgress {
                    agent_id: self.agent_id().to_string(),
                });
            }
            training.in_flight = true;
            training.last_run_id += 1;
            let run = TrainingRun {
                id: training.last_run_id,
                agent_id: self.agent_id().to_string(),
                status: TrainingStatus::Running,
                started_at: self.clock.now(),
                finished_at: None,
                error: None,
            };
            training.last = Some(run.clone());
            run
        };
        tracing::info!(agent = self.agent_id(), run = run.id, revision, "training started");

        let handle = tokio::spawn(run_training(
            self.store.clone(),
            self.trainer.clone(),
            self.clock.clone(),
            self.training.clone(),
            run.clone(),
            revision,
            snapshot,
        ));
        Ok(TrainingHandle { run, handle })
    }

    /// Start a training run and wait for it to finish.
    pub async fn train(&self) -> anyhow::Result<TrainingRun> {
        let handle = self.start_training().await?;
        handle.wait().await
    }

    pub fn is_training(&self) -> bool {
        lock_training(&self.training).in_flight
    }

    /// The most recent training run, finished or not.
    pub fn last_training(&self) -> Option<TrainingRun> {
        lock_training(&self.training).last.clone()
    }
}

/// A website whose crawl is running in the background.
///
/// Dropping it detaches the crawl; it still completes.
#[derive(Debug)]
pub struct PendingCrawl {
    pub website: WebsiteSource,
    handle: JoinHandle<Option<WebsiteSource>>,
}

impl PendingCrawl {
    /// Wait for the crawl to settle. Resolves to `None` if the website was
    /// deleted before the crawl finished.
    pub async fn finished(self) -> anyhow::Result<Option<WebsiteSource>> {
        self.handle.await.context("crawl task failed")
    }
}

/// A training run executing in the background.
#[derive(Debug)]
pub struct TrainingHandle {
    run: TrainingRun,
    handle: JoinHandle<TrainingRun>,
}

impl TrainingHandle {
    /// The run as it was when it started.
    pub fn run(&self) -> &TrainingRun {
        &self.run
    }

    pub async fn wait(self) -> anyhow::Result<TrainingRun> {
        self.handle.await.context("training task failed")
    }
}

async fn run_crawl(
    store: Arc<dyn KnowledgeStore>,
    crawler: Arc<dyn Crawler>,
    clock: Arc<dyn Clock>,
    id: RecordId,
    url: Url,
) -> Option<WebsiteSource> {
    let agent = store.agent_id().to_string();
    let settled = match crawler.crawl(&url).await {
        Ok(outcome) => store.complete_crawl(id, outcome, clock.now()).await,
        Err(e) => {
            tracing::warn!(agent = %agent, id, url = %url, error = %e, "crawl failed");
            store.fail_crawl(id, &e.to_string(), clock.now()).await
        }
    };

    match settled {
        Ok(website) => {
            tracing::info!(
                agent = %agent,
                id,
                status = ?website.status,
                pages = website.pages_count,
                size_bytes = website.size_bytes,
                "crawl settled"
            );
            Some(website)
        }
        Err(e) if e.is_not_found() => {
            tracing::debug!(agent = %agent, id, "website deleted before crawl finished");
            None
        }
        Err(e) => {
            tracing::warn!(agent = %agent, id, error = %e, "could not record crawl result");
            None
        }
    }
}

/// Resets the in-flight flag even if the trainer panics.
struct InFlight(SharedTraining);

impl Drop for InFlight {
    fn drop(&mut self) {
        lock_training(&self.0).in_flight = false;
    }
}

async fn run_training(
    store: Arc<dyn KnowledgeStore>,
    trainer: Arc<dyn Trainer>,
    clock: Arc<dyn Clock>,
    training: SharedTraining,
    run: TrainingRun,
    revision: u64,
    snapshot: KbStats,
) -> TrainingRun {
    let _in_flight = InFlight(training.clone());
    let result = trainer.train(&run.agent_id, &snapshot).await;

    let mut finished = run;
    finished.finished_at = Some(clock.now());
    match result {
        Ok(()) => {
            finished.status = TrainingStatus::Success;
            if store.mark_trained(revision).await {
                tracing::info!(agent = %finished.agent_id, run = finished.id, "training finished");
            } else {
                tracing::info!(
                    agent = %finished.agent_id,
                    run = finished.id,
                    "training finished; knowledge changed during the run and still needs training"
                );
            }
        }
        Err(e) => {
            finished.status = TrainingStatus::Failed;
            finished.error = Some(e.to_string());
            tracing::warn!(agent = %finished.agent_id, run = finished.id, error = %e, "training failed");
        }
    }

    lock_training(&training).last = Some(finished.clone());
    finished
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use helpdesk_kb_core::models::{CrawlOutcome, WebsiteStatus};
    use std::time::Duration;

    const CRAWL_DELAY: Duration = Duration::from_secs(2);
    const TRAIN_DELAY: Duration = Duration::from_secs(3);

    fn crawler() -> SimulatedCrawler {
        SimulatedCrawler::new(
            CRAWL_DELAY,
            CrawlOutcome {
                pages_count: 5,
                size_bytes: 15_000,
            },
        )
    }

    fn test_kb() -> KnowledgeBase {
        KnowledgeBase::new(
            Arc::new(InMemoryKnowledgeStore::new("agent-1")),
            Arc::new(crawler()),
            Arc::new(SimulatedTrainer::new(TRAIN_DELAY)),
        )
    }

    fn snippet(title: &str, content: &str) -> SnippetInput {
        SnippetInput {
            title: title.to_string(),
            content: content.to_string(),
        }
    }

    fn qa(question: &str, answer: &str) -> QaInput {
        QaInput {
            question: question.to_string(),
            answer: answer.to_string(),
        }
    }

    struct FailingTrainer;

    #[async_trait]
    impl Trainer for FailingTrainer {
        async fn train(&self, _agent_id: &str, _snapshot: &KbStats) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            anyhow::bail!("index unavailable")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_website_is_pending_then_ready() {
        let kb = test_kb();
        let pending = kb.add_website("https://example.com").await.unwrap();
        assert_eq!(pending.website.status, WebsiteStatus::Pending);
        assert_eq!(pending.website.url, "https://example.com");

        let listed = kb.list_websites().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, WebsiteStatus::Pending);
        assert_eq!(listed[0].pages_count, 0);

        tokio::time::sleep(CRAWL_DELAY + Duration::from_millis(1)).await;

        let listed = kb.list_websites().await;
        assert_eq!(listed[0].status, WebsiteStatus::Ready);
        assert!(listed[0].pages_count > 0);
        assert!(listed[0].last_crawled_at.is_some());
        assert_eq!(kb.stats().await.website_size, 15_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_crawl_resolves_to_final_record() {
        let kb = test_kb();
        let pending = kb.add_website("https://example.com/faq").await.unwrap();
        let id = pending.website.id;

        let done = pending.finished().await.unwrap().unwrap();
        assert_eq!(done.id, id);
        assert_eq!(done.status, WebsiteStatus::Ready);
        assert_eq!(done.pages_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawl_completion_sets_needs_training() {
        let kb = test_kb();
        let pending = kb.add_website("https://example.com").await.unwrap();

        // Clear the flag set by the insert; the crawl result must set it again.
        let revision = kb.store().revision().await;
        assert!(kb.store().mark_trained(revision).await);
        assert!(!kb.stats().await.needs_training);

        pending.finished().await.unwrap();
        assert!(kb.stats().await.needs_training);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deleted_website_is_not_resurrected() {
        let kb = test_kb();
        let pending = kb.add_website("https://example.com").await.unwrap();
        kb.delete_website(pending.website.id).await.unwrap();

        let result = pending.finished().await.unwrap();
        assert!(result.is_none());
        assert!(kb.list_websites().await.is_empty());
        assert_eq!(kb.stats().await.website_size, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_injected_crawl_failure() {
        let kb = KnowledgeBase::new(
            Arc::new(InMemoryKnowledgeStore::new("agent-1")),
            Arc::new(crawler().with_fail_hosts(vec!["down.example".to_string()])),
            Arc::new(SimulatedTrainer::new(TRAIN_DELAY)),
        );
        let pending = kb.add_website("https://down.example/help").await.unwrap();
        let done = pending.finished().await.unwrap().unwrap();

        assert_eq!(done.status, WebsiteStatus::Failed);
        assert!(done.last_error.unwrap().contains("host unreachable"));
        assert_eq!(done.pages_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_website_rejects_bad_url() {
        let kb = test_kb();
        let err = kb.add_website("not a url").await.unwrap_err();
        assert!(matches!(err, KbError::InvalidInput(_)));
        assert!(kb.list_websites().await.is_empty());
        assert!(!kb.stats().await.needs_training);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_crawls_complete_independently() {
        let kb = test_kb();
        let a = kb.add_website("https://a.example").await.unwrap();
        let b = kb.add_website("https://b.example").await.unwrap();
        kb.delete_website(a.website.id).await.unwrap();

        assert!(a.finished().await.unwrap().is_none());
        let b = b.finished().await.unwrap().unwrap();
        assert_eq!(b.status, WebsiteStatus::Ready);
        assert_eq!(kb.list_websites().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_train_clears_needs_training() {
        let kb = test_kb();
        kb.create_snippet(snippet("T", "ABC")).await.unwrap();
        assert!(kb.stats().await.needs_training);

        let started = tokio::time::Instant::now();
        let run = kb.train().await.unwrap();
        assert!(started.elapsed() >= TRAIN_DELAY);

        assert_eq!(run.status, TrainingStatus::Success);
        assert!(run.finished_at.is_some());
        assert!(!kb.stats().await.needs_training);
        assert!(!kb.is_training());
        assert_eq!(kb.last_training(), Some(run));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mutation_during_training_keeps_needs_training() {
        let kb = test_kb();
        kb.create_snippet(snippet("T", "ABC")).await.unwrap();

        let handle = kb.start_training().await.unwrap();
        assert_eq!(handle.run().status, TrainingStatus::Running);
        assert!(kb.is_training());

        kb.create_qa(qa("Opening hours?", "Mon-Fri 9-17")).await.unwrap();

        let run = handle.wait().await.unwrap();
        assert_eq!(run.status, TrainingStatus::Success);
        assert!(kb.stats().await.needs_training);
    }

    #[tokio::test(start_paused = true)]
    async fn test_crawl_finishing_during_training_keeps_needs_training() {
        let kb = test_kb();
        let pending = kb.add_website("https://example.com").await.unwrap();
        let handle = kb.start_training().await.unwrap();

        // The crawl (2s) settles while training (3s) is still running.
        let run = handle.wait().await.unwrap();
        assert_eq!(run.status, TrainingStatus::Success);
        let website = pending.finished().await.unwrap().unwrap();
        assert_eq!(website.status, WebsiteStatus::Ready);
        assert!(kb.stats().await.needs_training);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_training_is_rejected_while_in_flight() {
        let kb = test_kb();
        kb.create_snippet(snippet("T", "ABC")).await.unwrap();

        let first = kb.start_training().await.unwrap();
        let err = kb.start_training().await.unwrap_err();
        assert_eq!(
            err,
            KbError::AlreadyInProgress {
                agent_id: "agent-1".to_string()
            }
        );
        assert!(kb.train().await.is_err());

        let run = first.wait().await.unwrap();
        assert_eq!(run.id, 1);
        assert!(!kb.stats().await.needs_training);

        // Once finished, a new run can start.
        let again = kb.train().await.unwrap();
        assert_eq!(again.id, 2);
        assert_eq!(again.status, TrainingStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_training_keeps_flag_and_releases_lock() {
        let kb = KnowledgeBase::new(
            Arc::new(InMemoryKnowledgeStore::new("agent-1")),
            Arc::new(crawler()),
            Arc::new(FailingTrainer),
        );
        kb.create_snippet(snippet("T", "ABC")).await.unwrap();

        let run = kb.train().await.unwrap();
        assert_eq!(run.status, TrainingStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("index unavailable"));
        assert!(kb.stats().await.needs_training);
        assert!(!kb.is_training());
        assert_eq!(kb.last_training().unwrap().status, TrainingStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_missing_snippet_is_not_found() {
        let kb = test_kb();
        kb.create_snippet(snippet("T", "ABC")).await.unwrap();
        let err = kb.delete_snippet(12345).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(kb.list_snippets().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_config_applies_limits() {
        let mut config = Config::minimal();
        config.knowledge.limit_bytes = 4;
        config.knowledge.quota = helpdesk_kb_core::store::QuotaPolicy::Enforce;
        let kb = KnowledgeBase::from_config("acme", &config);

        assert_eq!(kb.agent_id(), "acme");
        assert_eq!(kb.stats().await.limit_size, 4);
        let err = kb.create_snippet(snippet("T", "too long")).await.unwrap_err();
        assert!(matches!(err, KbError::QuotaExceeded { .. }));
    }
}
