//! Training backends.
//!
//! Training re-indexes every knowledge source of an agent into whatever
//! retrieval system answers customer questions. The run itself is opaque to
//! the knowledge base: it only needs to know when it finished and whether it
//! succeeded.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use helpdesk_kb_core::models::KbStats;

#[async_trait]
pub trait Trainer: Send + Sync {
    /// Train `agent_id` on its current knowledge. `snapshot` is the stats
    /// at the moment the run started.
    async fn train(&self, agent_id: &str, snapshot: &KbStats) -> Result<()>;
}

/// Trainer that only waits.
#[derive(Debug, Clone)]
pub struct SimulatedTrainer {
    delay: Duration,
}

impl SimulatedTrainer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Trainer for SimulatedTrainer {
    async fn train(&self, agent_id: &str, snapshot: &KbStats) -> Result<()> {
        tracing::debug!(
            agent = agent_id,
            total_size = snapshot.total_size,
            "simulated training started"
        );
        tokio::time::sleep(self.delay).await;
        Ok(())
    }
}
