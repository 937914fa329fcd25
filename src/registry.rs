//! Per-agent knowledge bases.
//!
//! Each agent owns an independent [`KnowledgeBase`]. The registry creates
//! them lazily from the shared [`Config`] the first time an agent is
//! addressed, and optionally seeds them with the demo records.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use anyhow::Result;
use helpdesk_kb_core::KbError;

use crate::config::Config;
use crate::demo;
use crate::knowledge_base::KnowledgeBase;

pub struct KnowledgeBaseRegistry {
    config: Arc<Config>,
    bases: RwLock<HashMap<String, Arc<KnowledgeBase>>>,
}

impl KnowledgeBaseRegistry {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            bases: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Agent ids are path segments in the HTTP API and storage paths, so
    /// they are limited to ASCII letters, digits, `-` and `_`.
    pub fn validate_agent_id(agent_id: &str) -> Result<(), KbError> {
        let valid = !agent_id.is_empty()
            && agent_id.len() <= 64
            && agent_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(KbError::invalid(format!("invalid agent id '{}'", agent_id)))
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<KnowledgeBase>> {
        self.bases
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(agent_id)
            .cloned()
    }

    /// Return the agent's knowledge base, creating (and seeding, if
    /// configured) it on first use.
    pub async fn get_or_create(&self, agent_id: &str) -> Result<Arc<KnowledgeBase>> {
        Self::validate_agent_id(agent_id)?;
        if let Some(kb) = self.get(agent_id) {
            return Ok(kb);
        }

        let kb = Arc::new(KnowledgeBase::from_config(agent_id, &self.config));
        if self.config.knowledge.seed_demo {
            demo::seed(&kb).await?;
        }

        // Another request may have created it while we were seeding; keep
        // whichever landed first.
        let mut bases = self.bases.write().unwrap_or_else(|e| e.into_inner());
        let kb = bases.entry(agent_id.to_string()).or_insert(kb).clone();
        tracing::debug!(agent = agent_id, "knowledge base ready");
        Ok(kb)
    }

    pub fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .bases
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helpdesk_kb_core::models::SnippetInput;

    #[test]
    fn test_validate_agent_id() {
        assert!(KnowledgeBaseRegistry::validate_agent_id("agent-1").is_ok());
        assert!(KnowledgeBaseRegistry::validate_agent_id("support_bot").is_ok());
        assert!(KnowledgeBaseRegistry::validate_agent_id("").is_err());
        assert!(KnowledgeBaseRegistry::validate_agent_id("../etc").is_err());
        assert!(KnowledgeBaseRegistry::validate_agent_id(&"a".repeat(65)).is_err());
    }

    #[tokio::test]
    async fn test_agents_are_isolated() {
        let registry = KnowledgeBaseRegistry::new(Arc::new(Config::minimal()));
        let a = registry.get_or_create("alpha").await.unwrap();
        let b = registry.get_or_create("beta").await.unwrap();

        a.create_snippet(SnippetInput {
            title: "Refunds".to_string(),
            content: "Refunds take 5 days.".to_string(),
        })
        .await
        .unwrap();

        assert_eq!(a.stats().await.snippet_count, 1);
        assert_eq!(b.stats().await.snippet_count, 0);
        assert!(!b.stats().await.needs_training);
        assert_eq!(registry.agent_ids(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_instance() {
        let registry = KnowledgeBaseRegistry::new(Arc::new(Config::minimal()));
        let first = registry.get_or_create("alpha").await.unwrap();
        let second = registry.get_or_create("alpha").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn test_seed_demo_on_create() {
        let mut config = Config::minimal();
        config.knowledge.seed_demo = true;
        let registry = KnowledgeBaseRegistry::new(Arc::new(config));
        let kb = registry.get_or_create("demo").await.unwrap();

        let stats = kb.stats().await;
        assert!(stats.snippet_count > 0);
        assert!(stats.needs_training);
    }
}
