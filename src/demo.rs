//! Demo knowledge for a fictional eyewear shop's support agent.
//!
//! Seeding leaves the knowledge base in "needs training" state, the way a
//! freshly imported agent looks before its first training run.

use anyhow::Result;
use helpdesk_kb_core::models::{CrawlOutcome, QaInput, SnippetInput};

use crate::knowledge_base::KnowledgeBase;

const SNIPPETS: &[(&str, &str)] = &[
    (
        "Newsletter unsubscribe",
        "Customer wants to leave the newsletter. Reply: point them to the unsubscribe link \
         at the bottom of every mailing, or remove the address manually and confirm by email.",
    ),
    (
        "Invoice request",
        "Customer asks for an invoice. Reply: invoices are attached to the shipping \
         confirmation; resend it from the order page if it is missing.",
    ),
    (
        "Cancellation before shipping",
        "Customer wants to cancel and the order has not shipped yet. Reply: cancel the order, \
         confirm the cancellation, and let them know the refund arrives within 5 business days.",
    ),
    (
        "Prescription lenses and sizes",
        "Customer asks whether frames are available with prescription lenses or in other \
         sizes. Reply: prescription lenses can be added at checkout; sizes are listed on each \
         product page.",
    ),
    (
        "Spam and unrelated mail",
        "Mail that has nothing to do with our customers. Reply: do not answer; forward it to \
         the operations inbox and close the ticket.",
    ),
    (
        "Refund timing",
        "Customer asks when a promised refund will arrive. Reply: refunds are issued within \
         2 business days of receiving the return; banks may take another 3 to 5 days.",
    ),
    (
        "Register a return or exchange",
        "Customer wants to send an order back or exchange it. Reply: share the returns portal \
         link, explain the 30-day window, and mention that exchanges ship once the return is \
         scanned.",
    ),
];

const QAS: &[(&str, &str)] = &[(
    "What are your opening hours?",
    "Our support team is available Monday to Friday from 9:00 to 17:00.",
)];

const FAQ_URL: &str = "https://resolvia.demo/faq";
const FAQ_CRAWL: CrawlOutcome = CrawlOutcome {
    pages_count: 1,
    size_bytes: 2830,
};

/// Populate `kb` with the demo snippets, one crawled FAQ page, and one Q&A.
pub async fn seed(kb: &KnowledgeBase) -> Result<()> {
    for (title, content) in SNIPPETS {
        kb.create_snippet(SnippetInput {
            title: title.to_string(),
            content: content.to_string(),
        })
        .await?;
    }

    // The FAQ page is already crawled, so it bypasses the crawl task.
    let store = kb.store();
    let website = store.create_website(FAQ_URL).await?;
    store
        .complete_crawl(website.id, FAQ_CRAWL, kb.clock().now())
        .await?;

    for (question, answer) in QAS {
        kb.create_qa(QaInput {
            question: question.to_string(),
            answer: answer.to_string(),
        })
        .await?;
    }

    tracing::info!(agent = kb.agent_id(), "demo knowledge seeded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use helpdesk_kb_core::models::WebsiteStatus;

    #[tokio::test]
    async fn test_seed_populates_all_but_files() {
        let kb = KnowledgeBase::from_config("demo", &Config::minimal());
        seed(&kb).await.unwrap();

        let stats = kb.stats().await;
        assert_eq!(stats.snippet_count, SNIPPETS.len());
        assert_eq!(stats.website_count, 1);
        assert_eq!(stats.website_size, 2830);
        assert_eq!(stats.qa_count, 1);
        assert_eq!(stats.file_count, 0);
        assert!(stats.needs_training);
        assert_eq!(
            stats.total_size,
            stats.snippet_size + stats.website_size + stats.qa_size
        );

        let websites = kb.list_websites().await;
        assert_eq!(websites[0].status, WebsiteStatus::Ready);
        assert_eq!(websites[0].url, FAQ_URL);

        // Newest first: the last seeded snippet heads the list.
        let snippets = kb.list_snippets().await;
        assert_eq!(snippets[0].title, "Register a return or exchange");
    }
}
