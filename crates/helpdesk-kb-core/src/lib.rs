//! # helpdesk-kb core
//!
//! Shared, runtime-agnostic logic for helpdesk knowledge bases: knowledge
//! source models, the error taxonomy, the clock abstraction, and the
//! [`store::KnowledgeStore`] trait with its in-memory backend.
//!
//! This crate contains no tokio, HTTP, or filesystem dependencies. Timers
//! (crawl and training delays) live in the `helpdesk-kb` application crate.

pub mod clock;
pub mod error;
pub mod models;
pub mod store;

pub use error::{KbError, KbResult};
