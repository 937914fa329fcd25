//! # helpdesk-kb
//!
//! Per-agent knowledge bases for a customer-support helpdesk.
//!
//! Each AI support agent owns a knowledge base made of four kinds of
//! source: text snippets, uploaded files, crawled websites, and Q&A pairs.
//! The knowledge base tracks sizes against a quota and a "needs training"
//! flag that is set by every change and cleared by a completed training run.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌────────────────────┐
//! │  CLI (kb)    │────▶│ KnowledgeBase    │────▶│ KnowledgeStore     │
//! │  HTTP API    │     │ registry / agent │     │ (in-memory, core)  │
//! └──────────────┘     └───────┬──────────┘     └────────────────────┘
//!                              │ background tasks
//!                      ┌───────┴────────┐
//!                      ▼                ▼
//!                 ┌─────────┐      ┌─────────┐
//!                 │ Crawler │      │ Trainer │
//!                 └─────────┘      └─────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! kb stats --demo               # print stats for a seeded knowledge base
//! kb simulate                   # seed, crawl, train, and print the result
//! kb serve                      # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`knowledge_base`] | Per-agent service: CRUD, crawl tasks, training runs |
//! | [`registry`] | One knowledge base per agent, created on demand |
//! | [`crawler`] | `Crawler` trait, simulated crawler, URL validation |
//! | [`trainer`] | `Trainer` trait and simulated trainer |
//! | [`demo`] | Demo knowledge seed |
//! | [`stats`] | Human-readable stats report |
//! | [`server`] | JSON HTTP API |
//! | [`logging`] | Tracing subscriber setup |
//!
//! Models, the store trait, and the in-memory store live in the
//! `helpdesk-kb-core` crate.

pub mod config;
pub mod crawler;
pub mod demo;
pub mod knowledge_base;
pub mod logging;
pub mod registry;
pub mod server;
pub mod stats;
pub mod trainer;
