//! # Helpdesk Knowledge Base CLI (`kb`)
//!
//! The `kb` binary runs the knowledge-base HTTP API and offers offline
//! commands for inspecting and exercising a single agent's knowledge base.
//!
//! ## Usage
//!
//! ```bash
//! kb --config ./config/kb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kb serve` | Start the JSON HTTP API |
//! | `kb stats` | Print counts, sizes, quota usage, and training state |
//! | `kb simulate` | Seed demo knowledge, crawl a website, train, print stats |
//! | `kb completions <shell>` | Print a shell completion script |
//!
//! When the config file does not exist, built-in defaults are used.
//!
//! ## Examples
//!
//! ```bash
//! # Stats for a knowledge base seeded with the demo records
//! kb stats --demo
//!
//! # Walk one agent through crawl and training
//! kb simulate --agent support-bot --url https://example.com/help
//!
//! # Serve the API on the configured bind address
//! kb serve --config ./config/kb.toml
//! ```

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::{Path, PathBuf};

use helpdesk_kb::config::{self, Config};
use helpdesk_kb::knowledge_base::KnowledgeBase;
use helpdesk_kb::{demo, logging, server, stats};

/// Helpdesk knowledge base: per-agent knowledge sources, quota, and training.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kb.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kb",
    about = "Helpdesk knowledge base: per-agent knowledge sources, quota, and training",
    version,
    long_about = "Each support agent owns a knowledge base of text snippets, uploaded files, \
    crawled websites, and Q&A pairs. The knowledge base tracks its size against a quota and \
    whether it changed since the last training run."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/kb.toml`. Built-in defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/kb.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the JSON HTTP API.
    ///
    /// An agent's knowledge base is created by its first create or train
    /// request and lives in memory until the server stops.
    Serve,

    /// Print knowledge-base statistics for one agent.
    Stats {
        /// Agent whose knowledge base to inspect.
        #[arg(long, default_value = "demo")]
        agent: String,

        /// Seed the demo records before printing.
        #[arg(long)]
        demo: bool,
    },

    /// Seed demo knowledge, add a website, train, and print the result.
    ///
    /// The crawl and the training run overlap, so the crawl usually lands
    /// while training is running and the knowledge base needs a second run.
    Simulate {
        /// Agent to simulate.
        #[arg(long, default_value = "demo")]
        agent: String,

        /// Website to crawl.
        #[arg(long, default_value = "https://example.com")]
        url: String,
    },

    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "kb", &mut std::io::stdout());
        return Ok(());
    }

    let (cfg, defaulted) = load_or_default(&cli.config)?;
    logging::init(&cfg.logging);
    if defaulted {
        tracing::debug!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Stats { agent, demo } => {
            let kb = KnowledgeBase::from_config(&agent, &cfg);
            if demo {
                demo::seed(&kb).await?;
            }
            let summary = kb.stats().await;
            print!(
                "{}",
                stats::render_stats(&agent, &summary, kb.last_training().as_ref())
            );
        }
        Commands::Simulate { agent, url } => {
            simulate(&agent, &url, &cfg).await?;
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Loads `path`, falling back to [`Config::minimal`] when it does not exist.
/// A file that exists but fails to parse or validate is still an error.
fn load_or_default(path: &Path) -> Result<(Config, bool)> {
    if path.exists() {
        Ok((config::load_config(path)?, false))
    } else {
        Ok((Config::minimal(), true))
    }
}

async fn simulate(agent: &str, url: &str, cfg: &Config) -> Result<()> {
    let kb = KnowledgeBase::from_config(agent, cfg);
    demo::seed(&kb).await?;
    println!("Seeded demo knowledge for agent '{}'", agent);

    let pending = kb.add_website(url).await?;
    println!(
        "Added website {} (id {}, status {})",
        pending.website.url,
        pending.website.id,
        pending.website.status.as_str()
    );

    let training = kb.start_training().await?;
    println!("Training run {} started", training.run().id);

    match pending.finished().await? {
        Some(site) => match &site.last_error {
            Some(err) => println!("Crawl of {} failed: {}", site.url, err),
            None => println!(
                "Crawl of {} finished: {} pages, {}",
                site.url,
                site.pages_count,
                stats::format_bytes(site.size_bytes)
            ),
        },
        None => println!("Website was removed before its crawl finished"),
    }

    let run = training.wait().await?;
    println!("Training run {} {}", run.id, run.status.as_str());

    if kb.stats().await.needs_training {
        println!("Knowledge changed during training, training again");
        let rerun = kb.train().await?;
        println!("Training run {} {}", rerun.id, rerun.status.as_str());
    }

    println!();
    let summary = kb.stats().await;
    print!(
        "{}",
        stats::render_stats(agent, &summary, kb.last_training().as_ref())
    );
    Ok(())
}
