//! Command-line surface: `proxy`, `cook`, and `viewer`.
//!
//! clap exits 2 on invalid arguments; runtime failures (bind errors,
//! unreadable input) exit 1 from `main`; clean shutdown exits 0.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "promptlens",
    version,
    about = "Capture LLM API traffic and visualise how context evolves across calls"
)]
pub struct Cli {
    /// Log level filter (e.g. "info", "promptlens=debug,info").
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the transparent capturing proxy in front of an LLM API.
    Proxy {
        /// Port to listen on.
        #[arg(long)]
        port: u16,

        /// Interface to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Upstream base URL, e.g. https://api.anthropic.com
        #[arg(long)]
        target: String,

        /// Capture log file to append trace records to.
        #[arg(long)]
        output: PathBuf,

        /// Optional TOML config file for timeouts and tuning.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Cook a capture log into the derived artifact.
    Cook {
        /// Capture log (JSON-Lines) to read.
        input: PathBuf,

        /// Artifact path to atomically replace.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Serve the viewer UI over a cooked capture log.
    Viewer {
        /// Capture log to visualise (re-cooked when the artifact is stale).
        input: PathBuf,

        /// Port to listen on.
        #[arg(long, default_value_t = 9090)]
        port: u16,

        /// Interface to bind.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}
