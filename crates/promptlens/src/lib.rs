//! promptlens: capture LLM API traffic through a transparent proxy, cook it
//! into a deduplicated artifact, and serve a viewer over the result.

pub mod cli;
pub mod config;
pub mod proxy;
pub mod viewer;

use anyhow::Context;

use cli::{Cli, Command};
use config::ProxyConfig;

/// Dispatch a parsed command line. Server subcommands build their own
/// multi-thread runtime; `cook` is synchronous and needs none.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Proxy {
            port,
            host,
            target,
            output,
            config,
        } => {
            let config = ProxyConfig::load(config.as_deref(), &host, port, &target, &output)?;
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(proxy::run(config))
        }
        Command::Cook { input, output } => {
            promptlens_cook::cook_file(&input, &output)
                .with_context(|| format!("cook of {} failed", input.display()))?;
            Ok(())
        }
        Command::Viewer { input, port, host } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(viewer::run(&input, &host, port))
        }
    }
}
