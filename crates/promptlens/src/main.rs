use clap::Parser;
use promptlens::cli::Cli;
use promptlens_tracing::LoggingConfig;

fn main() {
    let cli = Cli::parse();

    promptlens_tracing::init_logging(&LoggingConfig {
        log_level: cli.log_level.clone(),
    });

    if let Err(e) = promptlens::run(cli) {
        tracing::error!(error = format!("{e:#}"), "Exiting with failure");
        std::process::exit(1);
    }
}
