use clap::Parser;
use colored::Colorize;
use trusty_tasks::cli::{log_filter, run, Cli};

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(log_filter(
            &std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV).unwrap_or_default(),
        ))
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
