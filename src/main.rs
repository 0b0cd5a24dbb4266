use anyhow::Context;
use clap::Parser;
use repurpose::{app, cli, config, paths};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the generated post; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => paths::config_path()?,
    };
    let cfg = config::Config::load_optional(&config_path)?;
    tracing::debug!(path = %config_path.display(), found = cfg.is_some(), "resolved config");

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    match args.cmd {
        cli::Command::Serve { addr, stub } => app::cmd_serve(&http, cfg.as_ref(), addr, stub).await,
        cli::Command::Generate(generate) => app::cmd_generate(&http, cfg.as_ref(), generate).await,
    }
}
