use crate::request::Platform;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Repurpose articles into platform-ready posts through a streaming relay
#[derive(Debug, Parser)]
#[command(name = "repurpose")]
#[command(version)]
#[command(about = "Repurpose articles into platform-ready posts", long_about = None)]
pub struct Args {
    /// Config file (default: $REPURPOSE_HOME/config/config.toml or XDG config dir)
    #[arg(long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay server
    Serve {
        /// Listen address
        #[arg(long, env = "LISTEN_ADDR")]
        addr: Option<SocketAddr>,

        /// Answer from an offline echo upstream instead of the configured endpoint
        #[arg(long)]
        stub: bool,
    },

    /// Generate a post through a running relay server
    Generate(GenerateArgs),
}

#[derive(Debug, clap::Args)]
pub struct GenerateArgs {
    /// Source URL (repeatable); switches the source to URL mode
    #[arg(long = "url", value_name = "URL", conflicts_with_all = ["text", "text_file"])]
    pub urls: Vec<String>,

    /// Source text
    #[arg(long = "text", value_name = "TEXT", conflicts_with = "text_file")]
    pub text: Option<String>,

    /// Read the source text from a file
    #[arg(long = "text-file", value_name = "FILE")]
    pub text_file: Option<PathBuf>,

    /// Style reference URL (repeatable)
    #[arg(long = "style-url", value_name = "URL", conflicts_with = "style_text")]
    pub style_urls: Vec<String>,

    /// Style reference text
    #[arg(long = "style-text", value_name = "TEXT")]
    pub style_text: Option<String>,

    /// Target platform
    #[arg(short = 'p', long = "platform", value_enum, default_value_t = Platform::Twitter)]
    pub platform: Platform,

    /// Wait for the whole post instead of streaming it
    #[arg(long = "no-stream")]
    pub no_stream: bool,

    /// Relay endpoint (default: config client.relay_url)
    #[arg(long = "relay", value_name = "URL", env = "REPURPOSE_RELAY_URL")]
    pub relay: Option<String>,
}
