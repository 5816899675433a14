use std::path::PathBuf;

use anyhow::Result;
use bsc_service::config::ServiceConfig;
use bsc_service::server;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "bsc-server")]
#[command(version)]
#[command(about = "HTTP service for bsc1 block-sorting compression", long_about = None)]
struct Args {
    /// JSON config file; missing fields take their defaults
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the config file
    #[arg(short, long)]
    bind: Option<String>,

    /// Engine threads per request (0 = all cores)
    #[arg(short = 't', long)]
    threads: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServiceConfig::from_json_file(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(threads) = args.threads {
        config.num_threads = threads;
    }
    config.validate()?;
    info!(?config, "starting");

    server::run(config).await
}
