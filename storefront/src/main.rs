use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use storefront::prelude::*;

/// storefront - e-commerce catalog and order API
#[derive(Parser)]
#[command(name = "storefront")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file; skips the default search path
    #[arg(short, long, env = "STOREFRONT_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listening port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => Config::load().context("failed to load configuration")?,
    };
    if let Some(port) = cli.port {
        config.service.port = port;
    }

    init_tracing(&config);

    let store = connect(&config.database)
        .await
        .context("failed to open document store")?;
    let app = router(AppState::new(config.clone(), store));

    Server::new(config).serve(app).await?;
    Ok(())
}
