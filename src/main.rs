use anyhow::Result;
use clap::Parser;
use van_static::cli::{run, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level()?)
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI arguments parsed, tracing initialised, invoking run");

    let result = run(cli).await;
    match &result {
        Ok(_) => tracing::info!("CLI completed successfully"),
        Err(e) => tracing::error!(error = %e, "CLI exited with error"),
    }
    result
}
