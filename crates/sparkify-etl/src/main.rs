use anyhow::Result;

use sparkify_core::config::Config;
use sparkify_etl::cli::{parse_args, USAGE};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let invocation = match parse_args(&args) {
        Ok(Some(invocation)) => invocation,
        Ok(None) => {
            println!("{USAGE}");
            return Ok(());
        }
        Err(message) => {
            eprintln!("error: {message}\n\n{USAGE}");
            std::process::exit(2);
        }
    };

    // Structured JSON logging. Level controlled via RUST_LOG env var.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sparkify=info".parse()?),
        )
        .json()
        .init();

    let cfg = match Config::from_file(&invocation.config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, path = %invocation.config_path, "Invalid config");
            return Err(e.into());
        }
    };

    if let Err(e) = sparkify_etl::run::execute(invocation.command, &cfg).await {
        tracing::error!(error = format!("{e:#}"), "Run failed");
        return Err(e);
    }
    Ok(())
}
