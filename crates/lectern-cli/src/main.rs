//! lectern - syllabus-to-courseware command-line binary.

use anyhow::Result;
use clap::Parser;
use lectern_cli::{run, Cli};
use lectern_core::LecternError;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::from_default_env()
        .add_directive(Level::INFO.into())
        .add_directive("lectern=debug".parse()?);
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.json)?;

    // Ctrl+C cancels in-flight provider calls and compiler runs.
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            trigger.cancel();
        }
    });

    match run(cli, &cancel).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            if let Some(hint) = e.downcast_ref::<LecternError>().and_then(LecternError::suggestion) {
                eprintln!("hint: {}", hint);
            }
            Err(e)
        }
    }
}
