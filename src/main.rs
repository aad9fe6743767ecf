//! Entry point for the Payslip Engine binary.
//!
//! Running this binary starts an HTTP server exposing the payslip
//! calculator and the LINE daily-report webhook.  Settings come from
//! an optional `payslip.toml` and `PAYSLIP_*` environment variables;
//! log verbosity follows `RUST_LOG` (default `info`).

use payslip_engine::config::EngineConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::load()?;
    tracing::info!(?config, "configuration loaded");
    if let Err(err) = payslip_engine::api::serve(config).await {
        tracing::error!(error = %err, "error running server");
        return Err(err);
    }
    Ok(())
}
