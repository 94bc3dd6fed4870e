//! Settlement scheduler daemon

use settlement::{Config, Metrics, ScheduledPayments, SettlementScheduler};
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("Starting settlement daemon");

    // Load configuration
    let config = Config::from_env()?;

    let mut ledger_config = bank_core::Config::default();
    ledger_config.data_dir = config.ledger_data_dir.clone();

    // Open ledger
    let ledger = Arc::new(bank_core::Ledger::open(ledger_config)?);
    tracing::info!("Ledger opened successfully");

    let payments = Arc::new(ScheduledPayments::new(ledger));
    let scheduler = Arc::new(SettlementScheduler::new(
        payments,
        std::time::Duration::from_secs(config.poll_interval_secs),
        Metrics::new()?,
    ));

    let scheduler_handle = tokio::spawn(scheduler.start());

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down settlement daemon");
    scheduler_handle.abort();
    Ok(())
}
