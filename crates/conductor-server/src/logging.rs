//! `tracing-subscriber` setup. JSON output always, whether or not stdout
//! is a terminal; this keeps log shipping uniform across local runs and
//! deployed processes.

use tracing_subscriber::{fmt, EnvFilter};

pub fn setup_logging(process_name: Option<&str>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,conductor=debug,conductor_server=debug"));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_current_span(true)
        .init();

    tracing::info!(process = process_name.unwrap_or("conductord"), "logging initialized");
    Ok(())
}
