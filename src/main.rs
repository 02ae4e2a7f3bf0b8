use anyhow::Context;

use offer_radar::config::AppConfig;
use offer_radar::lifecycle;
use offer_radar::service::scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("Invalid configuration")?;
    lifecycle::init_logging(&config.log_level);

    let orchestrator = lifecycle::build_orchestrator(&config).await?;

    match config.interval {
        Some(interval) => {
            tracing::info!("[PIPELINE] Scheduled every {}s", interval.as_secs());
            scheduler::run_every(&orchestrator, interval, None).await;
        }
        None => {
            let summary = orchestrator.run_once().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
