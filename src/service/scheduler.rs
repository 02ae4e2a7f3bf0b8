//! Run, sleep, repeat.

use std::time::Duration;

use super::processor::Orchestrator;

/// Drive `orchestrator` every `interval`. Runs never overlap: the next one
/// starts `interval` after the previous one finished. A failed run is logged
/// and the loop goes on. Returns the number of runs performed; with
/// `max_runs = None` it only returns if the task is dropped.
pub async fn run_every(
    orchestrator: &Orchestrator,
    interval: Duration,
    max_runs: Option<usize>,
) -> usize {
    let mut runs = 0usize;

    loop {
        match orchestrator.run_once().await {
            Ok(summary) => {
                for message in summary.messages() {
                    tracing::debug!("[PIPELINE] {}", message);
                }
            }
            Err(e) => tracing::error!("[PIPELINE] Run failed: {}", e),
        }
        runs += 1;

        if max_runs.is_some_and(|max| runs >= max) {
            return runs;
        }

        tracing::info!("[PIPELINE] Next run in {}s", interval.as_secs());
        tokio::time::sleep(interval).await;
    }
}
