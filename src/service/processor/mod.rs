//! Offer pipeline: creation, enrichment and analysis stages, and the
//! single-shot orchestrator that runs them in order.

mod analysis;
mod creation;
mod enrichment;
pub mod prompt;
mod report;

pub use analysis::AnalysisStage;
pub use creation::{CreationStage, MetadataRefreshPolicy};
pub use enrichment::EnrichmentStage;
pub use report::{RunSummary, StageKind, StageReport};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;

/// One pipeline stage. Per-item failures go into the report; only
/// repository failures are returned as errors.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self) -> Result<StageReport>;
}

/// Runs creation, enrichment and analysis once, in that order.
///
/// Holds no timer: recurring runs are driven from outside
/// (see [`crate::service::scheduler`]).
pub struct Orchestrator {
    creation: Arc<dyn Stage>,
    enrichment: Arc<dyn Stage>,
    analysis: Arc<dyn Stage>,
}

impl Orchestrator {
    pub fn new(
        creation: Arc<dyn Stage>,
        enrichment: Arc<dyn Stage>,
        analysis: Arc<dyn Stage>,
    ) -> Self {
        Self {
            creation,
            enrichment,
            analysis,
        }
    }

    pub async fn run_once(&self) -> Result<RunSummary> {
        let started = Instant::now();
        tracing::info!("[PIPELINE] Run started");

        let creation = run_stage(self.creation.as_ref()).await?;
        let enrichment = run_stage(self.enrichment.as_ref()).await?;
        let analysis = run_stage(self.analysis.as_ref()).await?;

        let summary = RunSummary {
            creation,
            enrichment,
            analysis,
        };
        tracing::info!(
            "[PIPELINE] Run finished in {}ms with {} failure(s)",
            started.elapsed().as_millis(),
            summary.total_failed()
        );
        Ok(summary)
    }
}

async fn run_stage(stage: &dyn Stage) -> Result<StageReport> {
    let kind = stage.kind();
    match stage.run().await {
        Ok(report) => {
            tracing::info!("{} {}", kind.tag(), report);
            Ok(report)
        }
        Err(e) => {
            tracing::error!("{} Stage aborted: {}", kind.tag(), e);
            Err(e)
        }
    }
}
