//! Analysis stage: AI qualification of offers awaiting analysis.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::prompt::{self, DEFAULT_CRITERIA};
use super::{Stage, StageKind, StageReport};
use crate::domain::models::{Offer, OfferPatch};
use crate::domain::status::{OfferStatus, StatusEvent};
use crate::error::{AppError, Result};
use crate::repository::OfferRepository;
use crate::service::ai::{AiClient, AiError};
use crate::service::retry::{retry_once, DEFAULT_RETRY_DELAY};
use crate::sources::SourceDirectory;

pub struct AnalysisStage {
    repository: Arc<dyn OfferRepository>,
    directory: Arc<SourceDirectory>,
    ai: Arc<dyn AiClient>,
    criteria: String,
    retry_delay: Duration,
}

impl AnalysisStage {
    pub fn new(
        repository: Arc<dyn OfferRepository>,
        directory: Arc<SourceDirectory>,
        ai: Arc<dyn AiClient>,
    ) -> Self {
        Self {
            repository,
            directory,
            ai,
            criteria: DEFAULT_CRITERIA.to_string(),
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    pub fn with_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.criteria = criteria.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    async fn qualify(&self, offer: &Offer, system: &str) -> std::result::Result<OfferPatch, AiError> {
        let user = prompt::user_prompt(offer);
        let text = retry_once(self.retry_delay, AiError::is_transient, || {
            self.ai.complete(system, &user)
        })
        .await?;

        let qualification = prompt::parse_qualification(&text)?;
        Ok(OfferPatch {
            qualification: Some(qualification),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Stage for AnalysisStage {
    fn kind(&self) -> StageKind {
        StageKind::Analysis
    }

    async fn run(&self) -> Result<StageReport> {
        let mut report = StageReport::new(StageKind::Analysis);

        let offers = self
            .repository
            .get_by_status(OfferStatus::AwaitingAnalysis)
            .await
            .map_err(AppError::repository)?;
        tracing::info!("[ANALYSIS] {} offer(s) awaiting analysis via {}", offers.len(), self.ai.name());

        let system = prompt::system_prompt(&self.criteria);

        for offer in &offers {
            if !self.directory.analysis_enabled(&offer.source) {
                tracing::debug!("[ANALYSIS] Source {} disabled, skipping {}", offer.source, offer.url);
                report.skipped += 1;
                continue;
            }
            report.processed += 1;

            match self.qualify(offer, &system).await {
                Ok(mut patch) => {
                    let next = match offer.status.apply(StatusEvent::AnalysisCompleted) {
                        Ok(next) => next,
                        Err(e) => {
                            report.fail(format!("{}: {}", offer.url, e));
                            continue;
                        }
                    };
                    patch.status = Some(next);
                    let written = self
                        .repository
                        .update_if_status(&offer.id, offer.status, &patch)
                        .await
                        .map_err(AppError::repository)?;
                    if written {
                        report.analysed += 1;
                    } else {
                        report.skip(format!(
                            "{} changed status during the run, left as is",
                            offer.url
                        ));
                    }
                }
                Err(AiError::NoApiKey) => {
                    report.fail(format!(
                        "[{}] AI provider {} has no API key, analysis stopped",
                        AiError::NoApiKey.code(),
                        self.ai.name()
                    ));
                    break;
                }
                Err(e) => {
                    report.fail(format!("{} [{}] {}", offer.url, e.code(), e));
                }
            }
        }

        Ok(report)
    }
}
