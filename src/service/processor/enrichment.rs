//! Enrichment stage: fetch full posting content for offers awaiting it.
//!
//! At most one attempt per offer per run; failures leave the offer where it
//! is for the next run.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use super::{Stage, StageKind, StageReport};
use crate::domain::models::{EnrichedContent, Offer, OfferPatch};
use crate::domain::status::{OfferStatus, StatusEvent};
use crate::error::{AppError, Result};
use crate::repository::OfferRepository;
use crate::sources::{EnrichmentFailure, SourceDirectory, SourceRegistry};

pub struct EnrichmentStage {
    repository: Arc<dyn OfferRepository>,
    registry: Arc<SourceRegistry>,
    directory: Arc<SourceDirectory>,
    /// Pause between two page fetches, plus up to 50% random jitter.
    delay: Duration,
}

impl EnrichmentStage {
    pub fn new(
        repository: Arc<dyn OfferRepository>,
        registry: Arc<SourceRegistry>,
        directory: Arc<SourceDirectory>,
    ) -> Self {
        Self {
            repository,
            registry,
            directory,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn pause(&self) {
        if self.delay.is_zero() {
            return;
        }
        let max_jitter = (self.delay.as_millis() / 2) as u64;
        let jitter = rand::thread_rng().gen_range(0..=max_jitter);
        tokio::time::sleep(self.delay + Duration::from_millis(jitter)).await;
    }

    async fn advance(
        &self,
        offer: &Offer,
        event: StatusEvent,
        mut patch: OfferPatch,
        report: &mut StageReport,
    ) -> Result<bool> {
        match offer.status.apply(event) {
            Ok(next) => {
                patch.status = Some(next);
                let written = self
                    .repository
                    .update_if_status(&offer.id, offer.status, &patch)
                    .await
                    .map_err(AppError::repository)?;
                if !written {
                    report.skip(format!(
                        "{} changed status during the run, left as is",
                        offer.url
                    ));
                }
                Ok(written)
            }
            Err(e) => {
                report.fail(format!("{}: {}", offer.url, e));
                Ok(false)
            }
        }
    }
}

/// Enriched values fill the record only when present; text is always written.
fn merge_patch(content: EnrichedContent) -> OfferPatch {
    OfferPatch {
        full_text: Some(content.full_text),
        title: content.title,
        company: content.company,
        city: content.city,
        region: content.region,
        salary: content.salary,
        date_offer: content.date_offer,
        ..Default::default()
    }
}

#[async_trait]
impl Stage for EnrichmentStage {
    fn kind(&self) -> StageKind {
        StageKind::Enrichment
    }

    async fn run(&self) -> Result<StageReport> {
        let mut report = StageReport::new(StageKind::Enrichment);

        let offers = self
            .repository
            .get_by_status(OfferStatus::AwaitingContent)
            .await
            .map_err(AppError::repository)?;
        tracing::info!("[ENRICH] {} offer(s) awaiting content", offers.len());

        let mut attempted = 0usize;
        for offer in &offers {
            if !self.directory.enrichment_enabled(&offer.source) {
                tracing::debug!("[ENRICH] Source {} disabled, skipping {}", offer.source, offer.url);
                report.skipped += 1;
                continue;
            }

            let Some(enricher) = self
                .registry
                .get_enrichment_plugin_for_url(&offer.url)
                .or_else(|| self.registry.get_enrichment_plugin(&offer.source))
                .and_then(|plugin| plugin.enricher.clone())
            else {
                tracing::debug!("[ENRICH] No enrichment plugin for {}, manual completion needed", offer.url);
                report.skipped += 1;
                continue;
            };

            if attempted > 0 {
                self.pause().await;
            }
            attempted += 1;
            report.processed += 1;

            match enricher.enrich(&offer.url).await {
                Ok(content) => {
                    if self
                        .advance(offer, StatusEvent::ContentEnriched, merge_patch(content), &mut report)
                        .await?
                    {
                        report.enriched += 1;
                    }
                }
                Err(EnrichmentFailure::PageGone { status }) => {
                    if self
                        .advance(offer, StatusEvent::PageGone, OfferPatch::default(), &mut report)
                        .await?
                    {
                        report.expired += 1;
                        report.note(format!("{} expired (HTTP {})", offer.url, status));
                    }
                }
                Err(failure) => {
                    report.fail(format!(
                        "{} [{}] {}: {}",
                        offer.source,
                        failure.code(),
                        offer.url,
                        failure
                    ));
                }
            }
        }

        Ok(report)
    }
}
