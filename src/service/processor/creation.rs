//! Creation stage: alert emails in, offer records out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{Stage, StageKind, StageReport};
use crate::domain::models::{CreationMethod, NewOffer, Offer, OfferPatch};
use crate::domain::status::OfferStatus;
use crate::error::{AppError, Result};
use crate::repository::{OfferRepository, UpsertOutcome};
use crate::service::mailbox::{CandidateEmail, EmailSource};
use crate::sources::{SourceDirectory, SourceRegistry};

/// What to do with extraction metadata when an offer is acquired again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataRefreshPolicy {
    /// Leave the stored record untouched.
    #[default]
    Keep,
    /// Fill fields the stored record lacks.
    FillMissing,
    /// Replace extraction fields while the offer is still awaiting content,
    /// fill missing ones afterwards.
    Overwrite,
}

impl MetadataRefreshPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataRefreshPolicy::Keep => "keep",
            MetadataRefreshPolicy::FillMissing => "fill_missing",
            MetadataRefreshPolicy::Overwrite => "overwrite",
        }
    }

    /// Patch to apply to `existing` given freshly extracted `incoming` data.
    /// Never touches status, full text or qualification.
    pub fn patch_for(&self, existing: &Offer, incoming: &NewOffer) -> OfferPatch {
        let overwrite = match self {
            MetadataRefreshPolicy::Keep => return OfferPatch::default(),
            MetadataRefreshPolicy::FillMissing => false,
            MetadataRefreshPolicy::Overwrite => existing.status == OfferStatus::AwaitingContent,
        };

        let pick = |stored: &Option<String>, fresh: &Option<String>| match (stored, fresh) {
            (_, None) => None,
            (None, Some(v)) => Some(v.clone()),
            (Some(old), Some(v)) if overwrite && old != v => Some(v.clone()),
            _ => None,
        };

        OfferPatch {
            title: pick(&existing.title, &incoming.title),
            company: pick(&existing.company, &incoming.company),
            city: pick(&existing.city, &incoming.city),
            region: pick(&existing.region, &incoming.region),
            salary: pick(&existing.salary, &incoming.salary),
            date_offer: match (existing.date_offer, incoming.date_offer) {
                (None, fresh) => fresh,
                (Some(old), Some(fresh)) if overwrite && old != fresh => Some(fresh),
                _ => None,
            },
            ..Default::default()
        }
    }
}

impl fmt::Display for MetadataRefreshPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataRefreshPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "keep" => Ok(MetadataRefreshPolicy::Keep),
            "fill_missing" | "fill-missing" => Ok(MetadataRefreshPolicy::FillMissing),
            "overwrite" => Ok(MetadataRefreshPolicy::Overwrite),
            other => Err(format!("unknown metadata refresh policy: {}", other)),
        }
    }
}

pub struct CreationStage {
    repository: Arc<dyn OfferRepository>,
    registry: Arc<SourceRegistry>,
    directory: Arc<SourceDirectory>,
    emails: Arc<dyn EmailSource>,
    mailbox: String,
    refresh: MetadataRefreshPolicy,
}

impl CreationStage {
    pub fn new(
        repository: Arc<dyn OfferRepository>,
        registry: Arc<SourceRegistry>,
        directory: Arc<SourceDirectory>,
        emails: Arc<dyn EmailSource>,
        mailbox: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            registry,
            directory,
            emails,
            mailbox: mailbox.into(),
            refresh: MetadataRefreshPolicy::default(),
        }
    }

    pub fn with_refresh_policy(mut self, refresh: MetadataRefreshPolicy) -> Self {
        self.refresh = refresh;
        self
    }

    /// Returns whether the email was fully handled and can be archived.
    async fn process_email(&self, email: &CandidateEmail, report: &mut StageReport) -> Result<bool> {
        let Some(config) = self.directory.source_for_sender(&email.from) else {
            report.fail(format!("Unknown sender {} for email {}", email.from, email.id));
            return Ok(false);
        };

        if !config.creation_enabled {
            report.skip(format!(
                "Source {} disabled for creation, email {} left in place",
                config.source, email.id
            ));
            return Ok(false);
        }

        let Some(extract) = self
            .registry
            .get_email_extraction_plugin(&config.source)
            .and_then(|plugin| plugin.extract_email)
        else {
            report.fail(format!(
                "No email extraction plugin for source {} (email {})",
                config.source, email.id
            ));
            return Ok(false);
        };

        let candidates = extract(&email.html);
        if candidates.is_empty() {
            report.note(format!("No offer found in email {} ({})", email.id, config.source));
        }

        for candidate in candidates {
            let offer = NewOffer::from_extracted(
                candidate,
                &config.source,
                CreationMethod::Email,
                Some(email.received_at),
            );

            match self.repository.upsert(&offer).await.map_err(AppError::repository)? {
                UpsertOutcome::Created(id) => {
                    tracing::debug!("[CREATION] Created {} ({} {})", id, offer.source, offer.offer_id);
                    report.created += 1;
                }
                UpsertOutcome::AlreadyPresent(existing) => {
                    report.already_present += 1;
                    let patch = self.refresh.patch_for(&existing, &offer);
                    if !patch.is_empty() {
                        tracing::debug!("[CREATION] Refreshing metadata of {}", existing.id);
                        // The patch was computed for the status just read.
                        let written = self
                            .repository
                            .update_if_status(&existing.id, existing.status, &patch)
                            .await
                            .map_err(AppError::repository)?;
                        if !written {
                            tracing::debug!(
                                "[CREATION] {} changed status, metadata left as is",
                                existing.id
                            );
                        }
                    }
                }
            }
        }

        Ok(true)
    }
}

#[async_trait]
impl Stage for CreationStage {
    fn kind(&self) -> StageKind {
        StageKind::Creation
    }

    async fn run(&self) -> Result<StageReport> {
        let mut report = StageReport::new(StageKind::Creation);

        let emails = match self.emails.list_candidate_emails(&self.mailbox).await {
            Ok(emails) => emails,
            Err(e) => {
                report.fail(format!("Mailbox {} unavailable: {:#}", self.mailbox, e));
                return Ok(report);
            }
        };
        tracing::info!("[CREATION] {} email(s) in {}", emails.len(), self.mailbox);

        let mut handled = Vec::new();
        for email in &emails {
            report.processed += 1;
            if self.process_email(email, &mut report).await? {
                handled.push(email.id.clone());
            }
        }

        if !handled.is_empty() {
            if let Err(e) = self.emails.archive(&handled).await {
                report.fail(format!("Failed to archive {} email(s): {:#}", handled.len(), e));
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryOfferRepository;
    use crate::service::mailbox::InMemoryEmailSource;
    use crate::sources::SourceConfig;
    use crate::test_utils::fixtures::{email_from, linkedin_alert};
    use crate::test_utils::stubs::StubFetcher;
    use chrono::Utc;

    struct Setup {
        repository: Arc<MemoryOfferRepository>,
        emails: Arc<InMemoryEmailSource>,
        stage: CreationStage,
    }

    fn setup_with(directory: SourceDirectory, refresh: MetadataRefreshPolicy) -> Setup {
        let registry = Arc::new(SourceRegistry::builtin(Arc::new(StubFetcher::new())));
        let repository = Arc::new(MemoryOfferRepository::default());
        let emails = Arc::new(InMemoryEmailSource::new());
        let stage = CreationStage::new(
            repository.clone(),
            registry,
            Arc::new(directory),
            emails.clone(),
            "INBOX",
        )
        .with_refresh_policy(refresh);
        Setup { repository, emails, stage }
    }

    fn setup() -> Setup {
        let registry = SourceRegistry::builtin(Arc::new(StubFetcher::new()));
        setup_with(SourceDirectory::from_registry(&registry), MetadataRefreshPolicy::Keep)
    }

    #[tokio::test]
    async fn test_second_run_creates_nothing() {
        let s = setup();
        s.emails.push("INBOX", email_from("jobalerts-noreply@linkedin.com", &linkedin_alert(&["111111", "222222"])));

        let first = s.stage.run().await.unwrap();
        assert_eq!(first.created, 2);

        s.emails.push("INBOX", email_from("jobalerts-noreply@linkedin.com", &linkedin_alert(&["111111", "222222"])));
        let second = s.stage.run().await.unwrap();

        assert_eq!(second.created, 0);
        assert_eq!(second.already_present, 2);
        assert_eq!(s.repository.get_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_new_offers_start_awaiting_content() {
        let s = setup();
        s.emails.push("INBOX", email_from("jobalerts-noreply@linkedin.com", &linkedin_alert(&["333333"])));

        s.stage.run().await.unwrap();

        let offers = s.repository.get_all().await.unwrap();
        assert_eq!(offers[0].status, OfferStatus::AwaitingContent);
        assert_eq!(offers[0].source, "linkedin");
        assert_eq!(offers[0].creation_method, CreationMethod::Email);
        assert!(offers[0].date_offer.is_some());
    }

    #[tokio::test]
    async fn test_unknown_and_disabled_senders_do_not_stop_batch() {
        let mut indeed = SourceConfig::new("indeed", &["alert@indeed.com"]);
        indeed.creation_enabled = false;
        let directory = SourceDirectory::new(vec![
            SourceConfig::new("linkedin", &["jobalerts-noreply@linkedin.com"]),
            indeed,
        ]);
        let s = setup_with(directory, MetadataRefreshPolicy::Keep);

        s.emails.push("INBOX", email_from("newsletter@example.com", "<p>promo</p>"));
        s.emails.push("INBOX", email_from("alert@indeed.com", "<p>indeed</p>"));
        s.emails.push("INBOX", email_from("jobalerts-noreply@linkedin.com", &linkedin_alert(&["444444"])));

        let report = s.stage.run().await.unwrap();

        assert_eq!(report.processed, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.created, 1);
        assert_eq!(report.messages.len(), 2);
        // Only the handled email is archived.
        assert_eq!(s.emails.archived(), vec!["INBOX/3".to_string()]);
    }

    #[tokio::test]
    async fn test_existing_enriched_offer_is_not_regressed() {
        let s = setup();
        s.emails.push("INBOX", email_from("jobalerts-noreply@linkedin.com", &linkedin_alert(&["555555"])));
        s.stage.run().await.unwrap();

        let stored = s.repository.get_all().await.unwrap().remove(0);
        s.repository
            .update_by_id(
                &stored.id,
                &OfferPatch {
                    status: Some(OfferStatus::AwaitingAnalysis),
                    full_text: Some("texte complet".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        s.emails.push("INBOX", email_from("jobalerts-noreply@linkedin.com", &linkedin_alert(&["555555"])));
        s.stage.run().await.unwrap();

        let after = s.repository.get_all().await.unwrap().remove(0);
        assert_eq!(after.status, OfferStatus::AwaitingAnalysis);
        assert_eq!(after.full_text.as_deref(), Some("texte complet"));
    }

    fn stored_offer(status: OfferStatus, title: Option<&str>) -> Offer {
        let new = NewOffer {
            offer_id: "1".into(),
            url: "u".into(),
            source: "linkedin".into(),
            creation_method: CreationMethod::Email,
            date_offer: None,
            title: title.map(str::to_string),
            company: None,
            city: None,
            region: None,
            salary: None,
        };
        let mut offer = Offer::from_new("row", &new, Utc::now());
        offer.status = status;
        offer
    }

    fn incoming() -> NewOffer {
        NewOffer {
            offer_id: "1".into(),
            url: "u".into(),
            source: "linkedin".into(),
            creation_method: CreationMethod::Email,
            date_offer: None,
            title: Some("Corrected title".into()),
            company: Some("Acme".into()),
            city: None,
            region: None,
            salary: None,
        }
    }

    #[test]
    fn test_refresh_policies() {
        let awaiting = stored_offer(OfferStatus::AwaitingContent, Some("Old title"));
        let analysed = stored_offer(OfferStatus::ReadyForDecision, Some("Old title"));

        assert!(MetadataRefreshPolicy::Keep.patch_for(&awaiting, &incoming()).is_empty());

        let fill = MetadataRefreshPolicy::FillMissing.patch_for(&awaiting, &incoming());
        assert_eq!(fill.title, None);
        assert_eq!(fill.company.as_deref(), Some("Acme"));

        let overwrite = MetadataRefreshPolicy::Overwrite.patch_for(&awaiting, &incoming());
        assert_eq!(overwrite.title.as_deref(), Some("Corrected title"));
        assert_eq!(overwrite.status, None);

        let late = MetadataRefreshPolicy::Overwrite.patch_for(&analysed, &incoming());
        assert_eq!(late.title, None);
        assert_eq!(late.company.as_deref(), Some("Acme"));
        assert_eq!(late.full_text, None);
        assert_eq!(late.qualification, None);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "fill_missing".parse::<MetadataRefreshPolicy>(),
            Ok(MetadataRefreshPolicy::FillMissing)
        );
        assert_eq!(
            " Overwrite ".parse::<MetadataRefreshPolicy>(),
            Ok(MetadataRefreshPolicy::Overwrite)
        );
        assert!("sometimes".parse::<MetadataRefreshPolicy>().is_err());
    }
}
