//! Full pipeline runs against an in-memory SQLite store with stubbed network.

use chrono::Utc;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use std::time::Duration;

use offer_radar::domain::status::OfferStatus;
use offer_radar::repository::{OfferRepository, SqliteOfferRepository};
use offer_radar::service::mailbox::{CandidateEmail, InMemoryEmailSource};
use offer_radar::service::processor::{
    AnalysisStage, CreationStage, EnrichmentStage, Orchestrator,
};
use offer_radar::sources::{linkedin, SourceDirectory, SourceRegistry};
use offer_radar::test_utils::stubs::{StubAi, StubFetcher};

const LIVE_ID: &str = "3912345678";
const GONE_ID: &str = "3987654321";

async fn sqlite_repository() -> Arc<SqliteOfferRepository> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create test database");
    sqlx::migrate!().run(&pool).await.expect("Failed to run migrations");
    Arc::new(SqliteOfferRepository::new(pool))
}

fn alert_email() -> CandidateEmail {
    let cards: String = [LIVE_ID, GONE_ID]
        .iter()
        .map(|id| {
            format!(
                r#"<tr><td><a href="https://www.linkedin.com/comm/jobs/view/{id}/?trk=alert">Développeur Rust {id}</a><p>Acme · Lyon</p></td></tr>"#
            )
        })
        .collect();
    CandidateEmail {
        id: String::new(),
        from: "LinkedIn <jobalerts-noreply@linkedin.com>".into(),
        subject: "Nouvelles offres".into(),
        html: format!("<html><body><table>{}</table></body></html>", cards),
        received_at: Utc::now(),
    }
}

fn live_page() -> String {
    format!(
        r#"<html><body>
          <h1 class="top-card-layout__title">Développeur Rust</h1>
          <a class="topcard__org-name-link" href="/company/acme">Acme</a>
          <span class="topcard__flavor--bullet">Lyon, Auvergne-Rhône-Alpes, France</span>
          <div class="show-more-less-html__markup"><p>{}</p></div>
        </body></html>"#,
        "Conception de services asynchrones en Rust pour une plateforme logistique. ".repeat(5)
    )
}

fn qualification() -> String {
    json!({
        "Resume": "Backend Rust à Lyon",
        "ScoreLocalisation": 18,
        "ScoreSalaire": 12,
        "ScoreCulture": 15,
        "ScoreQualiteOffre": 14
    })
    .to_string()
}

struct Harness {
    repository: Arc<SqliteOfferRepository>,
    emails: Arc<InMemoryEmailSource>,
    fetcher: Arc<StubFetcher>,
    ai: Arc<StubAi>,
    orchestrator: Orchestrator,
}

async fn harness() -> Harness {
    let repository = sqlite_repository().await;
    let emails = Arc::new(InMemoryEmailSource::new());
    let fetcher = Arc::new(
        StubFetcher::new()
            .with_page(&linkedin::canonical_url(LIVE_ID), &live_page())
            .with_status(&linkedin::canonical_url(GONE_ID), 404),
    );
    let ai = Arc::new(StubAi::new().respond(Ok(qualification())));

    let registry = Arc::new(SourceRegistry::builtin(fetcher.clone()));
    let directory = Arc::new(SourceDirectory::from_registry(&registry));

    let orchestrator = Orchestrator::new(
        Arc::new(CreationStage::new(
            repository.clone(),
            registry.clone(),
            directory.clone(),
            emails.clone(),
            "INBOX",
        )),
        Arc::new(EnrichmentStage::new(repository.clone(), registry, directory.clone())),
        Arc::new(
            AnalysisStage::new(repository.clone(), directory, ai.clone())
                .with_retry_delay(Duration::ZERO),
        ),
    );

    Harness {
        repository,
        emails,
        fetcher,
        ai,
        orchestrator,
    }
}

#[tokio::test]
async fn test_alert_email_to_qualified_offer() {
    let h = harness().await;
    h.emails.push("INBOX", alert_email());

    let summary = h.orchestrator.run_once().await.unwrap();

    assert_eq!(summary.creation.created, 2);
    assert_eq!(summary.enrichment.enriched, 1);
    assert_eq!(summary.enrichment.expired, 1);
    assert_eq!(summary.analysis.analysed, 1);
    assert_eq!(summary.total_failed(), 0);
    assert_eq!(h.emails.archived(), vec!["INBOX/1".to_string()]);
    assert_eq!(h.fetcher.calls(), 2);

    let ready = h
        .repository
        .get_by_status(OfferStatus::ReadyForDecision)
        .await
        .unwrap();
    assert_eq!(ready.len(), 1);
    let offer = &ready[0];
    assert_eq!(offer.offer_id, LIVE_ID);
    assert_eq!(offer.region.as_deref(), Some("Auvergne-Rhône-Alpes"));
    assert_eq!(offer.qualification.summary.as_deref(), Some("Backend Rust à Lyon"));
    assert_eq!(offer.qualification.scores.location, Some(18));

    let expired = h.repository.get_by_status(OfferStatus::Expired).await.unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].offer_id, GONE_ID);

    // Only the live offer's text reached the model.
    let prompts = h.ai.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].1.contains("plateforme logistique"));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let h = harness().await;
    h.emails.push("INBOX", alert_email());
    h.orchestrator.run_once().await.unwrap();

    // The same alert delivered again.
    h.emails.push("INBOX", alert_email());
    let summary = h.orchestrator.run_once().await.unwrap();

    assert_eq!(summary.creation.created, 0);
    assert_eq!(summary.creation.already_present, 2);
    assert_eq!(summary.enrichment.processed, 0);
    assert_eq!(summary.analysis.processed, 0);
    assert_eq!(h.fetcher.calls(), 2);
    assert_eq!(h.ai.prompts().len(), 1);
    assert_eq!(h.repository.get_all().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_empty_mailbox_run_is_quiet() {
    let h = harness().await;

    let summary = h.orchestrator.run_once().await.unwrap();

    assert_eq!(summary.creation.processed, 0);
    assert_eq!(summary.enrichment.processed, 0);
    assert_eq!(summary.analysis.processed, 0);
    assert!(h.emails.archived().is_empty());
}
