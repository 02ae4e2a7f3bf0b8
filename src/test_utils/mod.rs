//! Shared test utilities and fixtures
//!
//! `fixtures` is compiled for unit tests only. `stubs` holds in-process
//! implementations of the ports and is public so integration tests can
//! drive the pipeline without network access.

#[cfg(test)]
pub mod fixtures {
    use crate::domain::models::{CreationMethod, EnrichedContent, NewOffer};
    use crate::service::mailbox::CandidateEmail;
    use chrono::Utc;
    use serde_json::json;
    use sqlx::SqlitePool;

    /// Creates an in-memory SQLite database with migrations applied
    pub async fn setup_test_db() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test database");
        sqlx::migrate!().run(&pool).await.expect("Failed to run migrations");
        pool
    }

    /// Single-line posting text, long enough to pass the minimum length check.
    pub fn long_description() -> String {
        "Nous recherchons un développeur Rust confirmé pour rejoindre une équipe produit \
         de huit personnes. Vous concevrez des services asynchrones avec Tokio, maintiendrez \
         une base SQLite et participerez aux revues de code. Télétravail partiel possible."
            .to_string()
    }

    /// Posting page carrying a schema.org JobPosting located in Lyon.
    pub fn job_posting_page(title: &str, company: &str) -> String {
        let posting = json!({
            "@context": "https://schema.org",
            "@type": "JobPosting",
            "title": title,
            "description": format!("<p>{}</p>", long_description()),
            "datePosted": "2025-03-01",
            "hiringOrganization": { "@type": "Organization", "name": company },
            "jobLocation": { "@type": "Place", "address": { "addressLocality": "Lyon" } }
        });
        format!(
            r#"<html><head><script type="application/ld+json">{}</script></head><body><h1>{}</h1></body></html>"#,
            posting, title
        )
    }

    /// LinkedIn job alert with one card per id.
    pub fn linkedin_alert(ids: &[&str]) -> String {
        let cards: String = ids
            .iter()
            .map(|id| {
                format!(
                    r#"<tr><td><a href="https://www.linkedin.com/comm/jobs/view/{id}/?trk=alert">Offre {id}</a><p>Acme · Lyon</p></td></tr>"#
                )
            })
            .collect();
        format!("<html><body><table>{}</table></body></html>", cards)
    }

    pub fn email_from(from: &str, html: &str) -> CandidateEmail {
        CandidateEmail {
            id: String::new(),
            from: from.to_string(),
            subject: "Alerte emploi".into(),
            html: html.to_string(),
            received_at: Utc::now(),
        }
    }

    pub fn new_offer(source: &str, offer_id: &str, url: &str) -> NewOffer {
        NewOffer {
            offer_id: offer_id.to_string(),
            url: url.to_string(),
            source: source.to_string(),
            creation_method: CreationMethod::Email,
            date_offer: None,
            title: None,
            company: None,
            city: None,
            region: None,
            salary: None,
        }
    }

    pub fn enriched(text: &str) -> EnrichedContent {
        EnrichedContent {
            full_text: text.to_string(),
            ..Default::default()
        }
    }
}

pub mod stubs {
    use async_trait::async_trait;
    use std::collections::{HashMap, VecDeque};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, MutexGuard};

    use crate::domain::models::EnrichedContent;
    use crate::error::{AppError, Result};
    use crate::service::ai::{AiClient, AiError};
    use crate::service::http::{FetchError, FetchedPage, PageFetcher};
    use crate::service::processor::{Stage, StageKind, StageReport};
    use crate::sources::{EnrichmentFailure, PageEnricher};

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Canned pages keyed by URL. Unknown URLs fail with a network error.
    #[derive(Default)]
    pub struct StubFetcher {
        responses: HashMap<String, std::result::Result<FetchedPage, FetchError>>,
        calls: AtomicUsize,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_page(mut self, url: &str, body: &str) -> Self {
            self.responses.insert(
                url.to_string(),
                Ok(FetchedPage {
                    url: url.to_string(),
                    status: 200,
                    body: body.to_string(),
                }),
            );
            self
        }

        pub fn with_status(mut self, url: &str, status: u16) -> Self {
            self.responses.insert(
                url.to_string(),
                Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                }),
            );
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(url)
                .cloned()
                .unwrap_or_else(|| {
                    Err(FetchError::Network {
                        url: url.to_string(),
                        message: "no stubbed response".into(),
                    })
                })
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    /// Canned enrichment outcomes keyed by URL.
    #[derive(Default)]
    pub struct StubEnricher {
        outcomes: HashMap<String, std::result::Result<EnrichedContent, EnrichmentFailure>>,
        calls: Mutex<Vec<String>>,
    }

    impl StubEnricher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_content(mut self, url: &str, content: EnrichedContent) -> Self {
            self.outcomes.insert(url.to_string(), Ok(content));
            self
        }

        pub fn with_failure(mut self, url: &str, failure: EnrichmentFailure) -> Self {
            self.outcomes.insert(url.to_string(), Err(failure));
            self
        }

        /// URLs enriched so far, in call order.
        pub fn calls(&self) -> Vec<String> {
            lock(&self.calls).clone()
        }
    }

    #[async_trait]
    impl PageEnricher for StubEnricher {
        async fn enrich(&self, url: &str) -> std::result::Result<EnrichedContent, EnrichmentFailure> {
            lock(&self.calls).push(url.to_string());
            self.outcomes
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err(EnrichmentFailure::Network("no stubbed outcome".into())))
        }
    }

    /// Scripted AI answers, consumed in order.
    #[derive(Default)]
    pub struct StubAi {
        responses: Mutex<VecDeque<std::result::Result<String, AiError>>>,
        prompts: Mutex<Vec<(String, String)>>,
    }

    impl StubAi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(self, response: std::result::Result<String, AiError>) -> Self {
            lock(&self.responses).push_back(response);
            self
        }

        /// (system, user) prompt pairs received so far.
        pub fn prompts(&self) -> Vec<(String, String)> {
            lock(&self.prompts).clone()
        }
    }

    #[async_trait]
    impl AiClient for StubAi {
        async fn complete(
            &self,
            system_prompt: &str,
            user_prompt: &str,
        ) -> std::result::Result<String, AiError> {
            lock(&self.prompts).push((system_prompt.to_string(), user_prompt.to_string()));
            lock(&self.responses)
                .pop_front()
                .unwrap_or_else(|| Err(AiError::InvalidResponse("no scripted response".into())))
        }

        fn name(&self) -> &'static str {
            "stub"
        }
    }

    /// Stage that records its invocation and returns an empty report.
    pub struct RecordingStage {
        kind: StageKind,
        log: Arc<Mutex<Vec<StageKind>>>,
        failure: Option<fn() -> AppError>,
    }

    impl RecordingStage {
        pub fn new(kind: StageKind, log: Arc<Mutex<Vec<StageKind>>>) -> Self {
            Self {
                kind,
                log,
                failure: None,
            }
        }

        pub fn failing_with(mut self, failure: fn() -> AppError) -> Self {
            self.failure = Some(failure);
            self
        }
    }

    #[async_trait]
    impl Stage for RecordingStage {
        fn kind(&self) -> StageKind {
            self.kind
        }

        async fn run(&self) -> Result<StageReport> {
            lock(&self.log).push(self.kind);
            match self.failure {
                Some(failure) => Err(failure()),
                None => Ok(StageReport::new(self.kind)),
            }
        }
    }
}
