//! Enrichment from pages that publish a schema.org `JobPosting`.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::Arc;

use super::{fetch_html, finish, EnrichmentFailure, PageEnricher};
use crate::domain::models::EnrichedContent;
use crate::extractor::text::{element_text, select_text};
use crate::extractor::find_job_posting;
use crate::service::http::PageFetcher;

pub const JOB_POSTING_MARKER: &str = "JobPosting JSON-LD";

/// Reads the page's JSON-LD `JobPosting`; optionally falls back to the text
/// of a container element when the structured data is missing.
pub struct JsonLdEnricher {
    fetcher: Arc<dyn PageFetcher>,
    fallback_container: Option<&'static str>,
}

impl JsonLdEnricher {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            fallback_container: None,
        }
    }

    pub fn with_fallback_container(mut self, css: &'static str) -> Self {
        self.fallback_container = Some(css);
        self
    }

    fn parse(&self, body: &str, url: &str) -> Result<EnrichedContent, EnrichmentFailure> {
        let html = Html::parse_document(body);

        if let Some(posting) = find_job_posting(&html).filter(|p| !p.description.is_empty()) {
            return finish(posting.into_content());
        }

        let fallback = self.fallback_container.and_then(|css| {
            let container = Selector::parse(css).ok()?;
            let text = html.select(&container).next().map(element_text)?;
            let title = Selector::parse("h1").ok().and_then(|h1| select_text(&html, &h1));
            Some(EnrichedContent {
                full_text: text,
                title,
                ..Default::default()
            })
        });

        match fallback {
            Some(content) => {
                tracing::debug!("[ENRICH] No JSON-LD at {}, using page container", url);
                finish(content)
            }
            None => Err(EnrichmentFailure::StructureChanged {
                marker: JOB_POSTING_MARKER.to_string(),
                url: url.to_string(),
            }),
        }
    }
}

#[async_trait]
impl PageEnricher for JsonLdEnricher {
    async fn enrich(&self, url: &str) -> Result<EnrichedContent, EnrichmentFailure> {
        let body = fetch_html(self.fetcher.as_ref(), url).await?;
        self.parse(&body, url)
    }
}
