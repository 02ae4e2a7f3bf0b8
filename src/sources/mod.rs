//! Source Plugin Registry.
//!
//! Each job board is a [`SourcePlugin`]: a key plus two independent,
//! optional capabilities (email extraction, page enrichment). The registry is
//! a lookup table built once at startup; adding a board means registering one
//! more entry.

use async_trait::async_trait;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::models::{EnrichedContent, ExtractedOffer};
use crate::extractor::normalize_whitespace;
use crate::service::http::{FetchError, PageFetcher};

pub mod apec;
pub mod config;
pub mod hellowork;
pub mod indeed;
pub mod linkedin;
pub mod page;
pub mod welcome_to_the_jungle;

pub use config::{SourceConfig, SourceDirectory};

/// Enriched text shorter than this (in characters) is not usable for analysis.
pub const MIN_TEXT_CHARS: usize = 200;

/// Pure extraction of offer stubs from a raw alert email body.
///
/// Never fails: markup that does not match yields fewer (or zero) offers.
pub type EmailExtractor = fn(&str) -> Vec<ExtractedOffer>;

/// Why a page could not be turned into qualification-ready content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnrichmentFailure {
    #[error("network error: {0}")]
    Network(String),

    #[error("blocked by anti-automation (HTTP {status})")]
    Blocked { status: u16 },

    #[error("page gone (HTTP {status})")]
    PageGone { status: u16 },

    #[error("page structure changed: `{marker}` not found at {url}")]
    StructureChanged { marker: String, url: String },

    #[error("content too short ({len} characters, minimum {min})")]
    TooShort { len: usize, min: usize },
}

impl EnrichmentFailure {
    pub fn code(&self) -> &'static str {
        match self {
            EnrichmentFailure::Network(_) => "network",
            EnrichmentFailure::Blocked { .. } => "blocked",
            EnrichmentFailure::PageGone { .. } => "page_gone",
            EnrichmentFailure::StructureChanged { .. } => "structure_changed",
            EnrichmentFailure::TooShort { .. } => "too_short",
        }
    }
}

impl From<FetchError> for EnrichmentFailure {
    fn from(err: FetchError) -> Self {
        match err.status() {
            Some(status) if err.is_gone() => EnrichmentFailure::PageGone { status },
            Some(status) if err.is_blocked() => EnrichmentFailure::Blocked { status },
            _ => EnrichmentFailure::Network(err.to_string()),
        }
    }
}

#[async_trait]
pub trait PageEnricher: Send + Sync {
    async fn enrich(&self, url: &str) -> Result<EnrichedContent, EnrichmentFailure>;
}

/// Capability bundle for one job board.
#[derive(Clone)]
pub struct SourcePlugin {
    pub key: &'static str,
    pub display_name: &'static str,
    /// Sender addresses (or `@domain` entries) used when no source file is configured.
    pub default_senders: &'static [&'static str],
    /// Posting URLs this plugin can enrich.
    pub url_pattern: Option<Regex>,
    pub extract_email: Option<EmailExtractor>,
    pub enricher: Option<Arc<dyn PageEnricher>>,
}

impl SourcePlugin {
    /// Declared support for automated enrichment.
    pub fn stage2_implemented(&self) -> bool {
        self.enricher.is_some()
    }

    pub fn matches_url(&self, url: &str) -> bool {
        self.url_pattern.as_ref().is_some_and(|p| p.is_match(url))
    }
}

impl fmt::Debug for SourcePlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourcePlugin")
            .field("key", &self.key)
            .field("url_pattern", &self.url_pattern.as_ref().map(Regex::as_str))
            .field("email_extraction", &self.extract_email.is_some())
            .field("enrichment", &self.enricher.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    plugins: Vec<SourcePlugin>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All bundled job boards, enriching through `fetcher`.
    pub fn builtin(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self::new()
            .register(linkedin::plugin(fetcher.clone()))
            .register(hellowork::plugin(fetcher.clone()))
            .register(welcome_to_the_jungle::plugin(fetcher.clone()))
            .register(apec::plugin(fetcher))
            .register(indeed::plugin())
    }

    /// Add a plugin, replacing any previous entry with the same key.
    pub fn register(mut self, plugin: SourcePlugin) -> Self {
        self.plugins.retain(|p| p.key != plugin.key);
        self.plugins.push(plugin);
        self
    }

    pub fn get(&self, source: &str) -> Option<&SourcePlugin> {
        self.plugins.iter().find(|p| p.key == source)
    }

    pub fn plugins(&self) -> impl Iterator<Item = &SourcePlugin> {
        self.plugins.iter()
    }

    pub fn get_email_extraction_plugin(&self, source: &str) -> Option<&SourcePlugin> {
        self.get(source).filter(|p| p.extract_email.is_some())
    }

    /// First enrichment-capable plugin whose URL pattern matches.
    pub fn get_enrichment_plugin_for_url(&self, url: &str) -> Option<&SourcePlugin> {
        self.plugins
            .iter()
            .find(|p| p.stage2_implemented() && p.matches_url(url))
    }

    pub fn get_enrichment_plugin(&self, source: &str) -> Option<&SourcePlugin> {
        self.get(source).filter(|p| p.stage2_implemented())
    }
}

/// Fetch a page body, mapping transport failures onto enrichment reasons.
pub(crate) async fn fetch_html(
    fetcher: &dyn PageFetcher,
    url: &str,
) -> Result<String, EnrichmentFailure> {
    Ok(fetcher.fetch(url).await?.body)
}

/// Normalise the text and reject content too short to qualify.
pub(crate) fn finish(mut content: EnrichedContent) -> Result<EnrichedContent, EnrichmentFailure> {
    content.full_text = normalize_whitespace(&content.full_text);
    let len = content.full_text.chars().count();
    if len < MIN_TEXT_CHARS {
        return Err(EnrichmentFailure::TooShort {
            len,
            min: MIN_TEXT_CHARS,
        });
    }
    Ok(content)
}

/// First card line that looks like a pay range.
pub(crate) fn find_salary(lines: &[String]) -> Option<String> {
    lines
        .iter()
        .find(|line| {
            line.contains('€')
                || line.split_whitespace().any(|word| word == "EUR")
                || line.to_lowercase().starts_with("salaire")
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::stubs::{StubEnricher, StubFetcher};

    fn test_registry() -> SourceRegistry {
        SourceRegistry::builtin(Arc::new(StubFetcher::new()))
    }

    #[test]
    fn test_builtin_registry_capabilities() {
        let registry = test_registry();
        let keys: Vec<_> = registry.plugins().map(|p| p.key).collect();
        assert_eq!(
            keys,
            vec!["linkedin", "hellowork", "welcome_to_the_jungle", "apec", "indeed"]
        );

        assert!(registry.get_email_extraction_plugin("indeed").is_some());
        assert!(registry.get_enrichment_plugin("indeed").is_none());
        assert!(registry.get_enrichment_plugin("hellowork").is_some());
        assert!(registry.get_email_extraction_plugin("unknown").is_none());
    }

    #[test]
    fn test_url_routing() {
        let registry = test_registry();
        let route = |url: &str| registry.get_enrichment_plugin_for_url(url).map(|p| p.key);

        assert_eq!(route("https://www.linkedin.com/jobs/view/3912345678/"), Some("linkedin"));
        assert_eq!(
            route("https://www.hellowork.com/fr-fr/emplois/58231234.html"),
            Some("hellowork")
        );
        assert_eq!(
            route("https://www.welcometothejungle.com/fr/companies/acme/jobs/dev-rust_lyon"),
            Some("welcome_to_the_jungle")
        );
        assert_eq!(
            route("https://www.apec.fr/candidat/recherche-emploi.html/emploi/detail-offre/175864512W"),
            Some("apec")
        );
        assert_eq!(route("https://fr.indeed.com/viewjob?jk=0123abcd"), None);
        assert_eq!(route("https://example.com/job/1"), None);
    }

    #[test]
    fn test_register_replaces_same_key() {
        let enricher = Arc::new(StubEnricher::new());
        let registry = test_registry().register(SourcePlugin {
            key: "indeed",
            display_name: "Indeed",
            default_senders: &[],
            url_pattern: Regex::new(r"indeed\.com/viewjob").ok(),
            extract_email: None,
            enricher: Some(enricher),
        });

        assert_eq!(registry.plugins().count(), 5);
        assert!(registry.get_email_extraction_plugin("indeed").is_none());
        assert_eq!(
            registry
                .get_enrichment_plugin_for_url("https://fr.indeed.com/viewjob?jk=1")
                .map(|p| p.key),
            Some("indeed")
        );
    }

    #[test]
    fn test_fetch_errors_map_to_reasons() {
        let status = |status| FetchError::Status { url: "u".into(), status };
        assert_eq!(
            EnrichmentFailure::from(status(403)),
            EnrichmentFailure::Blocked { status: 403 }
        );
        assert_eq!(
            EnrichmentFailure::from(status(410)),
            EnrichmentFailure::PageGone { status: 410 }
        );
        assert_eq!(EnrichmentFailure::from(status(500)).code(), "network");
    }

    #[test]
    fn test_finish_rejects_short_text() {
        let short = EnrichedContent {
            full_text: "  Trop   court ".into(),
            ..Default::default()
        };
        assert_eq!(
            finish(short),
            Err(EnrichmentFailure::TooShort { len: 10, min: MIN_TEXT_CHARS })
        );

        let long = EnrichedContent {
            full_text: "mot ".repeat(60),
            ..Default::default()
        };
        assert!(finish(long).is_ok());
    }
}
