//! LinkedIn job alerts and public job pages.

use async_trait::async_trait;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, OnceLock};

use super::{fetch_html, find_salary, finish, EnrichmentFailure, PageEnricher, SourcePlugin};
use crate::domain::models::{EnrichedContent, ExtractedOffer};
use crate::extractor::text::{element_text, select_text};
use crate::extractor::{dedup_offers, find_job_posting, harvest_links};
use crate::service::http::PageFetcher;

pub const KEY: &str = "linkedin";

const DESCRIPTION_MARKER: &str = "show-more-less-html__markup";

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"linkedin\.com/(?:comm/)?jobs/view/(?:[^/?#]*-)?(?P<id>\d{6,})").unwrap()
    })
}

pub fn canonical_url(id: &str) -> String {
    format!("https://www.linkedin.com/jobs/view/{}/", id)
}

pub fn plugin(fetcher: Arc<dyn PageFetcher>) -> SourcePlugin {
    SourcePlugin {
        key: KEY,
        display_name: "LinkedIn",
        default_senders: &["jobalerts-noreply@linkedin.com", "jobs-listings@linkedin.com"],
        url_pattern: Some(link_pattern().clone()),
        extract_email: Some(extract_email),
        enricher: Some(Arc::new(LinkedinEnricher { fetcher })),
    }
}

/// Job alert cards: title link, then `Company · City` (or company and city
/// on separate lines), sometimes a pay line.
pub fn extract_email(html: &str) -> Vec<ExtractedOffer> {
    let offers = harvest_links(html, link_pattern())
        .into_iter()
        .map(|link| {
            let mut offer = ExtractedOffer::new(link.id.clone(), canonical_url(&link.id));
            offer.title = link.anchor_text.clone();

            let details: Vec<&String> = link
                .card_lines
                .iter()
                .filter(|line| Some(line.as_str()) != link.anchor_text.as_deref())
                .collect();

            if let Some((company, city)) = details.first().and_then(|l| l.split_once(" · ")) {
                offer.company = Some(company.trim().to_string());
                offer.city = Some(city.trim().to_string());
            } else if offer.title.is_some() {
                offer.company = details.first().map(|s| s.to_string());
                offer.city = details.get(1).map(|s| s.to_string());
            }
            offer.salary = find_salary(&link.card_lines);
            offer
        })
        .collect();

    dedup_offers(offers)
}

pub struct LinkedinEnricher {
    fetcher: Arc<dyn PageFetcher>,
}

impl LinkedinEnricher {
    fn parse(body: &str, url: &str) -> Result<EnrichedContent, EnrichmentFailure> {
        static DESCRIPTION: OnceLock<Selector> = OnceLock::new();
        static TITLE: OnceLock<Selector> = OnceLock::new();
        static COMPANY: OnceLock<Selector> = OnceLock::new();
        static LOCATION: OnceLock<Selector> = OnceLock::new();

        let html = Html::parse_document(body);
        let description = DESCRIPTION
            .get_or_init(|| Selector::parse(".show-more-less-html__markup").unwrap());
        let Some(text) = html.select(description).next().map(element_text) else {
            return Err(EnrichmentFailure::StructureChanged {
                marker: DESCRIPTION_MARKER.to_string(),
                url: url.to_string(),
            });
        };

        let title = select_text(
            &html,
            TITLE.get_or_init(|| Selector::parse("h1.top-card-layout__title, h1").unwrap()),
        );
        let company = select_text(
            &html,
            COMPANY.get_or_init(|| Selector::parse("a.topcard__org-name-link").unwrap()),
        );
        let location = select_text(
            &html,
            LOCATION.get_or_init(|| {
                Selector::parse(".topcard__flavor--bullet, .top-card-layout__second-subline span")
                    .unwrap()
            }),
        );

        // "Lyon, Auvergne-Rhône-Alpes, France"
        let mut parts = location.as_deref().unwrap_or("").split(',').map(str::trim);
        let city = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        let region = parts.next().filter(|s| !s.is_empty()).map(str::to_string);

        let posting = find_job_posting(&html);
        let posted = posting.as_ref().and_then(|p| p.date_posted);
        let salary = posting.and_then(|p| p.salary);

        finish(EnrichedContent {
            full_text: text,
            title,
            company,
            city,
            region,
            salary,
            date_offer: posted,
        })
    }
}

#[async_trait]
impl PageEnricher for LinkedinEnricher {
    async fn enrich(&self, url: &str) -> Result<EnrichedContent, EnrichmentFailure> {
        let body = fetch_html(self.fetcher.as_ref(), url).await?;
        Self::parse(&body, url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixtures::long_description;
    use crate::test_utils::stubs::StubFetcher;

    const ALERT: &str = r#"<html><body><table>
      <tr><td>
        <a href="https://www.linkedin.com/comm/jobs/view/3912345678/?trackingId=abc"><img src="logo.png"></a>
        <a href="https://www.linkedin.com/comm/jobs/view/3912345678/?trackingId=abc">Développeur Rust</a>
        <p>Acme · Lyon, Auvergne-Rhône-Alpes, France</p>
        <p>45 k€ - 55 k€ / an</p>
      </td></tr>
      <tr><td>
        <a href="https://www.linkedin.com/comm/jobs/view/ingenieur-backend-at-globex-3987654321">Ingénieur Backend</a>
        <p>Globex</p>
        <p>Paris</p>
      </td></tr>
      <tr><td>
        <a href="https://www.linkedin.com/comm/jobs/view/">Offre sans identifiant</a>
      </td></tr>
      <tr><td><a href="https://www.linkedin.com/comm/jobs/alerts">Gérer vos alertes</a></td></tr>
    </table></body></html>"#;

    #[test]
    fn test_extracts_valid_cards_only() {
        let offers = extract_email(ALERT);
        assert_eq!(offers.len(), 2);

        assert_eq!(offers[0].offer_id, "3912345678");
        assert_eq!(offers[0].url, "https://www.linkedin.com/jobs/view/3912345678/");
        assert_eq!(offers[0].title.as_deref(), Some("Développeur Rust"));
        assert_eq!(offers[0].company.as_deref(), Some("Acme"));
        assert_eq!(offers[0].city.as_deref(), Some("Lyon, Auvergne-Rhône-Alpes, France"));
        assert_eq!(offers[0].salary.as_deref(), Some("45 k€ - 55 k€ / an"));

        assert_eq!(offers[1].offer_id, "3987654321");
        assert_eq!(offers[1].company.as_deref(), Some("Globex"));
        assert_eq!(offers[1].city.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_extraction_is_repeatable() {
        assert_eq!(extract_email(ALERT), extract_email(ALERT));
        assert!(extract_email("<p>not an alert</p>").is_empty());
        assert!(extract_email("").is_empty());
    }

    #[tokio::test]
    async fn test_enrich_public_page() {
        let url = canonical_url("3912345678");
        let page = format!(
            r#"<html><body>
              <h1 class="top-card-layout__title">Développeur Rust</h1>
              <a class="topcard__org-name-link" href="/company/acme">Acme</a>
              <span class="topcard__flavor topcard__flavor--bullet">Lyon, Auvergne-Rhône-Alpes, France</span>
              <div class="show-more-less-html__markup"><p>{}</p></div>
            </body></html>"#,
            long_description()
        );
        let enricher = LinkedinEnricher {
            fetcher: Arc::new(StubFetcher::new().with_page(&url, &page)),
        };

        let content = enricher.enrich(&url).await.unwrap();
        assert_eq!(content.title.as_deref(), Some("Développeur Rust"));
        assert_eq!(content.company.as_deref(), Some("Acme"));
        assert_eq!(content.city.as_deref(), Some("Lyon"));
        assert_eq!(content.region.as_deref(), Some("Auvergne-Rhône-Alpes"));
        assert_eq!(content.full_text, long_description());
    }

    #[tokio::test]
    async fn test_enrich_reports_missing_description() {
        let url = canonical_url("1234567");
        let enricher = LinkedinEnricher {
            fetcher: Arc::new(
                StubFetcher::new().with_page(&url, "<html><body><h1>Sign in</h1></body></html>"),
            ),
        };

        match enricher.enrich(&url).await {
            Err(EnrichmentFailure::StructureChanged { marker, url: at }) => {
                assert_eq!(marker, DESCRIPTION_MARKER);
                assert_eq!(at, url);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_enrich_page_gone() {
        let url = canonical_url("1234567");
        let enricher = LinkedinEnricher {
            fetcher: Arc::new(StubFetcher::new().with_status(&url, 404)),
        };
        assert_eq!(
            enricher.enrich(&url).await,
            Err(EnrichmentFailure::PageGone { status: 404 })
        );
    }
}
