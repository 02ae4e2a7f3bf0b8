//! Welcome to the Jungle alerts. Offer ids are the job slugs.

use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::page::JsonLdEnricher;
use super::{find_salary, SourcePlugin};
use crate::domain::models::ExtractedOffer;
use crate::extractor::{dedup_offers, harvest_links};
use crate::service::http::PageFetcher;

pub const KEY: &str = "welcome_to_the_jungle";

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"welcometothejungle\.com/(?:[a-z]{2}/)?companies/(?P<company>[A-Za-z0-9_-]+)/jobs/(?P<id>[A-Za-z0-9_-]+)",
        )
        .unwrap()
    })
}

pub fn canonical_url(company_slug: &str, job_slug: &str) -> String {
    format!(
        "https://www.welcometothejungle.com/fr/companies/{}/jobs/{}",
        company_slug, job_slug
    )
}

pub fn plugin(fetcher: Arc<dyn PageFetcher>) -> SourcePlugin {
    SourcePlugin {
        key: KEY,
        display_name: "Welcome to the Jungle",
        default_senders: &["@welcometothejungle.com", "@welcometothejungle.co"],
        url_pattern: Some(link_pattern().clone()),
        extract_email: Some(extract_email),
        enricher: Some(Arc::new(
            JsonLdEnricher::new(fetcher).with_fallback_container("main"),
        )),
    }
}

/// Cards show the company above the title, then the city.
pub fn extract_email(html: &str) -> Vec<ExtractedOffer> {
    let offers = harvest_links(html, link_pattern())
        .into_iter()
        .filter_map(|link| {
            let caps = link_pattern().captures(&link.target)?;
            let company_slug = caps.name("company")?.as_str();
            let mut offer = ExtractedOffer::new(link.id.clone(), canonical_url(company_slug, &link.id));

            offer.title = link.anchor_text.clone();
            if let Some(title) = offer.title.as_deref() {
                let pos = link.card_lines.iter().position(|l| l == title);
                offer.company = pos
                    .and_then(|p| p.checked_sub(1))
                    .and_then(|p| link.card_lines.get(p))
                    .cloned();
                offer.city = pos.and_then(|p| link.card_lines.get(p + 1)).cloned();
            }
            offer.salary = find_salary(&link.card_lines);
            Some(offer)
        })
        .collect();

    dedup_offers(offers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALERT: &str = r#"<html><body>
      <div>
        <p>Acme</p>
        <a href="https://www.welcometothejungle.com/fr/companies/acme/jobs/developpeur-rust_lyon?utm_medium=email">Développeur Rust</a>
        <p>Lyon</p>
      </div>
      <div>
        <a href="https://www.welcometothejungle.com/fr/companies/globex/jobs/">Voir toutes les offres</a>
      </div>
    </body></html>"#;

    #[test]
    fn test_extracts_slug_identity() {
        let offers = extract_email(ALERT);
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].offer_id, "developpeur-rust_lyon");
        assert_eq!(
            offers[0].url,
            "https://www.welcometothejungle.com/fr/companies/acme/jobs/developpeur-rust_lyon"
        );
        assert_eq!(offers[0].company.as_deref(), Some("Acme"));
        assert_eq!(offers[0].city.as_deref(), Some("Lyon"));
    }
}
