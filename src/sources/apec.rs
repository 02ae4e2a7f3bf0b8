//! APEC alert emails; postings carry JSON-LD.

use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::page::JsonLdEnricher;
use super::{find_salary, SourcePlugin};
use crate::domain::models::ExtractedOffer;
use crate::extractor::{dedup_offers, harvest_links};
use crate::service::http::PageFetcher;

pub const KEY: &str = "apec";

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"apec\.fr/.*detail-offre/(?P<id>[0-9]+[A-Z]?)").unwrap())
}

pub fn canonical_url(id: &str) -> String {
    format!(
        "https://www.apec.fr/candidat/recherche-emploi.html/emploi/detail-offre/{}",
        id
    )
}

pub fn plugin(fetcher: Arc<dyn PageFetcher>) -> SourcePlugin {
    SourcePlugin {
        key: KEY,
        display_name: "APEC",
        default_senders: &["@apec.fr", "@alertes.apec.fr"],
        url_pattern: Some(link_pattern().clone()),
        extract_email: Some(extract_email),
        enricher: Some(Arc::new(JsonLdEnricher::new(fetcher))),
    }
}

/// Cards: title, company, then `City - NN` or `City`.
pub fn extract_email(html: &str) -> Vec<ExtractedOffer> {
    let offers = harvest_links(html, link_pattern())
        .into_iter()
        .map(|link| {
            let mut offer = ExtractedOffer::new(link.id.clone(), canonical_url(&link.id));
            offer.title = link.anchor_text.clone();

            let mut rest = link
                .card_lines
                .iter()
                .filter(|line| Some(line.as_str()) != offer.title.as_deref());
            offer.company = rest.next().cloned();
            offer.city = rest
                .next()
                .filter(|line| !line.contains('€'))
                .map(|line| match line.split_once(" - ") {
                    Some((city, _)) => city.trim().to_string(),
                    None => line.clone(),
                });
            offer.salary = find_salary(&link.card_lines);
            offer
        })
        .collect();

    dedup_offers(offers)
}
