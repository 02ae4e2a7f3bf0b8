//! HelloWork alert emails; postings carry JSON-LD.

use regex::Regex;
use std::sync::{Arc, OnceLock};

use super::page::JsonLdEnricher;
use super::{find_salary, SourcePlugin};
use crate::domain::models::ExtractedOffer;
use crate::extractor::{dedup_offers, harvest_links};
use crate::service::http::PageFetcher;

pub const KEY: &str = "hellowork";

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"hellowork\.com/(?:[a-z]{2}-[a-z]{2}/)?emplois/(?P<id>\d+)\.html").unwrap()
    })
}

fn department_suffix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*-\s*(?:\d{2,3}|2[AB])$").unwrap())
}

pub fn canonical_url(id: &str) -> String {
    format!("https://www.hellowork.com/fr-fr/emplois/{}.html", id)
}

pub fn plugin(fetcher: Arc<dyn PageFetcher>) -> SourcePlugin {
    SourcePlugin {
        key: KEY,
        display_name: "HelloWork",
        default_senders: &["@hellowork.com", "@alertes.hellowork.com"],
        url_pattern: Some(link_pattern().clone()),
        extract_email: Some(extract_email),
        enricher: Some(Arc::new(JsonLdEnricher::new(fetcher))),
    }
}

/// Cards list title, company, then `City - NN` (department number).
pub fn extract_email(html: &str) -> Vec<ExtractedOffer> {
    let offers = harvest_links(html, link_pattern())
        .into_iter()
        .map(|link| {
            let mut offer = ExtractedOffer::new(link.id.clone(), canonical_url(&link.id));
            offer.title = link.anchor_text.clone().or_else(|| link.card_lines.first().cloned());

            let mut rest = link
                .card_lines
                .iter()
                .skip_while(|line| Some(line.as_str()) != offer.title.as_deref())
                .skip(1);
            offer.company = rest.next().cloned();
            offer.city = rest
                .next()
                .filter(|line| department_suffix().is_match(line))
                .map(|line| department_suffix().replace(line, "").into_owned());
            offer.salary = find_salary(&link.card_lines);
            offer
        })
        .collect();

    dedup_offers(offers)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALERT: &str = r#"<html><body>
      <table><tr><td>
        <a href="https://www.hellowork.com/fr-fr/emplois/58231234.html?utm_source=alerte">Développeur Rust H/F</a>
        <div>Acme</div><div>Lyon - 69</div><div>CDI</div><div>45 000 - 50 000 € / an</div>
      </td></tr>
      <tr><td>
        <a href="https://www.hellowork.com/fr-fr/emplois/58239999.html">Ingénieur DevOps</a>
        <div>Globex</div><div>Télétravail</div>
      </td></tr>
      <tr><td><a href="https://www.hellowork.com/fr-fr/emplois/abc.html">Lien cassé</a></td></tr>
      </table></body></html>"#;

    #[test]
    fn test_extracts_cards() {
        let offers = extract_email(ALERT);
        assert_eq!(offers.len(), 2);

        assert_eq!(offers[0].offer_id, "58231234");
        assert_eq!(offers[0].url, "https://www.hellowork.com/fr-fr/emplois/58231234.html");
        assert_eq!(offers[0].title.as_deref(), Some("Développeur Rust H/F"));
        assert_eq!(offers[0].company.as_deref(), Some("Acme"));
        assert_eq!(offers[0].city.as_deref(), Some("Lyon"));
        assert_eq!(offers[0].salary.as_deref(), Some("45 000 - 50 000 € / an"));

        assert_eq!(offers[1].company.as_deref(), Some("Globex"));
        assert_eq!(offers[1].city, None);
        assert_eq!(offers[1].salary, None);
    }
}
