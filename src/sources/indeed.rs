//! Indeed alert emails. Indeed pages resist automated fetching, so offers
//! stay in `AwaitingContent` until completed by hand.

use regex::Regex;
use std::sync::OnceLock;

use super::{find_salary, SourcePlugin};
use crate::domain::models::ExtractedOffer;
use crate::extractor::{dedup_offers, harvest_links};

pub const KEY: &str = "indeed";

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"indeed\.[a-z.]+/[^\s]*?[?&]jk=(?P<id>[0-9a-fA-F]+)").unwrap())
}

pub fn canonical_url(id: &str) -> String {
    format!("https://fr.indeed.com/viewjob?jk={}", id)
}

pub fn plugin() -> SourcePlugin {
    SourcePlugin {
        key: KEY,
        display_name: "Indeed",
        default_senders: &["alert@indeed.com", "@jobalert.indeed.com"],
        url_pattern: None,
        extract_email: Some(extract_email),
        enricher: None,
    }
}

/// Cards: title link, company, city, optional pay line.
pub fn extract_email(html: &str) -> Vec<ExtractedOffer> {
    let offers = harvest_links(html, link_pattern())
        .into_iter()
        .map(|link| {
            let id = link.id.to_lowercase();
            let mut offer = ExtractedOffer::new(id.clone(), canonical_url(&id));
            offer.title = link.anchor_text.clone();

            let mut rest = link
                .card_lines
                .iter()
                .filter(|line| Some(line.as_str()) != offer.title.as_deref());
            offer.company = rest.next().cloned();
            offer.city = rest.next().filter(|line| !line.contains('€')).cloned();
            offer.salary = find_salary(&link.card_lines);
            offer
        })
        .collect();

    dedup_offers(offers)
}
