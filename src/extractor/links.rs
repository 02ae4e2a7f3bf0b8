//! Offer link harvesting for alert emails.
//!
//! Alert emails wrap each offer in a card (usually a table cell) whose anchor
//! points either at the posting or at a click-tracking redirect carrying the
//! posting URL in its query string. Both shapes are matched here.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

use super::text::{clean_inline, element_text};
use crate::domain::models::ExtractedOffer;

const CARD_ELEMENTS: &[&str] = &["td", "li", "div"];

/// One anchor whose target matched a source's offer-link pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertLink {
    /// Value of the pattern's `id` capture group.
    pub id: String,
    /// The matched posting URL (unwrapped from any redirect).
    pub target: String,
    /// Inline text of the anchor itself.
    pub anchor_text: Option<String>,
    /// Text lines of the enclosing card, anchor text included.
    pub card_lines: Vec<String>,
}

/// Every anchor in `html` whose href (or a redirect parameter of it) matches
/// `pattern`. The pattern must define an `id` capture group. Anchors that do
/// not match are ignored.
pub fn harvest_links(html: &str, pattern: &Regex) -> Vec<AlertLink> {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR.get_or_init(|| Selector::parse("a[href]").unwrap());

    let document = Html::parse_document(html);
    document
        .select(selector)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?.trim();
            let (id, target) = match_target(href, pattern)?;
            let anchor_text = clean_inline(&anchor.text().collect::<Vec<_>>().join(" "));
            let card_lines = card_of(anchor)
                .map(|card| element_text(card).lines().map(str::to_string).collect())
                .unwrap_or_default();

            Some(AlertLink {
                id,
                target,
                anchor_text,
                card_lines,
            })
        })
        .collect()
}

fn match_target(href: &str, pattern: &Regex) -> Option<(String, String)> {
    if let Some(found) = capture(href, pattern) {
        return Some(found);
    }

    // Click-tracking redirect: look for the posting URL among the query values.
    let parsed = Url::parse(href).ok()?;
    parsed
        .query_pairs()
        .find_map(|(_, value)| capture(&value, pattern))
}

fn capture(candidate: &str, pattern: &Regex) -> Option<(String, String)> {
    let caps = pattern.captures(candidate)?;
    let id = caps.name("id")?.as_str().trim();
    if id.is_empty() {
        return None;
    }
    Some((id.to_string(), candidate.to_string()))
}

/// Nearest enclosing card element of an anchor.
fn card_of(anchor: ElementRef<'_>) -> Option<ElementRef<'_>> {
    anchor
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| CARD_ELEMENTS.contains(&el.value().name()))
}

/// Merge candidates sharing an id, keeping first-seen order.
pub fn dedup_offers(offers: Vec<ExtractedOffer>) -> Vec<ExtractedOffer> {
    let mut position: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ExtractedOffer> = Vec::with_capacity(offers.len());

    for offer in offers {
        match position.get(&offer.offer_id) {
            Some(&idx) => unique[idx].absorb(offer),
            None => {
                position.insert(offer.offer_id.clone(), unique.len());
                unique.push(offer);
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> Regex {
        Regex::new(r"jobs\.example/offer/(?P<id>\d+)").unwrap()
    }

    #[test]
    fn test_harvest_skips_non_matching_anchors() {
        let html = r#"
            <table><tr>
              <td><a href="https://jobs.example/offer/11">Rust dev</a><p>Acme</p></td>
              <td><a href="https://jobs.example/offer/">No id</a></td>
              <td><a href="https://jobs.example/settings">Settings</a></td>
            </tr></table>"#;

        let links = harvest_links(html, &pattern());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].id, "11");
        assert_eq!(links[0].anchor_text.as_deref(), Some("Rust dev"));
        assert_eq!(links[0].card_lines, vec!["Rust dev", "Acme"]);
    }

    #[test]
    fn test_harvest_unwraps_tracking_redirect() {
        let html = r#"<div><a href="https://click.mailer.example/track?u=https%3A%2F%2Fjobs.example%2Foffer%2F42%3Fsrc%3Dmail&amp;k=1">Voir</a></div>"#;

        let links = harvest_links(html, &pattern());
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].id, "42");
        assert_eq!(links[0].target, "https://jobs.example/offer/42?src=mail");
    }

    #[test]
    fn test_dedup_merges_and_keeps_order() {
        let mut a = ExtractedOffer::new("1", "u1");
        a.title = Some("Title".into());
        let b = ExtractedOffer::new("2", "u2");
        let mut a2 = ExtractedOffer::new("1", "u1");
        a2.company = Some("Acme".into());

        let unique = dedup_offers(vec![a, b, a2]);
        let ids: Vec<_> = unique.iter().map(|o| o.offer_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(unique[0].company.as_deref(), Some("Acme"));
    }
}
