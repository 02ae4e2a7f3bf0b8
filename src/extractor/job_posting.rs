//! schema.org `JobPosting` extraction from embedded JSON-LD.

use chrono::{DateTime, NaiveDate, Utc};
use scraper::{Html, Selector};
use serde_json::Value;
use std::sync::OnceLock;

use super::text::{clean_inline, html_to_text};
use crate::domain::models::EnrichedContent;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobPosting {
    pub title: Option<String>,
    /// Description converted to plain text.
    pub description: String,
    pub company: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub salary: Option<String>,
    pub date_posted: Option<DateTime<Utc>>,
}

impl JobPosting {
    pub fn into_content(self) -> EnrichedContent {
        EnrichedContent {
            full_text: self.description,
            title: self.title,
            company: self.company,
            city: self.city,
            region: self.region,
            salary: self.salary,
            date_offer: self.date_posted,
        }
    }
}

/// First `JobPosting` object found in the page's `application/ld+json` scripts.
/// Unparseable scripts are skipped.
pub fn find_job_posting(html: &Html) -> Option<JobPosting> {
    static SELECTOR: OnceLock<Selector> = OnceLock::new();
    let selector = SELECTOR
        .get_or_init(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());

    html.select(selector)
        .filter_map(|script| {
            let raw = script.text().collect::<String>();
            serde_json::from_str::<Value>(raw.trim()).ok()
        })
        .find_map(|value| find_posting_node(&value).map(parse_posting))
}

fn find_posting_node(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_posting_node),
        Value::Object(map) => {
            if is_job_posting(map.get("@type")) {
                return Some(value);
            }
            map.get("@graph").and_then(find_posting_node)
        }
        _ => None,
    }
}

fn is_job_posting(kind: Option<&Value>) -> bool {
    match kind {
        Some(Value::String(s)) => s == "JobPosting",
        Some(Value::Array(kinds)) => kinds.iter().any(|k| k.as_str() == Some("JobPosting")),
        _ => false,
    }
}

fn parse_posting(node: &Value) -> JobPosting {
    let description = node["description"]
        .as_str()
        .map(description_text)
        .unwrap_or_default();

    let company = match &node["hiringOrganization"] {
        Value::String(name) => clean_inline(name),
        org => org["name"].as_str().and_then(clean_inline),
    };

    let address = first(&node["jobLocation"]).map(|location| &location["address"]);
    let address_field = |key: &str| {
        address
            .and_then(|a| a[key].as_str())
            .and_then(clean_inline)
    };

    JobPosting {
        title: node["title"].as_str().and_then(clean_inline),
        description,
        company,
        city: address_field("addressLocality"),
        region: address_field("addressRegion"),
        salary: salary_text(&node["baseSalary"]),
        date_posted: node["datePosted"].as_str().and_then(parse_date),
    }
}

fn first(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.first(),
        Value::Null => None,
        other => Some(other),
    }
}

// Descriptions are HTML, sometimes entity-escaped a second time.
fn description_text(raw: &str) -> String {
    let text = html_to_text(raw);
    if text.contains('<') && text.contains('>') {
        html_to_text(&text)
    } else {
        text
    }
}

fn salary_text(salary: &Value) -> Option<String> {
    let amount = match salary {
        Value::Null => return None,
        Value::String(s) => return clean_inline(s),
        Value::Number(n) => return Some(n.to_string()),
        other => other,
    };

    let value = &amount["value"];
    let range = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        Value::Object(_) => {
            let min = number_text(&value["minValue"]);
            let max = number_text(&value["maxValue"]);
            match (min, max, number_text(&value["value"])) {
                (Some(min), Some(max), _) if min != max => format!("{} - {}", min, max),
                (Some(min), _, _) => min,
                (None, Some(max), _) => max,
                (None, None, Some(single)) => single,
                (None, None, None) => return None,
            }
        }
        _ => return None,
    };

    let mut text = range;
    if let Some(currency) = amount["currency"].as_str() {
        text.push(' ');
        text.push_str(currency);
    }
    if let Some(unit) = value["unitText"].as_str() {
        text.push_str(" / ");
        text.push_str(unit);
    }
    Some(text)
}

fn number_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// RFC 3339 timestamps or plain `YYYY-MM-DD` dates.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
