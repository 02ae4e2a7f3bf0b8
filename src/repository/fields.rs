//! Column names shared verbatim by every storage backend, and the mapping
//! between offers and flat field maps.
//!
//! Dates are RFC 3339 strings, scores are integers, statuses are the
//! snake_case names from [`OfferStatus::as_str`].

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::domain::models::{CreationMethod, NewOffer, Offer, OfferPatch, Qualification, Scores};
use crate::domain::status::OfferStatus;

pub const ID: &str = "id";
pub const OFFER_ID: &str = "offer_id";
pub const URL: &str = "url";
pub const SOURCE: &str = "source";
pub const CREATION_METHOD: &str = "creation_method";
pub const STATUS: &str = "status";
pub const DATE_ADDED: &str = "date_added";
pub const DATE_OFFER: &str = "date_offer";
pub const TITLE: &str = "title";
pub const COMPANY: &str = "company";
pub const CITY: &str = "city";
pub const REGION: &str = "region";
pub const SALARY: &str = "salary";
pub const FULL_TEXT: &str = "full_text";
pub const SUMMARY: &str = "summary";
pub const JUSTIFICATIONS: [&str; 4] = [
    "justification_1",
    "justification_2",
    "justification_3",
    "justification_4",
];
pub const SCORE_LOCATION: &str = "score_location";
pub const SCORE_SALARY: &str = "score_salary";
pub const SCORE_CULTURE: &str = "score_culture";
pub const SCORE_QUALITY: &str = "score_quality";
pub const SCORE_OPTIONAL: [&str; 4] = [
    "score_optional_1",
    "score_optional_2",
    "score_optional_3",
    "score_optional_4",
];

/// Every stored column, row id last.
pub const COLUMNS: [&str; 27] = [
    OFFER_ID,
    URL,
    SOURCE,
    CREATION_METHOD,
    STATUS,
    DATE_ADDED,
    DATE_OFFER,
    TITLE,
    COMPANY,
    CITY,
    REGION,
    SALARY,
    FULL_TEXT,
    SUMMARY,
    JUSTIFICATIONS[0],
    JUSTIFICATIONS[1],
    JUSTIFICATIONS[2],
    JUSTIFICATIONS[3],
    SCORE_LOCATION,
    SCORE_SALARY,
    SCORE_CULTURE,
    SCORE_QUALITY,
    SCORE_OPTIONAL[0],
    SCORE_OPTIONAL[1],
    SCORE_OPTIONAL[2],
    SCORE_OPTIONAL[3],
    ID,
];

/// Fields of a brand-new record (status is always the initial one).
pub fn new_offer_fields(new: &NewOffer, date_added: DateTime<Utc>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(OFFER_ID.into(), Value::String(new.offer_id.clone()));
    map.insert(URL.into(), Value::String(new.url.clone()));
    map.insert(SOURCE.into(), Value::String(new.source.clone()));
    map.insert(
        CREATION_METHOD.into(),
        Value::String(new.creation_method.as_str().into()),
    );
    map.insert(
        STATUS.into(),
        Value::String(OfferStatus::INITIAL.as_str().into()),
    );
    map.insert(DATE_ADDED.into(), Value::String(date_added.to_rfc3339()));
    put_date(&mut map, DATE_OFFER, new.date_offer);
    put_text(&mut map, TITLE, &new.title);
    put_text(&mut map, COMPANY, &new.company);
    put_text(&mut map, CITY, &new.city);
    put_text(&mut map, REGION, &new.region);
    put_text(&mut map, SALARY, &new.salary);
    map
}

/// Fields written by a patch. Unset patch fields are absent from the map;
/// a qualification always writes all of its columns, nulls included.
pub fn patch_fields(patch: &OfferPatch) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(status) = patch.status {
        map.insert(STATUS.into(), Value::String(status.as_str().into()));
    }
    put_text(&mut map, TITLE, &patch.title);
    put_text(&mut map, COMPANY, &patch.company);
    put_text(&mut map, CITY, &patch.city);
    put_text(&mut map, REGION, &patch.region);
    put_text(&mut map, SALARY, &patch.salary);
    put_text(&mut map, FULL_TEXT, &patch.full_text);
    put_date(&mut map, DATE_OFFER, patch.date_offer);

    if let Some(q) = &patch.qualification {
        map.insert(SUMMARY.into(), opt_text(&q.summary));
        for (name, value) in JUSTIFICATIONS.iter().zip(q.justifications.iter()) {
            map.insert((*name).into(), opt_text(value));
        }
        map.insert(SCORE_LOCATION.into(), opt_score(q.scores.location));
        map.insert(SCORE_SALARY.into(), opt_score(q.scores.salary));
        map.insert(SCORE_CULTURE.into(), opt_score(q.scores.culture));
        map.insert(SCORE_QUALITY.into(), opt_score(q.scores.quality));
        for (name, value) in SCORE_OPTIONAL.iter().zip(q.scores.optional.iter()) {
            map.insert((*name).into(), opt_score(*value));
        }
    }
    map
}

/// Rebuild an offer from a field map (remote records, JSON exports).
pub fn offer_from_fields(id: impl Into<String>, map: &Map<String, Value>) -> Result<Offer> {
    let status = required_str(map, STATUS)?
        .parse::<OfferStatus>()
        .map_err(|e| anyhow!(e))?;
    let creation_method = text(map, CREATION_METHOD)
        .map(|m| m.parse::<CreationMethod>().map_err(|e| anyhow!(e)))
        .transpose()?
        .unwrap_or_default();
    let date_added = parse_datetime(required_str(map, DATE_ADDED)?)
        .with_context(|| format!("Invalid {}", DATE_ADDED))?;

    let mut justifications: [Option<String>; 4] = Default::default();
    for (slot, name) in justifications.iter_mut().zip(JUSTIFICATIONS.iter()) {
        *slot = text(map, name);
    }
    let mut optional = [None; 4];
    for (slot, name) in optional.iter_mut().zip(SCORE_OPTIONAL.iter()) {
        *slot = score(map, name);
    }

    Ok(Offer {
        id: id.into(),
        offer_id: required_str(map, OFFER_ID)?.to_string(),
        url: required_str(map, URL)?.to_string(),
        source: required_str(map, SOURCE)?.to_string(),
        creation_method,
        status,
        date_added,
        date_offer: text(map, DATE_OFFER).and_then(|d| parse_datetime(&d).ok()),
        title: text(map, TITLE),
        company: text(map, COMPANY),
        city: text(map, CITY),
        region: text(map, REGION),
        salary: text(map, SALARY),
        full_text: text(map, FULL_TEXT),
        qualification: Qualification {
            summary: text(map, SUMMARY),
            justifications,
            scores: Scores {
                location: score(map, SCORE_LOCATION),
                salary: score(map, SCORE_SALARY),
                culture: score(map, SCORE_CULTURE),
                quality: score(map, SCORE_QUALITY),
                optional,
            },
        },
    })
}

pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid timestamp: {}", s))
}

fn put_text(map: &mut Map<String, Value>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        map.insert(key.into(), Value::String(v.clone()));
    }
}

fn put_date(map: &mut Map<String, Value>, key: &str, value: Option<DateTime<Utc>>) {
    if let Some(v) = value {
        map.insert(key.into(), Value::String(v.to_rfc3339()));
    }
}

fn opt_text(value: &Option<String>) -> Value {
    value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn opt_score(value: Option<u8>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn required_str<'a>(map: &'a Map<String, Value>, key: &str) -> Result<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Missing field '{}'", key))
}

fn text(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.is_empty())
}

fn score(map: &Map<String, Value>, key: &str) -> Option<u8> {
    map.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u8::try_from(v).ok())
}
