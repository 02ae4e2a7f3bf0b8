//! Offer entities - behavior lives WITH data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::status::OfferStatus;

/// Maximum length (in characters) of a stored disqualifying-criterion justification.
pub const MAX_JUSTIFICATION_CHARS: usize = 500;

/// Scores are integers on a 0-20 scale.
pub const MAX_SCORE: i64 = 20;

// ====== Enums ======

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CreationMethod {
    #[default]
    Email,
    ManualImport,
}

impl CreationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreationMethod::Email => "email",
            CreationMethod::ManualImport => "manual_import",
        }
    }
}

impl fmt::Display for CreationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CreationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "email" => Ok(CreationMethod::Email),
            "manual_import" | "manual" => Ok(CreationMethod::ManualImport),
            other => Err(format!("unknown creation method: {}", other)),
        }
    }
}

// ====== Plugin outputs ======

/// Offer stub pulled out of an alert email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedOffer {
    pub offer_id: String,
    pub url: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub city: Option<String>,
    pub salary: Option<String>,
}

impl ExtractedOffer {
    pub fn new(offer_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            offer_id: offer_id.into(),
            url: url.into(),
            title: None,
            company: None,
            city: None,
            salary: None,
        }
    }

    /// Fill fields still empty on `self` from `other` (same offer seen twice in one email).
    pub fn absorb(&mut self, other: ExtractedOffer) {
        fill(&mut self.title, other.title);
        fill(&mut self.company, other.company);
        fill(&mut self.city, other.city);
        fill(&mut self.salary, other.salary);
    }
}

/// Qualification-ready content obtained from a posting page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichedContent {
    pub full_text: String,
    pub title: Option<String>,
    pub company: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub salary: Option<String>,
    pub date_offer: Option<DateTime<Utc>>,
}

// ====== Qualification ======

/// Scores on a 0-20 scale. `None` means absent or rejected as out of range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scores {
    pub location: Option<u8>,
    pub salary: Option<u8>,
    pub culture: Option<u8>,
    pub quality: Option<u8>,
    pub optional: [Option<u8>; 4],
}

/// Output of the AI analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualification {
    pub summary: Option<String>,
    pub justifications: [Option<String>; 4],
    pub scores: Scores,
}

impl Qualification {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.justifications.iter().all(Option::is_none)
            && self.scores == Scores::default()
    }
}

// ====== Rich Entity: Offer ======

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Offer {
    /// Storage row id (backend-assigned).
    pub id: String,
    /// Source-specific external id.
    pub offer_id: String,
    pub url: String,
    pub source: String,
    pub creation_method: CreationMethod,
    pub status: OfferStatus,
    pub date_added: DateTime<Utc>,
    pub date_offer: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub salary: Option<String>,
    pub full_text: Option<String>,
    pub qualification: Qualification,
}

impl Offer {
    /// Materialise a new record at the initial lifecycle state.
    pub fn from_new(id: impl Into<String>, new: &NewOffer, date_added: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            offer_id: new.offer_id.clone(),
            url: new.url.clone(),
            source: new.source.clone(),
            creation_method: new.creation_method,
            status: OfferStatus::INITIAL,
            date_added,
            date_offer: new.date_offer,
            title: new.title.clone(),
            company: new.company.clone(),
            city: new.city.clone(),
            region: new.region.clone(),
            salary: new.salary.clone(),
            full_text: None,
            qualification: Qualification::default(),
        }
    }

    /// Identity check used for deduplication: same source and same id or URL.
    pub fn same_identity(&self, source: &str, offer_id: &str, url: &str) -> bool {
        self.source == source && (self.offer_id == offer_id || self.url == url)
    }

    /// Apply a patch in place. Only fields set on the patch are written.
    pub fn apply_patch(&mut self, patch: &OfferPatch) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        set(&mut self.title, &patch.title);
        set(&mut self.company, &patch.company);
        set(&mut self.city, &patch.city);
        set(&mut self.region, &patch.region);
        set(&mut self.salary, &patch.salary);
        set(&mut self.full_text, &patch.full_text);
        if patch.date_offer.is_some() {
            self.date_offer = patch.date_offer;
        }
        if let Some(q) = &patch.qualification {
            self.qualification = q.clone();
        }
    }
}

/// A candidate offer ready to be written at the initial state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewOffer {
    pub offer_id: String,
    pub url: String,
    pub source: String,
    pub creation_method: CreationMethod,
    pub date_offer: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub salary: Option<String>,
}

impl NewOffer {
    /// Build from an email extraction result. An empty id falls back to the URL.
    pub fn from_extracted(
        extracted: ExtractedOffer,
        source: &str,
        creation_method: CreationMethod,
        date_offer: Option<DateTime<Utc>>,
    ) -> Self {
        let offer_id = if extracted.offer_id.trim().is_empty() {
            extracted.url.clone()
        } else {
            extracted.offer_id
        };

        Self {
            offer_id,
            url: extracted.url,
            source: source.to_string(),
            creation_method,
            date_offer,
            title: extracted.title,
            company: extracted.company,
            city: extracted.city,
            region: None,
            salary: extracted.salary,
        }
    }
}

/// Partial update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferPatch {
    pub status: Option<OfferStatus>,
    pub title: Option<String>,
    pub company: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub salary: Option<String>,
    pub full_text: Option<String>,
    pub date_offer: Option<DateTime<Utc>>,
    pub qualification: Option<Qualification>,
}

impl OfferPatch {
    pub fn status(status: OfferStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == OfferPatch::default()
    }
}

fn fill(slot: &mut Option<String>, value: Option<String>) {
    if slot.is_none() {
        *slot = value;
    }
}

fn set(slot: &mut Option<String>, value: &Option<String>) {
    if let Some(v) = value {
        *slot = Some(v.clone());
    }
}
