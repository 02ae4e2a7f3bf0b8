//! Qualification prompt and response parsing.

use serde_json::{Map, Value};

use crate::domain::models::{Offer, Qualification, Scores, MAX_JUSTIFICATION_CHARS, MAX_SCORE};
use crate::extractor::truncate_chars;
use crate::service::ai::AiError;

/// Offer text sent to the model is cut at this many characters.
pub const MAX_PROMPT_TEXT_CHARS: usize = 12_000;

pub const DEFAULT_CRITERIA: &str = "\
- Localisation : poste en présentiel à moins d'une heure de trajet, ou télétravail.
- Salaire : rémunération annoncée cohérente avec une expérience confirmée.
- Culture : entreprise transparente, équipe technique identifiée.
- Rédhibitoire : missions sans développement, déplacements fréquents.";

const RESPONSE_CONTRACT: &str = r#"Réponds uniquement avec un objet JSON de la forme :
{
  "Resume": "résumé de l'offre en 3 phrases",
  "JustificationRehibitoire1": "critère rédhibitoire rencontré, ou null",
  "JustificationRehibitoire2": null,
  "JustificationRehibitoire3": null,
  "JustificationRehibitoire4": null,
  "ScoreLocalisation": 0,
  "ScoreSalaire": 0,
  "ScoreCulture": 0,
  "ScoreQualiteOffre": 0,
  "ScoreOptionnel1": null,
  "ScoreOptionnel2": null,
  "ScoreOptionnel3": null,
  "ScoreOptionnel4": null
}
Les scores sont des entiers de 0 à 20. N'invente aucune information absente de l'offre."#;

const JUSTIFICATION_KEYS: [&str; 4] = [
    "JustificationRehibitoire1",
    "JustificationRehibitoire2",
    "JustificationRehibitoire3",
    "JustificationRehibitoire4",
];

const OPTIONAL_SCORE_KEYS: [&str; 4] = [
    "ScoreOptionnel1",
    "ScoreOptionnel2",
    "ScoreOptionnel3",
    "ScoreOptionnel4",
];

pub fn system_prompt(criteria: &str) -> String {
    format!(
        "Tu es un assistant de recherche d'emploi. Tu qualifies une offre d'emploi \
         selon les critères du candidat.\n\nCritères du candidat :\n{}\n\n{}",
        criteria.trim(),
        RESPONSE_CONTRACT
    )
}

pub fn user_prompt(offer: &Offer) -> String {
    let fields = [
        ("Titre", offer.title.as_deref()),
        ("Entreprise", offer.company.as_deref()),
        ("Ville", offer.city.as_deref()),
        ("Région", offer.region.as_deref()),
        ("Salaire", offer.salary.as_deref()),
        ("Source", Some(offer.source.as_str())),
        ("URL", Some(offer.url.as_str())),
    ];

    let mut prompt: String = fields
        .iter()
        .filter_map(|(label, value)| {
            value
                .filter(|v| !v.trim().is_empty())
                .map(|v| format!("{} : {}\n", label, v.trim()))
        })
        .collect();

    if let Some(text) = offer.full_text.as_deref().filter(|t| !t.trim().is_empty()) {
        prompt.push_str("\nTexte de l'offre :\n");
        prompt.push_str(&truncate_chars(text, MAX_PROMPT_TEXT_CHARS));
    }
    prompt
}

/// Drop a surrounding markdown code fence, if any.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.trim_end();
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    // Info string (```json) may sit on its own line or inline
    inner
        .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
        .trim()
}

/// Parse the model's answer. Out-of-range or non-integer scores are dropped,
/// justifications are truncated.
pub fn parse_qualification(text: &str) -> Result<Qualification, AiError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| AiError::InvalidResponse(format!("not JSON: {}", e)))?;
    let Value::Object(map) = value else {
        return Err(AiError::InvalidResponse("expected a JSON object".into()));
    };

    let qualification = Qualification {
        summary: text_field(&map, "Resume"),
        justifications: JUSTIFICATION_KEYS.map(|key| {
            text_field(&map, key).map(|t| truncate_chars(&t, MAX_JUSTIFICATION_CHARS))
        }),
        scores: Scores {
            location: score_field(&map, "ScoreLocalisation"),
            salary: score_field(&map, "ScoreSalaire"),
            culture: score_field(&map, "ScoreCulture"),
            quality: score_field(&map, "ScoreQualiteOffre"),
            optional: OPTIONAL_SCORE_KEYS.map(|key| score_field(&map, key)),
        },
    };

    if qualification.is_empty() {
        return Err(AiError::InvalidResponse("no qualification field present".into()));
    }
    Ok(qualification)
}

fn text_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn score_field(map: &Map<String, Value>, key: &str) -> Option<u8> {
    let value = map.get(key)?;
    match value.as_i64() {
        Some(score) if (0..=MAX_SCORE).contains(&score) => u8::try_from(score).ok(),
        _ => {
            if !value.is_null() {
                tracing::debug!("[ANALYSIS] Dropping {} = {}", key, value);
            }
            None
        }
    }
}
