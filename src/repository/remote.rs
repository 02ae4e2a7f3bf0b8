//! Offer repository on a hosted relational-table service.
//!
//! Talks to a records API (`GET/POST {base}/{table}`, `PATCH {base}/{table}/{id}`)
//! with bearer-token auth. Records carry the shared column names from
//! [`fields`] under `fields`; the service's own record id becomes the offer's
//! row id.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::{NewOffer, Offer, OfferPatch};
use crate::domain::status::OfferStatus;
use crate::repository::{fields, OfferRepository, UpsertOutcome};
use crate::service::retry::retry_once;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
enum RemoteError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

impl RemoteError {
    fn is_transient(&self) -> bool {
        match self {
            RemoteError::Network(_) => true,
            RemoteError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

pub struct RemoteTableRepository {
    client: Client,
    base_url: String,
    table: String,
    token: String,
    retry_delay: Duration,
}

impl RemoteTableRepository {
    pub fn new(
        base_url: impl Into<String>,
        table: impl Into<String>,
        token: impl Into<String>,
        retry_delay: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build remote table client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            table: table.into(),
            token: token.into(),
            retry_delay,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/{}", self.base_url, self.table)
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> std::result::Result<Value, RemoteError> {
        let mut request = self
            .client
            .request(method, url)
            .bearer_auth(&self.token)
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        if status == StatusCode::NO_CONTENT {
            return Ok(Value::Null);
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| RemoteError::Network(format!("invalid JSON body: {}", e)))
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        retry_once(self.retry_delay, RemoteError::is_transient, move || {
            self.send_once(method.clone(), url, query, body)
        })
        .await
        .map_err(|e| anyhow!(e))
    }

    /// Fetch every record matching `formula`, following pagination offsets.
    async fn list(&self, formula: Option<String>) -> Result<Vec<Offer>> {
        let url = self.table_url();
        let mut offers = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(f) = &formula {
                query.push(("filterByFormula", f.clone()));
            }
            if let Some(o) = &offset {
                query.push(("offset", o.clone()));
            }

            let body = self
                .send(Method::GET, &url, &query, None)
                .await
                .with_context(|| format!("Failed to list records from {}", self.table))?;
            let page: RecordPage =
                serde_json::from_value(body).context("Unexpected record list payload")?;

            for record in page.records {
                offers.push(
                    fields::offer_from_fields(record.id.clone(), &record.fields)
                        .with_context(|| format!("Invalid record {}", record.id))?,
                );
            }

            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }

        offers.sort_by_key(|o| o.date_added);
        Ok(offers)
    }
}

/// Quote a value for use inside a filter formula string literal.
fn formula_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[async_trait]
impl OfferRepository for RemoteTableRepository {
    async fn upsert(&self, offer: &NewOffer) -> Result<UpsertOutcome> {
        if let Some(existing) = self
            .find_by_identity(&offer.source, &offer.offer_id, &offer.url)
            .await?
        {
            return Ok(UpsertOutcome::AlreadyPresent(existing));
        }

        let body = json!({
            "records": [{ "fields": fields::new_offer_fields(offer, Utc::now()) }]
        });
        // A create is never retried: the service may have committed the record
        // before the failure surfaced, and it has no unique constraint.
        let response = self
            .send_once(Method::POST, &self.table_url(), &[], Some(&body))
            .await
            .map_err(|e| anyhow!(e))
            .context("Failed to create remote record")?;

        let id = response["records"][0]["id"]
            .as_str()
            .context("Remote create response carries no record id")?
            .to_string();

        tracing::info!("Created remote offer {} ({}/{})", id, offer.source, offer.offer_id);
        Ok(UpsertOutcome::Created(id))
    }

    async fn find_by_identity(
        &self,
        source: &str,
        offer_id: &str,
        url: &str,
    ) -> Result<Option<Offer>> {
        let formula = format!(
            "AND({{{}}}={}, OR({{{}}}={}, {{{}}}={}))",
            fields::SOURCE,
            formula_literal(source),
            fields::OFFER_ID,
            formula_literal(offer_id),
            fields::URL,
            formula_literal(url),
        );
        Ok(self.list(Some(formula)).await?.into_iter().next())
    }

    async fn get_by_status(&self, status: OfferStatus) -> Result<Vec<Offer>> {
        let formula = format!("{{{}}}={}", fields::STATUS, formula_literal(status.as_str()));
        self.list(Some(formula)).await
    }

    async fn update_by_id(&self, id: &str, patch: &OfferPatch) -> Result<()> {
        let map = fields::patch_fields(patch);
        if map.is_empty() {
            return Ok(());
        }

        let url = format!("{}/{}", self.table_url(), id);
        let body = json!({ "fields": map });
        self.send(Method::PATCH, &url, &[], Some(&body))
            .await
            .with_context(|| format!("Failed to update remote offer {}", id))?;
        Ok(())
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: OfferStatus,
        patch: &OfferPatch,
    ) -> Result<bool> {
        let url = format!("{}/{}", self.table_url(), id);
        let body = self
            .send(Method::GET, &url, &[], None)
            .await
            .with_context(|| format!("Failed to read remote offer {}", id))?;
        let record: Record =
            serde_json::from_value(body).context("Unexpected record payload")?;

        let current = record.fields.get(fields::STATUS).and_then(Value::as_str);
        if current != Some(expected.as_str()) {
            tracing::debug!(
                "Remote offer {} is {:?}, expected {}; not updated",
                id,
                current,
                expected
            );
            return Ok(false);
        }

        self.update_by_id(id, patch).await?;
        Ok(true)
    }

    async fn get_all(&self) -> Result<Vec<Offer>> {
        self.list(None).await
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
