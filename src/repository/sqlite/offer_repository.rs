//! Offer repository on the embedded SQLite store.
//!
//! Statements are assembled from the shared column names in
//! [`crate::repository::fields`]; values travel through the same field maps
//! the remote backend uses, so both stores agree on representation.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool};

use crate::domain::models::{NewOffer, Offer, OfferPatch};
use crate::domain::status::OfferStatus;
use crate::repository::{fields, OfferRepository, UpsertOutcome};

pub struct SqliteOfferRepository {
    pool: SqlitePool,
}

impl SqliteOfferRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn select(filter: &str) -> String {
        format!(
            "SELECT {} FROM offers {} ORDER BY date_added ASC, rowid ASC",
            fields::COLUMNS.join(", "),
            filter
        )
    }

    async fn insert_fields(&self, map: &Map<String, Value>) -> Result<()> {
        let columns: Vec<&str> = map.keys().map(String::as_str).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO offers ({}) VALUES ({})",
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for value in map.values() {
            query = bind_value(query, value);
        }

        query
            .execute(&self.pool)
            .await
            .context("Failed to insert offer")?;
        Ok(())
    }
}

#[async_trait]
impl OfferRepository for SqliteOfferRepository {
    async fn upsert(&self, offer: &NewOffer) -> Result<UpsertOutcome> {
        if let Some(existing) = self
            .find_by_identity(&offer.source, &offer.offer_id, &offer.url)
            .await?
        {
            tracing::debug!(
                "Offer {}/{} already stored as {}",
                offer.source,
                offer.offer_id,
                existing.id
            );
            return Ok(UpsertOutcome::AlreadyPresent(existing));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut map = fields::new_offer_fields(offer, Utc::now());
        map.insert(fields::ID.into(), Value::String(id.clone()));

        self.insert_fields(&map).await?;

        tracing::info!("Created offer {} ({}/{})", id, offer.source, offer.offer_id);
        Ok(UpsertOutcome::Created(id))
    }

    async fn find_by_identity(
        &self,
        source: &str,
        offer_id: &str,
        url: &str,
    ) -> Result<Option<Offer>> {
        let sql = Self::select("WHERE source = ? AND (offer_id = ? OR url = ?)");
        let row = sqlx::query(&sql)
            .bind(source)
            .bind(offer_id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to look up offer identity")?;

        row.as_ref().map(offer_from_row).transpose()
    }

    async fn get_by_status(&self, status: OfferStatus) -> Result<Vec<Offer>> {
        let sql = Self::select("WHERE status = ?");
        let rows = sqlx::query(&sql)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("Failed to fetch offers with status {}", status))?;

        rows.iter().map(offer_from_row).collect()
    }

    async fn update_by_id(&self, id: &str, patch: &OfferPatch) -> Result<()> {
        let map = fields::patch_fields(patch);
        if map.is_empty() {
            return Ok(());
        }

        let assignments: Vec<String> = map.keys().map(|k| format!("{} = ?", k)).collect();
        let sql = format!("UPDATE offers SET {} WHERE id = ?", assignments.join(", "));

        let mut query = sqlx::query(&sql);
        for value in map.values() {
            query = bind_value(query, value);
        }

        let result = query
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update offer {}", id))?;

        if result.rows_affected() == 0 {
            bail!("Offer not found: {}", id);
        }

        Ok(())
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: OfferStatus,
        patch: &OfferPatch,
    ) -> Result<bool> {
        let map = fields::patch_fields(patch);
        if map.is_empty() {
            return Ok(true);
        }

        let assignments: Vec<String> = map.keys().map(|k| format!("{} = ?", k)).collect();
        let sql = format!(
            "UPDATE offers SET {} WHERE id = ? AND status = ?",
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for value in map.values() {
            query = bind_value(query, value);
        }

        let result = query
            .bind(id)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to update offer {}", id))?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM offers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to look up offer {}", id))?;
        if exists.is_none() {
            bail!("Offer not found: {}", id);
        }
        Ok(false)
    }

    async fn get_all(&self) -> Result<Vec<Offer>> {
        let sql = Self::select("");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch offers")?;

        rows.iter().map(offer_from_row).collect()
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn offer_from_row(row: &SqliteRow) -> Result<Offer> {
    let mut map = Map::new();
    for column in fields::COLUMNS {
        let value = if column.starts_with("score_") {
            row.try_get::<Option<i64>, _>(column)
                .with_context(|| format!("Failed to read column {}", column))?
                .map(Value::from)
        } else {
            row.try_get::<Option<String>, _>(column)
                .with_context(|| format!("Failed to read column {}", column))?
                .map(Value::String)
        };
        map.insert(column.to_string(), value.unwrap_or(Value::Null));
    }

    let id: String = row.try_get(fields::ID).context("Failed to read offer id")?;
    fields::offer_from_fields(id, &map)
}
