//! Offer persistence port.
//!
//! Three interchangeable backends implement [`OfferRepository`]:
//! - `sqlite`: embedded single-file store (local-first default)
//! - `remote`: hosted relational-table service for shared dashboards
//! - `memory`: process-local map, used by tests and dry runs
//!
//! All backends use the column names in [`fields`], so the pipeline never
//! branches on backend identity.

use anyhow::Result;
use async_trait::async_trait;

use crate::domain::models::{NewOffer, Offer, OfferPatch};
use crate::domain::status::OfferStatus;

pub mod fields;
pub mod memory;
pub mod remote;
pub mod sqlite;

pub use memory::MemoryOfferRepository;
pub use remote::RemoteTableRepository;
pub use sqlite::SqliteOfferRepository;

/// Result of [`OfferRepository::upsert`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    /// A new record was written at the initial status; carries its row id.
    Created(String),
    /// The (source, id-or-url) identity already existed; the stored record is left untouched.
    AlreadyPresent(Offer),
}

impl UpsertOutcome {
    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

#[async_trait]
pub trait OfferRepository: Send + Sync {
    /// Insert at `AwaitingContent` unless the identity is already known.
    async fn upsert(&self, offer: &NewOffer) -> Result<UpsertOutcome>;

    /// Look up by (source, offer id or URL).
    async fn find_by_identity(&self, source: &str, offer_id: &str, url: &str)
        -> Result<Option<Offer>>;

    /// All offers at `status`, oldest first.
    async fn get_by_status(&self, status: OfferStatus) -> Result<Vec<Offer>>;

    /// Write the set fields of `patch` on the record with row id `id`.
    async fn update_by_id(&self, id: &str, patch: &OfferPatch) -> Result<()>;

    /// Like [`update_by_id`](Self::update_by_id), but only while the stored
    /// status is still `expected`. Returns `false` when the status has moved
    /// (e.g. a manual `Ignored`) and nothing was written.
    async fn update_if_status(
        &self,
        id: &str,
        expected: OfferStatus,
        patch: &OfferPatch,
    ) -> Result<bool>;

    /// Full scan, oldest first.
    async fn get_all(&self) -> Result<Vec<Offer>>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}
