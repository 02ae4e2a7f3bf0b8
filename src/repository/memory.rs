//! Process-local offer store.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::models::{NewOffer, Offer, OfferPatch};
use crate::domain::status::OfferStatus;
use crate::repository::{OfferRepository, UpsertOutcome};

/// Offers keyed by row id; a sequence number keeps insertion order stable.
#[derive(Default)]
pub struct MemoryOfferRepository {
    offers: DashMap<String, (u64, Offer)>,
    seq: AtomicU64,
}

impl MemoryOfferRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a fully-formed offer (tests, imports).
    pub fn insert_offer(&self, offer: Offer) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.offers.insert(offer.id.clone(), (seq, offer));
    }

    fn sorted(&self, keep: impl Fn(&Offer) -> bool) -> Vec<Offer> {
        let mut rows: Vec<(u64, Offer)> = self
            .offers
            .iter()
            .filter(|entry| keep(&entry.value().1))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, offer)| offer).collect()
    }
}

#[async_trait]
impl OfferRepository for MemoryOfferRepository {
    async fn upsert(&self, offer: &NewOffer) -> Result<UpsertOutcome> {
        if let Some(existing) = self
            .find_by_identity(&offer.source, &offer.offer_id, &offer.url)
            .await?
        {
            return Ok(UpsertOutcome::AlreadyPresent(existing));
        }

        let id = uuid::Uuid::new_v4().to_string();
        self.insert_offer(Offer::from_new(id.clone(), offer, Utc::now()));
        Ok(UpsertOutcome::Created(id))
    }

    async fn find_by_identity(
        &self,
        source: &str,
        offer_id: &str,
        url: &str,
    ) -> Result<Option<Offer>> {
        Ok(self
            .sorted(|o| o.same_identity(source, offer_id, url))
            .into_iter()
            .next())
    }

    async fn get_by_status(&self, status: OfferStatus) -> Result<Vec<Offer>> {
        Ok(self.sorted(|o| o.status == status))
    }

    async fn update_by_id(&self, id: &str, patch: &OfferPatch) -> Result<()> {
        match self.offers.get_mut(id) {
            Some(mut entry) => {
                entry.value_mut().1.apply_patch(patch);
                Ok(())
            }
            None => bail!("Offer not found: {}", id),
        }
    }

    async fn update_if_status(
        &self,
        id: &str,
        expected: OfferStatus,
        patch: &OfferPatch,
    ) -> Result<bool> {
        match self.offers.get_mut(id) {
            Some(mut entry) => {
                let offer = &mut entry.value_mut().1;
                if offer.status != expected {
                    return Ok(false);
                }
                offer.apply_patch(patch);
                Ok(true)
            }
            None => bail!("Offer not found: {}", id),
        }
    }

    async fn get_all(&self) -> Result<Vec<Offer>> {
        Ok(self.sorted(|_| true))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
