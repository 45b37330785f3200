//! Listing repository
//!
//! The read path builds a predicate and decodes every row's location. The
//! write path validates a draft, encodes its location and inserts it once.

use std::sync::Arc;

use minemap_core::{Listing, ListingFilter, NewListing, Predicate, Result};
use tracing::{debug, info, warn};

use crate::store::ListingStore;

/// Query and create listings over any [`ListingStore`]
#[derive(Clone)]
pub struct ListingRepository {
    store: Arc<dyn ListingStore>,
}

impl ListingRepository {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self { store }
    }

    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Listings matching the filter, in store order
    pub async fn query(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let predicate = Predicate::from_filter(filter);
        debug!(
            predicate = %predicate.to_sql(),
            values = predicate.values().len(),
            "querying listings"
        );

        let records = self.store.select(&predicate).await?;
        let listings = records
            .into_iter()
            .map(|record| {
                let id = record.id;
                Listing::try_from(record).inspect_err(|e| warn!(id, "listing has {e}"))
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(count = listings.len(), "listings returned");
        Ok(listings)
    }

    /// Validate, insert and return the stored listing
    pub async fn create(&self, draft: &NewListing) -> Result<Listing> {
        let validated = draft.validate()?;
        let record = self.store.insert(&validated).await?;
        let listing = Listing::try_from(record)?;
        info!(id = listing.id, title = %listing.title, "listing created");
        Ok(listing)
    }
}
