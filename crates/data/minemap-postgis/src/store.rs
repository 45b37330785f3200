//! Store trait

use async_trait::async_trait;
use minemap_core::{ListingRecord, Predicate, Result, ValidatedListing};

/// Backing store for listings.
///
/// Implementations return rows with the location in untagged point text
/// (`POINT(lng lat)`), in the store's native order.
#[async_trait]
pub trait ListingStore: Send + Sync {
    /// Rows matching the predicate
    async fn select(&self, predicate: &Predicate) -> Result<Vec<ListingRecord>>;

    /// Insert one listing atomically and return the stored row
    async fn insert(&self, listing: &ValidatedListing) -> Result<ListingRecord>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}
