//! Application state for the web server

use std::sync::Arc;

use minemap_postgis::{ListingRepository, ListingStore};

/// Shared across handlers; the repository holds no per-request state
pub struct AppState {
    pub repository: ListingRepository,
}

impl AppState {
    pub fn new(store: Arc<dyn ListingStore>) -> Self {
        Self {
            repository: ListingRepository::new(store),
        }
    }
}
