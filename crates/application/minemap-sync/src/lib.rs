//! # minemap sync
//!
//! The calling side of the listing service.
//!
//! ```text
//! filter edits ──► SyncHandle ──► driver task ──► machine::SyncState::apply
//!                                     │                    │
//!                                     │◄──── Effect::Fetch ┘
//!                                     ▼
//!                               ListingsApi (HTTP) ──► Event::FetchSucceeded
//! ```
//!
//! - Filter changes are debounced; only the latest snapshot is ever sent
//! - A superseded fetch never overwrites newer results
//! - Created listings are appended locally without a refetch

pub mod api;
pub mod driver;
pub mod geocode;
pub mod machine;

pub use api::{HttpListingsApi, ListingsApi};
pub use driver::{spawn, SyncHandle, SyncSnapshot};
pub use geocode::{GeocodeCandidate, NominatimClient};
pub use machine::{Effect, Event, FilterState, Phase, Region, SyncState, DEFAULT_DEBOUNCE};

/// Result type for minemap-sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur on the client side
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Core(#[from] minemap_core::Error),

    #[error("Sync controller stopped")]
    Closed,
}
