//! # minemap core
//!
//! Listing model, location codec and predicate builder shared by the
//! server and the client.
//!
//! ```text
//! query string ──► ListingFilter ──► Predicate { sql, values } ──► store
//!                                                                   │
//! Listing ◄── location::decode ◄── ListingRecord { "POINT(lng lat)" }
//! ```
//!
//! Everything in this crate is pure and stateless.

pub mod filter;
pub mod listing;
pub mod location;
pub mod predicate;

pub use filter::{category_filter, ListingFilter, ListingQuery, Proximity, ALL_SENTINEL};
pub use listing::{
    Listing, ListingRecord, NewListing, Numeric, ValidatedListing, COOLING_TYPES,
    DEFAULT_COOLING_TYPE, DEFAULT_POWER_SOURCE, POWER_SOURCES,
};
pub use location::{decode, encode, Coordinate, PersistedPoint, SRID};
pub use predicate::{Column, Fragment, Predicate, PredicateBuilder, SqlValue};

/// Result type for minemap-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors shared by every minemap layer
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// A required field is missing or malformed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Coordinate out of range or not a number
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Persisted point text that does not parse
    #[error("Malformed location: {0:?}")]
    MalformedLocation(String),

    /// Underlying persistence failure
    #[error("Store error: {0}")]
    Store(String),
}

impl Error {
    /// Caller faults (4xx) as opposed to server faults (5xx)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::InvalidCoordinate(_))
    }
}
