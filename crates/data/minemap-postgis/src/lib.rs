//! Listing storage
//!
//! ```text
//! ListingRepository ── query / create
//!        │  builds Predicate, validates drafts, decodes locations
//!        ▼
//!  dyn ListingStore ── select / insert
//!        ├── PgListingStore      (PostGIS via sqlx)
//!        └── MemoryListingStore  (in-process, same predicate semantics)
//! ```

pub mod memory;
pub mod pg;
pub mod repository;
pub mod store;

pub use memory::MemoryListingStore;
pub use pg::PgListingStore;
pub use repository::ListingRepository;
pub use store::ListingStore;
