//! PostGIS-backed listing store
//!
//! `location` is a `GEOGRAPHY(POINT, 4326)` column. Reads print it with
//! `ST_AsText` at 17 digits, enough for every `f64` to survive the trip.
//! Writes parse the codec's EWKT with `ST_GeogFromText`.

use async_trait::async_trait;
use minemap_core::{Error, ListingRecord, Predicate, Result, SqlValue, ValidatedListing};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use tracing::{debug, error, info};

use crate::store::ListingStore;

const RETURNED_COLUMNS: &str = "id, title, description, electricity_rate, power_source, \
     cooling_type, ST_AsText(location::geometry, 17) AS location";

const SCHEMA: [&str; 3] = [
    "CREATE EXTENSION IF NOT EXISTS postgis",
    r#"
    CREATE TABLE IF NOT EXISTS listings (
        id BIGSERIAL PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        electricity_rate DOUBLE PRECISION NOT NULL,
        power_source TEXT NOT NULL,
        cooling_type TEXT NOT NULL,
        location GEOGRAPHY(POINT, 4326) NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS listings_location_idx ON listings USING GIST (location)",
];

/// PostgreSQL + PostGIS listing store
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| store_error("connect", e))?;
        info!("Connected to PostGIS ({max_connections} max connections)");
        Ok(Self::new(pool))
    }

    /// Create the PostGIS extension, `listings` table and spatial index
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| store_error("ensure schema", e))?;
        }
        debug!("listings schema ready");
        Ok(())
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn select(&self, predicate: &Predicate) -> Result<Vec<ListingRecord>> {
        let sql = select_sql(predicate);
        let rows = predicate
            .values()
            .iter()
            .fold(sqlx::query(&sql), bind_value)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| store_error("select", e))?;

        rows.iter()
            .map(record_from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| store_error("read row", e))
    }

    async fn insert(&self, listing: &ValidatedListing) -> Result<ListingRecord> {
        let sql = insert_sql();
        let row = sqlx::query(&sql)
            .bind(&listing.title)
            .bind(&listing.description)
            .bind(listing.electricity_rate)
            .bind(listing.location.as_str())
            .bind(&listing.power_source)
            .bind(&listing.cooling_type)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| store_error("insert", e))?;

        record_from_row(&row).map_err(|e| store_error("read inserted row", e))
    }

    fn backend(&self) -> &'static str {
        "postgis"
    }
}

fn select_sql(predicate: &Predicate) -> String {
    format!(
        "SELECT {RETURNED_COLUMNS} FROM listings WHERE {}",
        predicate.to_sql()
    )
}

/// Bind order: title, description, rate, EWKT location, power, cooling
fn insert_sql() -> String {
    format!(
        "INSERT INTO listings \
         (title, description, electricity_rate, location, power_source, cooling_type) \
         VALUES ($1, $2, $3, ST_GeogFromText($4), $5, $6) \
         RETURNING {RETURNED_COLUMNS}"
    )
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &SqlValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        SqlValue::Float(v) => query.bind(*v),
        SqlValue::Text(v) => query.bind(v.clone()),
    }
}

fn record_from_row(row: &PgRow) -> std::result::Result<ListingRecord, sqlx::Error> {
    Ok(ListingRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        electricity_rate: row.try_get("electricity_rate")?,
        power_source: row.try_get("power_source")?,
        cooling_type: row.try_get("cooling_type")?,
        location: row.try_get("location")?,
    })
}

/// Log full detail here; callers only see the summary.
fn store_error(operation: &str, err: sqlx::Error) -> Error {
    error!(error = %err, "listing store {operation} failed");
    Error::Store(format!("{operation} failed"))
}
