//! In-memory listing store
//!
//! Interprets a [`Predicate`] the way PostGIS would run its SQL: every
//! fragment reads its values from the placeholder positions it names.
//! Distance is great-circle (haversine) on a mean-radius sphere.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use minemap_core::{
    location, Column, Coordinate, Error, Fragment, ListingRecord, Predicate, Result, SqlValue,
    ValidatedListing,
};
use tokio::sync::RwLock;

use crate::store::ListingStore;

/// IUGG mean Earth radius
const EARTH_RADIUS_M: f64 = 6_371_008.8;

#[derive(Debug, Clone)]
struct Row {
    id: i64,
    title: String,
    description: String,
    electricity_rate: f64,
    power_source: String,
    cooling_type: String,
    location: Coordinate,
}

impl Row {
    fn cell(&self, column: Column) -> SqlValue {
        match column {
            Column::PowerSource => SqlValue::Text(self.power_source.clone()),
            Column::CoolingType => SqlValue::Text(self.cooling_type.clone()),
            Column::ElectricityRate => SqlValue::Float(self.electricity_rate),
        }
    }

    fn to_record(&self) -> ListingRecord {
        ListingRecord {
            id: self.id,
            title: self.title.clone(),
            description: self.description.clone(),
            electricity_rate: self.electricity_rate,
            power_source: self.power_source.clone(),
            cooling_type: self.cooling_type.clone(),
            location: self.location.to_wkt(),
        }
    }
}

/// Listing store held in process memory. Ids start at 1.
pub struct MemoryListingStore {
    rows: RwLock<Vec<Row>>,
    next_id: AtomicI64,
}

impl Default for MemoryListingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn select(&self, predicate: &Predicate) -> Result<Vec<ListingRecord>> {
        let rows = self.rows.read().await;
        let mut matched = Vec::new();
        for row in rows.iter() {
            if row_matches(row, predicate)? {
                matched.push(row.to_record());
            }
        }
        Ok(matched)
    }

    async fn insert(&self, listing: &ValidatedListing) -> Result<ListingRecord> {
        // Parse the EWKT the same way the database would
        let location = location::decode(listing.location.as_str())
            .map_err(|e| Error::Store(format!("location rejected: {e}")))?;

        let mut rows = self.rows.write().await;
        let row = Row {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            title: listing.title.clone(),
            description: listing.description.clone(),
            electricity_rate: listing.electricity_rate,
            power_source: listing.power_source.clone(),
            cooling_type: listing.cooling_type.clone(),
            location,
        };
        let record = row.to_record();
        rows.push(row);
        Ok(record)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

fn row_matches(row: &Row, predicate: &Predicate) -> Result<bool> {
    for fragment in predicate.fragments() {
        let hit = match fragment {
            Fragment::Within {
                longitude,
                latitude,
                radius,
            } => {
                let lng = float_at(predicate, *longitude)?;
                let lat = float_at(predicate, *latitude)?;
                let radius = float_at(predicate, *radius)?;
                haversine_m(row.location.longitude, row.location.latitude, lng, lat) <= radius
            }
            Fragment::Equals { column, param } => row.cell(*column) == *value_at(predicate, *param)?,
            Fragment::AtMost { column, param } => {
                let bound = float_at(predicate, *param)?;
                match row.cell(*column) {
                    SqlValue::Float(v) => v <= bound,
                    SqlValue::Text(_) => {
                        return Err(Error::Store(format!(
                            "{} is not numeric",
                            column.name()
                        )))
                    }
                }
            }
        };
        if !hit {
            return Ok(false);
        }
    }
    Ok(true)
}

fn value_at(predicate: &Predicate, param: usize) -> Result<&SqlValue> {
    predicate
        .value(param)
        .ok_or_else(|| Error::Store(format!("no value bound for ${param}")))
}

fn float_at(predicate: &Predicate, param: usize) -> Result<f64> {
    value_at(predicate, param)?
        .as_f64()
        .ok_or_else(|| Error::Store(format!("${param} is not a number")))
}

/// Great-circle distance in meters
fn haversine_m(lng1: f64, lat1: f64, lng2: f64, lat2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().min(1.0).asin()
}
