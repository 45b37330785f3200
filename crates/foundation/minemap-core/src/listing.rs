//! Listing model
//!
//! - [`ListingRecord`]: row / wire form, location as point text
//! - [`Listing`]: normalized form, location decoded
//! - [`NewListing`]: raw `POST /listings` body
//! - [`ValidatedListing`]: a draft that passed validation, ready to insert

use serde::{Deserialize, Serialize};

use crate::filter::ALL_SENTINEL;
use crate::location::{self, Coordinate, PersistedPoint};
use crate::{Error, Result};

/// Power source used when a draft omits one
pub const DEFAULT_POWER_SOURCE: &str = "Hydro";

/// Cooling type used when a draft omits one
pub const DEFAULT_COOLING_TYPE: &str = "Immersion";

/// Power sources offered by the UI. The set is open; the store accepts others.
pub const POWER_SOURCES: [&str; 4] = ["Hydro", "Solar", "Grid", "Wind"];

/// Cooling types offered by the UI. The set is open; the store accepts others.
pub const COOLING_TYPES: [&str; 3] = ["Immersion", "Air", "Water"];

/// A persisted listing with its location decoded
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// Currency per energy unit, e.g. $/kWh
    pub electricity_rate: f64,
    pub power_source: String,
    pub cooling_type: String,
    pub location: Coordinate,
}

impl Listing {
    pub fn longitude(&self) -> f64 {
        self.location.longitude
    }

    pub fn latitude(&self) -> f64 {
        self.location.latitude
    }
}

/// A listing as the store returns it and as it travels over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub electricity_rate: f64,
    pub power_source: String,
    pub cooling_type: String,
    /// Point text, e.g. `POINT(-79.37 43.71)`
    pub location: String,
}

impl TryFrom<ListingRecord> for Listing {
    type Error = Error;

    fn try_from(record: ListingRecord) -> Result<Self> {
        let location = location::decode(&record.location)?;
        Ok(Listing {
            id: record.id,
            title: record.title,
            description: record.description,
            electricity_rate: record.electricity_rate,
            power_source: record.power_source,
            cooling_type: record.cooling_type,
            location,
        })
    }
}

impl From<&Listing> for ListingRecord {
    fn from(listing: &Listing) -> Self {
        ListingRecord {
            id: listing.id,
            title: listing.title.clone(),
            description: listing.description.clone(),
            electricity_rate: listing.electricity_rate,
            power_source: listing.power_source.clone(),
            cooling_type: listing.cooling_type.clone(),
            location: listing.location.to_wkt(),
        }
    }
}

/// A number that may arrive as JSON number or numeric string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    /// `None` for blank text
    fn non_blank(&self) -> Option<&Self> {
        match self {
            Numeric::Text(t) if t.trim().is_empty() => None,
            other => Some(other),
        }
    }

    /// Finite value, or `None` if the text is not a number
    pub fn to_f64(&self) -> Option<f64> {
        let value = match self {
            Numeric::Number(n) => *n,
            Numeric::Text(t) => t.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

impl From<f64> for Numeric {
    fn from(value: f64) -> Self {
        Numeric::Number(value)
    }
}

/// Raw `POST /listings` body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListing {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub electricity_rate: Option<Numeric>,
    #[serde(default)]
    pub latitude: Option<Numeric>,
    #[serde(default)]
    pub longitude: Option<Numeric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooling_type: Option<String>,
}

/// A draft that passed validation; `location` is already encoded
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedListing {
    pub title: String,
    pub description: String,
    pub electricity_rate: f64,
    pub power_source: String,
    pub cooling_type: String,
    pub location: PersistedPoint,
}

impl NewListing {
    /// Draft with every required field set
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        electricity_rate: f64,
        longitude: f64,
        latitude: f64,
    ) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            electricity_rate: Some(electricity_rate.into()),
            latitude: Some(latitude.into()),
            longitude: Some(longitude.into()),
            power_source: None,
            cooling_type: None,
        }
    }

    pub fn with_power_source(mut self, value: impl Into<String>) -> Self {
        self.power_source = Some(value.into());
        self
    }

    pub fn with_cooling_type(mut self, value: impl Into<String>) -> Self {
        self.cooling_type = Some(value.into());
        self
    }

    /// Check required fields and encode the location.
    ///
    /// Missing fields are [`Error::Validation`]; bad coordinates are
    /// [`Error::InvalidCoordinate`].
    pub fn validate(&self) -> Result<ValidatedListing> {
        let title = required_text(self.title.as_deref(), "title")?;
        let description = required_text(self.description.as_deref(), "description")?;

        let rate = required_number(self.electricity_rate.as_ref(), "electricityRate")?;
        let electricity_rate = rate.to_f64().ok_or_else(|| {
            Error::Validation(format!("electricityRate must be a finite number, got {rate:?}"))
        })?;

        let latitude = required_number(self.latitude.as_ref(), "latitude")?;
        let longitude = required_number(self.longitude.as_ref(), "longitude")?;
        let (Some(lat), Some(lng)) = (latitude.to_f64(), longitude.to_f64()) else {
            return Err(Error::InvalidCoordinate(format!(
                "longitude {longitude:?} / latitude {latitude:?} must be numbers"
            )));
        };
        let location = location::encode(lng, lat)?;

        Ok(ValidatedListing {
            title,
            description,
            electricity_rate,
            power_source: category(self.power_source.as_deref(), DEFAULT_POWER_SOURCE, "powerSource")?,
            cooling_type: category(self.cooling_type.as_deref(), DEFAULT_COOLING_TYPE, "coolingType")?,
            location,
        })
    }
}

fn required_text(value: Option<&str>, field: &str) -> Result<String> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(Error::Validation(format!("{field} is required"))),
    }
}

fn required_number<'a>(value: Option<&'a Numeric>, field: &str) -> Result<&'a Numeric> {
    value
        .and_then(Numeric::non_blank)
        .ok_or_else(|| Error::Validation(format!("{field} is required")))
}

fn category(value: Option<&str>, default: &str, field: &str) -> Result<String> {
    match value.map(str::trim) {
        None | Some("") => Ok(default.to_string()),
        Some(v) if v.eq_ignore_ascii_case(ALL_SENTINEL) => Err(Error::Validation(format!(
            "{field} \"{v}\" is a filter sentinel, not a category"
        ))),
        Some(v) => Ok(v.to_string()),
    }
}
