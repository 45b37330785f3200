//! Listing filters
//!
//! [`ListingQuery`] is the raw query-string form of `GET /listings`.
//! [`ListingFilter`] is the parsed form. Each filter is either present or
//! absent, and the `"all"` sentinel only exists at the string boundary.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    /// Leading decimal number: sign, digits with optional fraction, optional exponent
    static ref NUMERIC_PREFIX_RE: Regex =
        Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").unwrap();
}

/// Category value meaning "do not filter"
pub const ALL_SENTINEL: &str = "all";

/// Raw `GET /listings` parameters, every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooling_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_rate: Option<String>,
}

/// Circular proximity filter; radius in meters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Proximity {
    pub longitude: f64,
    pub latitude: f64,
    pub radius_meters: f64,
}

/// Parsed filter set handed to the predicate builder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub proximity: Option<Proximity>,
    pub power_source: Option<String>,
    pub cooling_type: Option<String>,
    pub max_rate: Option<f64>,
}

impl ListingFilter {
    /// Filter that matches every listing
    pub fn all() -> Self {
        Self::default()
    }

    pub fn near(mut self, longitude: f64, latitude: f64, radius_meters: f64) -> Self {
        self.proximity = Some(Proximity {
            longitude,
            latitude,
            radius_meters,
        });
        self
    }

    pub fn power_source(mut self, value: &str) -> Self {
        self.power_source = category_filter(Some(value));
        self
    }

    pub fn cooling_type(mut self, value: &str) -> Self {
        self.cooling_type = category_filter(Some(value));
        self
    }

    pub fn max_rate(mut self, rate: f64) -> Self {
        self.max_rate = Some(rate).filter(|r| r.is_finite());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.proximity.is_none()
            && self.power_source.is_none()
            && self.cooling_type.is_none()
            && self.max_rate.is_none()
    }
}

impl From<&ListingQuery> for ListingFilter {
    /// Lenient parse: a proximity component that is missing, empty or not a
    /// finite number drops the whole proximity filter without an error.
    fn from(query: &ListingQuery) -> Self {
        let lat = parse_finite(query.lat.as_deref());
        let lng = parse_finite(query.lng.as_deref());
        let radius = parse_finite(query.radius.as_deref());

        let proximity = match (lng, lat, radius) {
            (Some(longitude), Some(latitude), Some(radius_meters)) => Some(Proximity {
                longitude,
                latitude,
                radius_meters,
            }),
            _ => None,
        };

        Self {
            proximity,
            power_source: category_filter(query.power_source.as_deref()),
            cooling_type: category_filter(query.cooling_type.as_deref()),
            max_rate: parse_finite(query.max_rate.as_deref()),
        }
    }
}

/// Normalize a raw category filter.
///
/// Trims the value. Absent, blank and `"all"` (any case) mean no filter.
pub fn category_filter(raw: Option<&str>) -> Option<String> {
    let value = raw?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case(ALL_SENTINEL) {
        None
    } else {
        Some(value.to_string())
    }
}

/// Longest leading decimal number of the trimmed text, if finite.
///
/// `"1000m"` reads as 1000 and `"43.71abc"` as 43.71; `"west"`, `"NaN"` and
/// `"inf"` read as nothing.
fn parse_finite(raw: Option<&str>) -> Option<f64> {
    let prefix = NUMERIC_PREFIX_RE.find(raw?.trim())?;
    prefix.as_str().parse::<f64>().ok().filter(|v| v.is_finite())
}
