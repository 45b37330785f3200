//! Location codec
//!
//! Converts between a WGS84 point and the textual form the store persists.
//!
//! ```text
//! encode(-79.37, 43.71)  ──►  "SRID=4326;POINT(-79.37 43.71)"
//! decode("POINT(-79.37 43.71)")  ──►  Coordinate { longitude: -79.37, latitude: 43.71 }
//! ```
//!
//! Longitude always comes first. The server read path and the client use the
//! same `decode`, because the wire format echoes the store text verbatim.

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// WGS84 geographic coordinate reference system
pub const SRID: i32 = 4326;

lazy_static! {
    static ref POINT_RE: Regex =
        Regex::new(r"^(?:SRID=(\d+);)?POINT\s*\(\s*(\S+)\s+(\S+)\s*\)$").unwrap();
}

/// A validated longitude/latitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinate {
    /// Validate and build a coordinate.
    ///
    /// Fails with [`Error::InvalidCoordinate`] for non-finite input, a
    /// longitude outside [-180, 180] or a latitude outside [-90, 90].
    pub fn new(longitude: f64, latitude: f64) -> Result<Self> {
        if !longitude.is_finite() || !latitude.is_finite() {
            return Err(Error::InvalidCoordinate(format!(
                "({longitude}, {latitude}) is not a finite point"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidCoordinate(format!(
                "longitude {longitude} outside [-180, 180]"
            )));
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidCoordinate(format!(
                "latitude {latitude} outside [-90, 90]"
            )));
        }
        Ok(Self { longitude, latitude })
    }

    /// Untagged point text, as the store prints it: `POINT(lng lat)`
    pub fn to_wkt(&self) -> String {
        format!("POINT({} {})", self.longitude, self.latitude)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// SRID-tagged point text handed to the store on insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedPoint(String);

impl PersistedPoint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersistedPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Encode a longitude/latitude pair as `SRID=4326;POINT(lng lat)`.
///
/// `f64` display is the shortest text that parses back to the same value,
/// so `decode(encode(x, y))` returns `(x, y)` exactly.
pub fn encode(longitude: f64, latitude: f64) -> Result<PersistedPoint> {
    let coordinate = Coordinate::new(longitude, latitude)?;
    Ok(PersistedPoint(format!("SRID={SRID};{}", coordinate.to_wkt())))
}

/// Decode `POINT(lng lat)`, optionally prefixed with `SRID=4326;`.
///
/// Anything else is [`Error::MalformedLocation`]. No partial recovery is
/// attempted. A well-formed point outside geographic bounds is
/// [`Error::InvalidCoordinate`].
pub fn decode(persisted: &str) -> Result<Coordinate> {
    let malformed = || Error::MalformedLocation(persisted.to_string());

    let caps = POINT_RE.captures(persisted).ok_or_else(malformed)?;

    if let Some(srid) = caps.get(1) {
        if srid.as_str().parse::<i32>().ok() != Some(SRID) {
            return Err(malformed());
        }
    }

    let longitude = parse_ordinate(&caps[2]).ok_or_else(malformed)?;
    let latitude = parse_ordinate(&caps[3]).ok_or_else(malformed)?;

    Coordinate::new(longitude, latitude)
}

fn parse_ordinate(text: &str) -> Option<f64> {
    text.parse::<f64>().ok().filter(|v| v.is_finite())
}
