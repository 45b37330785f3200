//! Address lookup via a Nominatim-compatible service

use minemap_core::Coordinate;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Result, SyncError};

/// One search hit. Nominatim returns `lat` and `lon` as strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeCandidate {
    pub display_name: String,
    pub lat: String,
    pub lon: String,
    pub place_id: u64,
}

impl GeocodeCandidate {
    pub fn coordinate(&self) -> Result<Coordinate> {
        let parse = |raw: &str, axis: &str| {
            raw.trim().parse::<f64>().map_err(|_| {
                minemap_core::Error::InvalidCoordinate(format!("{axis} {raw:?} is not a number"))
            })
        };
        let latitude = parse(&self.lat, "latitude")?;
        let longitude = parse(&self.lon, "longitude")?;
        Ok(Coordinate::new(longitude, latitude)?)
    }
}

#[derive(Debug, Clone)]
pub struct NominatimClient {
    client: reqwest::Client,
    search: Url,
}

impl NominatimClient {
    /// Nominatim asks every caller to identify itself with a User-Agent
    pub fn new(base: &str, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            client,
            search: base.join("search")?,
        })
    }

    pub async fn search(&self, text: &str) -> Result<Vec<GeocodeCandidate>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(query = text, "geocoding");
        let response = self
            .client
            .get(self.search.clone())
            .query(&[("format", "json"), ("q", text)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// First candidate's coordinate, if any
    pub async fn locate(&self, text: &str) -> Result<Option<(GeocodeCandidate, Coordinate)>> {
        match self.search(text).await?.into_iter().next() {
            Some(candidate) => {
                let coordinate = candidate.coordinate()?;
                Ok(Some((candidate, coordinate)))
            }
            None => Ok(None),
        }
    }
}
