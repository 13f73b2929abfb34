//! HTTP backend
//!
//! Talks to the GPU-style geodata API. Each endpoint returns a GeoJSON
//! feature collection; the zoning endpoint takes the point as an inline
//! GeoJSON geometry parameter.

use crate::client::GeoDataClient;
use crate::error::GeoDataError;
use crate::types::{
    DocumentFeature, DocumentProperties, Feature, FeatureCollection, MunicipalityFeature,
    MunicipalityProperties, ZoneFeature, ZoneProperties,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

/// Default public API root.
pub const DEFAULT_BASE_URL: &str = "https://apicarto.ign.fr/api/gpu";

/// Reqwest-backed geodata client.
#[derive(Debug, Clone)]
pub struct HttpGeoData {
    http: reqwest::Client,
    base_url: String,
}

impl HttpGeoData {
    /// Client against a custom API root (no trailing slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Inject a pre-configured reqwest client (timeouts, proxies).
    #[must_use]
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    async fn fetch_features<P: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Feature<P>>, GeoDataError> {
        let url = format!("{}/{endpoint}", self.base_url);
        tracing::debug!(%url, "geodata fetch");

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        let collection: FeatureCollection<P> = response
            .json()
            .await
            .map_err(|e| GeoDataError::decode(endpoint, e))?;
        Ok(collection.features)
    }
}

impl Default for HttpGeoData {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl GeoDataClient for HttpGeoData {
    async fn zoning_at(
        &self,
        longitude: f64,
        latitude: f64,
    ) -> Result<Vec<ZoneFeature>, GeoDataError> {
        let point = json!({"type": "Point", "coordinates": [longitude, latitude]});
        let features: Vec<Feature<ZoneProperties>> = self
            .fetch_features("zone-urba", &[("geom", point.to_string())])
            .await?;
        Ok(features.into_iter().map(ZoneFeature::from).collect())
    }

    async fn municipality(
        &self,
        insee_code: &str,
    ) -> Result<Option<MunicipalityFeature>, GeoDataError> {
        let features: Vec<Feature<MunicipalityProperties>> = self
            .fetch_features("municipality", &[("insee", insee_code.to_string())])
            .await?;
        Ok(features.into_iter().next().map(MunicipalityFeature::from))
    }

    async fn documents(&self, insee_code: &str) -> Result<Vec<DocumentFeature>, GeoDataError> {
        let features: Vec<Feature<DocumentProperties>> = self
            .fetch_features("document", &[("insee", insee_code.to_string())])
            .await?;
        Ok(features.into_iter().map(DocumentFeature::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_public_api() {
        let client = HttpGeoData::default();
        assert_eq!(client.base_url, DEFAULT_BASE_URL);
    }
}
