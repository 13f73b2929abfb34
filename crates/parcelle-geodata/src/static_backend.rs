//! Seeded fixture backend
//!
//! Serves pre-loaded features without touching the network. Zones are keyed
//! by nothing (any coordinate hits the seeded set); municipalities and
//! documents are keyed by INSEE code.

use crate::client::GeoDataClient;
use crate::error::GeoDataError;
use crate::types::{DocumentFeature, MunicipalityFeature, ZoneFeature};
use async_trait::async_trait;
use std::collections::HashMap;

/// In-memory geodata backend for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticGeoData {
    zones: Vec<ZoneFeature>,
    municipalities: HashMap<String, MunicipalityFeature>,
    documents: HashMap<String, Vec<DocumentFeature>>,
}

impl StaticGeoData {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a zoning feature, appended in provider order.
    #[must_use]
    pub fn with_zone(mut self, zone: ZoneFeature) -> Self {
        self.zones.push(zone);
        self
    }

    /// Seed a municipality.
    #[must_use]
    pub fn with_municipality(mut self, municipality: MunicipalityFeature) -> Self {
        self.municipalities
            .insert(municipality.insee_code.clone(), municipality);
        self
    }

    /// Seed the document list for a municipality.
    #[must_use]
    pub fn with_documents(
        mut self,
        insee_code: impl Into<String>,
        documents: Vec<DocumentFeature>,
    ) -> Self {
        self.documents.insert(insee_code.into(), documents);
        self
    }
}

#[async_trait]
impl GeoDataClient for StaticGeoData {
    async fn zoning_at(
        &self,
        _longitude: f64,
        _latitude: f64,
    ) -> Result<Vec<ZoneFeature>, GeoDataError> {
        Ok(self.zones.clone())
    }

    async fn municipality(
        &self,
        insee_code: &str,
    ) -> Result<Option<MunicipalityFeature>, GeoDataError> {
        Ok(self.municipalities.get(insee_code).cloned())
    }

    async fn documents(&self, insee_code: &str) -> Result<Vec<DocumentFeature>, GeoDataError> {
        Ok(self.documents.get(insee_code).cloned().unwrap_or_default())
    }
}
