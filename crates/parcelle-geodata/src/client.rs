//! Backend trait

use crate::error::GeoDataError;
use crate::types::{DocumentFeature, MunicipalityFeature, ZoneFeature};
use async_trait::async_trait;

/// Read-only geodata operations, each independently failable.
#[async_trait]
pub trait GeoDataClient: Send + Sync {
    /// Zoning features covering the coordinate, in provider order. An empty
    /// list is a valid "no zone here" response.
    async fn zoning_at(
        &self,
        longitude: f64,
        latitude: f64,
    ) -> Result<Vec<ZoneFeature>, GeoDataError>;

    /// Municipality by INSEE code. `None` is a valid "not found" response.
    async fn municipality(
        &self,
        insee_code: &str,
    ) -> Result<Option<MunicipalityFeature>, GeoDataError>;

    /// Regulatory documents published for the municipality.
    async fn documents(&self, insee_code: &str) -> Result<Vec<DocumentFeature>, GeoDataError>;
}
