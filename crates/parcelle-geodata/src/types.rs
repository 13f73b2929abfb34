//! Geodata feature types
//!
//! Domain-facing features returned by [`crate::GeoDataClient`], plus the
//! GeoJSON wire envelopes the HTTP backend decodes them from.

use parcelle_model::Geometry;
use serde::{Deserialize, Deserializer};

/// One zoning feature at a coordinate.
///
/// Provider ordering is preserved; the pipeline takes the first feature as
/// authoritative for the address.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneFeature {
    /// Short zone code, e.g. "Uc".
    pub short_code: Option<String>,
    /// Full label of the zone.
    pub label: Option<String>,
    /// Broad type classifier, e.g. "U" / "A" / "N".
    pub type_code: Option<String>,
    pub geometry: Option<Geometry>,
}

/// Municipality feature.
#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalityFeature {
    pub insee_code: String,
    pub name: String,
    /// True when no local zoning plan exists and national baseline rules
    /// apply.
    pub is_rnu: bool,
}

/// Regulatory document feature.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentFeature {
    /// Document-type label, e.g. local plan vs. national baseline.
    pub kind: Option<String>,
    /// Direct URL of the source file, when the provider exposes one.
    pub source_url: Option<String>,
}

// Wire envelopes. The provider speaks GeoJSON feature collections; only the
// properties each endpoint actually uses are decoded.

#[derive(Debug, Deserialize)]
pub(crate) struct FeatureCollection<P> {
    #[serde(default = "Vec::new")]
    pub(crate) features: Vec<Feature<P>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Feature<P> {
    pub(crate) properties: P,
    #[serde(default, deserialize_with = "lenient_geometry")]
    pub(crate) geometry: Option<Geometry>,
}

/// Non-polygonal geometries (points, lines) are dropped rather than failing
/// the whole payload.
fn lenient_geometry<'de, D>(deserializer: D) -> Result<Option<Geometry>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct ZoneProperties {
    pub(crate) libelle: Option<String>,
    pub(crate) libelong: Option<String>,
    pub(crate) typezone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MunicipalityProperties {
    pub(crate) insee: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) is_rnu: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DocumentProperties {
    pub(crate) du_type: Option<String>,
    #[serde(default = "Vec::new")]
    pub(crate) files: Vec<String>,
}

impl From<Feature<ZoneProperties>> for ZoneFeature {
    fn from(feature: Feature<ZoneProperties>) -> Self {
        Self {
            short_code: feature.properties.libelle,
            label: feature.properties.libelong,
            type_code: feature.properties.typezone,
            geometry: feature.geometry,
        }
    }
}

impl From<Feature<MunicipalityProperties>> for MunicipalityFeature {
    fn from(feature: Feature<MunicipalityProperties>) -> Self {
        Self {
            insee_code: feature.properties.insee,
            name: feature.properties.name,
            is_rnu: feature.properties.is_rnu,
        }
    }
}

impl From<Feature<DocumentProperties>> for DocumentFeature {
    fn from(feature: Feature<DocumentProperties>) -> Self {
        Self {
            kind: feature.properties.du_type,
            source_url: feature.properties.files.into_iter().next(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_collection_decodes_with_geometry() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"libelle": "Uc", "libelong": "Zone urbaine de centre", "typezone": "U"},
                "geometry": {"type": "Polygon", "coordinates": [[[2.33, 48.86], [2.34, 48.86], [2.33, 48.86]]]}
            }]
        }"#;
        let collection: FeatureCollection<ZoneProperties> = serde_json::from_str(raw).unwrap();
        let zone: ZoneFeature = collection.features.into_iter().next().unwrap().into();
        assert_eq!(zone.short_code.as_deref(), Some("Uc"));
        assert_eq!(zone.type_code.as_deref(), Some("U"));
        assert!(zone.geometry.is_some());
    }

    #[test]
    fn empty_collection_is_valid() {
        let collection: FeatureCollection<ZoneProperties> =
            serde_json::from_str(r#"{"type": "FeatureCollection", "features": []}"#).unwrap();
        assert!(collection.features.is_empty());
    }

    #[test]
    fn missing_features_key_defaults_to_empty() {
        let collection: FeatureCollection<ZoneProperties> =
            serde_json::from_str(r#"{"type": "FeatureCollection"}"#).unwrap();
        assert!(collection.features.is_empty());
    }

    #[test]
    fn point_geometry_is_dropped_not_fatal() {
        let raw = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"libelle": "Uc", "libelong": null, "typezone": "U"},
                "geometry": {"type": "Point", "coordinates": [2.33, 48.86]}
            }]
        }"#;
        let collection: FeatureCollection<ZoneProperties> = serde_json::from_str(raw).unwrap();
        assert!(collection.features[0].geometry.is_none());
    }

    #[test]
    fn document_source_url_is_first_file() {
        let raw = r#"{
            "features": [{
                "type": "Feature",
                "properties": {"du_type": "PLU", "files": ["https://example.org/a.pdf", "https://example.org/b.pdf"]},
                "geometry": null
            }]
        }"#;
        let collection: FeatureCollection<DocumentProperties> = serde_json::from_str(raw).unwrap();
        let doc: DocumentFeature = collection.features.into_iter().next().unwrap().into();
        assert_eq!(doc.kind.as_deref(), Some("PLU"));
        assert_eq!(doc.source_url.as_deref(), Some("https://example.org/a.pdf"));
    }
}
