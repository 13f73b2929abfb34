//! GeoJSON geometry
//!
//! Zone outlines arrive from the geodata provider as GeoJSON `Polygon` or
//! `MultiPolygon` objects and flow unchanged through the pipeline to the map
//! layer. Coordinates are (longitude, latitude) pairs, ring-nested exactly
//! as GeoJSON specifies.

use serde::{Deserialize, Serialize};

/// Polygonal geometry in GeoJSON encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Polygon(Vec<Vec<[f64; 2]>>),
    MultiPolygon(Vec<Vec<Vec<[f64; 2]>>>),
}

impl Geometry {
    /// GeoJSON type name.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Total number of rings across all polygons.
    #[must_use]
    pub fn ring_count(&self) -> usize {
        match self {
            Self::Polygon(rings) => rings.len(),
            Self::MultiPolygon(polys) => polys.iter().map(Vec::len).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn polygon_decodes_from_geojson() {
        let raw = r#"{
            "type": "Polygon",
            "coordinates": [[[2.33, 48.86], [2.34, 48.86], [2.34, 48.87], [2.33, 48.86]]]
        }"#;
        let geom: Geometry = serde_json::from_str(raw).unwrap();
        assert_eq!(geom.kind(), "Polygon");
        assert_eq!(geom.ring_count(), 1);
    }

    #[test]
    fn multipolygon_roundtrips() {
        let geom = Geometry::MultiPolygon(vec![vec![vec![
            [2.0, 48.0],
            [2.1, 48.0],
            [2.1, 48.1],
            [2.0, 48.0],
        ]]]);
        let json = serde_json::to_value(&geom).unwrap();
        assert_eq!(json["type"], "MultiPolygon");
        let back: Geometry = serde_json::from_value(json).unwrap();
        assert_eq!(back, geom);
    }
}
