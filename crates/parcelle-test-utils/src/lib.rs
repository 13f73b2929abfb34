//! Testing utilities for the Parcelle workspace
//!
//! Shared fixtures: seeded geodata backends, conversation rows, reference
//! coordinates and geometry.

#![allow(missing_docs)]

use chrono::Utc;
use parcelle_geodata::{DocumentFeature, MunicipalityFeature, StaticGeoData, ZoneFeature};
use parcelle_model::{collections, ConversationId, Geometry};
use parcelle_store::{MemoryStore, RecordStore};
use serde_json::json;

/// Paris INSEE code used across scenario tests.
pub const PARIS_INSEE: &str = "75056";
pub const PARIS_LON: f64 = 2.3397;
pub const PARIS_LAT: f64 = 48.8606;
pub const UC_ZONE: &str = "Uc";
pub const SOURCE_PLU_URL: &str = "https://example.org/plu/75056/reglement.pdf";

pub fn sample_geometry() -> Geometry {
    Geometry::Polygon(vec![vec![
        [2.3390, 48.8600],
        [2.3404, 48.8600],
        [2.3404, 48.8612],
        [2.3390, 48.8612],
        [2.3390, 48.8600],
    ]])
}

pub fn paris_municipality() -> MunicipalityFeature {
    MunicipalityFeature {
        insee_code: PARIS_INSEE.to_string(),
        name: "Paris".to_string(),
        is_rnu: false,
    }
}

pub fn rnu_municipality(insee_code: &str) -> MunicipalityFeature {
    MunicipalityFeature {
        insee_code: insee_code.to_string(),
        name: "Saint-Elix-le-Château".to_string(),
        is_rnu: true,
    }
}

pub fn uc_zone_feature() -> ZoneFeature {
    ZoneFeature {
        short_code: Some(UC_ZONE.to_string()),
        label: Some("Zone urbaine de centre-ville".to_string()),
        type_code: Some("U".to_string()),
        geometry: Some(sample_geometry()),
    }
}

pub fn zone_feature_without_geometry(short_code: &str) -> ZoneFeature {
    ZoneFeature {
        short_code: Some(short_code.to_string()),
        label: None,
        type_code: Some("U".to_string()),
        geometry: None,
    }
}

pub fn source_document_feature() -> DocumentFeature {
    DocumentFeature {
        kind: Some("PLU".to_string()),
        source_url: Some(SOURCE_PLU_URL.to_string()),
    }
}

/// Geodata for the standard non-RNU scenario: Paris, one "Uc" zone with
/// geometry, one source document without analysis.
pub fn geodata_non_rnu() -> StaticGeoData {
    StaticGeoData::new()
        .with_municipality(paris_municipality())
        .with_zone(uc_zone_feature())
        .with_documents(PARIS_INSEE, vec![source_document_feature()])
}

/// Geodata for the RNU scenario: municipality flagged RNU, nothing else.
pub fn geodata_rnu(insee_code: &str) -> StaticGeoData {
    StaticGeoData::new().with_municipality(rnu_municipality(insee_code))
}

/// Seed a pending conversation with complete geocoding metadata.
pub async fn seed_conversation(
    store: &MemoryStore,
    insee_code: &str,
    longitude: f64,
    latitude: f64,
) -> ConversationId {
    let address = "10 Rue de Rivoli, Paris";
    let body = json!({
        "user_id": "user-1",
        "project_id": null,
        "address": address,
        "longitude": longitude,
        "latitude": latitude,
        "insee_code": insee_code,
        "enrichment_status": "pending",
        "branch_type": "pending",
        "has_analysis": false,
        "is_rnu": false,
        "primary_document_id": null,
        "document_metadata": null,
        "context_metadata": {
            "insee_code": insee_code,
            "longitude": longitude,
            "latitude": latitude,
            "address": address,
            "city_name": null,
            "enrichment": null,
        },
        "created_at": Utc::now(),
        "updated_at": Utc::now(),
    });
    store
        .insert(collections::CONVERSATIONS, body)
        .await
        .unwrap()
        .into()
}

/// Seed a conversation whose metadata is missing the INSEE code, for
/// precondition-failure tests.
pub async fn seed_conversation_without_insee(store: &MemoryStore) -> ConversationId {
    let body = json!({
        "user_id": "user-1",
        "project_id": null,
        "address": "Lieu-dit inconnu",
        "longitude": PARIS_LON,
        "latitude": PARIS_LAT,
        "insee_code": "",
        "enrichment_status": "pending",
        "branch_type": "pending",
        "has_analysis": false,
        "is_rnu": false,
        "primary_document_id": null,
        "document_metadata": null,
        "context_metadata": {
            "insee_code": null,
            "longitude": PARIS_LON,
            "latitude": PARIS_LAT,
            "address": null,
            "city_name": null,
            "enrichment": null,
        },
        "created_at": Utc::now(),
        "updated_at": Utc::now(),
    });
    store
        .insert(collections::CONVERSATIONS, body)
        .await
        .unwrap()
        .into()
}
