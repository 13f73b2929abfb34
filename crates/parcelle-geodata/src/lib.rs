//! Geodata backend
//!
//! Thin client over the three read-only geodata endpoints the enrichment
//! pipeline consumes:
//! - zoning features at a coordinate
//! - municipality by INSEE code
//! - regulatory documents by INSEE code
//!
//! The backend is switchable behind [`GeoDataClient`]: [`HttpGeoData`] talks
//! to the GPU-style HTTP API, [`StaticGeoData`] serves seeded fixtures for
//! tests and offline use. Empty feature lists and absent municipalities are
//! valid responses, not errors.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod error;
pub mod http;
pub mod static_backend;
pub mod types;

pub use client::GeoDataClient;
pub use error::GeoDataError;
pub use http::HttpGeoData;
pub use static_backend::StaticGeoData;
pub use types::{DocumentFeature, MunicipalityFeature, ZoneFeature};
