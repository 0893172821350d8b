//! Bundled catalog of core FHIR data types.
//!
//! Covers the general-purpose data types (Coding, CodeableConcept,
//! Quantity, Period, Reference, Extension, ...), a subset of
//! ElementDefinition with its constraint and binding parts, and a subset
//! of Observation.

use once_cell::sync::OnceCell;
use std::sync::Arc;

use super::{SchemaCatalog, SchemaRegistry};
use crate::error::Result;

pub static CORE_CATALOG_JSON: &str = include_str!("../../catalogs/core.json");

static SHARED_CORE_REGISTRY: OnceCell<Arc<SchemaRegistry>> = OnceCell::new();

pub fn core_catalog() -> Result<SchemaCatalog> {
    SchemaCatalog::from_json_str(CORE_CATALOG_JSON)
}

/// A fresh registry holding the core types, open for further registrations
pub fn core_registry() -> Result<SchemaRegistry> {
    SchemaRegistry::from_catalog_json(CORE_CATALOG_JSON)
}

/// Process-wide core registry, loaded on first use
pub fn shared_core_registry() -> Result<Arc<SchemaRegistry>> {
    SHARED_CORE_REGISTRY
        .get_or_try_init(|| core_registry().map(Arc::new))
        .cloned()
}
