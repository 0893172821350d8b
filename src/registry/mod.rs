//! Schema registry.
//!
//! Holds one [`RecordSchema`] per record type. It is populated once at
//! start-up (typically from a [`catalog::SchemaCatalog`]) and only read
//! afterwards; lookups take no locks and are safe from any thread.

pub mod catalog;
pub mod embedded;

use papaya::HashMap as PapayaMap;
use std::sync::Arc;

use crate::error::{FhirRecordError, Result};
use crate::types::RecordSchema;

pub use catalog::SchemaCatalog;

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: PapayaMap<String, Arc<RecordSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            schemas: PapayaMap::new(),
        }
    }

    /// Register a schema under `type_name`.
    ///
    /// Re-registering an identical schema is a no-op. A different schema
    /// for an existing name fails with `SchemaConflict`, and a structurally
    /// broken schema fails with `InvalidSchema`, both before anything is stored.
    pub fn register(&self, type_name: impl Into<String>, schema: RecordSchema) -> Result<()> {
        let type_name = type_name.into();
        if schema.type_name != type_name {
            return Err(FhirRecordError::invalid_schema(
                &type_name,
                format!("schema declares type '{}'", schema.type_name),
            ));
        }
        schema.check()?;

        let guard = self.schemas.pin();
        match guard.try_insert(type_name.clone(), Arc::new(schema)) {
            Ok(_) => {
                tracing::debug!("Registered record schema: {}", type_name);
                Ok(())
            }
            Err(occupied) if **occupied.current == *occupied.not_inserted => {
                tracing::debug!("Schema for {} already registered, skipping", type_name);
                Ok(())
            }
            Err(_) => {
                tracing::warn!("Conflicting schema registration for {}", type_name);
                Err(FhirRecordError::schema_conflict(type_name))
            }
        }
    }

    /// Register a schema under its own type name
    pub fn register_schema(&self, schema: RecordSchema) -> Result<()> {
        let type_name = schema.type_name.clone();
        self.register(type_name, schema)
    }

    pub fn lookup(&self, type_name: &str) -> Result<Arc<RecordSchema>> {
        self.get(type_name)
            .ok_or_else(|| FhirRecordError::unknown_type(type_name))
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<RecordSchema>> {
        self.schemas.pin().get(type_name).cloned()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.schemas.pin().contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.pin().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names referenced by registered schemas that are not registered
    /// themselves. Nested types are resolved lazily, so a catalog may be
    /// loaded in any order; this reports what is still missing.
    pub fn unresolved_references(&self) -> Vec<String> {
        let guard = self.schemas.pin();
        let mut missing: Vec<String> = guard
            .values()
            .flat_map(|schema| {
                schema
                    .referenced_types()
                    .into_iter()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|name| !guard.contains_key(name.as_str()))
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }
}
