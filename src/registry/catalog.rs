//! JSON schema catalogs.
//!
//! Record types are data: a catalog lists each type's elements in
//! declaration order. A plain element names its `type`; a choice element
//! names the logical field in `choice` and lists its variant `types`.
//!
//! ```json
//! {
//!   "types": [{
//!     "name": "Observation",
//!     "kind": "resource",
//!     "elements": [
//!       { "name": "status", "type": "code", "min": 1, "max": "1",
//!         "binding": { "strength": "required",
//!                      "codes": { "http://hl7.org/fhir/observation-status": ["final"] } } },
//!       { "choice": "value", "types": ["Quantity", "string", "dateTime"] }
//!     ]
//!   }]
//! }
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::SchemaRegistry;
use crate::error::{FhirRecordError, Result};
use crate::types::{
    BindingDefinition, BindingStrength, Cardinality, FieldDescriptor, Max, PolymorphicGroup,
    RecordKind, RecordSchema, TypeRef,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    pub name: Option<String>,
    pub types: Vec<CatalogType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogType {
    pub name: String,
    #[serde(default)]
    pub kind: RecordKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub elements: Vec<CatalogElement>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum CatalogElement {
    Choice(CatalogChoice),
    Field(CatalogField),
}

// Dispatch on the `choice` key. Untagged buffering cannot read numbers
// such as `min` once serde_json keeps them in their lexical form.
impl<'de> Deserialize<'de> for CatalogElement {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let element = if value.get("choice").is_some() {
            serde_json::from_value(value).map(CatalogElement::Choice)
        } else {
            serde_json::from_value(value).map(CatalogElement::Field)
        };
        element.map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_ref: TypeRef,
    #[serde(default)]
    pub min: u32,
    #[serde(default = "default_max")]
    pub max: Max,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<CatalogBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogChoice {
    pub choice: String,
    pub types: Vec<TypeRef>,
    #[serde(default)]
    pub min: u32,
    #[serde(default = "default_max")]
    pub max: Max,
    /// Applied to every coded variant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<CatalogBinding>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogBinding {
    pub strength: BindingStrength,
    #[serde(rename = "valueSet", skip_serializing_if = "Option::is_none")]
    pub value_set: Option<String>,
    #[serde(default)]
    pub codes: IndexMap<String, Vec<String>>,
}

fn default_max() -> Max {
    Max::Bounded(1)
}

impl SchemaCatalog {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Convert every catalog entry into a [`RecordSchema`]
    pub fn to_schemas(&self) -> Result<Vec<RecordSchema>> {
        self.types.iter().map(CatalogType::to_schema).collect()
    }
}

impl CatalogType {
    pub fn to_schema(&self) -> Result<RecordSchema> {
        let mut schema = RecordSchema::new(&self.name).with_kind(self.kind);
        if let Some(url) = &self.url {
            schema = schema.with_url(url);
        }

        for element in &self.elements {
            schema = match element {
                CatalogElement::Field(field) => schema.with_field(field.to_descriptor()),
                CatalogElement::Choice(choice) => schema.with_choice(choice.to_group(&self.name)?),
            };
        }

        Ok(schema)
    }
}

impl CatalogField {
    fn to_descriptor(&self) -> FieldDescriptor {
        let mut descriptor = FieldDescriptor::new(&self.name, self.type_ref.clone())
            .with_cardinality(self.min, self.max);
        descriptor.binding = self.binding.as_ref().map(CatalogBinding::to_definition);
        descriptor.profiles = self.profiles.iter().cloned().collect();
        descriptor
    }
}

impl CatalogChoice {
    fn to_group(&self, type_name: &str) -> Result<PolymorphicGroup> {
        if self.max != Max::Bounded(1) {
            return Err(FhirRecordError::invalid_schema(
                type_name,
                format!("choice group '{}' must have max 1", self.choice),
            ));
        }

        let mut group = PolymorphicGroup::new(&self.choice);
        group.cardinality = Cardinality::new(self.min, self.max);

        let binding = self.binding.as_ref().map(CatalogBinding::to_definition);
        for type_ref in &self.types {
            let coded = type_ref.as_primitive().is_none_or(|p| p.code() == "code");
            let variant_binding = if coded { binding.clone() } else { None };
            group = group.with_variant_binding(type_ref.clone(), variant_binding);
        }

        Ok(group)
    }
}

impl CatalogBinding {
    fn to_definition(&self) -> BindingDefinition {
        let mut definition = BindingDefinition::new(self.strength);
        if let Some(value_set) = &self.value_set {
            definition = definition.with_value_set(value_set);
        }
        for (system, codes) in &self.codes {
            definition = definition.with_codes(system, codes.iter().cloned());
        }
        definition
    }
}

impl SchemaRegistry {
    /// Register every type of a catalog. Stops at the first failure.
    pub fn load_catalog(&self, catalog: &SchemaCatalog) -> Result<usize> {
        let schemas = catalog.to_schemas()?;
        let count = schemas.len();
        for schema in schemas {
            self.register_schema(schema)?;
        }

        tracing::info!(
            "Loaded {} record schemas from catalog {}",
            count,
            catalog.name.as_deref().unwrap_or("<unnamed>")
        );

        let missing = self.unresolved_references();
        if !missing.is_empty() {
            tracing::warn!("Catalog references unregistered types: {}", missing.join(", "));
        }

        Ok(count)
    }

    pub fn from_catalog_json(json: &str) -> Result<Self> {
        let registry = Self::new();
        registry.load_catalog(&SchemaCatalog::from_json_str(json)?)?;
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PrimitiveType, SchemaEntry};

    const CATALOG: &str = r#"{
        "name": "test",
        "types": [
            {
                "name": "Observation",
                "kind": "resource",
                "elements": [
                    { "name": "status", "type": "code", "min": 1,
                      "binding": { "strength": "required",
                                   "codes": { "http://hl7.org/fhir/observation-status": ["final", "amended"] } } },
                    { "name": "note", "type": "string", "max": "*" },
                    { "choice": "value", "types": ["dateTime", "Period"] }
                ]
            },
            {
                "name": "Period",
                "elements": [
                    { "name": "start", "type": "dateTime" },
                    { "name": "end", "type": "dateTime" }
                ]
            }
        ]
    }"#;

    #[test]
    fn test_parse_catalog_elements() {
        let catalog = SchemaCatalog::from_json_str(CATALOG).unwrap();
        let schemas = catalog.to_schemas().unwrap();
        let observation = &schemas[0];

        assert!(observation.is_resource());
        let status = observation.field("status").unwrap();
        assert_eq!(status.declared_type, TypeRef::Primitive(PrimitiveType::Code));
        assert_eq!(status.min(), 1);
        assert_eq!(status.max(), Max::Bounded(1));
        assert!(status.binding.as_ref().unwrap().contains(None, "final"));

        assert_eq!(observation.field("note").unwrap().max(), Max::Unbounded);

        match &observation.entries[2] {
            SchemaEntry::Choice(group) => {
                assert_eq!(group.logical_name, "value");
                assert_eq!(group.variants.len(), 2);
                assert_eq!(group.variants[1].property_name(), "valuePeriod");
            }
            other => panic!("expected choice, got {other:?}"),
        }
    }

    #[test]
    fn test_load_catalog_into_registry() {
        let registry = SchemaRegistry::from_catalog_json(CATALOG).unwrap();
        assert_eq!(registry.type_names(), vec!["Observation", "Period"]);
        assert!(registry.unresolved_references().is_empty());

        // loading the same catalog twice is idempotent
        let catalog = SchemaCatalog::from_json_str(CATALOG).unwrap();
        assert_eq!(registry.load_catalog(&catalog).unwrap(), 2);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_choice_with_max_above_one_rejected() {
        let json = r#"{ "types": [ { "name": "X", "elements": [
            { "choice": "value", "types": ["string"], "max": "*" } ] } ] }"#;
        let err = SchemaRegistry::from_catalog_json(json).unwrap_err();
        assert!(matches!(err, FhirRecordError::InvalidSchema { .. }));
    }

    #[test]
    fn test_malformed_catalog_is_serialization_error() {
        let err = SchemaCatalog::from_json_str(r#"{ "types": [ { "name": 1 } ] }"#).unwrap_err();
        assert!(matches!(err, FhirRecordError::Serialization(_)));
    }
}
