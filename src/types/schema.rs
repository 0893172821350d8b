use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::choice_group::PolymorphicGroup;
use super::element::FieldDescriptor;
use crate::error::{FhirRecordError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecordKind {
    /// Top-level resource, carries a `resourceType` discriminator
    #[serde(rename = "resource")]
    Resource,
    #[default]
    #[serde(rename = "complex-type")]
    ComplexType,
    /// Nested structure owned by a parent type (e.g. `ElementDefinition.constraint`)
    #[serde(rename = "backbone")]
    Backbone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemaEntry {
    Field(FieldDescriptor),
    Choice(PolymorphicGroup),
}

impl SchemaEntry {
    /// Field name, or logical name for a choice group
    pub fn name(&self) -> &str {
        match self {
            SchemaEntry::Field(field) => &field.name,
            SchemaEntry::Choice(group) => &group.logical_name,
        }
    }
}

/// Ordered field catalog of one record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSchema {
    pub type_name: String,
    pub kind: RecordKind,
    pub url: Option<String>,
    pub entries: Vec<SchemaEntry>,
}

impl RecordSchema {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            kind: RecordKind::ComplexType,
            url: None,
            entries: Vec::new(),
        }
    }

    pub fn resource(type_name: impl Into<String>) -> Self {
        Self::new(type_name).with_kind(RecordKind::Resource)
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_field(mut self, field: FieldDescriptor) -> Self {
        self.entries.push(SchemaEntry::Field(field));
        self
    }

    pub fn with_choice(mut self, group: PolymorphicGroup) -> Self {
        self.entries.push(SchemaEntry::Choice(group));
        self
    }

    pub fn is_resource(&self) -> bool {
        self.kind == RecordKind::Resource
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.entries.iter().filter_map(|entry| match entry {
            SchemaEntry::Field(field) => Some(field),
            SchemaEntry::Choice(_) => None,
        })
    }

    pub fn choice_groups(&self) -> impl Iterator<Item = &PolymorphicGroup> {
        self.entries.iter().filter_map(|entry| match entry {
            SchemaEntry::Choice(group) => Some(group),
            SchemaEntry::Field(_) => None,
        })
    }

    /// Exact plain-field lookup
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields().find(|field| field.name == name)
    }

    pub fn choice_group(&self, logical_name: &str) -> Option<&PolymorphicGroup> {
        self.choice_groups()
            .find(|group| group.logical_name == logical_name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Record types referenced by this schema, in declaration order
    pub fn referenced_types(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut types = Vec::new();
        for entry in &self.entries {
            let descriptors: Vec<&FieldDescriptor> = match entry {
                SchemaEntry::Field(field) => vec![field],
                SchemaEntry::Choice(group) => group.variants.iter().map(|v| &v.descriptor).collect(),
            };
            for descriptor in descriptors {
                if let Some(name) = descriptor.declared_type.record_name()
                    && seen.insert(name)
                {
                    types.push(name);
                }
            }
        }
        types
    }

    /// Structural integrity checks run before a schema is registered
    pub fn check(&self) -> Result<()> {
        let invalid = |message: String| FhirRecordError::invalid_schema(&self.type_name, message);

        if self.type_name.is_empty() {
            return Err(invalid("type name must not be empty".to_string()));
        }

        let mut names = HashSet::new();
        for entry in &self.entries {
            match entry {
                SchemaEntry::Field(field) => {
                    check_descriptor(field).map_err(invalid)?;
                    if !names.insert(field.name.as_str()) {
                        return Err(invalid(format!("duplicate property '{}'", field.name)));
                    }
                }
                SchemaEntry::Choice(group) => {
                    if group.logical_name.is_empty() {
                        return Err(invalid("choice group without a logical name".to_string()));
                    }
                    if group.variants.is_empty() {
                        return Err(invalid(format!(
                            "choice group '{}' declares no variants",
                            group.logical_name
                        )));
                    }
                    if !group.cardinality.is_consistent() {
                        return Err(invalid(format!(
                            "choice group '{}' has inconsistent cardinality {}",
                            group.logical_name, group.cardinality
                        )));
                    }
                    if !names.insert(group.logical_name.as_str()) {
                        return Err(invalid(format!(
                            "duplicate property '{}'",
                            group.logical_name
                        )));
                    }
                    for variant in &group.variants {
                        check_descriptor(&variant.descriptor).map_err(invalid)?;
                        if !names.insert(variant.property_name()) {
                            return Err(invalid(format!(
                                "duplicate property '{}'",
                                variant.property_name()
                            )));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

fn check_descriptor(field: &FieldDescriptor) -> std::result::Result<(), String> {
    if field.name.is_empty() {
        return Err("field without a name".to_string());
    }
    if !field.cardinality.is_consistent() {
        return Err(format!(
            "field '{}' has inconsistent cardinality {}",
            field.name, field.cardinality
        ));
    }
    for profile in &field.profiles {
        url::Url::parse(profile)
            .map_err(|e| format!("field '{}' has invalid profile '{profile}': {e}", field.name))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Max, PrimitiveType};

    fn observation() -> RecordSchema {
        RecordSchema::resource("Observation")
            .with_field(FieldDescriptor::new("status", PrimitiveType::Code).required())
            .with_field(FieldDescriptor::new("code", "CodeableConcept").required())
            .with_choice(PolymorphicGroup::new("value").with_variants(["Quantity", "string", "Period"]))
    }

    #[test]
    fn test_lookup_helpers() {
        let schema = observation();
        assert!(schema.is_resource());
        assert!(schema.has_field("status"));
        assert!(!schema.has_field("value"));
        assert!(schema.choice_group("value").is_some());
        assert_eq!(schema.fields().count(), 2);
        assert_eq!(
            schema.referenced_types(),
            vec!["CodeableConcept", "Quantity", "Period"]
        );
    }

    #[test]
    fn test_check_accepts_valid_schema() {
        assert!(observation().check().is_ok());
    }

    #[test]
    fn test_check_rejects_duplicates() {
        let schema = observation().with_field(FieldDescriptor::new("status", PrimitiveType::Code));
        assert!(matches!(
            schema.check(),
            Err(FhirRecordError::InvalidSchema { .. })
        ));

        let schema = observation().with_field(FieldDescriptor::new("valueString", PrimitiveType::String));
        assert!(schema.check().is_err());
    }

    #[test]
    fn test_check_rejects_bad_cardinality_and_profiles() {
        let schema = RecordSchema::new("Bad")
            .with_field(FieldDescriptor::new("x", PrimitiveType::String).with_cardinality(2, Max::Bounded(1)));
        assert!(schema.check().is_err());

        let schema = RecordSchema::new("Bad")
            .with_field(FieldDescriptor::new("subject", "Reference").with_profile("not a uri"));
        assert!(schema.check().is_err());

        let schema = RecordSchema::new("Bad").with_choice(PolymorphicGroup::new("value"));
        assert!(schema.check().is_err());
    }
}
