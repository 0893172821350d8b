// Polymorphic ("choice") field groups such as `value[x]`

use serde::{Deserialize, Serialize};

use super::element::{BindingDefinition, Cardinality, FieldDescriptor, Max};
use super::primitive::TypeRef;

/// One concrete alternative of a choice group.
///
/// The descriptor is named after the concrete property (`valueDateTime`)
/// and carries the group's cardinality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceVariant {
    pub suffix: String,
    pub descriptor: FieldDescriptor,
}

impl ChoiceVariant {
    pub fn type_code(&self) -> &str {
        self.descriptor.declared_type.code()
    }

    pub fn property_name(&self) -> &str {
        &self.descriptor.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolymorphicGroup {
    pub logical_name: String,
    pub cardinality: Cardinality,
    pub variants: Vec<ChoiceVariant>,
}

impl PolymorphicGroup {
    pub fn new(logical_name: impl Into<String>) -> Self {
        Self {
            logical_name: logical_name.into(),
            cardinality: Cardinality::optional(),
            variants: Vec::new(),
        }
    }

    /// Make the group mandatory: exactly one variant must be populated
    pub fn required(mut self) -> Self {
        self.cardinality = Cardinality::required();
        for variant in &mut self.variants {
            variant.descriptor.cardinality = self.cardinality;
        }
        self
    }

    pub fn with_variant(self, type_ref: impl Into<TypeRef>) -> Self {
        self.with_variant_binding(type_ref, None)
    }

    pub fn with_variant_binding(
        mut self,
        type_ref: impl Into<TypeRef>,
        binding: Option<BindingDefinition>,
    ) -> Self {
        let type_ref = type_ref.into();
        let suffix = choice_suffix(type_ref.code());
        let mut descriptor = FieldDescriptor::new(format!("{}{suffix}", self.logical_name), type_ref);
        descriptor.cardinality = self.cardinality;
        descriptor.binding = binding;
        self.variants.push(ChoiceVariant { suffix, descriptor });
        self
    }

    pub fn with_variants<I, T>(self, type_refs: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeRef>,
    {
        type_refs
            .into_iter()
            .fold(self, |group, type_ref| group.with_variant(type_ref))
    }

    pub fn min(&self) -> u32 {
        self.cardinality.min
    }

    pub fn max(&self) -> Max {
        self.cardinality.max
    }

    /// Find the variant for an exact, case-sensitive suffix (`DateTime`)
    pub fn variant_by_suffix(&self, suffix: &str) -> Option<&ChoiceVariant> {
        self.variants.iter().find(|v| v.suffix == suffix)
    }

    /// Find the variant for a type code (`dateTime`)
    pub fn variant_by_type(&self, type_code: &str) -> Option<&ChoiceVariant> {
        self.variants.iter().find(|v| v.type_code() == type_code)
    }

    /// Find the variant whose concrete property name is `property`
    pub fn variant_by_property(&self, property: &str) -> Option<&ChoiceVariant> {
        property
            .strip_prefix(self.logical_name.as_str())
            .and_then(|suffix| self.variant_by_suffix(suffix))
    }

    /// Whether `property` looks like a concrete property of this group:
    /// the logical name followed by an upper-case type suffix.
    pub fn claims_property(&self, property: &str) -> bool {
        property
            .strip_prefix(self.logical_name.as_str())
            .and_then(|suffix| suffix.chars().next())
            .is_some_and(|c| c.is_ascii_uppercase())
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(|v| v.property_name())
    }
}

/// Concrete property suffix for a type code: `dateTime` -> `DateTime`
pub fn choice_suffix(type_code: &str) -> String {
    let name = type_code.rsplit('/').next().unwrap_or(type_code);
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
