// Field descriptors with cardinality and coded-value binding support

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::primitive::TypeRef;

/// Upper cardinality bound, written `"1"` or `"*"` in definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Max {
    Bounded(u32),
    Unbounded,
}

impl Max {
    pub fn allows(&self, count: usize) -> bool {
        match self {
            Max::Bounded(max) => count <= *max as usize,
            Max::Unbounded => true,
        }
    }
}

impl TryFrom<String> for Max {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        if value == "*" {
            return Ok(Max::Unbounded);
        }
        value
            .parse::<u32>()
            .map(Max::Bounded)
            .map_err(|_| format!("invalid max cardinality '{value}'"))
    }
}

impl From<Max> for String {
    fn from(max: Max) -> Self {
        max.to_string()
    }
}

impl fmt::Display for Max {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Max::Bounded(max) => write!(f, "{max}"),
            Max::Unbounded => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cardinality {
    pub min: u32,
    pub max: Max,
}

impl Cardinality {
    pub fn new(min: u32, max: Max) -> Self {
        Self { min, max }
    }

    pub fn optional() -> Self {
        Self::new(0, Max::Bounded(1))
    }

    pub fn required() -> Self {
        Self::new(1, Max::Bounded(1))
    }

    pub fn many() -> Self {
        Self::new(0, Max::Unbounded)
    }

    /// Whether occurrences are carried as a list in the interchange tree
    pub fn is_array(&self) -> bool {
        self.max != Max::Bounded(1)
    }

    /// `min <= max`; `0..0` marks a prohibited element
    pub fn is_consistent(&self) -> bool {
        match self.max {
            Max::Bounded(max) => max >= self.min,
            Max::Unbounded => true,
        }
    }
}

impl Default for Cardinality {
    fn default() -> Self {
        Self::optional()
    }
}

impl fmt::Display for Cardinality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindingStrength {
    #[serde(rename = "required")]
    Required,
    #[serde(rename = "extensible")]
    Extensible,
    #[serde(rename = "preferred")]
    Preferred,
    #[serde(rename = "example")]
    Example,
}

impl BindingStrength {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingStrength::Required => "required",
            BindingStrength::Extensible => "extensible",
            BindingStrength::Preferred => "preferred",
            BindingStrength::Example => "example",
        }
    }

    /// Preferred and example bindings never block acceptance
    pub fn is_advisory(&self) -> bool {
        matches!(self, BindingStrength::Preferred | BindingStrength::Example)
    }
}

impl fmt::Display for BindingStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coded-value binding with the allowed codes enumerated per code system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingDefinition {
    pub strength: BindingStrength,
    pub value_set: Option<String>,
    pub allowed_codes: IndexMap<String, BTreeSet<String>>,
}

impl BindingDefinition {
    pub fn new(strength: BindingStrength) -> Self {
        Self {
            strength,
            value_set: None,
            allowed_codes: IndexMap::new(),
        }
    }

    pub fn with_value_set(mut self, value_set: impl Into<String>) -> Self {
        self.value_set = Some(value_set.into());
        self
    }

    pub fn with_codes<I, S>(mut self, system: impl Into<String>, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_codes
            .entry(system.into())
            .or_default()
            .extend(codes.into_iter().map(Into::into));
        self
    }

    /// No codes enumerated; membership cannot be checked syntactically
    pub fn is_open(&self) -> bool {
        self.allowed_codes.values().all(|codes| codes.is_empty())
    }

    /// Check a code for membership. Without a system every enumerated
    /// system is searched.
    pub fn contains(&self, system: Option<&str>, code: &str) -> bool {
        match system {
            Some(system) => self
                .allowed_codes
                .get(system)
                .is_some_and(|codes| codes.contains(code)),
            None => self.allowed_codes.values().any(|codes| codes.contains(code)),
        }
    }
}

/// Declared shape of one named field of a record type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub declared_type: TypeRef,
    pub cardinality: Cardinality,
    pub binding: Option<BindingDefinition>,
    pub profiles: BTreeSet<String>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<TypeRef>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            cardinality: Cardinality::default(),
            binding: None,
            profiles: BTreeSet::new(),
        }
    }

    pub fn with_cardinality(mut self, min: u32, max: Max) -> Self {
        self.cardinality = Cardinality::new(min, max);
        self
    }

    pub fn required(self) -> Self {
        self.with_cardinality(1, Max::Bounded(1))
    }

    pub fn repeating(self) -> Self {
        let min = self.cardinality.min;
        self.with_cardinality(min, Max::Unbounded)
    }

    pub fn with_binding(mut self, binding: BindingDefinition) -> Self {
        self.binding = Some(binding);
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profiles.insert(profile.into());
        self
    }

    pub fn min(&self) -> u32 {
        self.cardinality.min
    }

    pub fn max(&self) -> Max {
        self.cardinality.max
    }

    pub fn is_array(&self) -> bool {
        self.cardinality.is_array()
    }
}
