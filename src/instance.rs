//! In-memory record instances.
//!
//! An [`Instance`] maps property names to [`Value`]s. Choice fields are
//! stored under their logical name as a [`ChoiceValue`] (a tagged union);
//! the concrete property naming (`valueDateTime`) only appears at the codec
//! boundary. Properties named after a concrete variant may still be set
//! directly, and the choice resolver treats both forms alike.
//!
//! Instances are plain owned data. They are `Send + Sync` but not
//! internally synchronized; callers sharing one across threads must
//! serialize their own writes.

use indexmap::IndexMap;
use serde_json::Number;
use std::fmt;

use crate::error::{FhirRecordError, Result};
use crate::types::PolymorphicGroup;

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Boolean(bool),
    Integer(i64),
    Decimal(Number),
    String(String),
}

impl Primitive {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Primitive::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Primitive::Boolean(_) => "boolean",
            Primitive::Integer(_) => "integer",
            Primitive::Decimal(_) => "decimal",
            Primitive::String(_) => "string",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Boolean(b) => write!(f, "{b}"),
            Primitive::Integer(i) => write!(f, "{i}"),
            Primitive::Decimal(n) => write!(f, "{n}"),
            Primitive::String(s) => f.write_str(s),
        }
    }
}

/// Populated choice slot: the chosen variant's type code and its content
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceValue {
    pub type_code: String,
    pub value: Box<Value>,
}

impl ChoiceValue {
    pub fn new(type_code: impl Into<String>, value: Value) -> Self {
        Self {
            type_code: type_code.into(),
            value: Box::new(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Primitive(Primitive),
    Record(Instance),
    List(Vec<Value>),
    Choice(ChoiceValue),
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::Primitive(Primitive::String(value.into()))
    }

    pub fn integer(value: i64) -> Self {
        Value::Primitive(Primitive::Integer(value))
    }

    pub fn boolean(value: bool) -> Self {
        Value::Primitive(Primitive::Boolean(value))
    }

    /// Decimal from an `f64`; non-finite inputs have no FHIR representation
    pub fn decimal(value: f64) -> Option<Self> {
        Number::from_f64(value).map(|n| Value::Primitive(Primitive::Decimal(n)))
    }

    pub fn list(values: impl IntoIterator<Item = Value>) -> Self {
        Value::List(values.into_iter().collect())
    }

    /// Number of occurrences this value contributes to a cardinality count
    pub fn occurrences(&self) -> usize {
        match self {
            Value::List(items) => items.len(),
            Value::Choice(choice) => choice.value.occurrences(),
            _ => 1,
        }
    }

    pub fn as_primitive(&self) -> Option<&Primitive> {
        match self {
            Value::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_primitive().and_then(Primitive::as_str)
    }

    pub fn as_record(&self) -> Option<&Instance> {
        match self {
            Value::Record(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Primitive(p) => p.kind_name(),
            Value::Record(_) => "record",
            Value::List(_) => "list",
            Value::Choice(_) => "choice",
        }
    }
}

impl From<Primitive> for Value {
    fn from(primitive: Primitive) -> Self {
        Value::Primitive(primitive)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::Record(instance)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::string(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::string(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::integer(value)
    }
}

/// A record of some registered type
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    type_name: String,
    properties: IndexMap<String, Value>,
}

impl Instance {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: IndexMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn with_choice(
        mut self,
        logical_name: impl Into<String>,
        type_code: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        self.set_choice(logical_name, type_code, value);
        self
    }

    /// Set a property, replacing any previous value.
    ///
    /// No schema is consulted, so setting a concrete variant property such
    /// as `valueDateTime` next to a populated `value` slot leaves two
    /// variants of one choice group. Encode and validation report that as
    /// an ambiguous choice; [`Instance::bind_choice`] keeps a group to one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(name.into(), value.into())
    }

    /// Append an occurrence to a repeating property
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let value = value.into();
        match self.properties.entry(name.into()) {
            indexmap::map::Entry::Occupied(mut entry) => match entry.get_mut() {
                Value::List(items) => items.push(value),
                existing => {
                    let previous = std::mem::replace(existing, Value::List(Vec::new()));
                    *existing = Value::List(vec![previous, value]);
                }
            },
            indexmap::map::Entry::Vacant(entry) => {
                entry.insert(Value::List(vec![value]));
            }
        }
    }

    /// Populate a choice slot in its tagged form; any previous content of
    /// the slot is replaced.
    ///
    /// Concrete variant properties already present are left in place: without
    /// the schema `valueSet` is indistinguishable from a `Set` variant of
    /// `value[x]`. Only [`Instance::bind_choice`] clears the other variants.
    pub fn set_choice(
        &mut self,
        logical_name: impl Into<String>,
        type_code: impl Into<String>,
        value: impl Into<Value>,
    ) -> Option<Value> {
        self.properties.insert(
            logical_name.into(),
            Value::Choice(ChoiceValue::new(type_code, value.into())),
        )
    }

    /// Schema-aware choice setter: rejects undeclared types and clears any
    /// concrete variant properties so at most one variant stays populated.
    pub fn bind_choice(
        &mut self,
        group: &PolymorphicGroup,
        type_code: &str,
        value: impl Into<Value>,
    ) -> Result<()> {
        let variant = group.variant_by_type(type_code).ok_or_else(|| {
            FhirRecordError::unknown_choice_variant(
                format!("{}.{}", self.type_name, group.logical_name),
                format!("{}{}", group.logical_name, crate::types::choice_suffix(type_code)),
            )
        })?;
        for property in group.property_names() {
            self.properties.shift_remove(property);
        }
        let type_code = variant.type_code().to_string();
        self.set_choice(group.logical_name.clone(), type_code, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.properties.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.shift_remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties.contains_key(name)
    }

    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
