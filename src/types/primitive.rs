// Declared types of fields: FHIR primitives and named record types

use serde::{Deserialize, Serialize};
use std::fmt;

/// FHIR primitive data types understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "unsignedInt")]
    UnsignedInt,
    #[serde(rename = "positiveInt")]
    PositiveInt,
    #[serde(rename = "decimal")]
    Decimal,
    #[serde(rename = "string")]
    String,
    #[serde(rename = "markdown")]
    Markdown,
    #[serde(rename = "code")]
    Code,
    #[serde(rename = "id")]
    Id,
    #[serde(rename = "uri")]
    Uri,
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "canonical")]
    Canonical,
    #[serde(rename = "oid")]
    Oid,
    #[serde(rename = "uuid")]
    Uuid,
    #[serde(rename = "base64Binary")]
    Base64Binary,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "dateTime")]
    DateTime,
    #[serde(rename = "instant")]
    Instant,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "xhtml")]
    Xhtml,
}

/// JSON representation class of a primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Boolean,
    Integer,
    Decimal,
    String,
}

impl PrimitiveType {
    pub const ALL: &'static [PrimitiveType] = &[
        PrimitiveType::Boolean,
        PrimitiveType::Integer,
        PrimitiveType::UnsignedInt,
        PrimitiveType::PositiveInt,
        PrimitiveType::Decimal,
        PrimitiveType::String,
        PrimitiveType::Markdown,
        PrimitiveType::Code,
        PrimitiveType::Id,
        PrimitiveType::Uri,
        PrimitiveType::Url,
        PrimitiveType::Canonical,
        PrimitiveType::Oid,
        PrimitiveType::Uuid,
        PrimitiveType::Base64Binary,
        PrimitiveType::Date,
        PrimitiveType::DateTime,
        PrimitiveType::Instant,
        PrimitiveType::Time,
        PrimitiveType::Xhtml,
    ];

    /// Type code as written in FHIR definitions (e.g. `dateTime`)
    pub fn code(&self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Integer => "integer",
            PrimitiveType::UnsignedInt => "unsignedInt",
            PrimitiveType::PositiveInt => "positiveInt",
            PrimitiveType::Decimal => "decimal",
            PrimitiveType::String => "string",
            PrimitiveType::Markdown => "markdown",
            PrimitiveType::Code => "code",
            PrimitiveType::Id => "id",
            PrimitiveType::Uri => "uri",
            PrimitiveType::Url => "url",
            PrimitiveType::Canonical => "canonical",
            PrimitiveType::Oid => "oid",
            PrimitiveType::Uuid => "uuid",
            PrimitiveType::Base64Binary => "base64Binary",
            PrimitiveType::Date => "date",
            PrimitiveType::DateTime => "dateTime",
            PrimitiveType::Instant => "instant",
            PrimitiveType::Time => "time",
            PrimitiveType::Xhtml => "xhtml",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.code() == code)
    }

    pub fn kind(&self) -> PrimitiveKind {
        match self {
            PrimitiveType::Boolean => PrimitiveKind::Boolean,
            PrimitiveType::Integer
            | PrimitiveType::UnsignedInt
            | PrimitiveType::PositiveInt => PrimitiveKind::Integer,
            PrimitiveType::Decimal => PrimitiveKind::Decimal,
            _ => PrimitiveKind::String,
        }
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Declared type of a field.
///
/// Record types are referenced by name and resolved through the registry
/// when needed, so a schema may refer to itself (`Extension.extension`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TypeRef {
    Primitive(PrimitiveType),
    Record(String),
}

impl TypeRef {
    pub fn primitive(primitive: PrimitiveType) -> Self {
        TypeRef::Primitive(primitive)
    }

    pub fn record(name: impl Into<String>) -> Self {
        TypeRef::Record(name.into())
    }

    /// Parse a type code; unknown codes name record types
    pub fn parse(code: &str) -> Self {
        match PrimitiveType::from_code(code) {
            Some(primitive) => TypeRef::Primitive(primitive),
            None => TypeRef::Record(code.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            TypeRef::Primitive(p) => p.code(),
            TypeRef::Record(name) => name,
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeRef::Primitive(_))
    }

    pub fn as_primitive(&self) -> Option<PrimitiveType> {
        match self {
            TypeRef::Primitive(p) => Some(*p),
            TypeRef::Record(_) => None,
        }
    }

    pub fn record_name(&self) -> Option<&str> {
        match self {
            TypeRef::Record(name) => Some(name),
            TypeRef::Primitive(_) => None,
        }
    }
}

impl From<String> for TypeRef {
    fn from(code: String) -> Self {
        TypeRef::parse(&code)
    }
}

impl From<&str> for TypeRef {
    fn from(code: &str) -> Self {
        TypeRef::parse(code)
    }
}

impl From<PrimitiveType> for TypeRef {
    fn from(primitive: PrimitiveType) -> Self {
        TypeRef::Primitive(primitive)
    }
}

impl From<TypeRef> for String {
    fn from(type_ref: TypeRef) -> Self {
        type_ref.code().to_string()
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}
