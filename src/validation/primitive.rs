//! Lexical checks for primitive values.
//!
//! Patterns follow the regular expressions published for each FHIR
//! primitive type. `instant` and `url` are checked by parsing.

use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::instance::Primitive;
use crate::types::{PrimitiveKind, PrimitiveType};

static ID_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-\.]{1,64}$").unwrap());
static CODE_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\s]+( [^\s]+)*$").unwrap());
static OID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^urn:oid:[0-2](\.(0|[1-9][0-9]*))+$").unwrap());
static UUID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^urn:uuid:[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});
static BASE64_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\s*([0-9a-zA-Z+/=]){4}\s*)+$").unwrap());
static URI_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\S*$").unwrap());
static DATE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9]([0-9]([0-9][1-9]|[1-9]0)|[1-9]00)|[1-9]000)(-(0[1-9]|1[0-2])(-(0[1-9]|[1-2][0-9]|3[0-1]))?)?$",
    )
    .unwrap()
});
static DATE_TIME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^([0-9]([0-9]([0-9][1-9]|[1-9]0)|[1-9]00)|[1-9]000)(-(0[1-9]|1[0-2])(-(0[1-9]|[1-2][0-9]|3[0-1])(T([01][0-9]|2[0-3]):[0-5][0-9]:([0-5][0-9]|60)(\.[0-9]+)?(Z|(\+|-)((0[0-9]|1[0-3]):[0-5][0-9]|14:00)))?)?)?$",
    )
    .unwrap()
});
static TIME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]:([0-5][0-9]|60)(\.[0-9]+)?$").unwrap());

/// Whether the in-memory kind of `value` can carry `primitive_type`.
/// Integers are accepted where decimals are declared.
pub fn kind_matches(primitive_type: PrimitiveType, value: &Primitive) -> bool {
    matches!(
        (primitive_type.kind(), value),
        (PrimitiveKind::Boolean, Primitive::Boolean(_))
            | (PrimitiveKind::Integer, Primitive::Integer(_))
            | (PrimitiveKind::Decimal, Primitive::Decimal(_) | Primitive::Integer(_))
            | (PrimitiveKind::String, Primitive::String(_))
    )
}

/// Check the lexical form of a value already known to be of the right kind.
/// Returns a description of the violation.
pub fn check_format(primitive_type: PrimitiveType, value: &Primitive) -> Option<String> {
    match value {
        Primitive::Integer(i) => check_integer(primitive_type, *i),
        Primitive::String(s) => check_string(primitive_type, s),
        Primitive::Boolean(_) | Primitive::Decimal(_) => None,
    }
}

fn check_integer(primitive_type: PrimitiveType, value: i64) -> Option<String> {
    let (low, label) = match primitive_type {
        PrimitiveType::PositiveInt => (1, "a positive integer"),
        PrimitiveType::UnsignedInt => (0, "an unsigned integer"),
        PrimitiveType::Integer => (i64::from(i32::MIN), "a 32-bit integer"),
        _ => return None,
    };
    (value < low || value > i64::from(i32::MAX)).then(|| format!("{value} is not {label}"))
}

fn check_string(primitive_type: PrimitiveType, value: &str) -> Option<String> {
    let valid = match primitive_type {
        PrimitiveType::String | PrimitiveType::Markdown | PrimitiveType::Xhtml => {
            !value.trim().is_empty()
        }
        PrimitiveType::Code => CODE_REGEX.is_match(value),
        PrimitiveType::Id => ID_REGEX.is_match(value),
        PrimitiveType::Uri | PrimitiveType::Canonical => !value.is_empty() && URI_REGEX.is_match(value),
        PrimitiveType::Url => Url::parse(value).is_ok(),
        PrimitiveType::Oid => OID_REGEX.is_match(value),
        PrimitiveType::Uuid => UUID_REGEX.is_match(value),
        PrimitiveType::Base64Binary => BASE64_REGEX.is_match(value),
        PrimitiveType::Date => DATE_REGEX.is_match(value),
        PrimitiveType::DateTime => DATE_TIME_REGEX.is_match(value),
        PrimitiveType::Instant => DateTime::parse_from_rfc3339(value).is_ok(),
        PrimitiveType::Time => TIME_REGEX.is_match(value),
        _ => true,
    };

    (!valid).then(|| format!("'{value}' is not a valid {primitive_type}"))
}
