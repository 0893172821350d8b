//! Coded-value binding checks.
//!
//! Coded content is recognised by shape: a bare `code` string, a
//! Coding-like record (`system` + `code`), or a CodeableConcept-like record
//! (`coding` occurrences plus optional `text`).

use crate::core::AdvisoryBindingMode;
use crate::instance::{Instance, Value};
use crate::types::{BindingDefinition, BindingStrength};

use super::{ValidationIssue, ValidationSeverity};

/// Codes carried by a value, as `(system, code)` pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodedContent<'a> {
    Codes(Vec<(Option<&'a str>, &'a str)>),
    /// A concept with text but no coding
    TextOnly,
    NotCoded,
}

pub fn coded_content(value: &Value) -> CodedContent<'_> {
    match value {
        Value::Primitive(primitive) => match primitive.as_str() {
            Some(code) => CodedContent::Codes(vec![(None, code)]),
            None => CodedContent::NotCoded,
        },
        Value::Record(record) => record_content(record),
        _ => CodedContent::NotCoded,
    }
}

fn record_content(record: &Instance) -> CodedContent<'_> {
    if let Some(pair) = coding_pair(record) {
        return CodedContent::Codes(vec![pair]);
    }

    let codes: Vec<_> = match record.get("coding") {
        Some(Value::List(items)) => items
            .iter()
            .filter_map(Value::as_record)
            .filter_map(coding_pair)
            .collect(),
        Some(Value::Record(coding)) => coding_pair(coding).into_iter().collect(),
        _ => Vec::new(),
    };

    if !codes.is_empty() {
        CodedContent::Codes(codes)
    } else if record.contains("text") {
        CodedContent::TextOnly
    } else {
        CodedContent::NotCoded
    }
}

fn coding_pair(record: &Instance) -> Option<(Option<&str>, &str)> {
    let code = record.get("code").and_then(Value::as_str)?;
    let system = record.get("system").and_then(Value::as_str);
    Some((system, code))
}

/// Severity of a membership violation, or `None` when it goes unreported
pub fn violation_severity(
    strength: BindingStrength,
    advisory: AdvisoryBindingMode,
) -> Option<ValidationSeverity> {
    match strength {
        BindingStrength::Required => Some(ValidationSeverity::Error),
        BindingStrength::Extensible => Some(ValidationSeverity::Warning),
        BindingStrength::Preferred | BindingStrength::Example => match advisory {
            AdvisoryBindingMode::Report => Some(ValidationSeverity::Information),
            AdvisoryBindingMode::Suppress => None,
            AdvisoryBindingMode::Enforce => Some(ValidationSeverity::Error),
        },
    }
}

/// Check `value` against `binding`. Paths are filled in by the caller.
pub fn check_binding(
    binding: &BindingDefinition,
    value: &Value,
    advisory: AdvisoryBindingMode,
) -> Option<ValidationIssue> {
    let content = coded_content(value);
    if content == CodedContent::NotCoded {
        return None;
    }

    if binding.is_open() {
        tracing::debug!(
            "Binding to {} enumerates no codes, skipping membership check",
            binding.value_set.as_deref().unwrap_or("<anonymous value set>")
        );
        return None;
    }

    let target = binding
        .value_set
        .as_deref()
        .map(|vs| format!(" ({vs})"))
        .unwrap_or_default();

    match content {
        CodedContent::Codes(codes) => {
            if codes.iter().any(|(system, code)| binding.contains(*system, code)) {
                return None;
            }
            let severity = violation_severity(binding.strength, advisory)?;
            let listed = codes
                .iter()
                .map(|(system, code)| match system {
                    Some(system) => format!("{system}#{code}"),
                    None => (*code).to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            Some(ValidationIssue::new(
                severity,
                "code-invalid",
                format!(
                    "Code {listed} is not in the {} value set{target}",
                    binding.strength
                ),
            ))
        }
        CodedContent::TextOnly if binding.strength == BindingStrength::Required => {
            Some(ValidationIssue::error(
                "code-missing",
                format!("A code is required by the required binding{target}, found text only"),
            ))
        }
        _ => None,
    }
}
