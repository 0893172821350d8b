use serde::{Deserialize, Serialize};

use crate::error::Result;

/// FHIR XML namespace, used for the root element of encoded records
pub const FHIR_NAMESPACE: &str = "http://hl7.org/fhir";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub validation: ValidationOptions,
    pub codec: CodecOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationOptions {
    /// How violations of `preferred` and `example` bindings are reported
    pub advisory_bindings: AdvisoryBindingMode,
    /// Check primitive values against their lexical rules
    pub check_primitive_formats: bool,
    /// Check reference targets against a field's declared profiles
    pub check_reference_targets: bool,
}

/// Reporting of advisory (`preferred`/`example`) binding violations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryBindingMode {
    /// Informational finding
    #[default]
    Report,
    /// No finding at all
    Suppress,
    /// Error, for strict validation contexts
    Enforce,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CodecOptions {
    /// Emit `resourceType` as the first key of encoded resources
    pub emit_resource_type: bool,
    pub xml_namespace: String,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            advisory_bindings: AdvisoryBindingMode::Report,
            check_primitive_formats: true,
            check_reference_targets: true,
        }
    }
}

impl ValidationOptions {
    /// Advisory bindings become errors
    pub fn strict() -> Self {
        Self {
            advisory_bindings: AdvisoryBindingMode::Enforce,
            ..Self::default()
        }
    }
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            emit_resource_type: true,
            xml_namespace: FHIR_NAMESPACE.to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from JSON; absent keys keep their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_validation(mut self, validation: ValidationOptions) -> Self {
        self.validation = validation;
        self
    }

    pub fn with_codec(mut self, codec: CodecOptions) -> Self {
        self.codec = codec;
        self
    }
}
