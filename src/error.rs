use thiserror::Error;

#[derive(Error, Debug)]
pub enum FhirRecordError {
    #[error("Unknown record type: {type_name}")]
    UnknownType { type_name: String },

    #[error("Conflicting schema registration for type: {type_name}")]
    SchemaConflict { type_name: String },

    #[error("Invalid schema for {type_name}: {message}")]
    InvalidSchema { type_name: String, message: String },

    #[error("Ambiguous choice at {path}: {} are populated", .properties.join(", "))]
    AmbiguousChoice {
        path: String,
        properties: Vec<String>,
    },

    #[error("Unknown choice variant '{property}' at {path}")]
    UnknownChoiceVariant { path: String, property: String },

    #[error("Decode error at {path}: {message}")]
    Decode { path: String, message: String },

    #[error("Encode error at {path}: {message}")]
    Encode { path: String, message: String },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FhirRecordError>;

impl FhirRecordError {
    pub fn unknown_type<S: Into<String>>(type_name: S) -> Self {
        Self::UnknownType {
            type_name: type_name.into(),
        }
    }

    pub fn schema_conflict<S: Into<String>>(type_name: S) -> Self {
        Self::SchemaConflict {
            type_name: type_name.into(),
        }
    }

    pub fn invalid_schema<S: Into<String>, M: Into<String>>(type_name: S, message: M) -> Self {
        Self::InvalidSchema {
            type_name: type_name.into(),
            message: message.into(),
        }
    }

    pub fn ambiguous_choice<S: Into<String>>(path: S, properties: Vec<String>) -> Self {
        Self::AmbiguousChoice {
            path: path.into(),
            properties,
        }
    }

    pub fn unknown_choice_variant<S: Into<String>, P: Into<String>>(path: S, property: P) -> Self {
        Self::UnknownChoiceVariant {
            path: path.into(),
            property: property.into(),
        }
    }

    pub fn decode<S: Into<String>, M: Into<String>>(path: S, message: M) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn encode<S: Into<String>, M: Into<String>>(path: S, message: M) -> Self {
        Self::Encode {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn xml<S: Into<String>>(message: S) -> Self {
        Self::Xml(message.into())
    }

    /// True for problems with the payload or instance, false for problems
    /// with the schema catalog or the calling code.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::Decode { .. } | Self::Encode { .. } | Self::Xml(_) | Self::Serialization(_)
        )
    }

    /// Path of the offending property, when the error carries one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::AmbiguousChoice { path, .. }
            | Self::UnknownChoiceVariant { path, .. }
            | Self::Decode { path, .. }
            | Self::Encode { path, .. } => Some(path),
            _ => None,
        }
    }
}
