//! # OctoFHIR FHIR Records
//!
//! A metadata-driven engine for FHIR-style records: record types are data
//! ([`RecordSchema`] values held in a [`SchemaRegistry`]), and one generic
//! [`Instance`] type is validated and serialized against them.
//!
//! ## Features
//!
//! - **Choice types**: `value[x]` groups are a tagged union in memory and
//!   projected onto concrete properties (`valueDateTime`) only at the codec
//! - **Validation**: cardinality, coded-value bindings of every strength,
//!   primitive formats and nested records, with dotted paths
//! - **Codecs**: lossless JSON and XML round trips in schema order
//! - **Catalogs**: record types load from JSON; core data types are bundled
//!
//! ## Quick Start
//!
//! ```rust
//! use octofhir_fhirrecord::*;
//! use serde_json::json;
//!
//! # fn example() -> Result<()> {
//! let engine = RecordEngine::with_core_types()?;
//!
//! let observation = engine.decode_json("Observation", &json!({
//!     "resourceType": "Observation",
//!     "status": "final",
//!     "code": { "text": "Heart rate" },
//!     "valueQuantity": { "value": 72, "unit": "beats/minute" }
//! }))?;
//!
//! let result = engine.validate(&observation)?;
//! assert!(result.is_valid);
//!
//! let json = engine.encode_json(&observation)?;
//! assert_eq!(json["valueQuantity"]["value"], 72);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

pub mod choice_resolver;
pub mod codec;
pub mod core;
pub mod error;
pub mod instance;
pub mod registry;
pub mod tree;
pub mod types;
pub mod validation;

pub use choice_resolver::ChoiceBinding;
pub use codec::RecordCodec;
pub use crate::core::{
    AdvisoryBindingMode, CodecOptions, EngineConfig, FHIR_NAMESPACE, RecordEngine,
    ValidationOptions,
};
pub use error::{FhirRecordError, Result};
pub use instance::{ChoiceValue, Instance, Primitive, Value};
pub use registry::{SchemaCatalog, SchemaRegistry};
pub use tree::{MAX_NESTING_DEPTH, Scalar, TreeNode};
pub use types::*;
pub use validation::{
    InstanceValidator, ValidationContext, ValidationIssue, ValidationResult, ValidationSeverity,
};
