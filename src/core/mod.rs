pub mod config;
pub mod engine;

pub use config::{AdvisoryBindingMode, CodecOptions, EngineConfig, FHIR_NAMESPACE, ValidationOptions};
pub use engine::RecordEngine;
