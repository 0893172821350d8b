use serde_json::Value as JsonValue;
use std::sync::Arc;

use super::config::EngineConfig;
use crate::codec::{RESOURCE_TYPE_KEY, RecordCodec};
use crate::error::{FhirRecordError, Result};
use crate::instance::Instance;
use crate::registry::SchemaRegistry;
use crate::registry::embedded::core_registry;
use crate::tree::TreeNode;
use crate::types::RecordSchema;
use crate::validation::{InstanceValidator, ValidationResult};

/// Entry point bundling a shared schema registry with engine options.
///
/// Every operation is a synchronous walk over resident data; the engine
/// is cheap to clone and may be shared across threads.
#[derive(Debug, Clone)]
pub struct RecordEngine {
    registry: Arc<SchemaRegistry>,
    config: EngineConfig,
}

impl RecordEngine {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            config: EngineConfig::default(),
        }
    }

    /// Engine over the bundled core data types
    pub fn with_core_types() -> Result<Self> {
        Ok(Self::new(Arc::new(core_registry()?)))
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn register(&self, type_name: impl Into<String>, schema: RecordSchema) -> Result<()> {
        self.registry.register(type_name, schema)
    }

    pub fn lookup(&self, type_name: &str) -> Result<Arc<RecordSchema>> {
        self.registry.lookup(type_name)
    }

    pub fn validator(&self) -> InstanceValidator<'_> {
        InstanceValidator::new(&self.registry).with_options(self.config.validation.clone())
    }

    pub fn codec(&self) -> RecordCodec<'_> {
        RecordCodec::new(&self.registry).with_options(self.config.codec.clone())
    }

    /// Validate against the schema registered for the instance's type
    pub fn validate(&self, instance: &Instance) -> Result<ValidationResult> {
        let schema = self.lookup(instance.type_name())?;
        self.validator().validate(instance, &schema)
    }

    pub fn encode(&self, instance: &Instance) -> Result<TreeNode> {
        let schema = self.lookup(instance.type_name())?;
        self.codec().encode(instance, &schema)
    }

    pub fn decode(&self, type_name: &str, tree: &TreeNode) -> Result<Instance> {
        let schema = self.lookup(type_name)?;
        self.codec().decode(tree, &schema)
    }

    /// The form `decode(encode(instance))` yields; see [`RecordCodec::normalize`]
    pub fn normalize(&self, instance: &Instance) -> Result<Instance> {
        let schema = self.lookup(instance.type_name())?;
        self.codec().normalize(instance, &schema)
    }

    pub fn encode_json(&self, instance: &Instance) -> Result<JsonValue> {
        let schema = self.lookup(instance.type_name())?;
        self.codec().encode_json(instance, &schema)
    }

    pub fn decode_json(&self, type_name: &str, json: &JsonValue) -> Result<Instance> {
        let schema = self.lookup(type_name)?;
        self.codec().decode_json(json, &schema)
    }

    /// Decode a resource, taking its type from the `resourceType` key
    pub fn decode_resource_json(&self, json: &JsonValue) -> Result<Instance> {
        let type_name = json
            .get(RESOURCE_TYPE_KEY)
            .and_then(JsonValue::as_str)
            .ok_or_else(|| FhirRecordError::decode("$", "missing resourceType"))?;
        self.decode_json(type_name, json)
    }

    pub fn to_json_string(&self, instance: &Instance, pretty: bool) -> Result<String> {
        let schema = self.lookup(instance.type_name())?;
        self.codec().encode_json_string(instance, &schema, pretty)
    }

    pub fn from_json_str(&self, type_name: &str, text: &str) -> Result<Instance> {
        let schema = self.lookup(type_name)?;
        self.codec().decode_json_str(text, &schema)
    }

    #[cfg(feature = "xml")]
    pub fn encode_xml(&self, instance: &Instance) -> Result<String> {
        let schema = self.lookup(instance.type_name())?;
        self.codec().encode_xml(instance, &schema)
    }

    #[cfg(feature = "xml")]
    pub fn decode_xml(&self, type_name: &str, xml: &str) -> Result<Instance> {
        let schema = self.lookup(type_name)?;
        self.codec().decode_xml(xml, &schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AdvisoryBindingMode, ValidationOptions};
    use crate::instance::Value;
    use serde_json::json;

    #[test]
    fn test_engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RecordEngine>();
    }

    #[test]
    fn test_decode_resource_by_resource_type() {
        let engine = RecordEngine::with_core_types().unwrap();
        let observation = engine
            .decode_resource_json(&json!({
                "resourceType": "Observation",
                "status": "final",
                "code": {"text": "Heart rate"},
                "valueQuantity": {"value": 72, "unit": "beats/minute"}
            }))
            .unwrap();
        assert_eq!(observation.type_name(), "Observation");

        let err = engine.decode_resource_json(&json!({"status": "final"})).unwrap_err();
        assert!(matches!(err, FhirRecordError::Decode { .. }));
    }

    #[test]
    fn test_config_flows_into_validator() {
        let engine = RecordEngine::with_core_types().unwrap().with_config(
            EngineConfig::default().with_validation(ValidationOptions {
                advisory_bindings: AdvisoryBindingMode::Suppress,
                ..ValidationOptions::default()
            }),
        );
        assert_eq!(
            engine.validator().options().advisory_bindings,
            AdvisoryBindingMode::Suppress
        );

        let unknown = Instance::new("Coding").with("code", Value::integer(1));
        assert!(!engine.validate(&unknown).unwrap().is_valid);
    }

    #[test]
    fn test_unknown_type() {
        let engine = RecordEngine::new(Arc::new(SchemaRegistry::new()));
        let err = engine.encode(&Instance::new("Patient")).unwrap_err();
        assert!(matches!(err, FhirRecordError::UnknownType { .. }));
    }
}
