use octofhir_fhirrecord::*;
use std::sync::Arc;

#[allow(dead_code)]
pub fn create_core_engine() -> RecordEngine {
    RecordEngine::with_core_types().unwrap()
}

/// Registry with a small resource exercising every schema feature:
/// a required code, a repeating field, a `value[x]` group over
/// {dateTime, Duration, Period} and a plain `valueSet` field next to it.
#[allow(dead_code)]
pub fn create_test_registry() -> SchemaRegistry {
    let registry = SchemaRegistry::new();
    registry
        .register_schema(
            RecordSchema::new("Duration")
                .with_field(FieldDescriptor::new("value", PrimitiveType::Decimal))
                .with_field(FieldDescriptor::new("unit", PrimitiveType::String)),
        )
        .unwrap();
    registry
        .register_schema(
            RecordSchema::new("Period")
                .with_field(FieldDescriptor::new("start", PrimitiveType::DateTime))
                .with_field(FieldDescriptor::new("end", PrimitiveType::DateTime)),
        )
        .unwrap();
    registry.register_schema(create_test_schema()).unwrap();
    registry
}

#[allow(dead_code)]
pub fn create_test_schema() -> RecordSchema {
    RecordSchema::resource("Measurement")
        .with_field(
            FieldDescriptor::new("status", PrimitiveType::Code)
                .required()
                .with_binding(create_test_binding(BindingStrength::Required)),
        )
        .with_field(FieldDescriptor::new("note", PrimitiveType::String).repeating())
        .with_field(FieldDescriptor::new("valueSet", PrimitiveType::Canonical))
        .with_choice(create_test_value_group())
}

#[allow(dead_code)]
pub fn create_test_value_group() -> PolymorphicGroup {
    PolymorphicGroup::new("value").with_variants(["dateTime", "Duration", "Period"])
}

#[allow(dead_code)]
pub fn create_test_binding(strength: BindingStrength) -> BindingDefinition {
    BindingDefinition::new(strength)
        .with_value_set("http://example.org/ValueSet/status")
        .with_codes("http://example.org/status", ["draft", "final"])
}

#[allow(dead_code)]
pub fn create_test_engine() -> RecordEngine {
    RecordEngine::new(Arc::new(create_test_registry()))
}

#[allow(dead_code)]
pub fn create_test_period(start: &str, end: &str) -> Instance {
    Instance::new("Period")
        .with("start", start)
        .with("end", end)
}
