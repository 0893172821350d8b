mod common;

use common::*;
use octofhir_fhirrecord::*;
use serde_json::json;
use std::sync::Arc;

fn bound_engine(strength: BindingStrength) -> RecordEngine {
    let registry = SchemaRegistry::new();
    registry
        .register_schema(
            RecordSchema::new("Flag").with_field(
                FieldDescriptor::new("status", PrimitiveType::Code)
                    .with_binding(create_test_binding(strength)),
            ),
        )
        .unwrap();
    RecordEngine::new(Arc::new(registry))
}

#[test]
fn test_binding_strength_gradient() {
    let flag = Instance::new("Flag").with("status", "retired");

    let cases = [
        (BindingStrength::Required, Some(ValidationSeverity::Error)),
        (BindingStrength::Extensible, Some(ValidationSeverity::Warning)),
        (BindingStrength::Preferred, Some(ValidationSeverity::Information)),
        (BindingStrength::Example, Some(ValidationSeverity::Information)),
    ];

    for (strength, expected) in cases {
        let result = bound_engine(strength).validate(&flag).unwrap();
        let severities: Vec<_> = result.at_path("status").map(|issue| issue.severity).collect();
        assert_eq!(severities, expected.into_iter().collect::<Vec<_>>(), "{strength}");
        assert_eq!(result.is_valid, strength != BindingStrength::Required, "{strength}");
        if let Some(issue) = result.issues.first() {
            assert_eq!(issue.code, "code-invalid");
        }
    }
}

#[test]
fn test_member_codes_pass_every_strength() {
    let flag = Instance::new("Flag").with("status", "final");

    for strength in [
        BindingStrength::Required,
        BindingStrength::Extensible,
        BindingStrength::Preferred,
        BindingStrength::Example,
    ] {
        let result = bound_engine(strength).validate(&flag).unwrap();
        assert!(result.issues.is_empty(), "{strength}: {:?}", result.issues);
    }
}

#[test]
fn test_advisory_binding_modes() {
    let flag = Instance::new("Flag").with("status", "retired");
    let engine = bound_engine(BindingStrength::Preferred);

    let suppressed = engine
        .clone()
        .with_config(EngineConfig::default().with_validation(ValidationOptions {
            advisory_bindings: AdvisoryBindingMode::Suppress,
            ..ValidationOptions::default()
        }))
        .validate(&flag)
        .unwrap();
    assert!(suppressed.issues.is_empty());

    let strict = engine
        .with_config(EngineConfig::default().with_validation(ValidationOptions::strict()))
        .validate(&flag)
        .unwrap();
    assert!(!strict.is_valid);
    assert_eq!(strict.error_count, 1);
}

#[test]
fn test_cardinality_boundaries() {
    let engine = create_test_engine();

    let absent = engine.validate(&Instance::new("Measurement")).unwrap();
    assert!(!absent.is_valid);
    assert_eq!(absent.issues.len(), 1);
    assert_eq!(absent.issues[0].code, "cardinality-min");
    assert_eq!(absent.issues[0].path.as_deref(), Some("status"));

    let single = engine
        .validate(&Instance::new("Measurement").with("status", "final"))
        .unwrap();
    assert!(single.is_valid);
    assert!(single.issues.is_empty());

    let doubled = Instance::new("Measurement").with(
        "status",
        Value::list([Value::string("final"), Value::string("draft")]),
    );
    let result = engine.validate(&doubled).unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].code, "cardinality-max");
}

#[test]
fn test_prohibited_element_populated() {
    let registry = SchemaRegistry::new();
    registry
        .register_schema(
            RecordSchema::new("Profiled")
                .with_field(FieldDescriptor::new("name", PrimitiveType::String))
                .with_field(
                    FieldDescriptor::new("legacy", PrimitiveType::String)
                        .with_cardinality(0, Max::Bounded(0)),
                ),
        )
        .unwrap();
    let engine = RecordEngine::new(Arc::new(registry));

    let clean = engine.validate(&Instance::new("Profiled").with("name", "a")).unwrap();
    assert!(clean.is_valid);
    assert!(clean.issues.is_empty());

    let populated = Instance::new("Profiled").with("name", "a").with("legacy", "old");
    let result = engine.validate(&populated).unwrap();
    assert!(!result.is_valid);
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].code, "cardinality-max");
    assert_eq!(result.issues[0].path.as_deref(), Some("legacy"));
}

#[test]
fn test_nesting_depth_is_bounded() {
    let engine = create_core_engine();
    let nested = |levels: usize| {
        let innermost = Instance::new("Extension")
            .with("url", "http://example.org/leaf")
            .with_choice("value", "boolean", true);
        let chain = (1..levels).fold(innermost, |inner, _| {
            Instance::new("Extension")
                .with("url", "http://example.org/nested")
                .with("extension", Value::list([Value::Record(inner)]))
        });
        Instance::new("Observation")
            .with("status", "final")
            .with("code", Instance::new("CodeableConcept").with("text", "deep"))
            .with("extension", Value::list([Value::Record(chain)]))
    };

    let within = engine.validate(&nested(MAX_NESTING_DEPTH - 1)).unwrap();
    assert!(within.is_valid, "{:?}", within.issues);

    let deep = nested(MAX_NESTING_DEPTH + 20);
    let result = engine.validate(&deep).unwrap();
    assert!(!result.is_valid);
    let findings: Vec<_> = result.issues.iter().filter(|issue| issue.code == "nesting-depth").collect();
    assert_eq!(findings.len(), 1);
    assert_eq!(result.error_count, 1);

    let err = engine.encode(&deep).unwrap_err();
    assert!(matches!(err, FhirRecordError::Encode { .. }));
    assert!(err.to_string().contains("nesting exceeds 128"));
}

#[test]
fn test_ambiguous_choice_reports_once() {
    let engine = create_test_engine();

    let instance = Instance::new("Measurement")
        .with("status", "final")
        .with("valueDateTime", "2024-01-01")
        .with_choice("value", "Period", create_test_period("2024-01-01", "2024-02-01"));

    let result = engine.validate(&instance).unwrap();
    let findings: Vec<_> = result
        .issues
        .iter()
        .filter(|issue| issue.code == "ambiguous-choice")
        .collect();
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].path.as_deref(), Some("value[x]"));
    assert_eq!(result.error_count, 1);

    let err = engine.encode(&instance).unwrap_err();
    assert!(matches!(err, FhirRecordError::AmbiguousChoice { .. }));
}

#[test]
fn test_undeclared_choice_type_on_instance() {
    let engine = create_test_engine();

    let instance = Instance::new("Measurement")
        .with("status", "final")
        .with_choice("value", "boolean", true);

    let result = engine.validate(&instance).unwrap();
    assert!(result.has_code("unknown-choice-variant"));
    assert_eq!(result.at_path("valueBoolean").count(), 1);
}

#[test]
fn test_required_choice_group() {
    let registry = create_test_registry();
    registry
        .register_schema(
            RecordSchema::new("Reading")
                .with_choice(create_test_value_group().required()),
        )
        .unwrap();
    let engine = RecordEngine::new(Arc::new(registry));

    let result = engine.validate(&Instance::new("Reading")).unwrap();
    assert_eq!(result.issues.len(), 1);
    assert_eq!(result.issues[0].code, "cardinality-min");
    assert_eq!(result.issues[0].path.as_deref(), Some("value[x]"));

    let populated = Instance::new("Reading").with_choice("value", "dateTime", "2024");
    assert!(engine.validate(&populated).unwrap().is_valid);
}

#[test]
fn test_unknown_element() {
    let engine = create_test_engine();

    let instance = Instance::new("Measurement")
        .with("status", "final")
        .with("comment", "not declared");

    let result = engine.validate(&instance).unwrap();
    assert!(!result.is_valid);
    let issue = result.at_path("comment").next().unwrap();
    assert_eq!(issue.code, "unknown-element");
}

#[test]
fn test_nested_paths_in_core_observation() {
    let engine = create_core_engine();

    let observation = engine
        .decode_json(
            "Observation",
            &json!({
                "resourceType": "Observation",
                "status": "done",
                "category": [{
                    "coding": [{"system": "http://example.org/category", "code": "misc"}]
                }],
                "code": {"coding": [{"system": "http://loinc.org", "code": "8867-4"}]},
                "identifier": [
                    {"use": "official", "value": "A-1"},
                    {
                        "type": {"coding": [{"system": "http://example.org/id-type", "code": "XX"}]},
                        "value": "B-2"
                    }
                ],
                "component": [
                    {"code": {"text": "systolic"}, "valueQuantity": {"value": 120, "comparator": "~"}}
                ]
            }),
        )
        .unwrap();

    let result = engine.validate(&observation).unwrap();

    let status = result.at_path("status").next().unwrap();
    assert_eq!(status.severity, ValidationSeverity::Error);
    assert_eq!(status.code, "code-invalid");

    let category = result.at_path("category[0]").next().unwrap();
    assert_eq!(category.severity, ValidationSeverity::Information);

    let identifier_type = result.at_path("identifier[1].type").next().unwrap();
    assert_eq!(identifier_type.severity, ValidationSeverity::Warning);

    let comparator = result
        .at_path("component[0].valueQuantity.comparator")
        .next()
        .unwrap();
    assert_eq!(comparator.severity, ValidationSeverity::Error);

    // example binding without enumerated codes is never checked
    assert_eq!(result.at_path("code").count(), 0);
    assert_eq!(result.error_count, 2);
}

#[test]
fn test_text_only_concept_against_required_binding() {
    let registry = SchemaRegistry::new();
    registry
        .register_schema(
            RecordSchema::new("CodeableConcept")
                .with_field(FieldDescriptor::new("coding", "Coding").repeating())
                .with_field(FieldDescriptor::new("text", PrimitiveType::String)),
        )
        .unwrap();
    registry
        .register_schema(
            RecordSchema::new("Coding")
                .with_field(FieldDescriptor::new("system", PrimitiveType::Uri))
                .with_field(FieldDescriptor::new("code", PrimitiveType::Code)),
        )
        .unwrap();
    registry
        .register_schema(
            RecordSchema::new("Task").with_field(
                FieldDescriptor::new("reason", "CodeableConcept")
                    .with_binding(create_test_binding(BindingStrength::Required)),
            ),
        )
        .unwrap();
    let engine = RecordEngine::new(Arc::new(registry));

    let task = Instance::new("Task").with("reason", Instance::new("CodeableConcept").with("text", "done"));
    let result = engine.validate(&task).unwrap();
    assert!(result.has_code("code-missing"));

    let coded = Instance::new("Task").with(
        "reason",
        Instance::new("CodeableConcept").with(
            "coding",
            Value::list([Value::Record(
                Instance::new("Coding")
                    .with("system", "http://example.org/status")
                    .with("code", "final"),
            )]),
        ),
    );
    assert!(engine.validate(&coded).unwrap().is_valid);
}

#[test]
fn test_reference_target_profiles() {
    let engine = create_core_engine();

    let observation = |reference: &str| {
        engine
            .decode_json(
                "Observation",
                &json!({
                    "status": "final",
                    "code": {"text": "Heart rate"},
                    "subject": {"reference": reference}
                }),
            )
            .unwrap()
    };

    let patient = engine.validate(&observation("Patient/123")).unwrap();
    assert!(patient.issues.is_empty(), "{:?}", patient.issues);

    let versioned = engine
        .validate(&observation("http://example.org/fhir/Group/7/_history/2"))
        .unwrap();
    assert!(versioned.issues.is_empty());

    let medication = engine.validate(&observation("Medication/5")).unwrap();
    let issue = medication.at_path("subject.reference").next().unwrap();
    assert_eq!(issue.code, "reference-target");
    assert_eq!(issue.severity, ValidationSeverity::Warning);
    assert!(medication.is_valid);
}

#[test]
fn test_primitive_formats() {
    let engine = create_core_engine();

    let definition = Instance::new("ElementDefinition")
        .with("path", "Observation.status")
        .with("min", Value::integer(-1))
        .with("condition", Value::list([Value::string("has spaces")]))
        .with("short", "   ");

    let result = engine.validate(&definition).unwrap();
    for path in ["min", "condition[0]", "short"] {
        let issue = result.at_path(path).next().unwrap_or_else(|| panic!("no finding at {path}"));
        assert_eq!(issue.code, "invalid-format", "{path}");
    }

    let unchecked = engine
        .clone()
        .with_config(EngineConfig::default().with_validation(ValidationOptions {
            check_primitive_formats: false,
            ..ValidationOptions::default()
        }))
        .validate(&definition)
        .unwrap();
    assert!(unchecked.is_valid);
}

#[test]
fn test_wrong_primitive_kind() {
    let engine = create_test_engine();

    let instance = Instance::new("Measurement").with("status", true);
    let result = engine.validate(&instance).unwrap();
    let issue = result.at_path("status").next().unwrap();
    assert_eq!(issue.code, "type-mismatch");
}

#[test]
fn test_unregistered_nested_type_fails() {
    let registry = SchemaRegistry::new();
    registry
        .register_schema(RecordSchema::new("Holder").with_field(FieldDescriptor::new("part", "Missing")))
        .unwrap();
    let engine = RecordEngine::new(Arc::new(registry));

    let holder = Instance::new("Holder").with("part", Instance::new("Missing"));
    let err = engine.validate(&holder).unwrap_err();
    assert!(matches!(err, FhirRecordError::UnknownType { .. }));
}
