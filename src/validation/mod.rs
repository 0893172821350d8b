//! Instance validation.
//!
//! The validator walks an [`Instance`] against its [`RecordSchema`] and
//! collects every finding in one pass. Data problems never abort the walk;
//! only a reference to an unregistered record type does.

pub mod binding;
pub mod primitive;

use serde::{Deserialize, Serialize};

use crate::choice_resolver;
use crate::core::ValidationOptions;
use crate::error::{FhirRecordError, Result};
use crate::instance::{Instance, Value};
use crate::registry::SchemaRegistry;
use crate::tree::MAX_NESTING_DEPTH;
use crate::types::{Cardinality, FieldDescriptor, PolymorphicGroup, RecordSchema, SchemaEntry, TypeRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Error,
    Warning,
    Information,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: ValidationSeverity,
    pub code: String,
    pub message: String,
    /// Dotted path of the offending field, e.g. `constraint[0].severity`
    pub path: Option<String>,
}

impl ValidationIssue {
    pub fn new(
        severity: ValidationSeverity,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            message: message.into(),
            path: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Error, code, message)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Warning, code, message)
    }

    pub fn information(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ValidationSeverity::Information, code, message)
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == ValidationSeverity::Error
    }
}

/// Result of validation containing all issues found
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub issues: Vec<ValidationIssue>,

    /// No error-severity issues
    pub is_valid: bool,

    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
}

impl ValidationResult {
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let count = |severity: ValidationSeverity| issues.iter().filter(|i| i.severity == severity).count();
        let error_count = count(ValidationSeverity::Error);
        let warning_count = count(ValidationSeverity::Warning);
        let info_count = count(ValidationSeverity::Information);

        Self {
            is_valid: error_count == 0,
            issues,
            error_count,
            warning_count,
            info_count,
        }
    }

    pub fn success() -> Self {
        Self::from_issues(Vec::new())
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.issues.extend(other.issues);
        self.error_count += other.error_count;
        self.warning_count += other.warning_count;
        self.info_count += other.info_count;
        self.is_valid = self.is_valid && other.is_valid;
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| issue.is_error())
    }

    /// Issues reported at exactly `path`
    pub fn at_path<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a ValidationIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.path.as_deref() == Some(path))
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }
}

/// Path bookkeeping and issue collection during one validation walk
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    pub current_path: String,
    pub path_stack: Vec<String>,
    pub issues: Vec<ValidationIssue>,
    /// Records entered below the root
    pub depth: usize,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend into a named property
    pub fn push_path(&mut self, segment: &str) {
        self.path_stack.push(self.current_path.clone());
        if self.current_path.is_empty() {
            self.current_path = segment.to_string();
        } else {
            self.current_path = format!("{}.{}", self.current_path, segment);
        }
    }

    /// Descend into one occurrence of the current property
    pub fn push_index(&mut self, index: usize) {
        self.path_stack.push(self.current_path.clone());
        self.current_path = format!("{}[{}]", self.current_path, index);
    }

    pub fn pop_path(&mut self) {
        if let Some(previous_path) = self.path_stack.pop() {
            self.current_path = previous_path;
        }
    }

    /// Path of `segment` below the current position, without descending
    pub fn child_path(&self, segment: &str) -> String {
        if self.current_path.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.current_path, segment)
        }
    }

    pub fn add_issue(&mut self, mut issue: ValidationIssue) {
        if issue.path.is_none() && !self.current_path.is_empty() {
            issue.path = Some(self.current_path.clone());
        }
        self.issues.push(issue);
    }

    pub fn add_error(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.add_issue(ValidationIssue::error(code, message));
    }

    pub fn add_warning(&mut self, code: impl Into<String>, message: impl Into<String>) {
        self.add_issue(ValidationIssue::warning(code, message));
    }

    pub fn into_result(self) -> ValidationResult {
        ValidationResult::from_issues(self.issues)
    }
}

/// Validates instances against schemas held in a registry.
///
/// Nested record types are looked up by name as the walk reaches them.
#[derive(Debug, Clone)]
pub struct InstanceValidator<'a> {
    registry: &'a SchemaRegistry,
    options: ValidationOptions,
}

impl<'a> InstanceValidator<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            options: ValidationOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Validate `instance` against `schema`.
    ///
    /// Fails only with `UnknownType`, when a nested field refers to a record
    /// type that is not registered.
    pub fn validate(&self, instance: &Instance, schema: &RecordSchema) -> Result<ValidationResult> {
        let mut context = ValidationContext::new();
        self.validate_record(instance, schema, &mut context)?;
        let result = context.into_result();

        tracing::debug!(
            "Validated {}: {} errors, {} warnings, {} informational",
            schema.type_name,
            result.error_count,
            result.warning_count,
            result.info_count
        );
        Ok(result)
    }

    /// Validate against the schema registered for the instance's own type
    pub fn validate_instance(&self, instance: &Instance) -> Result<ValidationResult> {
        let schema = self.registry.lookup(instance.type_name())?;
        self.validate(instance, &schema)
    }

    fn validate_record(
        &self,
        instance: &Instance,
        schema: &RecordSchema,
        context: &mut ValidationContext,
    ) -> Result<()> {
        if instance.type_name() != schema.type_name {
            context.add_error(
                "type-mismatch",
                format!(
                    "Expected a {} record, found {}",
                    schema.type_name,
                    instance.type_name()
                ),
            );
        }

        for entry in &schema.entries {
            match entry {
                SchemaEntry::Field(field) => self.validate_field(instance, field, context)?,
                SchemaEntry::Choice(group) => self.validate_choice(instance, schema, group, context)?,
            }
        }

        check_unknown_properties(instance, schema, context);
        Ok(())
    }

    fn validate_field(
        &self,
        instance: &Instance,
        field: &FieldDescriptor,
        context: &mut ValidationContext,
    ) -> Result<()> {
        let value = instance.get(&field.name);
        context.push_path(&field.name);

        let count = value.map_or(0, Value::occurrences);
        check_cardinality(&field.name, field.cardinality, count, context);
        if let Some(value) = value {
            self.validate_occurrences(value, field, context)?;
        }

        context.pop_path();
        Ok(())
    }

    fn validate_choice(
        &self,
        instance: &Instance,
        schema: &RecordSchema,
        group: &PolymorphicGroup,
        context: &mut ValidationContext,
    ) -> Result<()> {
        let group_label = format!("{}[x]", group.logical_name);
        let group_path = context.child_path(&group_label);

        match choice_resolver::resolve_instance(group, schema, instance, &group_path) {
            Ok(Some(binding)) => {
                let descriptor = &binding.variant.descriptor;
                context.push_path(&descriptor.name);
                check_cardinality(
                    &descriptor.name,
                    descriptor.cardinality,
                    binding.value.occurrences(),
                    context,
                );
                self.validate_occurrences(binding.value, descriptor, context)?;
                context.pop_path();
            }
            Ok(None) if group.min() > 0 => {
                context.push_path(&group_label);
                context.add_error(
                    "cardinality-min",
                    format!(
                        "'{group_label}' requires one of {} to be populated",
                        group.property_names().collect::<Vec<_>>().join(", ")
                    ),
                );
                context.pop_path();
            }
            Ok(None) => {}
            Err(FhirRecordError::AmbiguousChoice { properties, .. }) => {
                context.push_path(&group_label);
                context.add_error(
                    "ambiguous-choice",
                    format!(
                        "Only one variant of '{group_label}' may be populated, found {}",
                        properties.join(", ")
                    ),
                );
                context.pop_path();
            }
            Err(FhirRecordError::UnknownChoiceVariant { property, .. }) => {
                context.push_path(&property);
                context.add_error(
                    "unknown-choice-variant",
                    format!("'{property}' is not a declared variant of '{group_label}'"),
                );
                context.pop_path();
            }
            Err(other) => return Err(other),
        }
        Ok(())
    }

    fn validate_occurrences(
        &self,
        value: &Value,
        descriptor: &FieldDescriptor,
        context: &mut ValidationContext,
    ) -> Result<()> {
        match value {
            Value::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    context.push_index(index);
                    self.validate_value(item, descriptor, context)?;
                    context.pop_path();
                }
                Ok(())
            }
            single => self.validate_value(single, descriptor, context),
        }
    }

    fn validate_value(
        &self,
        value: &Value,
        descriptor: &FieldDescriptor,
        context: &mut ValidationContext,
    ) -> Result<()> {
        match (&descriptor.declared_type, value) {
            (TypeRef::Primitive(primitive_type), Value::Primitive(primitive)) => {
                if !primitive::kind_matches(*primitive_type, primitive) {
                    context.add_error(
                        "type-mismatch",
                        format!(
                            "Expected a {primitive_type} value, found {}",
                            primitive.kind_name()
                        ),
                    );
                    return Ok(());
                }
                if self.options.check_primitive_formats
                    && let Some(message) = primitive::check_format(*primitive_type, primitive)
                {
                    context.add_error("invalid-format", message);
                }
            }
            (TypeRef::Record(type_name), Value::Record(record)) => {
                if context.depth + 1 >= MAX_NESTING_DEPTH {
                    context.add_error(
                        "nesting-depth",
                        format!("Record nesting exceeds {MAX_NESTING_DEPTH}, content not checked"),
                    );
                    return Ok(());
                }
                let schema = self.registry.lookup(type_name)?;
                context.depth += 1;
                let outcome = self.validate_record(record, &schema, context);
                context.depth -= 1;
                outcome?;
                if self.options.check_reference_targets && !descriptor.profiles.is_empty() {
                    check_reference_target(record, descriptor, context);
                }
            }
            (declared, other) => {
                context.add_error(
                    "type-mismatch",
                    format!("Expected {}, found {}", declared.code(), other.kind_name()),
                );
                return Ok(());
            }
        }

        if let Some(definition) = &descriptor.binding
            && let Some(issue) =
                binding::check_binding(definition, value, self.options.advisory_bindings)
        {
            context.add_issue(issue);
        }
        Ok(())
    }
}

fn check_cardinality(
    label: &str,
    cardinality: Cardinality,
    count: usize,
    context: &mut ValidationContext,
) {
    if count < cardinality.min as usize {
        context.add_error(
            "cardinality-min",
            format!(
                "'{label}' requires at least {} occurrence(s), found {count}",
                cardinality.min
            ),
        );
    }
    if !cardinality.max.allows(count) {
        context.add_error(
            "cardinality-max",
            format!(
                "'{label}' allows at most {} occurrence(s), found {count}",
                cardinality.max
            ),
        );
    }
}

fn check_unknown_properties(
    instance: &Instance,
    schema: &RecordSchema,
    context: &mut ValidationContext,
) {
    for (name, _) in instance.iter() {
        let known = schema.has_field(name)
            || schema.choice_group(name).is_some()
            // undeclared variants are reported by the group itself
            || schema.choice_groups().any(|group| group.claims_property(name));
        if !known {
            context.push_path(name);
            context.add_error(
                "unknown-element",
                format!("'{name}' is not an element of {}", schema.type_name),
            );
            context.pop_path();
        }
    }
}

fn check_reference_target(
    record: &Instance,
    descriptor: &FieldDescriptor,
    context: &mut ValidationContext,
) {
    let Some(target) = record
        .get("reference")
        .and_then(Value::as_str)
        .and_then(reference_target_type)
    else {
        return;
    };

    let allowed: Vec<&str> = descriptor
        .profiles
        .iter()
        .map(|profile| profile.rsplit('/').next().unwrap_or(profile))
        .collect();
    if allowed.iter().any(|name| *name == target || *name == "Resource") {
        return;
    }

    context.push_path("reference");
    context.add_warning(
        "reference-target",
        format!(
            "Reference to {target} is not allowed here, expected {}",
            allowed.join(" | ")
        ),
    );
    context.pop_path();
}

/// Target type of a literal reference (`Patient/123`, absolute URLs and
/// versioned references included). Contained references have none.
fn reference_target_type(reference: &str) -> Option<&str> {
    if reference.starts_with('#') {
        return None;
    }
    let unversioned = reference.split("/_history/").next().unwrap_or(reference);
    let mut segments = unversioned.rsplit('/');
    segments.next()?;
    let type_name = segments.next()?;
    type_name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase())
        .then_some(type_name)
}
