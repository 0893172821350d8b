//! Instance <-> interchange tree conversion.
//!
//! Encoding walks the schema in declaration order and projects each choice
//! group onto its concrete property (`value` + `DateTime`). Decoding is the
//! mirror image: exact field names first, then choice variants, and any key
//! left over is an error rather than silent data loss.

pub mod json;
#[cfg(feature = "xml")]
pub mod xml;

use indexmap::IndexMap;
use serde_json::Number;

use crate::choice_resolver;
use crate::core::CodecOptions;
use crate::error::{FhirRecordError, Result};
use crate::instance::{Instance, Primitive, Value};
use crate::registry::SchemaRegistry;
use crate::tree::{MAX_NESTING_DEPTH, Scalar, TreeNode};
use crate::types::{FieldDescriptor, PrimitiveKind, PrimitiveType, RecordSchema, SchemaEntry, TypeRef};

pub const RESOURCE_TYPE_KEY: &str = "resourceType";

/// How scalars are read during decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScalarMode {
    /// The scalar kind must match the declared primitive (JSON)
    Typed,
    /// Scalars are lexical strings parsed into the declared primitive (XML)
    Lexical,
}

#[derive(Debug, Clone)]
pub struct RecordCodec<'a> {
    registry: &'a SchemaRegistry,
    options: CodecOptions,
}

impl<'a> RecordCodec<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self {
            registry,
            options: CodecOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CodecOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Encode `instance` as an ordered map following `schema`.
    ///
    /// Fails on properties the schema does not declare, on values whose
    /// shape cannot carry the declared type, and on ambiguous choices.
    pub fn encode(&self, instance: &Instance, schema: &RecordSchema) -> Result<TreeNode> {
        let map = self.encode_record(instance, schema, &schema.type_name, 0)?;
        Ok(TreeNode::Map(map))
    }

    /// Canonical in-memory form of `instance`, the one decode produces from
    /// its encoding: choice groups in their tagged slot whichever form they
    /// were populated in, repeating fields as lists, empty lists dropped.
    /// Nested records are normalized against their own schemas and
    /// undeclared properties are carried over unchanged.
    pub fn normalize(&self, instance: &Instance, schema: &RecordSchema) -> Result<Instance> {
        self.normalize_record(instance, schema, &schema.type_name, 0)
    }

    /// Decode a map into an instance of `schema`
    pub fn decode(&self, tree: &TreeNode, schema: &RecordSchema) -> Result<Instance> {
        self.decode_with(tree, schema, ScalarMode::Typed)
    }

    pub(crate) fn decode_with(
        &self,
        tree: &TreeNode,
        schema: &RecordSchema,
        mode: ScalarMode,
    ) -> Result<Instance> {
        let path = schema.type_name.as_str();
        let map = tree.as_map().ok_or_else(|| {
            FhirRecordError::decode(path, format!("expected object, found {}", tree.kind_name()))
        })?;

        self.decode_record(map, schema, path, mode, 0).inspect_err(|err| {
            tracing::debug!("Failed to decode {}: {}", schema.type_name, err);
        })
    }

    fn encode_record(
        &self,
        instance: &Instance,
        schema: &RecordSchema,
        path: &str,
        depth: usize,
    ) -> Result<IndexMap<String, TreeNode>> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(FhirRecordError::encode(path, nesting_exceeded()));
        }
        check_declared_properties(instance, schema, path)?;

        let mut map = IndexMap::with_capacity(instance.len() + 1);
        if schema.is_resource() && self.options.emit_resource_type {
            map.insert(RESOURCE_TYPE_KEY.to_string(), TreeNode::string(&schema.type_name));
        }

        for entry in &schema.entries {
            match entry {
                SchemaEntry::Field(field) => {
                    let Some(value) = instance.get(&field.name) else {
                        continue;
                    };
                    let field_path = format!("{path}.{}", field.name);
                    if let Some(node) = self.encode_field(value, field, &field_path, depth)? {
                        map.insert(field.name.clone(), node);
                    }
                }
                SchemaEntry::Choice(group) => {
                    let Some(binding) = choice_resolver::resolve_instance(group, schema, instance, path)?
                    else {
                        continue;
                    };
                    let descriptor = &binding.variant.descriptor;
                    let field_path = format!("{path}.{}", descriptor.name);
                    if let Some(node) = self.encode_field(binding.value, descriptor, &field_path, depth)? {
                        map.insert(descriptor.name.clone(), node);
                    }
                }
            }
        }

        Ok(map)
    }

    /// Emit a field, honouring its array-ness. Empty lists are omitted.
    fn encode_field(
        &self,
        value: &Value,
        descriptor: &FieldDescriptor,
        path: &str,
        depth: usize,
    ) -> Result<Option<TreeNode>> {
        match value {
            Value::List(items) => {
                let mut nodes = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.encode_value(item, descriptor, &format!("{path}[{index}]"), depth))
                    .collect::<Result<Vec<_>>>()?;
                if descriptor.is_array() || nodes.len() > 1 {
                    Ok((!nodes.is_empty()).then_some(TreeNode::List(nodes)))
                } else {
                    Ok(nodes.pop())
                }
            }
            single => {
                let node = self.encode_value(single, descriptor, path, depth)?;
                if descriptor.is_array() {
                    Ok(Some(TreeNode::List(vec![node])))
                } else {
                    Ok(Some(node))
                }
            }
        }
    }

    fn encode_value(
        &self,
        value: &Value,
        descriptor: &FieldDescriptor,
        path: &str,
        depth: usize,
    ) -> Result<TreeNode> {
        match (&descriptor.declared_type, value) {
            (TypeRef::Primitive(_), Value::Primitive(primitive)) => {
                Ok(TreeNode::Scalar(primitive_to_scalar(primitive)))
            }
            (TypeRef::Record(type_name), Value::Record(record)) => {
                let schema = self.registry.lookup(type_name)?;
                Ok(TreeNode::Map(self.encode_record(record, &schema, path, depth + 1)?))
            }
            (declared, other) => Err(FhirRecordError::encode(
                path,
                format!("expected {}, found {}", declared.code(), other.kind_name()),
            )),
        }
    }

    fn decode_record(
        &self,
        map: &IndexMap<String, TreeNode>,
        schema: &RecordSchema,
        path: &str,
        mode: ScalarMode,
        depth: usize,
    ) -> Result<Instance> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(FhirRecordError::decode(path, nesting_exceeded()));
        }
        let mut instance = Instance::new(&schema.type_name);
        let mut unmatched: Vec<(&str, &TreeNode)> = Vec::new();

        for (key, node) in map {
            if key == RESOURCE_TYPE_KEY && schema.is_resource() {
                check_resource_type(node, schema, path)?;
                continue;
            }
            match schema.field(key) {
                Some(field) => {
                    let field_path = format!("{path}.{key}");
                    if let Some(value) = self.decode_field(node, field, &field_path, mode, depth)? {
                        instance.set(key.as_str(), value);
                    }
                }
                None => unmatched.push((key.as_str(), node)),
            }
        }

        let mut consumed: Vec<&str> = Vec::new();
        for group in schema.choice_groups() {
            let candidates = unmatched.iter().map(|(key, node)| (*key, *node));
            let binding = match choice_resolver::bind(group, path, candidates) {
                Ok(Some(binding)) => binding,
                Ok(None) => continue,
                Err(FhirRecordError::UnknownChoiceVariant { property, .. }) => {
                    return Err(FhirRecordError::decode(
                        format!("{path}.{property}"),
                        format!(
                            "unknown property '{property}', not a declared variant of {}[x]",
                            group.logical_name
                        ),
                    ));
                }
                Err(other) => return Err(other),
            };

            let descriptor = &binding.variant.descriptor;
            let field_path = format!("{path}.{}", binding.property);
            if let Some(value) = self.decode_field(binding.value, descriptor, &field_path, mode, depth)? {
                instance.set_choice(group.logical_name.as_str(), binding.variant.type_code(), value);
            }
            consumed.push(binding.property);
        }

        if let Some((key, _)) = unmatched.iter().find(|(key, _)| !consumed.contains(key)) {
            return Err(FhirRecordError::decode(
                format!("{path}.{key}"),
                format!("unknown property '{key}' for {}", schema.type_name),
            ));
        }

        Ok(instance)
    }

    /// Read a field, honouring its array-ness. Empty arrays decode as absent.
    fn decode_field(
        &self,
        node: &TreeNode,
        descriptor: &FieldDescriptor,
        path: &str,
        mode: ScalarMode,
        depth: usize,
    ) -> Result<Option<Value>> {
        match node {
            TreeNode::List(items) => {
                if !descriptor.is_array() {
                    return Err(FhirRecordError::decode(
                        path,
                        format!(
                            "unexpected array, '{}' allows at most one occurrence",
                            descriptor.name
                        ),
                    ));
                }
                if items.is_empty() {
                    return Ok(None);
                }
                let values = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        self.decode_value(item, descriptor, &format!("{path}[{index}]"), mode, depth)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Some(Value::List(values)))
            }
            single => {
                let value = self.decode_value(single, descriptor, path, mode, depth)?;
                if descriptor.is_array() {
                    Ok(Some(Value::List(vec![value])))
                } else {
                    Ok(Some(value))
                }
            }
        }
    }

    fn decode_value(
        &self,
        node: &TreeNode,
        descriptor: &FieldDescriptor,
        path: &str,
        mode: ScalarMode,
        depth: usize,
    ) -> Result<Value> {
        match (&descriptor.declared_type, node) {
            (TypeRef::Primitive(primitive_type), TreeNode::Scalar(scalar)) => {
                decode_primitive(*primitive_type, scalar, path, mode).map(Value::Primitive)
            }
            (TypeRef::Record(type_name), TreeNode::Map(map)) => {
                let schema = self.registry.lookup(type_name)?;
                self.decode_record(map, &schema, path, mode, depth + 1).map(Value::Record)
            }
            (declared, other) => Err(FhirRecordError::decode(
                path,
                format!("expected {}, found {}", declared.code(), other.kind_name()),
            )),
        }
    }

    fn normalize_record(
        &self,
        instance: &Instance,
        schema: &RecordSchema,
        path: &str,
        depth: usize,
    ) -> Result<Instance> {
        if depth >= MAX_NESTING_DEPTH {
            return Err(FhirRecordError::encode(path, nesting_exceeded()));
        }
        let mut normalized = Instance::new(&schema.type_name);

        for entry in &schema.entries {
            match entry {
                SchemaEntry::Field(field) => {
                    let Some(value) = instance.get(&field.name) else {
                        continue;
                    };
                    let field_path = format!("{path}.{}", field.name);
                    if let Some(value) = self.normalize_field(value, field, &field_path, depth)? {
                        normalized.set(field.name.as_str(), value);
                    }
                }
                SchemaEntry::Choice(group) => {
                    let Some(binding) = choice_resolver::resolve_instance(group, schema, instance, path)?
                    else {
                        continue;
                    };
                    let descriptor = &binding.variant.descriptor;
                    let field_path = format!("{path}.{}", descriptor.name);
                    if let Some(value) = self.normalize_field(binding.value, descriptor, &field_path, depth)? {
                        normalized.set_choice(group.logical_name.as_str(), binding.variant.type_code(), value);
                    }
                }
            }
        }

        for (name, value) in instance.iter() {
            if !is_declared(schema, name) {
                normalized.set(name, value.clone());
            }
        }

        Ok(normalized)
    }

    /// Same array-ness rules as [`Self::encode_field`]
    fn normalize_field(
        &self,
        value: &Value,
        descriptor: &FieldDescriptor,
        path: &str,
        depth: usize,
    ) -> Result<Option<Value>> {
        match value {
            Value::List(items) => {
                let mut values = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| {
                        self.normalize_value(item, descriptor, &format!("{path}[{index}]"), depth)
                    })
                    .collect::<Result<Vec<_>>>()?;
                if values.is_empty() {
                    Ok(None)
                } else if descriptor.is_array() || values.len() > 1 {
                    Ok(Some(Value::List(values)))
                } else {
                    Ok(values.pop())
                }
            }
            single => {
                let value = self.normalize_value(single, descriptor, path, depth)?;
                if descriptor.is_array() {
                    Ok(Some(Value::List(vec![value])))
                } else {
                    Ok(Some(value))
                }
            }
        }
    }

    fn normalize_value(
        &self,
        value: &Value,
        descriptor: &FieldDescriptor,
        path: &str,
        depth: usize,
    ) -> Result<Value> {
        match (&descriptor.declared_type, value) {
            (TypeRef::Record(type_name), Value::Record(record)) => {
                let schema = self.registry.lookup(type_name)?;
                self.normalize_record(record, &schema, path, depth + 1).map(Value::Record)
            }
            _ => Ok(value.clone()),
        }
    }
}

fn nesting_exceeded() -> String {
    format!("nesting exceeds {MAX_NESTING_DEPTH}")
}

fn is_declared(schema: &RecordSchema, name: &str) -> bool {
    schema.has_field(name)
        || schema.choice_group(name).is_some()
        || schema.choice_groups().any(|group| group.claims_property(name))
}

fn check_declared_properties(instance: &Instance, schema: &RecordSchema, path: &str) -> Result<()> {
    let undeclared = instance.iter().map(|(name, _)| name).find(|name| !is_declared(schema, name));
    match undeclared {
        Some(name) => Err(FhirRecordError::encode(
            format!("{path}.{name}"),
            format!("'{name}' is not an element of {}", schema.type_name),
        )),
        None => Ok(()),
    }
}

fn check_resource_type(node: &TreeNode, schema: &RecordSchema, path: &str) -> Result<()> {
    match node.as_str() {
        Some(found) if found == schema.type_name => Ok(()),
        Some(found) => Err(FhirRecordError::decode(
            format!("{path}.{RESOURCE_TYPE_KEY}"),
            format!("expected resourceType '{}', found '{found}'", schema.type_name),
        )),
        None => Err(FhirRecordError::decode(
            format!("{path}.{RESOURCE_TYPE_KEY}"),
            format!("resourceType must be a string, found {}", node.kind_name()),
        )),
    }
}

fn primitive_to_scalar(primitive: &Primitive) -> Scalar {
    match primitive {
        Primitive::Boolean(b) => Scalar::Boolean(*b),
        Primitive::Integer(i) => Scalar::Number(Number::from(*i)),
        Primitive::Decimal(n) => Scalar::Number(n.clone()),
        Primitive::String(s) => Scalar::String(s.clone()),
    }
}

fn decode_primitive(
    primitive_type: PrimitiveType,
    scalar: &Scalar,
    path: &str,
    mode: ScalarMode,
) -> Result<Primitive> {
    let mismatch = || {
        FhirRecordError::decode(
            path,
            format!("expected {primitive_type}, found {}", scalar.kind_name()),
        )
    };
    let unparseable = |lexical: &str| {
        FhirRecordError::decode(path, format!("'{lexical}' is not a valid {primitive_type}"))
    };

    if let (ScalarMode::Lexical, Scalar::String(lexical)) = (mode, scalar) {
        return match primitive_type.kind() {
            PrimitiveKind::Boolean => match lexical.as_str() {
                "true" => Ok(Primitive::Boolean(true)),
                "false" => Ok(Primitive::Boolean(false)),
                _ => Err(unparseable(lexical)),
            },
            PrimitiveKind::Integer => lexical
                .parse::<i64>()
                .map(Primitive::Integer)
                .map_err(|_| unparseable(lexical)),
            PrimitiveKind::Decimal => lexical
                .parse::<Number>()
                .map(Primitive::Decimal)
                .map_err(|_| unparseable(lexical)),
            PrimitiveKind::String => Ok(Primitive::String(lexical.clone())),
        };
    }

    match (primitive_type.kind(), scalar) {
        (PrimitiveKind::Boolean, Scalar::Boolean(b)) => Ok(Primitive::Boolean(*b)),
        (PrimitiveKind::Integer, Scalar::Number(n)) => {
            n.as_i64().map(Primitive::Integer).ok_or_else(|| unparseable(&n.to_string()))
        }
        (PrimitiveKind::Decimal, Scalar::Number(n)) => Ok(Primitive::Decimal(n.clone())),
        (PrimitiveKind::String, Scalar::String(s)) => Ok(Primitive::String(s.clone())),
        _ => Err(mismatch()),
    }
}
