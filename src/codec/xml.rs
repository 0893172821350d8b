//! XML projection of the interchange tree.
//!
//! Records become elements named after their fields, primitives are carried
//! in a `value` attribute and list occurrences become repeated siblings.
//! The root element is named after the record type. Element `id` and
//! extension `url` are attributes, as FHIR XML writes them.
//!
//! ```xml
//! <Observation xmlns="http://hl7.org/fhir">
//!   <extension url="http://example.org/flag">
//!     <valueBoolean value="true"/>
//!   </extension>
//!   <status value="final"/>
//!   <valueDateTime value="2020-01-01"/>
//! </Observation>
//! ```
//!
//! XML carries no array markers, so the reader produces a list only for
//! repeated siblings. Decode wraps single occurrences of repeating fields.
//! Primitive extensions and narrative XHTML are out of reach of this
//! projection: a primitive element holds its `value` and nothing else.

use indexmap::IndexMap;
use indexmap::map::Entry;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::{RESOURCE_TYPE_KEY, RecordCodec, ScalarMode};
use crate::error::{FhirRecordError, Result};
use crate::instance::Instance;
use crate::tree::{MAX_NESTING_DEPTH, TreeNode};
use crate::types::RecordSchema;

/// Elements whose `url` is written as an attribute
const EXTENSION_ELEMENTS: [&str; 2] = ["extension", "modifierExtension"];

impl RecordCodec<'_> {
    pub fn encode_xml(&self, instance: &Instance, schema: &RecordSchema) -> Result<String> {
        let tree = self.encode(instance, schema)?;
        tree_to_xml(&schema.type_name, &tree, &self.options.xml_namespace)
    }

    /// Decode an XML document whose root element is named after `schema`.
    /// Primitive values are parsed from their lexical form.
    pub fn decode_xml(&self, xml: &str, schema: &RecordSchema) -> Result<Instance> {
        let (root, tree) = xml_to_tree(xml)?;
        if root != schema.type_name {
            return Err(FhirRecordError::decode(
                &schema.type_name,
                format!("expected root element '{}', found '{root}'", schema.type_name),
            ));
        }
        self.decode_with(&tree, schema, ScalarMode::Lexical)
    }
}

/// Write a map-shaped tree as an XML document with root element `root`
pub fn tree_to_xml(root: &str, tree: &TreeNode, namespace: &str) -> Result<String> {
    let map = tree
        .as_map()
        .ok_or_else(|| FhirRecordError::xml(format!("{root} must encode to an object")))?;

    let mut writer = Writer::new(Vec::new());
    write(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut start = BytesStart::new(root);
    if !namespace.is_empty() {
        start.push_attribute(("xmlns", namespace));
    }
    write(&mut writer, Event::Start(start))?;
    write_children(&mut writer, map, &[], 1)?;
    write(&mut writer, Event::End(BytesEnd::new(root)))?;

    String::from_utf8(writer.into_inner()).map_err(|e| FhirRecordError::xml(e.to_string()))
}

fn write_children(
    writer: &mut Writer<Vec<u8>>,
    map: &IndexMap<String, TreeNode>,
    attributes: &[&str],
    depth: usize,
) -> Result<()> {
    for (name, node) in map {
        // the element name carries the type
        if name == RESOURCE_TYPE_KEY || attributes.iter().any(|attribute| attribute == name) {
            continue;
        }
        match node {
            TreeNode::List(items) => {
                for item in items {
                    write_element(writer, name, item, depth)?;
                }
            }
            single => write_element(writer, name, single, depth)?,
        }
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, name: &str, node: &TreeNode, depth: usize) -> Result<()> {
    match node {
        TreeNode::Scalar(scalar) => {
            let lexical = scalar.lexical();
            let mut element = BytesStart::new(name);
            element.push_attribute(("value", lexical.as_str()));
            write(writer, Event::Empty(element))
        }
        TreeNode::Map(_) if depth >= MAX_NESTING_DEPTH => Err(FhirRecordError::xml(format!(
            "element '{name}' nesting exceeds {MAX_NESTING_DEPTH}"
        ))),
        TreeNode::Map(children) => {
            let attributes = attribute_properties(name, children);
            let mut element = BytesStart::new(name);
            for property in &attributes {
                if let Some(TreeNode::Scalar(scalar)) = children.get(*property) {
                    element.push_attribute((*property, scalar.lexical().as_str()));
                }
            }

            let has_content = children
                .keys()
                .any(|key| key != RESOURCE_TYPE_KEY && !attributes.iter().any(|attribute| attribute == key));
            if !has_content {
                return write(writer, Event::Empty(element));
            }
            write(writer, Event::Start(element))?;
            write_children(writer, children, &attributes, depth + 1)?;
            write(writer, Event::End(BytesEnd::new(name)))
        }
        TreeNode::List(_) => Err(FhirRecordError::xml(format!(
            "element '{name}' cannot hold a nested list"
        ))),
    }
}

/// Scalar properties of a nested element written as attributes: `id`
/// unless the element is itself a resource, and `url` on extensions
fn attribute_properties(name: &str, children: &IndexMap<String, TreeNode>) -> Vec<&'static str> {
    let mut properties = Vec::with_capacity(2);
    if !children.contains_key(RESOURCE_TYPE_KEY) {
        properties.push("id");
    }
    if EXTENSION_ELEMENTS.iter().any(|element| *element == name) {
        properties.push("url");
    }
    properties.retain(|property| matches!(children.get(*property), Some(TreeNode::Scalar(_))));
    properties
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| FhirRecordError::xml(e.to_string()))
}

/// Read an XML document into its root element name and a map-shaped tree.
/// Every `value` attribute becomes a string scalar, and any other attribute
/// a string property of its element.
pub fn xml_to_tree(xml: &str) -> Result<(String, TreeNode)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut open: Vec<(String, IndexMap<String, TreeNode>)> = Vec::new();
    let mut root: Option<(String, TreeNode)> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| FhirRecordError::xml(format!("XML parse error: {e}")))?;
        match event {
            Event::Start(start) => {
                let name = element_name(&start);
                if root.is_some() {
                    return Err(FhirRecordError::xml(format!(
                        "unexpected element '{name}' after the root element"
                    )));
                }
                if open.len() >= MAX_NESTING_DEPTH {
                    return Err(FhirRecordError::xml(format!(
                        "element '{name}' nesting exceeds {MAX_NESTING_DEPTH}"
                    )));
                }
                let (value, properties) = read_attributes(&start)?;
                if value.is_some() {
                    return Err(FhirRecordError::xml(format!(
                        "element '{name}' has both a value and child elements"
                    )));
                }
                open.push((name, properties));
            }
            Event::Empty(start) => {
                let name = element_name(&start);
                let node = match read_attributes(&start)? {
                    (Some(value), properties) if properties.is_empty() => TreeNode::string(value),
                    (Some(_), _) => {
                        return Err(FhirRecordError::xml(format!(
                            "element '{name}' has both a value and other attributes"
                        )));
                    }
                    (None, properties) => TreeNode::Map(properties),
                };
                match open.last_mut() {
                    Some((_, parent)) => insert_child(parent, name, node),
                    None if root.is_none() => root = Some((name, node)),
                    None => {
                        return Err(FhirRecordError::xml(format!(
                            "unexpected element '{name}' after the root element"
                        )));
                    }
                }
            }
            Event::End(_) => {
                let (name, children) = open
                    .pop()
                    .ok_or_else(|| FhirRecordError::xml("unbalanced end tag"))?;
                let node = TreeNode::Map(children);
                match open.last_mut() {
                    Some((_, parent)) => insert_child(parent, name, node),
                    None => root = Some((name, node)),
                }
            }
            Event::Text(_) | Event::CData(_) => {
                let path = open
                    .iter()
                    .map(|(name, _)| name.as_str())
                    .collect::<Vec<_>>()
                    .join("/");
                return Err(FhirRecordError::xml(format!(
                    "unexpected text content in '{path}', values belong in 'value' attributes"
                )));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some((name, _)) = open.last() {
        return Err(FhirRecordError::xml(format!("element '{name}' is not closed")));
    }
    root.ok_or_else(|| FhirRecordError::xml("document has no root element"))
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

/// Split attributes into the `value` and the remaining element properties.
/// Namespace declarations and prefixed attributes carry no record data.
fn read_attributes(start: &BytesStart<'_>) -> Result<(Option<String>, IndexMap<String, TreeNode>)> {
    let mut value = None;
    let mut properties = IndexMap::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| FhirRecordError::xml(e.to_string()))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.contains(&b':') {
            continue;
        }
        let raw = String::from_utf8_lossy(&attr.value);
        let unescaped = quick_xml::escape::unescape(&raw)
            .map_err(|e| FhirRecordError::xml(e.to_string()))?
            .into_owned();
        if key == b"value" {
            value = Some(unescaped);
        } else {
            let name = String::from_utf8_lossy(key).into_owned();
            properties.insert(name, TreeNode::string(unescaped));
        }
    }
    Ok((value, properties))
}

/// Repeated siblings collect into a list in document order
fn insert_child(parent: &mut IndexMap<String, TreeNode>, name: String, node: TreeNode) {
    match parent.entry(name) {
        Entry::Occupied(mut entry) => match entry.get_mut() {
            TreeNode::List(items) => items.push(node),
            existing => {
                let first = std::mem::replace(existing, TreeNode::List(Vec::new()));
                *existing = TreeNode::List(vec![first, node]);
            }
        },
        Entry::Vacant(entry) => {
            entry.insert(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Value;
    use crate::registry::SchemaRegistry;
    use crate::types::{FieldDescriptor, PolymorphicGroup, PrimitiveType};

    fn registry() -> SchemaRegistry {
        let registry = SchemaRegistry::new();
        registry
            .register_schema(
                RecordSchema::new("Coding")
                    .with_field(FieldDescriptor::new("system", PrimitiveType::Uri))
                    .with_field(FieldDescriptor::new("code", PrimitiveType::Code)),
            )
            .unwrap();
        registry
            .register_schema(
                RecordSchema::resource("Observation")
                    .with_field(FieldDescriptor::new("status", PrimitiveType::Code))
                    .with_field(FieldDescriptor::new("coding", "Coding").repeating())
                    .with_field(FieldDescriptor::new("flagged", PrimitiveType::Boolean))
                    .with_choice(PolymorphicGroup::new("value").with_variants(["integer", "string"])),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_encode_layout() {
        let registry = registry();
        let schema = registry.lookup("Observation").unwrap();
        let instance = Instance::new("Observation")
            .with("status", "final")
            .with("flagged", true)
            .with_choice("value", "string", "a < b");

        let xml = RecordCodec::new(&registry).encode_xml(&instance, &schema).unwrap();
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?><Observation xmlns="http://hl7.org/fhir">"#));
        assert!(xml.contains(r#"<status value="final"/>"#));
        assert!(xml.contains(r#"<flagged value="true"/>"#));
        assert!(xml.contains(r#"<valueString value="a &lt; b"/>"#));
        assert!(!xml.contains("resourceType"));
    }

    #[test]
    fn test_round_trip_with_repeated_siblings() {
        let registry = registry();
        let schema = registry.lookup("Observation").unwrap();
        let codec = RecordCodec::new(&registry);
        let coding = |code: &str| -> Value {
            Instance::new("Coding")
                .with("system", "http://loinc.org")
                .with("code", code)
                .into()
        };
        let instance = Instance::new("Observation")
            .with("status", "final")
            .with("coding", Value::list([coding("1"), coding("2")]))
            .with("flagged", false)
            .with_choice("value", "integer", Value::integer(42));

        let xml = codec.encode_xml(&instance, &schema).unwrap();
        assert_eq!(codec.decode_xml(&xml, &schema).unwrap(), instance);
    }

    #[test]
    fn test_single_occurrence_of_repeating_field() {
        let registry = registry();
        let schema = registry.lookup("Observation").unwrap();
        let xml = r#"<Observation xmlns="http://hl7.org/fhir">
            <!-- one coding only -->
            <coding><code value="x"/></coding>
        </Observation>"#;

        let instance = RecordCodec::new(&registry).decode_xml(xml, &schema).unwrap();
        assert_eq!(instance.get("coding").map(Value::occurrences), Some(1));
        assert!(instance.get("coding").and_then(Value::as_list).is_some());
    }

    #[test]
    fn test_decode_errors() {
        let registry = registry();
        let schema = registry.lookup("Observation").unwrap();
        let codec = RecordCodec::new(&registry);

        let err = codec.decode_xml("<Patient/>", &schema).unwrap_err();
        assert!(matches!(err, FhirRecordError::Decode { .. }));

        let err = codec
            .decode_xml(r#"<Observation><flagged value="yes"/></Observation>"#, &schema)
            .unwrap_err();
        assert_eq!(err.path(), Some("Observation.flagged"));

        let err = codec
            .decode_xml(r#"<Observation><status>final</status></Observation>"#, &schema)
            .unwrap_err();
        assert!(matches!(err, FhirRecordError::Xml(_)));

        assert!(codec.decode_xml("<Observation>", &schema).is_err());
    }

    #[test]
    fn test_tree_reader_collects_siblings() {
        let (root, tree) = xml_to_tree(r#"<Bundle><a value="1"/><b/><a value="2"/></Bundle>"#).unwrap();
        assert_eq!(root, "Bundle");
        assert_eq!(
            tree.get("a"),
            Some(&TreeNode::List(vec![TreeNode::string("1"), TreeNode::string("2")]))
        );
        assert_eq!(tree.get("b"), Some(&TreeNode::map()));
    }

    #[test]
    fn test_id_and_extension_url_are_attributes() {
        let tree = TreeNode::from_json(&serde_json::json!({
            "id": "obs-1",
            "extension": [
                {"url": "http://example.org/flag", "valueCode": "on"},
                {"url": "http://example.org/empty"}
            ],
            "code": {"id": "c1", "text": "pulse"},
            "subject": {"id": "s1"}
        }))
        .unwrap();

        let xml = tree_to_xml("Observation", &tree, "").unwrap();
        assert!(xml.contains(r#"<Observation><id value="obs-1"/>"#));
        assert!(xml.contains(
            r#"<extension url="http://example.org/flag"><valueCode value="on"/></extension>"#
        ));
        assert!(xml.contains(r#"<extension url="http://example.org/empty"/>"#));
        assert!(xml.contains(r#"<code id="c1"><text value="pulse"/></code>"#));
        assert!(xml.contains(r#"<subject id="s1"/>"#));

        let (_, parsed) = xml_to_tree(&xml).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn test_reader_ignores_namespace_declarations() {
        let xml = r#"<Observation xmlns="http://hl7.org/fhir" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="x">
            <extension url="http://example.org/a&amp;b"/>
        </Observation>"#;
        let (_, tree) = xml_to_tree(xml).unwrap();
        assert_eq!(tree.as_map().map(|map| map.len()), Some(1));
        assert_eq!(
            tree.get("extension").and_then(|ext| ext.get("url")),
            Some(&TreeNode::string("http://example.org/a&b"))
        );
    }

    #[test]
    fn test_primitive_with_attributes_rejected() {
        let err = xml_to_tree(r#"<Observation><status id="s" value="final"/></Observation>"#).unwrap_err();
        assert!(matches!(err, FhirRecordError::Xml(_)));
    }

    #[test]
    fn test_nesting_limit() {
        let levels = MAX_NESTING_DEPTH + 72;
        let xml = format!(
            "<Observation>{}{}</Observation>",
            r#"<extension url="http://example.org/nested">"#.repeat(levels),
            "</extension>".repeat(levels)
        );
        let err = xml_to_tree(&xml).unwrap_err();
        assert!(matches!(err, FhirRecordError::Xml(_)));
        assert!(err.to_string().contains("nesting exceeds 128"));

        let within = MAX_NESTING_DEPTH - 1;
        let xml = format!(
            "<Observation>{}{}</Observation>",
            "<extension>".repeat(within),
            "</extension>".repeat(within)
        );
        let (_, tree) = xml_to_tree(&xml).unwrap();
        assert!(tree_to_xml("Observation", &tree, "").is_ok());
    }
}
