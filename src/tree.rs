//! Format-neutral interchange tree.
//!
//! Every external encoding reduces to this shape: scalars, ordered lists and
//! ordered string-keyed maps. Map key order is preserved end to end.

use indexmap::IndexMap;
use serde_json::{Number, Value as JsonValue};

use crate::error::{FhirRecordError, Result};

/// Deepest nesting of maps and lists (or of records) any codec or the
/// validator will follow
pub const MAX_NESTING_DEPTH: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Boolean(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Boolean(_) => "boolean",
            Scalar::Number(_) => "number",
            Scalar::String(_) => "string",
        }
    }

    /// Lexical form, as carried by XML `value` attributes
    pub fn lexical(&self) -> String {
        match self {
            Scalar::Boolean(b) => b.to_string(),
            Scalar::Number(n) => n.to_string(),
            Scalar::String(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TreeNode {
    Scalar(Scalar),
    List(Vec<TreeNode>),
    Map(IndexMap<String, TreeNode>),
}

impl TreeNode {
    pub fn string(value: impl Into<String>) -> Self {
        TreeNode::Scalar(Scalar::String(value.into()))
    }

    pub fn map() -> Self {
        TreeNode::Map(IndexMap::new())
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            TreeNode::Scalar(scalar) => scalar.kind_name(),
            TreeNode::List(_) => "array",
            TreeNode::Map(_) => "object",
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, TreeNode>> {
        match self {
            TreeNode::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[TreeNode]> {
        match self {
            TreeNode::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TreeNode::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&TreeNode> {
        self.as_map().and_then(|map| map.get(key))
    }

    /// Build a tree from JSON. `null` has no place in the interchange
    /// model and is rejected with the path where it occurred, as is
    /// nesting past [`MAX_NESTING_DEPTH`].
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        from_json_at(value, "$", 0)
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            TreeNode::Scalar(Scalar::Boolean(b)) => JsonValue::Bool(*b),
            TreeNode::Scalar(Scalar::Number(n)) => JsonValue::Number(n.clone()),
            TreeNode::Scalar(Scalar::String(s)) => JsonValue::String(s.clone()),
            TreeNode::List(items) => JsonValue::Array(items.iter().map(TreeNode::to_json).collect()),
            TreeNode::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(key, node)| (key.clone(), node.to_json()))
                    .collect(),
            ),
        }
    }
}

fn from_json_at(value: &JsonValue, path: &str, depth: usize) -> Result<TreeNode> {
    if depth >= MAX_NESTING_DEPTH && (value.is_array() || value.is_object()) {
        return Err(FhirRecordError::decode(
            path,
            format!("nesting exceeds {MAX_NESTING_DEPTH}"),
        ));
    }
    Ok(match value {
        JsonValue::Null => {
            return Err(FhirRecordError::decode(path, "null is not a permitted value"));
        }
        JsonValue::Bool(b) => TreeNode::Scalar(Scalar::Boolean(*b)),
        JsonValue::Number(n) => TreeNode::Scalar(Scalar::Number(n.clone())),
        JsonValue::String(s) => TreeNode::Scalar(Scalar::String(s.clone())),
        JsonValue::Array(items) => TreeNode::List(
            items
                .iter()
                .enumerate()
                .map(|(index, item)| from_json_at(item, &format!("{path}[{index}]"), depth + 1))
                .collect::<Result<Vec<_>>>()?,
        ),
        JsonValue::Object(map) => {
            let mut nodes = IndexMap::with_capacity(map.len());
            for (key, item) in map {
                nodes.insert(key.clone(), from_json_at(item, &format!("{path}.{key}"), depth + 1)?);
            }
            TreeNode::Map(nodes)
        }
    })
}

impl TryFrom<JsonValue> for TreeNode {
    type Error = FhirRecordError;

    fn try_from(value: JsonValue) -> Result<Self> {
        TreeNode::from_json(&value)
    }
}

impl From<TreeNode> for JsonValue {
    fn from(node: TreeNode) -> Self {
        node.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_key_order_preserved() {
        let payload = json!({"zeta": 1, "alpha": [true, "x"], "mid": {"b": 1.5, "a": 2}});
        let tree = TreeNode::from_json(&payload).unwrap();

        let keys: Vec<&String> = tree.as_map().unwrap().keys().collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
        assert_eq!(
            serde_json::to_string(&tree.to_json()).unwrap(),
            r#"{"zeta":1,"alpha":[true,"x"],"mid":{"b":1.5,"a":2}}"#
        );
    }

    #[test]
    fn test_null_rejected_with_path() {
        let payload = json!({"code": {"coding": [null]}});
        let err = TreeNode::from_json(&payload).unwrap_err();
        assert_eq!(err.path(), Some("$.code.coding[0]"));
    }

    #[test]
    fn test_nesting_limit() {
        let nest = |levels: usize| {
            (0..levels).fold(json!("leaf"), |inner, _| json!({"extension": inner}))
        };

        assert!(TreeNode::from_json(&nest(MAX_NESTING_DEPTH)).is_ok());

        let err = TreeNode::from_json(&nest(MAX_NESTING_DEPTH + 1)).unwrap_err();
        assert!(matches!(err, FhirRecordError::Decode { .. }));
        assert!(err.to_string().contains("nesting exceeds 128"));
    }

    #[test]
    fn test_decimal_keeps_lexical_form() {
        let payload: JsonValue = serde_json::from_str(r#"{"value": 1.50}"#).unwrap();
        let tree = TreeNode::from_json(&payload).unwrap();

        let Some(TreeNode::Scalar(scalar)) = tree.get("value") else {
            panic!("expected a scalar");
        };
        assert!(matches!(scalar, Scalar::Number(_)));
        assert_eq!(scalar.lexical(), "1.50");
        assert_eq!(serde_json::to_string(&tree.to_json()).unwrap(), r#"{"value":1.50}"#);
    }

    #[test]
    fn test_scalar_lexical_form() {
        assert_eq!(Scalar::Boolean(true).lexical(), "true");
        assert_eq!(Scalar::Number(Number::from(42)).lexical(), "42");
        assert_eq!(Scalar::String("x".into()).lexical(), "x");
    }
}
