// JSON projection of the interchange tree

use serde_json::Value as JsonValue;

use super::RecordCodec;
use crate::error::Result;
use crate::instance::Instance;
use crate::tree::TreeNode;
use crate::types::RecordSchema;

impl RecordCodec<'_> {
    pub fn encode_json(&self, instance: &Instance, schema: &RecordSchema) -> Result<JsonValue> {
        Ok(self.encode(instance, schema)?.to_json())
    }

    pub fn decode_json(&self, json: &JsonValue, schema: &RecordSchema) -> Result<Instance> {
        let tree = TreeNode::from_json(json)?;
        self.decode(&tree, schema)
    }

    pub fn encode_json_string(
        &self,
        instance: &Instance,
        schema: &RecordSchema,
        pretty: bool,
    ) -> Result<String> {
        let json = self.encode_json(instance, schema)?;
        let text = if pretty {
            serde_json::to_string_pretty(&json)?
        } else {
            serde_json::to_string(&json)?
        };
        Ok(text)
    }

    pub fn decode_json_str(&self, text: &str, schema: &RecordSchema) -> Result<Instance> {
        let json: JsonValue = serde_json::from_str(text)?;
        self.decode_json(&json, schema)
    }
}
