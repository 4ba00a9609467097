//! Structured-output contract shared by every schema the screener asks the model for.

use serde::{de::DeserializeOwned, Deserialize, Deserializer};
use serde_json::{json, Value};

/// A Schema Layer type the model can be asked to produce.
///
/// Deserialization is the shape check (types should use `deny_unknown_fields` and
/// `required_nullable` so extra and missing keys both fail); `validate` covers the
/// semantic rules JSON Schema cannot express.
pub trait StructuredOutput: DeserializeOwned + Send + 'static {
    const SCHEMA_NAME: &'static str;

    fn json_schema() -> Value;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Deserializes an `Option<T>` whose key must be present. `null` maps to `None`.
///
/// Plain `Option` fields silently default when the key is missing, which would hide
/// an incomplete model response.
pub fn required_nullable<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer)
}

/// Parses raw model text into `T`, then runs its semantic validation.
pub fn parse_structured<T: StructuredOutput>(raw: &str) -> Result<T, String> {
    let text = strip_json_fences(raw);
    let value: T = serde_json::from_str(text).map_err(|e| format!("invalid JSON: {e}"))?;
    value.validate()?;
    Ok(value)
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
pub fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}

// Schema-building helpers. Strict structured output requires every property to be
// listed in `required` and `additionalProperties: false`.

pub fn object_schema(properties: Value) -> Value {
    let required: Vec<String> = properties
        .as_object()
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

pub fn nullable(type_name: &str) -> Value {
    json!({ "type": [type_name, "null"] })
}

pub fn array_of(items: Value) -> Value {
    json!({ "type": "array", "items": items })
}

pub fn string_enum(values: &[&str]) -> Value {
    json!({ "type": "string", "enum": values })
}
