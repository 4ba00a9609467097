//! Raw candidate input: an identifier plus arbitrary, ordered text fields.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// One raw input row. No fixed column set is assumed; field order is kept as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub source_id: String,
    #[serde(
        serialize_with = "serialize_fields",
        deserialize_with = "deserialize_fields"
    )]
    fields: Vec<(String, String)>,
}

impl RawRecord {
    /// Blank names and blank values are dropped; everything else is kept verbatim.
    pub fn new<K, V>(source_id: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            source_id: source_id.into(),
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
                .collect(),
        }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn serialize_fields<S: Serializer>(fields: &[(String, String)], s: S) -> Result<S::Ok, S::Error> {
    s.collect_map(fields.iter().map(|(k, v)| (k, v)))
}

/// Accepts a JSON object in document order. Non-string values keep their JSON text;
/// nulls are dropped.
fn deserialize_fields<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<(String, String)>, D::Error> {
    let map = Map::<String, Value>::deserialize(d)?;
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .filter(|(k, v)| !k.trim().is_empty() && !v.trim().is_empty())
        .collect())
}
