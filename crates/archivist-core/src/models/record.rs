use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A row of the spreadsheet-backed resource list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, deserialize_with = "crate::models::id::deserialize")]
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Look up a field's value
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Look up a field as a string, if it is one
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Envelope returned by the resource endpoint's GET.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordsResponse {
    #[serde(default)]
    pub data: Vec<Record>,
}
