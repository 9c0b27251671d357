use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field name to value mapping shared by source and destination records
pub type Fields = BTreeMap<String, Value>;

pub const NAME: &str = "Name";
pub const INDUSTRY: &str = "Industry";
pub const NUMBER_OF_EMPLOYEES: &str = "NumberOfEmployees";

/// What an adapter decided to do with a record after looking it up
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WriteAction {
    Create,
    Update,
    Skip,
}

/// A record as it exists in the source org
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRecord {
    /// Identifier assigned by the source system once the record is created
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub fields: Fields,

    #[serde(default = "Utc::now")]
    pub last_modified: DateTime<Utc>,
}

impl Default for SourceRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRecord {
    pub fn new() -> Self {
        Self {
            id: None,
            fields: Fields::new(),
            last_modified: Utc::now(),
        }
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String view of a field; numbers are rendered, null and missing are None
    pub fn get_str(&self, field: &str) -> Option<String> {
        match self.fields.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get(NAME).and_then(Value::as_str)
    }

    pub fn industry(&self) -> Option<&str> {
        self.fields.get(INDUSTRY).and_then(Value::as_str)
    }

    pub fn number_of_employees(&self) -> Option<i64> {
        self.fields.get(NUMBER_OF_EMPLOYEES).and_then(as_i64)
    }

    /// Short label for logs and failure reports
    pub fn label(&self) -> String {
        match (self.name(), self.id.as_deref()) {
            (Some(name), Some(id)) => format!("{} ({})", name, id),
            (Some(name), None) => name.to_string(),
            (None, Some(id)) => id.to_string(),
            (None, None) => "<unnamed>".to_string(),
        }
    }
}

/// The synced entity as stored by one destination system
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestinationRecord {
    /// System-assigned identifier, used for deletes
    pub id: String,

    /// Business key the record was matched on
    pub key: String,

    pub fields: Fields,
}

impl DestinationRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Integer view of a value that may arrive as a number or a numeric string
pub fn as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose equality: numbers and numeric strings compare by value
pub fn values_match(left: &Value, right: &Value) -> bool {
    if left == right {
        return true;
    }
    match (as_i64(left), as_i64(right)) {
        (Some(l), Some(r)) => l == r,
        _ => false,
    }
}
