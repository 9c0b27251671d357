use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::record::as_i64;
use crate::SourceRecord;

/// Industry to destination category id table.
///
/// Category ids differ per environment, so the table always comes from
/// configuration. Lookups ignore case because environment overrides
/// arrive lower-cased.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CategoryTable(BTreeMap<String, String>);

impl CategoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, industry: impl Into<String>, category_id: impl Into<String>) -> Self {
        self.0.insert(industry.into(), category_id.into());
        self
    }

    /// Category id for an industry; unmapped industries get no category
    pub fn categorize(&self, industry: &str) -> Option<&str> {
        let industry = industry.trim();
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(industry))
            .map(|(_, v)| v.as_str())
    }

    /// Configured category ids
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CategoryTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Pre-sync inclusion/exclusion rule
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RecordFilter {
    /// Drop records whose field equals one of the values
    Exclude { field: String, values: Vec<String> },
    /// Keep only records whose field equals one of the values
    Include { field: String, values: Vec<String> },
    /// Keep only records whose numeric field is at least `min`
    MinValue { field: String, min: i64 },
}

impl RecordFilter {
    pub fn accepts(&self, record: &SourceRecord) -> bool {
        match self {
            RecordFilter::Exclude { field, values } => match record.get_str(field) {
                Some(value) => !contains_ignore_case(values, &value),
                None => true,
            },
            RecordFilter::Include { field, values } => match record.get_str(field) {
                Some(value) => contains_ignore_case(values, &value),
                None => false,
            },
            RecordFilter::MinValue { field, min } => record
                .get(field)
                .and_then(as_i64)
                .map(|v| v >= *min)
                .unwrap_or(false),
        }
    }

    fn describe(&self) -> String {
        match self {
            RecordFilter::Exclude { field, values } => {
                format!("{} is one of [{}]", field, values.join(", "))
            }
            RecordFilter::Include { field, values } => {
                format!("{} is not one of [{}]", field, values.join(", "))
            }
            RecordFilter::MinValue { field, min } => format!("{} is below {}", field, min),
        }
    }
}

fn contains_ignore_case(values: &[String], value: &str) -> bool {
    values.iter().any(|v| v.eq_ignore_ascii_case(value.trim()))
}

/// Flow-wide rules applied before and during the fan-out
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncRules {
    #[serde(default)]
    pub filters: Vec<RecordFilter>,

    #[serde(default)]
    pub categories: CategoryTable,
}

impl SyncRules {
    pub fn accepts(&self, record: &SourceRecord) -> bool {
        self.rejection(record).is_none()
    }

    /// Why a record is dropped, if it is
    pub fn rejection(&self, record: &SourceRecord) -> Option<String> {
        self.filters
            .iter()
            .find(|f| !f.accepts(record))
            .map(RecordFilter::describe)
    }
}
