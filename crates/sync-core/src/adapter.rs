use crate::record::values_match;
use crate::{DestinationRecord, Error, Fields, Result, SourceRecord, WriteAction};
use async_trait::async_trait;

/// Trait for downstream systems a batch fans out to
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    /// Name used in job summaries and failure reports
    fn name(&self) -> &str;

    /// Key used to match a source record with its downstream counterpart.
    /// Fails with `Error::Validation` when the record does not carry it.
    fn business_key(&self, record: &SourceRecord) -> Result<String>;

    /// Destination-side fields for a source record
    fn map_fields(&self, record: &SourceRecord) -> Fields;

    /// Decide what a write should do given what is already downstream
    fn plan(&self, existing: Option<&DestinationRecord>, fields: &Fields) -> WriteAction {
        match existing {
            None => WriteAction::Create,
            Some(existing) => {
                let unchanged = fields.iter().all(|(field, value)| {
                    existing
                        .fields
                        .get(field)
                        .map(|current| values_match(current, value))
                        .unwrap_or(value.is_null())
                });
                if unchanged {
                    WriteAction::Skip
                } else {
                    WriteAction::Update
                }
            }
        }
    }

    /// Look up by business key; `Ok(None)` means not present
    async fn find_by_key(&self, key: &str) -> Result<Option<DestinationRecord>>;

    /// Create a record and return its system-assigned id
    async fn create(&self, key: &str, fields: Fields) -> Result<String>;

    async fn update(&self, key: &str, fields: Fields) -> Result<()>;

    /// Remove records by system-assigned id; ids that are already gone are ignored
    async fn delete(&self, ids: &[String]) -> Result<()>;

    async fn connect(&self) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// Business key taken from a named field, e.g. `Name`
pub fn key_from_field(record: &SourceRecord, field: &str) -> Result<String> {
    match record.get_str(field) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Validation(format!(
            "record {} has no '{}'",
            record.label(),
            field
        ))),
    }
}

/// Business key taken from the source system id
pub fn key_from_source_id(record: &SourceRecord) -> Result<String> {
    match record.id.as_deref() {
        Some(id) if !id.trim().is_empty() => Ok(id.to_string()),
        _ => Err(Error::Validation(format!(
            "record {} has no source id",
            record.label()
        ))),
    }
}

/// Copy the listed source fields, skipping the ones the record does not have
pub fn project_fields(record: &SourceRecord, fields: &[String]) -> Fields {
    fields
        .iter()
        .filter_map(|f| record.get(f).map(|v| (f.clone(), v.clone())))
        .collect()
}
