use async_trait::async_trait;
use sync_core::{DestinationRecord, Fields, Result};

/// Storage behind the database adapter, keyed by the source record id.
///
/// Rows are returned as `DestinationRecord`s whose fields are column
/// values, key column included; `id` is the row id.
#[async_trait]
pub trait AccountTable: Send + Sync {
    /// Prepare the table (create it when allowed)
    async fn ensure(&self) -> Result<()>;

    async fn select_by_key(&self, key: &str) -> Result<Option<DestinationRecord>>;

    /// Insert a row and return its id
    async fn insert(&self, key: &str, columns: &Fields) -> Result<String>;

    async fn update(&self, key: &str, columns: &Fields) -> Result<()>;

    /// Delete rows by id, returning the number removed
    async fn delete(&self, ids: &[String]) -> Result<u64>;

    async fn close(&self) {}
}

/// Quote identifier if it contains uppercase letters or needs quoting
pub fn quote_identifier(identifier: &str) -> String {
    let plain = identifier
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && identifier
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if plain {
        identifier.to_string()
    } else {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }
}
