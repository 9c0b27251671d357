use serde::{Deserialize, Serialize};
use sync_core::record::{INDUSTRY, NAME, NUMBER_OF_EMPLOYEES};
use sync_core::{Error, Result};

use crate::quote_identifier;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Memory,
    Postgres,
}

/// One source field stored in one column
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnSpec {
    pub field: String,
    pub column: String,

    /// Column type used when the table is created
    #[serde(default = "default_sql_type")]
    pub sql_type: String,
}

fn default_sql_type() -> String {
    "TEXT".to_string()
}

impl ColumnSpec {
    pub fn new(field: &str, column: &str, sql_type: &str) -> Self {
        Self {
            field: field.to_string(),
            column: column.to_string(),
            sql_type: sql_type.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub backend: Backend,

    /// Target table
    #[serde(default = "default_table")]
    pub table: String,

    /// Column holding the source record id
    #[serde(default = "default_key_column")]
    pub key_column: String,

    #[serde(default = "default_columns")]
    pub columns: Vec<ColumnSpec>,

    /// Required for the postgres backend
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

fn default_table() -> String {
    "account".to_string()
}

fn default_key_column() -> String {
    "salesforceId".to_string()
}

fn default_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new(NAME, "name", "TEXT"),
        ColumnSpec::new(INDUSTRY, "industry", "TEXT"),
        ColumnSpec::new(NUMBER_OF_EMPLOYEES, "numberOfEmployees", "BIGINT"),
    ]
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            table: default_table(),
            key_column: default_key_column(),
            columns: default_columns(),
            postgres: None,
        }
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<()> {
        if self.table.trim().is_empty() || self.key_column.trim().is_empty() {
            return Err(Error::Configuration(
                "database table and key_column must not be empty".to_string(),
            ));
        }
        if self.columns.is_empty() {
            return Err(Error::Configuration(
                "database destination needs at least one column".to_string(),
            ));
        }

        let mut seen = vec![quote_identifier(&self.key_column)];
        for column in &self.columns {
            let quoted = quote_identifier(&column.column);
            if seen.contains(&quoted) {
                return Err(Error::Configuration(format!(
                    "column '{}' mapped twice",
                    column.column
                )));
            }
            seen.push(quoted);
        }

        if self.backend == Backend::Postgres && self.postgres.is_none() {
            return Err(Error::Configuration(
                "postgres backend selected without a 'postgres' section".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostgresConfig {
    /// PostgreSQL connection URL (built from individual fields or provided directly)
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Target schema name
    pub schema: String,

    /// Create the table on connect if it doesn't exist
    pub auto_create_table: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_schema() -> String {
    "public".to_string()
}

fn default_auto_create_table() -> bool {
    true
}

impl<'de> Deserialize<'de> for PostgresConfig {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;

        #[derive(Deserialize)]
        struct PostgresConfigHelper {
            // Direct URL format
            url: Option<String>,

            // Individual fields format
            host: Option<String>,
            port: Option<u16>,
            username: Option<String>,
            password: Option<String>,
            database: Option<String>,

            #[serde(default = "default_max_connections")]
            max_connections: u32,
            #[serde(default = "default_schema")]
            schema: String,
            #[serde(default = "default_auto_create_table")]
            auto_create_table: bool,
        }

        let helper = PostgresConfigHelper::deserialize(deserializer)?;

        let url = if let Some(url) = helper.url {
            url
        } else if let (Some(host), Some(username)) = (helper.host, helper.username) {
            let port = helper.port.unwrap_or(5432);
            let password = helper.password.unwrap_or_default();
            let database = helper.database.unwrap_or_else(|| "postgres".to_string());

            if password.is_empty() {
                format!("postgresql://{}@{}:{}/{}", username, host, port, database)
            } else {
                format!(
                    "postgresql://{}:{}@{}:{}/{}",
                    username, password, host, port, database
                )
            }
        } else {
            return Err(D::Error::custom(
                "Either 'url' or both 'host' and 'username' must be provided",
            ));
        };

        Ok(PostgresConfig {
            url,
            max_connections: helper.max_connections,
            schema: helper.schema,
            auto_create_table: helper.auto_create_table,
        })
    }
}
