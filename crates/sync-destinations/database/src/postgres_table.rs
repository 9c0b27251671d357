use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use sync_core::{DestinationRecord, Error, Fields, Result};
use tracing::{debug, info};

use crate::{quote_identifier, AccountTable, ColumnSpec, PostgresConfig};

/// SQL for one account table; kept apart from the pool so it can be checked
/// without a database
#[derive(Debug, Clone)]
struct TableLayout {
    schema: String,
    table: String,
    key_column: String,
    columns: Vec<ColumnSpec>,
}

impl TableLayout {
    fn qualified(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.schema),
            quote_identifier(&self.table)
        )
    }

    fn create_table_sql(&self) -> String {
        let mut defs = vec![
            "id BIGSERIAL PRIMARY KEY".to_string(),
            format!("{} TEXT NOT NULL UNIQUE", quote_identifier(&self.key_column)),
        ];
        defs.extend(
            self.columns
                .iter()
                .map(|c| format!("{} {}", quote_identifier(&c.column), c.sql_type)),
        );
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.qualified(),
            defs.join(", ")
        )
    }

    fn select_sql(&self) -> String {
        format!(
            "SELECT id, to_jsonb(t) AS row FROM {} t WHERE {} = $1",
            self.qualified(),
            quote_identifier(&self.key_column)
        )
    }

    /// Null values are written as literal NULL so no typed parameter is bound
    fn insert_sql(&self, columns: &Fields) -> String {
        let mut names = vec![quote_identifier(&self.key_column)];
        let mut values = vec!["$1".to_string()];
        let mut next = 2;
        for (column, value) in columns {
            names.push(quote_identifier(column));
            if value.is_null() {
                values.push("NULL".to_string());
            } else {
                values.push(format!("${}", next));
                next += 1;
            }
        }
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING id",
            self.qualified(),
            names.join(", "),
            values.join(", ")
        )
    }

    fn update_sql(&self, columns: &Fields) -> String {
        let mut next = 2;
        let assignments: Vec<String> = columns
            .iter()
            .map(|(column, value)| {
                if value.is_null() {
                    format!("{} = NULL", quote_identifier(column))
                } else {
                    let assignment = format!("{} = ${}", quote_identifier(column), next);
                    next += 1;
                    assignment
                }
            })
            .collect();
        format!(
            "UPDATE {} SET {} WHERE {} = $1",
            self.qualified(),
            assignments.join(", "),
            quote_identifier(&self.key_column)
        )
    }

    fn delete_sql(&self) -> String {
        format!("DELETE FROM {} WHERE id = ANY($1)", self.qualified())
    }
}

/// Account table in PostgreSQL
pub struct PgAccountTable {
    pool: PgPool,
    layout: TableLayout,
    auto_create_table: bool,
}

impl PgAccountTable {
    /// The pool connects on first use
    pub fn new(
        config: &PostgresConfig,
        table: &str,
        key_column: &str,
        columns: Vec<ColumnSpec>,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy(&config.url)
            .map_err(|e| Error::Connection(format!("Invalid PostgreSQL URL: {}", e)))?;

        Ok(Self {
            pool,
            layout: TableLayout {
                schema: config.schema.clone(),
                table: table.to_string(),
                key_column: key_column.to_string(),
                columns,
            },
            auto_create_table: config.auto_create_table,
        })
    }

    async fn table_exists(&self) -> Result<bool> {
        let query = "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = $1 AND table_name = $2
        )";

        let exists: (bool,) = sqlx::query_as(query)
            .bind(&self.layout.schema)
            .bind(&self.layout.table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to check table existence", e))?;

        Ok(exists.0)
    }
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &'q Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query,
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.as_str()),
        other => query.bind(other),
    }
}

fn db_error(context: &str, e: sqlx::Error) -> Error {
    match &e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => Error::Connection(format!("{}: {}", context, e)),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            Error::Validation(format!("{}: {}", context, e))
        }
        _ => Error::Generic(anyhow::anyhow!("{}: {}", context, e)),
    }
}

fn row_to_record(id: i64, row: Value, key_column: &str) -> Result<DestinationRecord> {
    let Value::Object(map) = row else {
        return Err(Error::Parse(format!("row {} is not a JSON object", id)));
    };
    let key = map
        .get(key_column)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let fields: Fields = map.into_iter().filter(|(k, _)| k != "id").collect();

    Ok(DestinationRecord {
        id: id.to_string(),
        key,
        fields,
    })
}

#[async_trait]
impl AccountTable for PgAccountTable {
    async fn ensure(&self) -> Result<()> {
        if self.auto_create_table {
            let query = self.layout.create_table_sql();
            info!("Ensuring table: {}", query);
            sqlx::query(&query)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("Failed to create table", e))?;
            return Ok(());
        }

        if !self.table_exists().await? {
            return Err(Error::Configuration(format!(
                "Table {} does not exist and auto_create_table is disabled",
                self.layout.qualified()
            )));
        }
        Ok(())
    }

    async fn select_by_key(&self, key: &str) -> Result<Option<DestinationRecord>> {
        let query = self.layout.select_sql();
        let row: Option<(i64, Value)> = sqlx::query_as(&query)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_error("Failed to select account", e))?;

        row.map(|(id, row)| row_to_record(id, row, &self.layout.key_column))
            .transpose()
    }

    async fn insert(&self, key: &str, columns: &Fields) -> Result<String> {
        let query = self.layout.insert_sql(columns);
        debug!("Executing insert query: {}", query);

        let mut builder = sqlx::query(&query).bind(key);
        for value in columns.values() {
            builder = bind_value(builder, value);
        }

        let row = builder
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Failed to insert account", e))?;
        let id: i64 = row
            .try_get("id")
            .map_err(|e| db_error("Failed to read inserted id", e))?;
        Ok(id.to_string())
    }

    async fn update(&self, key: &str, columns: &Fields) -> Result<()> {
        if columns.is_empty() {
            return Ok(());
        }
        let query = self.layout.update_sql(columns);
        debug!("Executing update query: {}", query);

        let mut builder = sqlx::query(&query).bind(key);
        for value in columns.values() {
            builder = bind_value(builder, value);
        }

        let result = builder
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update account", e))?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("no row with key '{}'", key)));
        }
        Ok(())
    }

    async fn delete(&self, ids: &[String]) -> Result<u64> {
        let ids: Vec<i64> = ids.iter().filter_map(|id| id.parse().ok()).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(&self.layout.delete_sql())
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete accounts", e))?;
        Ok(result.rows_affected())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
