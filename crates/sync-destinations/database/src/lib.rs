mod config;
mod database_adapter;
mod factory;
mod memory_table;
mod postgres_table;
mod table;

pub use config::{Backend, ColumnSpec, DatabaseConfig, PostgresConfig};
pub use database_adapter::DatabaseAdapter;
pub use factory::DatabaseAdapterFactory;
pub use memory_table::MemoryAccountTable;
pub use postgres_table::PgAccountTable;
pub use table::{quote_identifier, AccountTable};
