mod erp_adapter;
mod factory;

pub use erp_adapter::{ErpAdapter, ErpConfig, CUSTOMER_NUMBER};
pub use factory::ErpAdapterFactory;
