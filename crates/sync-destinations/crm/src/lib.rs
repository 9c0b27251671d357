mod crm_adapter;
mod factory;

pub use crm_adapter::{CrmAdapter, CrmConfig};
pub use factory::CrmAdapterFactory;
