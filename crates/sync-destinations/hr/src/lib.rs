mod factory;
mod hr_adapter;

pub use factory::HrAdapterFactory;
pub use hr_adapter::{
    category_id, HrAdapter, HrConfig, CATEGORY_REFERENCE, CUSTOMER_CATEGORY_ID, CUSTOMER_NAME, WID,
};
