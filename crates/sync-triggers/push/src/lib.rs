mod factory;
mod payload;
mod push_trigger;

pub use factory::PushTriggerFactory;
pub use payload::{parse_notifications, sample_notification, SAMPLE_ACCOUNT_ID};
pub use push_trigger::{PushConfig, PushTrigger};
