mod factory;
mod memory_source;
mod poll_trigger;

pub use factory::PollTriggerFactory;
pub use memory_source::{load_seed, MemorySource};
pub use poll_trigger::{PollConfig, PollTrigger};
