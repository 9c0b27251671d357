mod adapter;
mod batch;
pub mod convergence;
mod error;
mod factory;
mod flow;
mod job;
mod memory;
mod notification;
pub mod record;
mod registry;
mod rules;
mod source;
mod trigger;

pub use adapter::{key_from_field, key_from_source_id, project_fields, DestinationAdapter};
pub use batch::{BatchRunner, RunnerSettings};
pub use convergence::{await_absent, find_converged, wait_until, BackoffPolicy};
pub use error::{Error, Result};
pub use factory::{AdapterFactory, TriggerFactory};
pub use flow::{DestinationConfig, FlowConfig, SyncFlow, TriggerConfig};
pub use job::{AdapterSummary, JobHandle, JobId, JobResult, JobState, JobStatus, RecordFailure};
pub use memory::MemoryRecordStore;
pub use notification::{failure_report, EmailNotifier, NoOpNotifier, Notifier, SmtpSettings};
pub use record::{DestinationRecord, Fields, SourceRecord, WriteAction};
pub use registry::Registry;
pub use rules::{CategoryTable, RecordFilter, SyncRules};
pub use source::SourceSystem;
pub use trigger::{Trigger, TriggerEvent, TriggerPolicy, TriggerStatus};
