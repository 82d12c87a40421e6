//! Ferry - Adapters
//!
//! In-memory collaborators for the ferry pipelines: a partitioned message
//! log, an idempotent apply store, a pending-row table and a per-channel
//! topic sender. Each can inject failures through [`SimulatedFailure`].
//!
//! Used by the `ferry simulate` command and by the integration tests.

mod failure;
mod log;
mod store;
mod table;
mod topic;

pub use failure::SimulatedFailure;
pub use log::{Decoder, LogPosition, MemoryLog, MemoryLogSource};
pub use store::MemoryApplyStore;
pub use table::MemoryRowTable;
pub use topic::{MemoryTopicSender, RejectFn, SendCall};
