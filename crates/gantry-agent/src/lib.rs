//! Gantry agent runtime services.
//!
//! The pieces an agent process needs around job execution: the port to the
//! orchestration server, the batched result-upload queue, and secret
//! masking for everything that leaves the process. The process host itself
//! (message polling loop, process isolation, credential storage) lives with
//! the hosting environment.

pub mod masker;
pub mod queue;
pub mod server;

pub use masker::SecretMasker;
pub use queue::{ConsoleLine, FileUpload, JobServer, JobServerQueue, TimelineRecord};
pub use server::{AgentMessage, AgentSession, OrchestrationServer};
