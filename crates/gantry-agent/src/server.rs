//! Port to the orchestration server.
//!
//! The HTTP plumbing is supplied by the hosting environment; this trait is
//! the contract the agent runtime codes against.

use async_trait::async_trait;
use gantry_core::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message types delivered to agents.
pub mod message_types {
    pub const PIPELINE_AGENT_JOB_REQUEST: &str = "PipelineAgentJobRequest";
    pub const JOB_CANCELLATION: &str = "JobCancellation";
    pub const AGENT_REFRESH: &str = "AgentRefresh";
}

/// An active agent session with the orchestration server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSession {
    pub session_id: Uuid,
    pub agent_name: String,
    pub pool_id: i32,
}

/// A message pulled from the agent's message queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessage {
    pub message_id: i64,
    pub message_type: String,
    /// JSON payload; a `PipelineAgentJobRequest` body deserializes into
    /// [`gantry_core::messages::AgentJobRequestMessage`].
    pub body: String,
}

/// Connection to the orchestration server, as seen by the agent runtime.
#[async_trait]
pub trait OrchestrationServer: Send + Sync {
    /// Establishes a session for the named agent within a pool.
    async fn create_session(&self, pool_id: i32, agent_name: &str) -> Result<AgentSession>;

    /// Long-polls the next message for the session. `None` on poll timeout.
    async fn get_message(
        &self,
        session: &AgentSession,
        last_message_id: Option<i64>,
    ) -> Result<Option<AgentMessage>>;

    /// Acknowledges a delivered message so it is not redelivered.
    async fn delete_message(&self, session: &AgentSession, message_id: i64) -> Result<()>;

    /// Tears the session down.
    async fn delete_session(&self, session: &AgentSession) -> Result<()>;
}
