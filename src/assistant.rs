//! The hosted assistant collaborator.
//!
//! The core never speaks a wire protocol directly.  It consumes the
//! [`Assistant`] trait, which models a service that groups messages into
//! server-side contexts and produces answers through asynchronous jobs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Opaque identifier of a server-side conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(String);

impl ContextId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a processing job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wraps a raw identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Author of a message stored in a context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A message written by the person chatting.
    User,
    /// A message produced by the hosted assistant.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// Error returned when parsing an invalid role string.
#[derive(Debug)]
pub struct RoleParseError {
    /// The invalid string value that could not be parsed.
    pub invalid_value: String,
}

impl fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unknown role: {}", self.invalid_value)
    }
}

impl std::error::Error for RoleParseError {}

impl FromStr for Role {
    type Err = RoleParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(RoleParseError {
                invalid_value: s.to_string(),
            }),
        }
    }
}

/// Observable state of a processing job.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// The job has not reached a terminal state.
    Running,
    /// The job finished and its answer is in the context.
    Completed,
    /// The job ended without producing an answer.
    Failed,
}

impl JobStatus {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A message as listed by the assistant service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistantMessage {
    /// Who wrote the message.
    pub role: Role,
    /// The message text, raw as the service returned it.
    pub content: String,
}

impl AssistantMessage {
    /// Creates a new message.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A hosted assistant that answers messages through asynchronous jobs.
///
/// Implementations are remote services with their own concurrency; callers
/// must not issue overlapping jobs against the same context.
#[async_trait::async_trait]
pub trait Assistant: Send + Sync {
    /// Allocates a fresh, empty context.
    async fn create_context(&self) -> Result<ContextId>;

    /// Appends a message to the context.
    async fn post_message(&self, context: &ContextId, role: Role, content: &str) -> Result<()>;

    /// Starts a job that answers the messages currently in the context.
    async fn start_job(&self, context: &ContextId) -> Result<JobId>;

    /// Reads the current status of a job.
    async fn job_status(&self, context: &ContextId, job: &JobId) -> Result<JobStatus>;

    /// Lists the messages of a context, newest first.
    async fn list_messages(&self, context: &ContextId) -> Result<Vec<AssistantMessage>>;
}

#[async_trait::async_trait]
impl<A: Assistant + ?Sized> Assistant for std::sync::Arc<A> {
    async fn create_context(&self) -> Result<ContextId> {
        (**self).create_context().await
    }

    async fn post_message(&self, context: &ContextId, role: Role, content: &str) -> Result<()> {
        (**self).post_message(context, role, content).await
    }

    async fn start_job(&self, context: &ContextId) -> Result<JobId> {
        (**self).start_job(context).await
    }

    async fn job_status(&self, context: &ContextId, job: &JobId) -> Result<JobStatus> {
        (**self).job_status(context, job).await
    }

    async fn list_messages(&self, context: &ContextId) -> Result<Vec<AssistantMessage>> {
        (**self).list_messages(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("system".parse::<Role>().is_err());
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }

    #[test]
    fn terminal_statuses() {
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = ContextId::new("thread_abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"thread_abc\"");
        assert_eq!(id.to_string(), "thread_abc");
        assert_eq!(JobId::new("run_1").as_str(), "run_1");
    }
}
