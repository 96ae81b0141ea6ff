// Public modules
pub mod assistant;
pub mod chat;
pub mod classifier;
pub mod client;
pub mod error;
pub mod observability;
pub mod orchestrator;
pub mod sanitize;
pub mod session;
pub mod testing;
pub mod transcript;

// Re-exports
pub use assistant::{Assistant, AssistantMessage, ContextId, JobId, JobStatus, Role};
pub use classifier::ContextualClassifier;
pub use client::HttpAssistant;
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use orchestrator::{Orchestrator, PendingJob, PollConfig};
pub use sanitize::sanitize;
pub use session::{ClarificationTemplate, ConversationSession, Outbound};
pub use transcript::{Entry, Speaker, Transcript};
