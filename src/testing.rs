//! A scripted [`Assistant`] for exercising the chat flow without a network.
//!
//! The double keeps a per-context message log, hands out sequential ids, and
//! answers status reads from a queue.  When a status read returns
//! `Completed`, the next queued reply is appended to that context as an
//! assistant message.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use crate::assistant::{Assistant, AssistantMessage, ContextId, JobId, JobStatus, Role};
use crate::error::{Error, Result};

/// Number of calls made to each collaborator operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub create_context: usize,
    pub post_message: usize,
    pub start_job: usize,
    pub job_status: usize,
    pub list_messages: usize,
}

#[derive(Default)]
struct Script {
    next_context: usize,
    next_job: usize,
    statuses: VecDeque<Result<JobStatus>>,
    default_status: Option<JobStatus>,
    replies: VecDeque<String>,
    logs: HashMap<ContextId, Vec<AssistantMessage>>,
    jobs: HashMap<JobId, ContextId>,
    answered: Vec<JobId>,
    posted: Vec<(ContextId, Role, String)>,
    fail_create: Option<Error>,
    fail_post: Option<Error>,
    fail_start: Option<Error>,
    fail_list: Option<Error>,
    calls: CallCounts,
}

/// In-memory assistant driven by queued statuses and replies.
#[derive(Default)]
pub struct ScriptedAssistant {
    script: Mutex<Script>,
}

impl ScriptedAssistant {
    /// Creates a double whose jobs complete on the first status read.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a status returned by the next unanswered status read.
    pub fn push_status(&self, status: JobStatus) -> &Self {
        self.lock().statuses.push_back(Ok(status));
        self
    }

    /// Queues several statuses in order.
    pub fn push_statuses(&self, statuses: impl IntoIterator<Item = JobStatus>) -> &Self {
        let mut script = self.lock();
        script.statuses.extend(statuses.into_iter().map(Ok));
        drop(script);
        self
    }

    /// Queues an error returned by a status read.
    pub fn push_status_error(&self, err: Error) -> &Self {
        self.lock().statuses.push_back(Err(err));
        self
    }

    /// Status returned once the queue is empty.  Defaults to `Completed`.
    pub fn set_default_status(&self, status: JobStatus) -> &Self {
        self.lock().default_status = Some(status);
        self
    }

    /// Queues an assistant reply for the next completed job.
    pub fn push_reply(&self, reply: impl Into<String>) -> &Self {
        self.lock().replies.push_back(reply.into());
        self
    }

    /// Appends a message to a context log directly.
    pub fn seed_message(&self, context: &ContextId, message: AssistantMessage) -> &Self {
        self.lock()
            .logs
            .entry(context.clone())
            .or_default()
            .push(message);
        self
    }

    pub fn fail_create_context(&self, err: Error) -> &Self {
        self.lock().fail_create = Some(err);
        self
    }

    pub fn fail_post_message(&self, err: Error) -> &Self {
        self.lock().fail_post = Some(err);
        self
    }

    pub fn fail_start_job(&self, err: Error) -> &Self {
        self.lock().fail_start = Some(err);
        self
    }

    pub fn fail_list_messages(&self, err: Error) -> &Self {
        self.lock().fail_list = Some(err);
        self
    }

    /// Every message posted, in order, with its context and role.
    pub fn posted(&self) -> Vec<(ContextId, Role, String)> {
        self.lock().posted.clone()
    }

    /// How many times each operation was called.
    pub fn calls(&self) -> CallCounts {
        self.lock().calls
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl Assistant for ScriptedAssistant {
    async fn create_context(&self) -> Result<ContextId> {
        let mut script = self.lock();
        script.calls.create_context += 1;
        if let Some(err) = script.fail_create.clone() {
            return Err(err);
        }
        script.next_context += 1;
        let id = ContextId::new(format!("ctx-{}", script.next_context));
        script.logs.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn post_message(&self, context: &ContextId, role: Role, content: &str) -> Result<()> {
        let mut script = self.lock();
        script.calls.post_message += 1;
        if let Some(err) = script.fail_post.clone() {
            return Err(err);
        }
        let Some(log) = script.logs.get_mut(context) else {
            return Err(Error::not_found(
                "no such context",
                Some("context".to_string()),
                Some(context.to_string()),
            ));
        };
        log.push(AssistantMessage::new(role, content));
        script
            .posted
            .push((context.clone(), role, content.to_string()));
        Ok(())
    }

    async fn start_job(&self, context: &ContextId) -> Result<JobId> {
        let mut script = self.lock();
        script.calls.start_job += 1;
        if let Some(err) = script.fail_start.clone() {
            return Err(err);
        }
        script.next_job += 1;
        let id = JobId::new(format!("job-{}", script.next_job));
        script.jobs.insert(id.clone(), context.clone());
        Ok(id)
    }

    async fn job_status(&self, _context: &ContextId, job: &JobId) -> Result<JobStatus> {
        let mut script = self.lock();
        script.calls.job_status += 1;
        let status = match script.statuses.pop_front() {
            Some(status) => status?,
            None => script.default_status.unwrap_or(JobStatus::Completed),
        };
        if status == JobStatus::Completed && !script.answered.contains(job) {
            script.answered.push(job.clone());
            let context = script.jobs.get(job).cloned();
            if let (Some(context), Some(reply)) = (context, script.replies.pop_front()) {
                script
                    .logs
                    .entry(context)
                    .or_default()
                    .push(AssistantMessage::new(Role::Assistant, reply));
            }
        }
        Ok(status)
    }

    async fn list_messages(&self, context: &ContextId) -> Result<Vec<AssistantMessage>> {
        let mut script = self.lock();
        script.calls.list_messages += 1;
        if let Some(err) = script.fail_list.clone() {
            return Err(err);
        }
        let mut messages = script.logs.get(context).cloned().unwrap_or_default();
        messages.reverse();
        Ok(messages)
    }
}
