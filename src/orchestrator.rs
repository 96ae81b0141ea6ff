//! The request/poll cycle against the assistant.
//!
//! [`Orchestrator::ask`] turns the service's asynchronous job model into a
//! single awaitable call: post the prompt, start a job, poll its status on a
//! fixed interval for a bounded number of attempts, then read back the newest
//! assistant message.  The attempt bound is the only guard against a backend
//! that never finishes; there is no cancellation once a job is started.

use std::time::{Duration, Instant};

use biometrics::Counter;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::assistant::{Assistant, ContextId, JobId, JobStatus, Role};
use crate::error::{Error, Result};
use crate::observability::{
    ASK_DURATION, ASK_JOB_START_FAILURES, ASK_NO_RESPONSE, ASK_OTHER_FAILURES, ASK_POLL_ATTEMPTS,
    ASK_PROCESSING_FAILURES, ASK_SUBMISSION_FAILURES, ASK_SUCCESSES, ASK_TIMEOUTS, ASKS,
};
use crate::sanitize::sanitize;

/// Default delay between status reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of status reads before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 60;

/// How a job is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between consecutive status reads.
    pub interval: Duration,
    /// Maximum number of status reads.  Zero is treated as one.
    pub max_attempts: u32,
}

impl PollConfig {
    /// Creates a poll configuration.  A `max_attempts` of zero becomes one.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }

    /// The number of status reads actually issued; never zero.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Upper bound on time spent sleeping for one job.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.attempts() - 1)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

/// A job that has been started and not yet observed in a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingJob {
    pub job_id: JobId,
    pub context_id: ContextId,
    pub started_at: OffsetDateTime,
    pub status: JobStatus,
}

impl PendingJob {
    fn new(job_id: JobId, context_id: ContextId) -> Self {
        Self {
            job_id,
            context_id,
            started_at: OffsetDateTime::now_utc(),
            status: JobStatus::Running,
        }
    }
}

/// Drives one prompt through the assistant to a cleaned answer.
pub struct Orchestrator<A> {
    assistant: A,
    poll: PollConfig,
}

impl<A: Assistant> Orchestrator<A> {
    /// Creates an orchestrator over `assistant`.
    pub fn new(assistant: A, poll: PollConfig) -> Self {
        Self { assistant, poll }
    }

    /// The collaborator this orchestrator talks to.
    pub fn assistant(&self) -> &A {
        &self.assistant
    }

    pub fn poll_config(&self) -> PollConfig {
        self.poll
    }

    /// Posts `prompt` to `context_id` and waits for the answer.
    ///
    /// # Errors
    ///
    /// - `SubmissionFailed` if the message cannot be posted.
    /// - `JobStartFailed` if the job cannot be started.
    /// - `ProcessingFailed` if the job fails or its status cannot be read.
    /// - `Timeout` if the job is still running after `max_attempts` reads.
    /// - `NoResponse` if no assistant message can be found afterwards.
    pub async fn ask(&self, context_id: &ContextId, prompt: &str) -> Result<String> {
        ASKS.click();
        let start = Instant::now();
        let result = self.drive(context_id, prompt).await;
        ASK_DURATION.add(start.elapsed().as_secs_f64());
        match &result {
            Ok(_) => ASK_SUCCESSES.click(),
            Err(err) => failure_counter(err).click(),
        }
        result
    }

    async fn drive(&self, context_id: &ContextId, prompt: &str) -> Result<String> {
        self.assistant
            .post_message(context_id, Role::User, prompt)
            .await
            .map_err(|err| {
                Error::submission_failed(
                    format!("could not post message to {context_id}"),
                    Some(Box::new(err)),
                )
            })?;

        let job_id = self.assistant.start_job(context_id).await.map_err(|err| {
            Error::job_start_failed(
                format!("could not start a job for {context_id}"),
                Some(Box::new(err)),
            )
        })?;
        info!(context = %context_id, job = %job_id, "job started");

        let mut job = PendingJob::new(job_id, context_id.clone());
        self.wait(&mut job).await?;
        self.retrieve(context_id).await
    }

    async fn wait(&self, job: &mut PendingJob) -> Result<()> {
        let max_attempts = self.poll.attempts();
        for attempt in 1..=max_attempts {
            ASK_POLL_ATTEMPTS.click();
            job.status = self
                .assistant
                .job_status(&job.context_id, &job.job_id)
                .await
                .map_err(|err| {
                    Error::processing_failed(
                        format!("could not read status of job {}", job.job_id),
                        Some(Box::new(err)),
                    )
                })?;
            match job.status {
                JobStatus::Completed => {
                    debug!(job = %job.job_id, attempt, "job completed");
                    return Ok(());
                }
                JobStatus::Failed => {
                    warn!(job = %job.job_id, attempt, "job failed");
                    return Err(Error::processing_failed(
                        format!("job {} failed", job.job_id),
                        None,
                    ));
                }
                JobStatus::Running => {
                    debug!(job = %job.job_id, attempt, max_attempts, "job still running");
                    if attempt < max_attempts {
                        tokio::time::sleep(self.poll.interval).await;
                    }
                }
            }
        }
        let waited = OffsetDateTime::now_utc() - job.started_at;
        warn!(
            job = %job.job_id,
            max_attempts,
            waited_secs = waited.as_seconds_f64(),
            "gave up waiting for job"
        );
        Err(Error::timeout(
            format!("job {} still running", job.job_id),
            Some(max_attempts),
        ))
    }

    async fn retrieve(&self, context_id: &ContextId) -> Result<String> {
        let messages = self
            .assistant
            .list_messages(context_id)
            .await
            .map_err(|err| Error::no_response(format!("could not list messages: {err}")))?;
        messages
            .into_iter()
            .find(|m| m.role == Role::Assistant)
            .map(|m| sanitize(&m.content))
            .ok_or_else(|| {
                Error::no_response(format!("no assistant message in {context_id}"))
            })
    }
}

/// The counter an `ask` failure is recorded under.
fn failure_counter(err: &Error) -> &'static Counter {
    match err {
        Error::SubmissionFailed { .. } => &ASK_SUBMISSION_FAILURES,
        Error::JobStartFailed { .. } => &ASK_JOB_START_FAILURES,
        Error::ProcessingFailed { .. } => &ASK_PROCESSING_FAILURES,
        Error::Timeout { .. } => &ASK_TIMEOUTS,
        Error::NoResponse { .. } => &ASK_NO_RESPONSE,
        _ => &ASK_OTHER_FAILURES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AssistantMessage;
    use crate::testing::ScriptedAssistant;
    use biometrics::Sensor;

    async fn setup(poll: PollConfig) -> (Orchestrator<ScriptedAssistant>, ContextId) {
        let assistant = ScriptedAssistant::new();
        let context = assistant.create_context().await.unwrap();
        (Orchestrator::new(assistant, poll), context)
    }

    #[tokio::test(start_paused = true)]
    async fn success_path_returns_sanitized_answer() {
        let (orchestrator, context) = setup(PollConfig::default()).await;
        orchestrator
            .assistant()
            .push_statuses([JobStatus::Running, JobStatus::Running, JobStatus::Completed])
            .push_reply("Hola 【1:x†y】mundo");

        let answer = orchestrator.ask(&context, "saluda").await.unwrap();

        assert_eq!(answer, "Hola mundo");
        let calls = orchestrator.assistant().calls();
        assert_eq!(calls.post_message, 1);
        assert_eq!(calls.start_job, 1);
        assert_eq!(calls.job_status, 3);
        assert_eq!(calls.list_messages, 1);
        assert_eq!(
            orchestrator.assistant().posted(),
            vec![(context, Role::User, "saluda".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_between_reads_but_not_after_the_last() {
        let poll = PollConfig::new(Duration::from_secs(1), 5);
        let (orchestrator, context) = setup(poll).await;
        orchestrator
            .assistant()
            .push_statuses([JobStatus::Running, JobStatus::Running, JobStatus::Completed])
            .push_reply("listo");

        let start = tokio::time::Instant::now();
        orchestrator.ask(&context, "hola").await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_stops_at_the_attempt_budget() {
        let poll = PollConfig::new(Duration::from_secs(1), 30);
        let (orchestrator, context) = setup(poll).await;
        orchestrator.assistant().set_default_status(JobStatus::Running);

        let start = tokio::time::Instant::now();
        let err = orchestrator.ask(&context, "hola").await.unwrap_err();

        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(matches!(err, Error::Timeout { attempts: Some(30), .. }));
        let calls = orchestrator.assistant().calls();
        assert_eq!(calls.job_status, 30);
        assert_eq!(calls.list_messages, 0);
        assert_eq!(start.elapsed(), poll.budget());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_job_is_a_processing_failure() {
        let (orchestrator, context) = setup(PollConfig::default()).await;
        orchestrator
            .assistant()
            .push_statuses([JobStatus::Running, JobStatus::Failed]);

        let err = orchestrator.ask(&context, "hola").await.unwrap_err();

        assert!(err.is_processing_failed());
        assert_eq!(orchestrator.assistant().calls().job_status, 2);
        assert_eq!(orchestrator.assistant().calls().list_messages, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_status_is_a_processing_failure() {
        let (orchestrator, context) = setup(PollConfig::default()).await;
        orchestrator
            .assistant()
            .push_status(JobStatus::Running)
            .push_status_error(Error::service_unavailable("overloaded", None));

        let err = orchestrator.ask(&context, "hola").await.unwrap_err();
        assert!(err.is_processing_failed());
    }

    #[tokio::test]
    async fn post_failure_is_a_submission_failure() {
        let (orchestrator, context) = setup(PollConfig::default()).await;
        orchestrator
            .assistant()
            .fail_post_message(Error::connection("reset", None));

        let err = orchestrator.ask(&context, "hola").await.unwrap_err();

        assert!(err.is_submission_failed());
        assert_eq!(orchestrator.assistant().calls().start_job, 0);
    }

    #[tokio::test]
    async fn start_failure_is_a_job_start_failure() {
        let (orchestrator, context) = setup(PollConfig::default()).await;
        orchestrator
            .assistant()
            .fail_start_job(Error::rate_limit("slow down", Some(3)));

        let err = orchestrator.ask(&context, "hola").await.unwrap_err();

        assert!(err.is_job_start_failed());
        assert_eq!(orchestrator.assistant().calls().job_status, 0);
    }

    #[tokio::test]
    async fn completed_without_answer_is_no_response() {
        let (orchestrator, context) = setup(PollConfig::default()).await;

        let err = orchestrator.ask(&context, "hola").await.unwrap_err();

        assert!(err.is_no_response());
    }

    #[tokio::test]
    async fn listing_failure_is_no_response() {
        let (orchestrator, context) = setup(PollConfig::default()).await;
        orchestrator
            .assistant()
            .push_reply("never seen")
            .fail_list_messages(Error::internal_server("boom", None));

        let err = orchestrator.ask(&context, "hola").await.unwrap_err();
        assert!(err.is_no_response());
    }

    #[tokio::test]
    async fn newest_assistant_message_wins() {
        let (orchestrator, context) = setup(PollConfig::default()).await;
        orchestrator
            .assistant()
            .seed_message(
                &context,
                AssistantMessage::new(Role::Assistant, "respuesta anterior"),
            )
            .push_reply("respuesta  nueva【2:0†tupa.pdf】");

        let answer = orchestrator.ask(&context, "otra vez").await.unwrap();
        assert_eq!(answer, "respuesta nueva");
    }

    #[test]
    fn poll_budget() {
        assert_eq!(PollConfig::default().budget(), Duration::from_secs(59));
        assert_eq!(
            PollConfig::new(Duration::from_millis(500), 1).budget(),
            Duration::ZERO
        );
    }

    #[test]
    fn failures_are_counted_by_kind() {
        let label = |err: Error| failure_counter(&err).label();
        assert_eq!(
            label(Error::submission_failed("post", None)),
            "threadchat.ask.submission_failures"
        );
        assert_eq!(
            label(Error::job_start_failed("run", None)),
            "threadchat.ask.job_start_failures"
        );
        assert_eq!(
            label(Error::processing_failed("failed", None)),
            "threadchat.ask.processing_failures"
        );
        assert_eq!(label(Error::timeout("slow", Some(3))), "threadchat.ask.timeouts");
        assert_eq!(label(Error::no_response("empty")), "threadchat.ask.no_response");
        assert_eq!(
            label(Error::connection("reset", None)),
            "threadchat.ask.other_failures"
        );
    }

    #[test]
    fn zero_attempts_becomes_one() {
        let poll = PollConfig::new(Duration::from_secs(1), 0);
        assert_eq!(poll.max_attempts, 1);
        assert_eq!(poll.budget(), Duration::ZERO);

        let literal = PollConfig {
            interval: Duration::from_secs(1),
            max_attempts: 0,
        };
        assert_eq!(literal.attempts(), 1);
        assert_eq!(literal.budget(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_reads_the_status_once() {
        let poll = PollConfig {
            interval: Duration::from_secs(1),
            max_attempts: 0,
        };
        let (orchestrator, context) = setup(poll).await;
        orchestrator.assistant().push_reply("listo");

        let answer = orchestrator.ask(&context, "hola").await.unwrap();

        assert_eq!(answer, "listo");
        assert_eq!(orchestrator.assistant().calls().job_status, 1);

        orchestrator.assistant().set_default_status(JobStatus::Running);
        let err = orchestrator.ask(&context, "otra vez").await.unwrap_err();
        assert!(matches!(err, Error::Timeout { attempts: Some(1), .. }));
        assert_eq!(orchestrator.assistant().calls().job_status, 2);
    }
}
