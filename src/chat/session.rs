//! Core chat session management.
//!
//! [`ChatSession`] is the caller that owns a [`ConversationSession`] and runs
//! one exchange at a time through the [`Orchestrator`].  Because `submit`
//! takes `&mut self`, a second message cannot be submitted while a job is in
//! flight.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::assistant::{Assistant, ContextId};
use crate::chat::config::{ChatConfig, Secrets};
use crate::client::HttpAssistant;
use crate::error::{Error, Result};
use crate::observability::{CHAT_CLARIFICATIONS, CHAT_FALLBACKS, CHAT_TOPICS};
use crate::orchestrator::Orchestrator;
use crate::session::ConversationSession;
use crate::transcript::{Entry, Speaker, Transcript};

/// The result of one submitted message.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// The assistant line recorded for this message: the answer, or the
    /// fallback reply when the exchange failed.
    pub reply: String,
    /// Whether the message was handled as a clarification.
    pub contextual: bool,
    /// The failure behind a fallback reply, if any.
    pub failure: Option<Error>,
    /// Set when the transcript could not be auto-saved.
    pub autosave_error: Option<Error>,
}

impl Exchange {
    /// Returns true if the assistant answered.
    pub fn is_answered(&self) -> bool {
        self.failure.is_none()
    }
}

/// Aggregated stats for a chat session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Lines in the transcript.
    pub transcript_len: usize,
    /// Top-level questions asked since the last reset.
    pub topics: usize,
    /// Follow-ups answered within an existing context.
    pub clarifications: u64,
    /// Messages submitted since the last reset.
    pub exchanges: u64,
    /// Exchanges that ended with the fallback reply.
    pub failures: u64,
    /// The current context, if any.
    pub context_id: Option<ContextId>,
    /// The auto-save transcript path, if set.
    pub transcript_path: Option<PathBuf>,
}

/// A chat session that manages conversation state and assistant exchanges.
pub struct ChatSession<A> {
    orchestrator: Orchestrator<A>,
    conversation: ConversationSession,
    config: ChatConfig,
    exchanges: u64,
    failures: u64,
    clarifications: u64,
}

impl ChatSession<HttpAssistant> {
    /// Creates a session backed by the HTTP assistant.
    pub fn connect(secrets: &Secrets, config: ChatConfig) -> Result<Self> {
        let assistant = HttpAssistant::with_options(
            secrets.api_key.clone(),
            secrets.assistant_id.clone(),
            config.base_url.as_deref(),
            None,
        )?;
        Ok(Self::with_assistant(assistant, config))
    }
}

impl<A: Assistant> ChatSession<A> {
    /// Creates a new chat session over any assistant.
    pub fn with_assistant(assistant: A, config: ChatConfig) -> Self {
        Self {
            orchestrator: Orchestrator::new(assistant, config.poll),
            conversation: ConversationSession::new(),
            config,
            exchanges: 0,
            failures: 0,
            clarifications: 0,
        }
    }

    /// Sends a user message and records the answer.
    ///
    /// This method:
    /// 1. Records the user message in the transcript
    /// 2. Picks a context: the current one for clarifications, a new one otherwise
    /// 3. Runs the request/poll cycle
    /// 4. Records the cleaned answer, or the fallback reply on failure
    ///
    /// Exchange failures never surface as `Err`; they are reported in
    /// [`Exchange::failure`] and the session remains usable.
    ///
    /// # Errors
    ///
    /// Returns a validation error, without recording anything, if `input` is
    /// blank.
    pub async fn submit(&mut self, input: &str) -> Result<Exchange> {
        if input.trim().is_empty() {
            return Err(Error::validation(
                "message cannot be empty",
                Some("input".to_string()),
            ));
        }

        self.exchanges += 1;
        self.conversation.record(Speaker::User, input);

        let result = self.exchange(input).await;
        let (reply, contextual, failure) = match result {
            Ok((answer, contextual)) => (answer, contextual, None),
            Err((err, contextual)) => {
                warn!(error = %err, kind = err.kind(), "exchange failed");
                CHAT_FALLBACKS.click();
                self.failures += 1;
                (self.config.fallback_message.clone(), contextual, Some(err))
            }
        };
        self.conversation.record(Speaker::Assistant, reply.clone());

        let autosave_error = self.auto_save_transcript().err();
        if let Some(err) = &autosave_error {
            warn!(error = %err, "transcript auto-save failed");
        }

        Ok(Exchange {
            reply,
            contextual,
            failure,
            autosave_error,
        })
    }

    async fn exchange(&mut self, input: &str) -> std::result::Result<(String, bool), (Error, bool)> {
        let outbound = self
            .conversation
            .prepare(
                self.orchestrator.assistant(),
                &self.config.classifier,
                &self.config.clarification_template,
                input,
            )
            .await
            .map_err(|err| {
                (
                    Error::submission_failed("could not allocate a context", Some(Box::new(err))),
                    false,
                )
            })?;

        if outbound.contextual {
            CHAT_CLARIFICATIONS.click();
            self.clarifications += 1;
        } else {
            CHAT_TOPICS.click();
        }
        info!(
            context = %outbound.context_id,
            contextual = outbound.contextual,
            "submitting message"
        );

        self.orchestrator
            .ask(&outbound.context_id, &outbound.prompt)
            .await
            .map(|answer| (answer, outbound.contextual))
            .map_err(|err| (err, outbound.contextual))
    }

    /// Discards the conversation: transcript, questions, and context.
    pub fn reset(&mut self) {
        self.conversation.reset();
        self.exchanges = 0;
        self.failures = 0;
        self.clarifications = 0;
    }

    /// The transcript lines, oldest first.
    pub fn history(&self) -> &[Entry] {
        self.conversation.transcript().all()
    }

    /// The underlying conversation state.
    pub fn conversation(&self) -> &ConversationSession {
        &self.conversation
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    /// The assistant exchanges are sent to.
    pub fn assistant(&self) -> &A {
        self.orchestrator.assistant()
    }

    /// Sets the auto-save transcript path.
    pub fn set_transcript_path(&mut self, path: Option<PathBuf>) {
        self.config.transcript_path = path;
    }

    /// Returns the configured transcript path, if any.
    pub fn transcript_path(&self) -> Option<&Path> {
        self.config.transcript_path.as_deref()
    }

    /// Saves the transcript to the specified path.
    pub fn save_transcript_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.conversation.transcript().save_to(path)
    }

    /// Loads a transcript from disk into a fresh conversation.
    ///
    /// Contexts are not persisted, so the loaded lines are display history
    /// only; the next message starts a new topic.
    pub fn load_transcript_from<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let transcript = Transcript::load_from(path)?;
        self.reset();
        self.conversation.restore(transcript);
        Ok(())
    }

    /// Returns the current session statistics snapshot.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            transcript_len: self.conversation.transcript().len(),
            topics: self.conversation.prior_questions().len(),
            clarifications: self.clarifications,
            exchanges: self.exchanges,
            failures: self.failures,
            context_id: self.conversation.current_context().cloned(),
            transcript_path: self.config.transcript_path.clone(),
        }
    }

    fn auto_save_transcript(&self) -> Result<()> {
        if let Some(path) = &self.config.transcript_path {
            self.save_transcript_to(path)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::JobStatus;
    use crate::orchestrator::PollConfig;
    use crate::testing::ScriptedAssistant;
    use std::time::Duration;

    fn session() -> ChatSession<ScriptedAssistant> {
        let config = ChatConfig::new()
            .with_poll(PollConfig::new(Duration::from_secs(1), 5))
            .with_fallback_message("fallback");
        ChatSession::with_assistant(ScriptedAssistant::new(), config)
    }

    #[tokio::test]
    async fn answered_exchange_records_both_lines() {
        let mut chat = session();
        chat.assistant().push_reply("Cuesta S/ 25.00【1:0†tupa.pdf】");

        let exchange = chat.submit("¿Cuánto cuesta?").await.unwrap();

        assert!(exchange.is_answered());
        assert_eq!(exchange.reply, "Cuesta S/ 25.00");
        let history = chat.history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].speaker, Speaker::User);
        assert_eq!(history[0].text, "¿Cuánto cuesta?");
        assert_eq!(history[1].speaker, Speaker::Assistant);
        assert_eq!(history[1].text, "Cuesta S/ 25.00");
    }

    #[tokio::test(start_paused = true)]
    async fn failure_records_fallback_and_session_stays_usable() {
        let mut chat = session();
        chat.assistant().push_statuses([JobStatus::Running; 5]);

        let exchange = chat.submit("¿Cuánto cuesta?").await.unwrap();
        assert!(!exchange.is_answered());
        assert!(exchange.failure.as_ref().unwrap().is_timeout());
        assert_eq!(exchange.reply, "fallback");
        assert_eq!(chat.history()[1].text, "fallback");

        chat.assistant().push_reply("S/ 25.00");
        let exchange = chat.submit("no entendí").await.unwrap();
        assert!(exchange.is_answered());
        assert!(exchange.contextual);
        assert_eq!(chat.history().len(), 4);

        let stats = chat.stats();
        assert_eq!(stats.exchanges, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.clarifications, 1);
        assert_eq!(stats.topics, 1);
    }

    #[tokio::test]
    async fn context_allocation_failure_is_a_submission_failure() {
        let mut chat = session();
        chat.assistant()
            .fail_create_context(Error::authentication("bad key"));

        let exchange = chat.submit("hola").await.unwrap();

        assert!(exchange.failure.as_ref().unwrap().is_submission_failed());
        assert_eq!(chat.history().len(), 2);
        assert!(chat.conversation().current_context().is_none());
    }

    #[tokio::test]
    async fn follow_up_text_reaches_the_template_verbatim() {
        let mut chat = session();
        chat.assistant().push_reply("S/ 25.00").push_reply("Es un pago único.");
        chat.submit("¿Cuánto cuesta?").await.unwrap();

        let exchange = chat.submit("  no entendí  ").await.unwrap();

        assert!(exchange.contextual);
        let posted = chat.assistant().posted();
        assert_eq!(
            posted[1].2,
            "Responde con más claridad sobre esto: ¿Cuánto cuesta?\n\nConsulta de seguimiento:   no entendí  "
        );
        assert_eq!(chat.history()[2].text, "  no entendí  ");
    }

    #[tokio::test]
    async fn blank_input_is_rejected_without_recording() {
        let mut chat = session();
        let err = chat.submit("   ").await.unwrap_err();
        assert!(err.is_validation());
        assert!(chat.history().is_empty());
        assert_eq!(chat.assistant().calls().create_context, 0);
    }

    #[tokio::test]
    async fn reset_returns_to_initial_state() {
        let mut chat = session();
        chat.assistant().push_reply("respuesta");
        chat.submit("pregunta").await.unwrap();

        chat.reset();

        let stats = chat.stats();
        assert_eq!(stats.transcript_len, 0);
        assert_eq!(stats.topics, 0);
        assert_eq!(stats.exchanges, 0);
        assert!(stats.context_id.is_none());
    }

    #[tokio::test]
    async fn auto_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auto.json");
        let mut chat = session();
        chat.set_transcript_path(Some(path.clone()));
        chat.assistant().push_reply("respuesta");

        let exchange = chat.submit("pregunta").await.unwrap();
        assert!(exchange.autosave_error.is_none());

        let mut other = session();
        other.load_transcript_from(&path).unwrap();
        assert_eq!(other.history().len(), 2);
        assert_eq!(other.history()[1].text, "respuesta");
        assert!(other.conversation().current_context().is_none());
    }

    #[tokio::test]
    async fn auto_save_failure_is_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut chat = session();
        chat.set_transcript_path(Some(dir.path().join("missing").join("auto.json")));
        chat.assistant().push_reply("respuesta");

        let exchange = chat.submit("pregunta").await.unwrap();

        assert!(exchange.is_answered());
        assert!(exchange.autosave_error.is_some());
        assert_eq!(chat.history().len(), 2);
    }
}
