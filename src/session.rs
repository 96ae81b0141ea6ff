//! Conversation session state.
//!
//! A [`ConversationSession`] owns the current context id, the history of
//! top-level questions, and the transcript.  It decides, per message, whether
//! to reuse the current context for a clarification or to start a new topic.

use tracing::{debug, info};

use crate::assistant::{Assistant, ContextId};
use crate::classifier::ContextualClassifier;
use crate::error::{Error, Result};
use crate::transcript::{Speaker, Transcript};

const QUESTION_PLACEHOLDER: &str = "{question}";
const FOLLOW_UP_PLACEHOLDER: &str = "{follow_up}";

/// Template used when the default is not overridden.
pub const DEFAULT_CLARIFICATION_TEMPLATE: &str =
    "Responde con más claridad sobre esto: {question}\n\nConsulta de seguimiento: {follow_up}";

/// Prompt template for clarification requests.
///
/// The template must contain both `{question}` and `{follow_up}`; each is
/// replaced verbatim and substituted text is never re-scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClarificationTemplate {
    template: String,
}

impl ClarificationTemplate {
    /// Validates and wraps a template.
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for placeholder in [QUESTION_PLACEHOLDER, FOLLOW_UP_PLACEHOLDER] {
            if !template.contains(placeholder) {
                return Err(Error::validation(
                    format!("clarification template must contain {placeholder}"),
                    Some("clarification_template".to_string()),
                ));
            }
        }
        Ok(Self { template })
    }

    /// Returns the raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Fills in the previous question and the follow-up text.
    pub fn render(&self, question: &str, follow_up: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + question.len() + follow_up.len());
        let mut rest = self.template.as_str();
        loop {
            let next_question = rest.find(QUESTION_PLACEHOLDER);
            let next_follow_up = rest.find(FOLLOW_UP_PLACEHOLDER);
            let (at, placeholder, value) = match (next_question, next_follow_up) {
                (Some(q), Some(f)) if q < f => (q, QUESTION_PLACEHOLDER, question),
                (Some(_), Some(f)) => (f, FOLLOW_UP_PLACEHOLDER, follow_up),
                (Some(q), None) => (q, QUESTION_PLACEHOLDER, question),
                (None, Some(f)) => (f, FOLLOW_UP_PLACEHOLDER, follow_up),
                (None, None) => break,
            };
            out.push_str(&rest[..at]);
            out.push_str(value);
            rest = &rest[at + placeholder.len()..];
        }
        out.push_str(rest);
        out
    }
}

impl Default for ClarificationTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_CLARIFICATION_TEMPLATE.to_string(),
        }
    }
}

/// What to send for one user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Context the prompt goes to.
    pub context_id: ContextId,
    /// Text posted to the assistant.
    pub prompt: String,
    /// True when the message was handled as a clarification of the last question.
    pub contextual: bool,
}

/// The state of one user's conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationSession {
    context_id: Option<ContextId>,
    prior_questions: Vec<String>,
    transcript: Transcript,
}

impl ConversationSession {
    /// Creates an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh context, makes it current, and remembers `question`.
    ///
    /// On failure the session is unchanged.
    pub async fn start_new_topic<A>(&mut self, assistant: &A, question: &str) -> Result<ContextId>
    where
        A: Assistant + ?Sized,
    {
        let context_id = assistant.create_context().await?;
        info!(context = %context_id, "started new topic");
        self.context_id = Some(context_id.clone());
        self.prior_questions.push(question.to_string());
        Ok(context_id)
    }

    /// The context new messages are sent to, if any.
    pub fn current_context(&self) -> Option<&ContextId> {
        self.context_id.as_ref()
    }

    /// The most recent top-level question.
    pub fn last_question(&self) -> Option<&str> {
        self.prior_questions.last().map(String::as_str)
    }

    /// Every top-level question, oldest first.
    pub fn prior_questions(&self) -> &[String] {
        &self.prior_questions
    }

    /// Appends a line to the transcript.
    pub fn record(&mut self, speaker: Speaker, text: impl Into<String>) {
        self.transcript.append(speaker, text);
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Chooses the context and prompt for `input`.
    ///
    /// A clarification reuses the current context and wraps the last
    /// top-level question; anything else starts a new topic and is sent as-is.
    /// A contextual message with no history or no context falls back to a new
    /// topic.
    pub async fn prepare<A>(
        &mut self,
        assistant: &A,
        classifier: &ContextualClassifier,
        template: &ClarificationTemplate,
        input: &str,
    ) -> Result<Outbound>
    where
        A: Assistant + ?Sized,
    {
        if classifier.is_contextual(input)
            && let (Some(question), Some(context_id)) = (self.last_question(), &self.context_id)
        {
            debug!(context = %context_id, "treating message as a clarification");
            return Ok(Outbound {
                context_id: context_id.clone(),
                prompt: template.render(question, input),
                contextual: true,
            });
        }
        let context_id = self.start_new_topic(assistant, input).await?;
        Ok(Outbound {
            context_id,
            prompt: input.to_string(),
            contextual: false,
        })
    }

    /// Replaces the transcript with one loaded from disk, discarding the rest
    /// of the session state.
    pub fn restore(&mut self, transcript: Transcript) {
        self.reset();
        self.transcript = transcript;
    }

    /// Discards the context, the question history, and the transcript.
    pub fn reset(&mut self) {
        self.context_id = None;
        self.prior_questions.clear();
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedAssistant;

    #[test]
    fn template_requires_both_placeholders() {
        assert!(ClarificationTemplate::new("Explain: {question}").is_err());
        assert!(ClarificationTemplate::new("{follow_up}").is_err());
        assert!(ClarificationTemplate::new("{question} / {follow_up}").is_ok());
    }

    #[test]
    fn template_substitutes_once() {
        let template = ClarificationTemplate::new("Q={question}; F={follow_up}").unwrap();
        assert_eq!(
            template.render("what is {follow_up}?", "no entendí"),
            "Q=what is {follow_up}?; F=no entendí"
        );
        let template = ClarificationTemplate::new("{follow_up} <- {question}").unwrap();
        assert_eq!(template.render("a", "b"), "b <- a");
    }

    #[tokio::test]
    async fn new_topics_get_distinct_contexts() {
        let assistant = ScriptedAssistant::new();
        let classifier = ContextualClassifier::default();
        let template = ClarificationTemplate::default();
        let mut session = ConversationSession::new();

        let first = session
            .prepare(&assistant, &classifier, &template, "¿Qué requisitos tiene la licencia?")
            .await
            .unwrap();
        let second = session
            .prepare(&assistant, &classifier, &template, "¿Cuál es el plazo del trámite?")
            .await
            .unwrap();

        assert_ne!(first.context_id, second.context_id);
        assert!(!first.contextual && !second.contextual);
        assert_eq!(second.prompt, "¿Cuál es el plazo del trámite?");
        assert_eq!(session.prior_questions().len(), 2);
        assert_eq!(session.current_context(), Some(&second.context_id));
    }

    #[tokio::test]
    async fn clarification_reuses_context_and_embeds_last_question() {
        let assistant = ScriptedAssistant::new();
        let classifier = ContextualClassifier::default();
        let template = ClarificationTemplate::default();
        let mut session = ConversationSession::new();

        let first = session
            .prepare(&assistant, &classifier, &template, "¿Cuánto cuesta el permiso?")
            .await
            .unwrap();
        let follow_up = session
            .prepare(&assistant, &classifier, &template, "No entendí, explícame mejor")
            .await
            .unwrap();

        assert!(follow_up.contextual);
        assert_eq!(follow_up.context_id, first.context_id);
        assert!(follow_up.prompt.contains("¿Cuánto cuesta el permiso?"));
        assert!(follow_up.prompt.contains("No entendí, explícame mejor"));
        assert_eq!(session.prior_questions(), &["¿Cuánto cuesta el permiso?".to_string()]);
        assert_eq!(assistant.calls().create_context, 1);
    }

    #[tokio::test]
    async fn contextual_message_without_history_starts_a_topic() {
        let assistant = ScriptedAssistant::new();
        let classifier = ContextualClassifier::default();
        let template = ClarificationTemplate::default();
        let mut session = ConversationSession::new();

        let outbound = session
            .prepare(&assistant, &classifier, &template, "no entendí")
            .await
            .unwrap();

        assert!(!outbound.contextual);
        assert_eq!(outbound.prompt, "no entendí");
        assert_eq!(session.last_question(), Some("no entendí"));
        assert_eq!(assistant.calls().create_context, 1);
    }

    #[tokio::test]
    async fn failed_allocation_leaves_session_unchanged() {
        let assistant = ScriptedAssistant::new();
        assistant.fail_create_context(Error::connection("refused", None));
        let mut session = ConversationSession::new();

        let err = session.start_new_topic(&assistant, "hola").await.unwrap_err();
        assert!(err.is_connection());
        assert!(session.current_context().is_none());
        assert!(session.last_question().is_none());
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let assistant = ScriptedAssistant::new();
        let mut session = ConversationSession::new();
        session.start_new_topic(&assistant, "hola").await.unwrap();
        session.record(Speaker::User, "hola");
        session.record(Speaker::Assistant, "¡Hola!");

        session.reset();

        assert!(session.current_context().is_none());
        assert!(session.prior_questions().is_empty());
        assert!(session.transcript().is_empty());
    }
}
