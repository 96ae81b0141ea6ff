//! Configuration types for the chat application.
//!
//! Settings come from three layers: built-in defaults, an optional YAML file,
//! and command-line arguments parsed via `arrrg`.  Later layers win.  The two
//! secrets (API key and assistant id) may also come from the environment,
//! which takes precedence over the file; they are never read from the command
//! line.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::classifier::ContextualClassifier;
use crate::error::{Error, Result};
use crate::orchestrator::{DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, PollConfig};
use crate::session::ClarificationTemplate;

/// Environment variable holding the API credential.
pub const API_KEY_ENV: &str = "THREADCHAT_API_KEY";

/// Environment variable holding the assistant id.
pub const ASSISTANT_ID_ENV: &str = "THREADCHAT_ASSISTANT_ID";

/// Reply recorded when an exchange fails.
pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "Lo siento, hubo un error al procesar la respuesta. Por favor, intenta nuevamente.";

const DEFAULT_TITLE: &str = "threadchat";

/// Command-line arguments for the threadchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Path to a YAML configuration file.
    #[arrrg(optional, "YAML configuration and secrets file", "PATH")]
    pub config: Option<String>,

    /// Base URL of the assistant API.
    #[arrrg(optional, "Assistant API base URL", "URL")]
    pub base_url: Option<String>,

    /// Milliseconds between job status reads.
    #[arrrg(optional, "Delay between status reads in ms (default: 1000)", "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Maximum number of job status reads.
    #[arrrg(optional, "Status reads before giving up (default: 60)", "N")]
    pub max_attempts: Option<u32>,

    /// Auto-save the transcript to this file after every exchange.
    #[arrrg(optional, "Auto-save transcript to this file", "PATH")]
    pub transcript: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Contents of the optional YAML configuration file.
///
/// ```yaml
/// api_key: sk-...
/// assistant_id: asst_...
/// max_attempts: 30
/// phrases:
///   - no entendí
///   - explica
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub base_url: Option<String>,
    pub poll_interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub phrases: Option<ContextualClassifier>,
    pub clarification_template: Option<String>,
    pub fallback_message: Option<String>,
    pub title: Option<String>,
    pub transcript_path: Option<PathBuf>,
    pub use_color: Option<bool>,
}

impl ConfigFile {
    /// Reads and parses a YAML configuration file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|err| Error::io("failed to read configuration file", err))?;
        Self::parse(&text)
    }

    /// Parses YAML configuration text.  An empty document yields defaults.
    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Credentials required before any exchange can run.
#[derive(Clone, PartialEq, Eq)]
pub struct Secrets {
    pub api_key: String,
    pub assistant_id: String,
}

impl Secrets {
    /// Resolves secrets from `env` first, then the file.
    ///
    /// Blank values count as absent.  A missing value is
    /// [`Error::ConfigurationMissing`].
    pub fn resolve<F>(file: &ConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |var: &str, from_file: &Option<String>, setting: &str| {
            env(var)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| from_file.clone().filter(|v| !v.trim().is_empty()))
                .ok_or_else(|| {
                    Error::configuration_missing(
                        setting,
                        format!("set {var} or `{setting}` in the configuration file"),
                    )
                })
        };
        Ok(Self {
            api_key: pick(API_KEY_ENV, &file.api_key, "api_key")?,
            assistant_id: pick(ASSISTANT_ID_ENV, &file.assistant_id, "assistant_id")?,
        })
    }

    /// Resolves secrets from the process environment and the file.
    pub fn from_env(file: &ConfigFile) -> Result<Self> {
        Self::resolve(file, |var| std::env::var(var).ok())
    }
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("api_key", &"<redacted>")
            .field("assistant_id", &self.assistant_id)
            .finish()
    }
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after merging the
/// file and the command line over the defaults.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Assistant API base URL; `None` uses the client default.
    pub base_url: Option<String>,

    /// How jobs are polled.
    pub poll: PollConfig,

    /// Detects clarification follow-ups.
    pub classifier: ContextualClassifier,

    /// Prompt sent for clarification follow-ups.
    pub clarification_template: ClarificationTemplate,

    /// Reply recorded when an exchange fails.
    pub fallback_message: String,

    /// Banner shown when the chat starts.
    pub title: String,

    /// Path to persist the transcript after each exchange.
    pub transcript_path: Option<PathBuf>,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Poll: every 1s, at most 60 reads
    /// - Phrases: the built-in Spanish clarification list
    /// - Color: enabled
    /// - Transcript auto-save: disabled
    pub fn new() -> Self {
        Self {
            base_url: None,
            poll: PollConfig::default(),
            classifier: ContextualClassifier::default(),
            clarification_template: ClarificationTemplate::default(),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            title: DEFAULT_TITLE.to_string(),
            transcript_path: None,
            use_color: true,
        }
    }

    /// Merges a configuration file and command-line arguments over the defaults.
    pub fn resolve(file: &ConfigFile, args: &ChatArgs) -> Result<Self> {
        let mut config = Self::new();

        if let Some(base_url) = args.base_url.clone().or_else(|| file.base_url.clone()) {
            config.base_url = Some(base_url);
        }

        let interval_ms = args.poll_interval_ms.or(file.poll_interval_ms);
        let max_attempts = args
            .max_attempts
            .or(file.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS);
        if max_attempts == 0 {
            return Err(Error::validation(
                "max_attempts must be at least 1",
                Some("max_attempts".to_string()),
            ));
        }
        config.poll = PollConfig::new(
            interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_POLL_INTERVAL),
            max_attempts,
        );

        if let Some(classifier) = &file.phrases {
            config.classifier = classifier.clone();
        }
        if let Some(template) = &file.clarification_template {
            config.clarification_template = ClarificationTemplate::new(template.clone())?;
        }
        if let Some(message) = &file.fallback_message {
            config.fallback_message = message.clone();
        }
        if let Some(title) = &file.title {
            config.title = title.clone();
        }
        config.transcript_path = args
            .transcript
            .as_ref()
            .map(PathBuf::from)
            .or_else(|| file.transcript_path.clone());
        config.use_color = !args.no_color && file.use_color.unwrap_or(true);

        Ok(config)
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Sets the poll settings.
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Sets the clarification classifier.
    pub fn with_classifier(mut self, classifier: ContextualClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Sets the clarification template.
    pub fn with_clarification_template(mut self, template: ClarificationTemplate) -> Self {
        self.clarification_template = template;
        self
    }

    /// Sets the fallback reply.
    pub fn with_fallback_message(mut self, message: impl Into<String>) -> Self {
        self.fallback_message = message.into();
        self
    }

    /// Sets the banner title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the transcript auto-save path.
    pub fn with_transcript_path(mut self, path: Option<PathBuf>) -> Self {
        self.transcript_path = path;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}
