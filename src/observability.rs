use biometrics::{Collector, Counter, Moments};

pub(crate) static HTTP_REQUESTS: Counter = Counter::new("threadchat.http.requests");
pub(crate) static HTTP_REQUEST_ERRORS: Counter = Counter::new("threadchat.http.request_errors");
pub(crate) static HTTP_REQUEST_DURATION: Moments =
    Moments::new("threadchat.http.request_duration_seconds");

pub(crate) static ASKS: Counter = Counter::new("threadchat.ask.requests");
pub(crate) static ASK_SUCCESSES: Counter = Counter::new("threadchat.ask.successes");
pub(crate) static ASK_SUBMISSION_FAILURES: Counter =
    Counter::new("threadchat.ask.submission_failures");
pub(crate) static ASK_JOB_START_FAILURES: Counter =
    Counter::new("threadchat.ask.job_start_failures");
pub(crate) static ASK_PROCESSING_FAILURES: Counter =
    Counter::new("threadchat.ask.processing_failures");
pub(crate) static ASK_TIMEOUTS: Counter = Counter::new("threadchat.ask.timeouts");
pub(crate) static ASK_NO_RESPONSE: Counter = Counter::new("threadchat.ask.no_response");
pub(crate) static ASK_OTHER_FAILURES: Counter = Counter::new("threadchat.ask.other_failures");
pub(crate) static ASK_POLL_ATTEMPTS: Counter = Counter::new("threadchat.ask.poll_attempts");
pub(crate) static ASK_DURATION: Moments = Moments::new("threadchat.ask.duration_seconds");

pub(crate) static CHAT_TOPICS: Counter = Counter::new("threadchat.chat.topics");
pub(crate) static CHAT_CLARIFICATIONS: Counter = Counter::new("threadchat.chat.clarifications");
pub(crate) static CHAT_FALLBACKS: Counter = Counter::new("threadchat.chat.fallbacks");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&HTTP_REQUESTS);
    collector.register_counter(&HTTP_REQUEST_ERRORS);
    collector.register_moments(&HTTP_REQUEST_DURATION);

    collector.register_counter(&ASKS);
    collector.register_counter(&ASK_SUCCESSES);
    collector.register_counter(&ASK_SUBMISSION_FAILURES);
    collector.register_counter(&ASK_JOB_START_FAILURES);
    collector.register_counter(&ASK_PROCESSING_FAILURES);
    collector.register_counter(&ASK_TIMEOUTS);
    collector.register_counter(&ASK_NO_RESPONSE);
    collector.register_counter(&ASK_OTHER_FAILURES);
    collector.register_counter(&ASK_POLL_ATTEMPTS);
    collector.register_moments(&ASK_DURATION);

    collector.register_counter(&CHAT_TOPICS);
    collector.register_counter(&CHAT_CLARIFICATIONS);
    collector.register_counter(&CHAT_FALLBACKS);
}
