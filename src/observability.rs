use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("agentchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("agentchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("agentchat.client.request_duration_seconds");

pub(crate) static STREAM_PARTS: Counter = Counter::new("agentchat.stream.parts");
pub(crate) static STREAM_FRAGMENTS: Counter = Counter::new("agentchat.stream.fragments");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("agentchat.stream.errors");
pub(crate) static STREAM_QUIESCENT: Counter =
    Counter::new("agentchat.stream.quiescent_completions");
pub(crate) static STREAM_CANCELLED: Counter = Counter::new("agentchat.stream.cancelled");
pub(crate) static STREAM_TTFB: Moments = Moments::new("agentchat.stream.ttfb_seconds");
pub(crate) static STREAM_DURATION: Moments = Moments::new("agentchat.stream.duration_seconds");

pub(crate) static SESSION_COMMITS: Counter = Counter::new("agentchat.session.commits");
pub(crate) static SESSION_STALE_UPDATES: Counter = Counter::new("agentchat.session.stale_updates");
pub(crate) static SESSION_TURNS: Counter = Counter::new("agentchat.session.turns");
pub(crate) static SESSION_TURN_FAILURES: Counter = Counter::new("agentchat.session.turn_failures");
pub(crate) static SESSION_REJECTED: Counter = Counter::new("agentchat.session.rejected_sends");
pub(crate) static SESSION_TURN_DURATION: Moments =
    Moments::new("agentchat.session.turn_duration_seconds");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&STREAM_PARTS);
    collector.register_counter(&STREAM_FRAGMENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_QUIESCENT);
    collector.register_counter(&STREAM_CANCELLED);
    collector.register_moments(&STREAM_TTFB);
    collector.register_moments(&STREAM_DURATION);

    collector.register_counter(&SESSION_COMMITS);
    collector.register_counter(&SESSION_STALE_UPDATES);
    collector.register_counter(&SESSION_TURNS);
    collector.register_counter(&SESSION_TURN_FAILURES);
    collector.register_counter(&SESSION_REJECTED);
    collector.register_moments(&SESSION_TURN_DURATION);
}
