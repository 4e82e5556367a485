use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("ragchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter = Counter::new("ragchat.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("ragchat.client.request_duration_seconds");

pub(crate) static NORMALIZED_CITATIONS: Counter = Counter::new("ragchat.normalize.citations");
pub(crate) static CITATIONS_WITH_STORAGE: Counter =
    Counter::new("ragchat.normalize.citations_with_storage");
pub(crate) static PARSED_INTENTS: Counter = Counter::new("ragchat.normalize.intents_parsed");

pub(crate) static TOKEN_FETCHES: Counter = Counter::new("ragchat.credential.token_fetches");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);

    collector.register_counter(&NORMALIZED_CITATIONS);
    collector.register_counter(&CITATIONS_WITH_STORAGE);
    collector.register_counter(&PARSED_INTENTS);

    collector.register_counter(&TOKEN_FETCHES);
}
