pub(crate) mod cards;
pub(crate) mod core;
pub(crate) mod directory;
pub(crate) mod errors;
pub(crate) mod escalation;
pub(crate) mod guard;
pub(crate) mod handlers;
pub(crate) mod hierarchy;
pub(crate) mod membership;
pub(crate) mod metrics;
pub(crate) mod mover;
pub(crate) mod ordering;
pub(crate) mod ownership;
pub(crate) mod realtime;
pub(crate) mod router;
pub(crate) mod store;
#[cfg(test)]
mod test_support;
pub(crate) mod types;

pub use core::{
    AppConfig, DEFAULT_JSON_BODY_LIMIT_BYTES, DEFAULT_MAX_REALTIME_EVENT_BYTES,
    DEFAULT_RATE_LIMIT_REQUESTS_PER_MINUTE, DEFAULT_REALTIME_OUTBOUND_QUEUE,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use errors::init_tracing;
pub use router::build_router;
