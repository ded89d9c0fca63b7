use std::{
    collections::HashMap,
    sync::{Mutex, OnceLock},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use anyhow::anyhow;
use sqlx::postgres::PgPoolOptions;

use super::{
    realtime::RealtimeHub,
    store::{memory::InMemoryStore, postgres::PgStore, Store},
};

pub const DEFAULT_JSON_BODY_LIMIT_BYTES: usize = 1_048_576;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RATE_LIMIT_REQUESTS_PER_MINUTE: u32 = 60;
pub const DEFAULT_REALTIME_OUTBOUND_QUEUE: usize = 256;
pub const DEFAULT_MAX_REALTIME_EVENT_BYTES: usize = corkboard_protocol::MAX_EVENT_BYTES;
pub(crate) const METRICS_TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
pub(crate) const ACTOR_HEADER: &str = "x-corkboard-user";

pub(crate) static METRICS_STATE: OnceLock<MetricsState> = OnceLock::new();

#[derive(Default)]
pub(crate) struct MetricsState {
    pub(crate) permission_denials: Mutex<HashMap<(&'static str, &'static str), u64>>,
    pub(crate) business_rule_rejections: Mutex<HashMap<&'static str, u64>>,
    pub(crate) ordering_conflicts: Mutex<HashMap<&'static str, u64>>,
    pub(crate) realtime_events_emitted: Mutex<HashMap<String, u64>>,
    pub(crate) realtime_events_dropped: Mutex<HashMap<(String, &'static str), u64>>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub max_body_bytes: usize,
    pub request_timeout: Duration,
    pub rate_limit_requests_per_minute: u32,
    pub realtime_outbound_queue: usize,
    pub max_realtime_event_bytes: usize,
    pub database_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_JSON_BODY_LIMIT_BYTES,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            rate_limit_requests_per_minute: DEFAULT_RATE_LIMIT_REQUESTS_PER_MINUTE,
            realtime_outbound_queue: DEFAULT_REALTIME_OUTBOUND_QUEUE,
            max_realtime_event_bytes: DEFAULT_MAX_REALTIME_EVENT_BYTES,
            database_url: None,
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Store,
    pub(crate) hub: RealtimeHub,
}

impl AppState {
    pub(crate) fn new(config: &AppConfig) -> anyhow::Result<Self> {
        let store = if let Some(database_url) = &config.database_url {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect_lazy(database_url)
                .map_err(|e| anyhow!("postgres pool init failed: {e}"))?;
            Store::Postgres(PgStore::new(pool))
        } else {
            Store::Memory(InMemoryStore::default())
        };

        Ok(Self {
            store,
            hub: RealtimeHub::new(config.realtime_outbound_queue, config.max_realtime_event_bytes),
        })
    }
}

pub(crate) fn now_unix() -> i64 {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs();
    i64::try_from(seconds).unwrap_or(i64::MAX)
}
