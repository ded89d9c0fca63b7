#![forbid(unsafe_code)]

mod events;

use serde::Serialize;

pub use events::{
    parse_realtime_event_manifest, realtime_event_manifest, RealtimeEventManifest,
    RealtimeEventManifestEntry, RealtimeEventManifestError, RealtimeEventScope,
};

/// Current realtime envelope version.
pub const PROTOCOL_VERSION: u16 = 1;
/// Maximum allowed realtime payload bytes.
pub const MAX_EVENT_BYTES: usize = 64 * 1024;

/// Versioned realtime envelope. All events use `{ v, t, d }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope<T> {
    pub v: u16,
    pub t: EventType,
    pub d: T,
}

impl<T> Envelope<T> {
    #[must_use]
    pub const fn new(t: EventType, d: T) -> Self {
        Self {
            v: PROTOCOL_VERSION,
            t,
            d,
        }
    }
}

/// Event type identifier with a strict character allowlist.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct EventType(String);

impl EventType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EventType {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_event_type(&value)?;
        Ok(Self(value))
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        value.0
    }
}

/// Serialize an outbound envelope, enforcing the payload ceiling.
///
/// # Errors
/// Returns [`ProtocolError`] if the payload cannot be serialized or the encoded
/// envelope exceeds [`MAX_EVENT_BYTES`].
pub fn encode_envelope<T: Serialize>(envelope: &Envelope<T>) -> Result<String, ProtocolError> {
    let encoded = serde_json::to_string(envelope)?;
    if encoded.len() > MAX_EVENT_BYTES {
        return Err(ProtocolError::OversizedPayload {
            max: MAX_EVENT_BYTES,
            actual: encoded.len(),
        });
    }
    Ok(encoded)
}

pub(crate) fn validate_event_type(value: &str) -> Result<(), ProtocolError> {
    const MAX_LEN: usize = 64;

    if value.is_empty() || value.len() > MAX_LEN {
        return Err(ProtocolError::InvalidEventType);
    }

    if value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
    {
        return Ok(());
    }

    Err(ProtocolError::InvalidEventType)
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("payload exceeds max size: max={max} bytes actual={actual} bytes")]
    OversizedPayload { max: usize, actual: usize },
    #[error("invalid event type")]
    InvalidEventType,
    #[error("invalid json payload")]
    InvalidJson,
}

impl From<serde_json::Error> for ProtocolError {
    fn from(_: serde_json::Error) -> Self {
        Self::InvalidJson
    }
}
