use std::{collections::BTreeSet, sync::OnceLock};

use serde::{Deserialize, Serialize};

use crate::validate_event_type;

const REALTIME_EVENT_MANIFEST_JSON: &str = include_str!("events/realtime_events_manifest.json");

/// Primary audience an event is fanned out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RealtimeEventScope {
    Workspace,
    Board,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeEventManifestEntry {
    pub event_type: String,
    pub schema_version: u16,
    pub scope: RealtimeEventScope,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeEventManifest {
    pub events: Vec<RealtimeEventManifestEntry>,
}

impl RealtimeEventManifest {
    #[must_use]
    pub fn entry(&self, event_type: &str) -> Option<&RealtimeEventManifestEntry> {
        self.events
            .iter()
            .find(|entry| entry.event_type == event_type)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RealtimeEventManifestError {
    #[error("invalid manifest json")]
    InvalidJson,
    #[error("realtime event type `{0}` failed identifier validation")]
    InvalidEventType(String),
    #[error("duplicate realtime event type `{0}` in manifest")]
    DuplicateEventType(String),
    #[error("realtime event `{event_type}` has invalid schema version {schema_version}")]
    InvalidSchemaVersion {
        event_type: String,
        schema_version: u16,
    },
}

impl From<serde_json::Error> for RealtimeEventManifestError {
    fn from(_: serde_json::Error) -> Self {
        Self::InvalidJson
    }
}

/// Parse and validate a realtime event manifest.
///
/// # Errors
/// Returns [`RealtimeEventManifestError`] when JSON is invalid or an entry has a
/// malformed identifier, a zero schema version, or a duplicate event type.
pub fn parse_realtime_event_manifest(
    json: &str,
) -> Result<RealtimeEventManifest, RealtimeEventManifestError> {
    let manifest: RealtimeEventManifest = serde_json::from_str(json)?;
    validate_realtime_event_manifest(&manifest)?;
    Ok(manifest)
}

/// Return the embedded realtime event manifest.
///
/// # Panics
/// Panics if the embedded manifest file is invalid. The file ships with the
/// crate and is checked by the tests below.
#[must_use]
pub fn realtime_event_manifest() -> &'static RealtimeEventManifest {
    static MANIFEST: OnceLock<RealtimeEventManifest> = OnceLock::new();
    MANIFEST.get_or_init(|| {
        parse_realtime_event_manifest(REALTIME_EVENT_MANIFEST_JSON)
            .expect("realtime event manifest must parse and validate")
    })
}

fn validate_realtime_event_manifest(
    manifest: &RealtimeEventManifest,
) -> Result<(), RealtimeEventManifestError> {
    let mut seen = BTreeSet::new();

    for entry in &manifest.events {
        validate_event_type(&entry.event_type)
            .map_err(|_| RealtimeEventManifestError::InvalidEventType(entry.event_type.clone()))?;

        if entry.schema_version == 0 {
            return Err(RealtimeEventManifestError::InvalidSchemaVersion {
                event_type: entry.event_type.clone(),
                schema_version: entry.schema_version,
            });
        }

        if !seen.insert(entry.event_type.as_str()) {
            return Err(RealtimeEventManifestError::DuplicateEventType(
                entry.event_type.clone(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        parse_realtime_event_manifest, realtime_event_manifest, RealtimeEventManifestError,
        RealtimeEventScope,
    };

    #[test]
    fn embedded_manifest_parses_and_declares_move_events() {
        let manifest = realtime_event_manifest();
        assert!(!manifest.events.is_empty());
        let moved = manifest.entry("item_move").expect("item_move is declared");
        assert_eq!(moved.scope, RealtimeEventScope::Board);
        assert!(manifest.entry("message_create").is_none());
    }

    #[test]
    fn parse_rejects_duplicate_event_types() {
        let error = parse_realtime_event_manifest(
            r#"{"events":[{"event_type":"item_move","schema_version":1,"scope":"board"},{"event_type":"item_move","schema_version":1,"scope":"board"}]}"#,
        )
        .expect_err("duplicate event types must fail");

        assert_eq!(
            error,
            RealtimeEventManifestError::DuplicateEventType(String::from("item_move"))
        );
    }

    #[test]
    fn parse_rejects_zero_schema_version_and_bad_identifiers() {
        let error = parse_realtime_event_manifest(
            r#"{"events":[{"event_type":"item_move","schema_version":0,"scope":"board"}]}"#,
        )
        .expect_err("schema version zero must fail");
        assert_eq!(
            error,
            RealtimeEventManifestError::InvalidSchemaVersion {
                event_type: String::from("item_move"),
                schema_version: 0,
            }
        );

        let error = parse_realtime_event_manifest(
            r#"{"events":[{"event_type":"Item-Move","schema_version":1,"scope":"board"}]}"#,
        )
        .expect_err("identifier must be validated");
        assert_eq!(
            error,
            RealtimeEventManifestError::InvalidEventType(String::from("Item-Move"))
        );
    }
}
