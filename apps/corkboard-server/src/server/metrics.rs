use std::{collections::HashMap, fmt::Write as _};

use super::core::{MetricsState, METRICS_STATE};

pub(crate) const REALTIME_DROP_REASON_CLOSED: &str = "closed";
pub(crate) const REALTIME_DROP_REASON_FULL_QUEUE: &str = "full_queue";
pub(crate) const REALTIME_DROP_REASON_OVERSIZED_OUTBOUND: &str = "oversized_outbound";
pub(crate) const REALTIME_DROP_REASON_SCOPE_MISMATCH: &str = "scope_mismatch";
pub(crate) const REALTIME_DROP_REASON_SERIALIZE_ERROR: &str = "serialize_error";
pub(crate) const REALTIME_DROP_REASON_UNKNOWN_EVENT: &str = "unknown_event";

pub(crate) fn metrics_state() -> &'static MetricsState {
    METRICS_STATE.get_or_init(MetricsState::default)
}

pub(crate) fn render_metrics() -> String {
    let permission_denials = metrics_state()
        .permission_denials
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let business_rule_rejections = metrics_state()
        .business_rule_rejections
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let ordering_conflicts = metrics_state()
        .ordering_conflicts
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let realtime_events_emitted = metrics_state()
        .realtime_events_emitted
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());
    let realtime_events_dropped = metrics_state()
        .realtime_events_dropped
        .lock()
        .map_or_else(|_| HashMap::new(), |guard| guard.clone());

    let mut output = String::new();
    output.push_str(
        "# HELP corkboard_permission_denials_total Count of rejected permission checks by scope and reason\n",
    );
    output.push_str("# TYPE corkboard_permission_denials_total counter\n");
    let mut denial_entries: Vec<_> = permission_denials.into_iter().collect();
    denial_entries.sort_by_key(|((scope, reason), _)| (*scope, *reason));
    for ((scope, reason), value) in denial_entries {
        let _ = writeln!(
            output,
            "corkboard_permission_denials_total{{scope=\"{scope}\",reason=\"{reason}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP corkboard_business_rule_rejections_total Count of commands rejected by an invariant\n",
    );
    output.push_str("# TYPE corkboard_business_rule_rejections_total counter\n");
    let mut rule_entries: Vec<_> = business_rule_rejections.into_iter().collect();
    rule_entries.sort_by_key(|(rule, _)| *rule);
    for (rule, value) in rule_entries {
        let _ = writeln!(
            output,
            "corkboard_business_rule_rejections_total{{rule=\"{rule}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP corkboard_ordering_conflicts_total Count of ordering commits lost to a concurrent writer\n",
    );
    output.push_str("# TYPE corkboard_ordering_conflicts_total counter\n");
    let mut conflict_entries: Vec<_> = ordering_conflicts.into_iter().collect();
    conflict_entries.sort_by_key(|(operation, _)| *operation);
    for (operation, value) in conflict_entries {
        let _ = writeln!(
            output,
            "corkboard_ordering_conflicts_total{{operation=\"{operation}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP corkboard_realtime_events_emitted_total Count of realtime events delivered by type\n",
    );
    output.push_str("# TYPE corkboard_realtime_events_emitted_total counter\n");
    let mut emitted_entries: Vec<_> = realtime_events_emitted.into_iter().collect();
    emitted_entries.sort();
    for (event_type, value) in emitted_entries {
        let _ = writeln!(
            output,
            "corkboard_realtime_events_emitted_total{{event_type=\"{event_type}\"}} {value}"
        );
    }

    output.push_str(
        "# HELP corkboard_realtime_events_dropped_total Count of dropped realtime events by type and reason\n",
    );
    output.push_str("# TYPE corkboard_realtime_events_dropped_total counter\n");
    let mut dropped_entries: Vec<_> = realtime_events_dropped.into_iter().collect();
    dropped_entries.sort();
    for ((event_type, reason), value) in dropped_entries {
        let _ = writeln!(
            output,
            "corkboard_realtime_events_dropped_total{{event_type=\"{event_type}\",reason=\"{reason}\"}} {value}"
        );
    }

    output
}

pub(crate) fn record_permission_denied(scope: &'static str, reason: &'static str) {
    if let Ok(mut counters) = metrics_state().permission_denials.lock() {
        let entry = counters.entry((scope, reason)).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn record_business_rule_rejection(rule: &'static str) {
    if let Ok(mut counters) = metrics_state().business_rule_rejections.lock() {
        let entry = counters.entry(rule).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn record_ordering_conflict(operation: &'static str) {
    if let Ok(mut counters) = metrics_state().ordering_conflicts.lock() {
        let entry = counters.entry(operation).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn record_realtime_event_emitted(event_type: &str) {
    if let Ok(mut counters) = metrics_state().realtime_events_emitted.lock() {
        let entry = counters.entry(event_type.to_owned()).or_insert(0);
        *entry += 1;
    }
}

pub(crate) fn record_realtime_event_dropped(event_type: &str, reason: &'static str) {
    if let Ok(mut counters) = metrics_state().realtime_events_dropped.lock() {
        let entry = counters
            .entry((event_type.to_owned(), reason))
            .or_insert(0);
        *entry += 1;
    }
}
