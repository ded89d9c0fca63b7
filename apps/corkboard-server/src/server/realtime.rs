use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use corkboard_core::{BoardId, UserId, WorkspaceId};
use corkboard_protocol::{
    encode_envelope, realtime_event_manifest, Envelope, EventType, ProtocolError,
    RealtimeEventScope,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::warn;
use uuid::Uuid;

use super::{
    core::AppState,
    errors::ServiceError,
    guard::PermissionGuard,
    handlers::Actor,
    metrics::{
        record_realtime_event_dropped, record_realtime_event_emitted,
        REALTIME_DROP_REASON_CLOSED, REALTIME_DROP_REASON_FULL_QUEUE,
        REALTIME_DROP_REASON_OVERSIZED_OUTBOUND, REALTIME_DROP_REASON_SCOPE_MISMATCH,
        REALTIME_DROP_REASON_SERIALIZE_ERROR, REALTIME_DROP_REASON_UNKNOWN_EVENT,
    },
    types::RealtimeQuery,
};

/// Who a realtime event is fanned out to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Audience {
    Workspace(WorkspaceId),
    Board(BoardId),
    User(UserId),
}

impl Audience {
    const fn scope(self) -> RealtimeEventScope {
        match self {
            Self::Workspace(_) => RealtimeEventScope::Workspace,
            Self::Board(_) => RealtimeEventScope::Board,
            Self::User(_) => RealtimeEventScope::User,
        }
    }
}

/// Post-commit, best-effort event sink. Implementations swallow their own
/// failures: a committed command never fails because of a notify.
pub(crate) trait RealtimeNotifier {
    async fn notify(
        &self,
        audiences: &[Audience],
        event_type: &'static str,
        payload: serde_json::Value,
    );

    /// Stops delivering `audiences` to every connection opened by `user`.
    async fn revoke(&self, user: UserId, audiences: &[Audience]);
}

#[derive(Debug, Clone)]
pub(crate) struct Listener {
    user: UserId,
    sender: mpsc::Sender<String>,
}

impl Listener {
    pub(crate) const fn new(user: UserId, sender: mpsc::Sender<String>) -> Self {
        Self { user, sender }
    }
}

type Subscriptions = HashMap<Audience, HashMap<Uuid, Listener>>;

#[derive(Clone)]
pub(crate) struct RealtimeHub {
    subscriptions: Arc<RwLock<Subscriptions>>,
    outbound_queue: usize,
    max_event_bytes: usize,
}

impl RealtimeHub {
    pub(crate) fn new(outbound_queue: usize, max_event_bytes: usize) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            outbound_queue,
            max_event_bytes,
        }
    }

    pub(crate) async fn subscribe(
        &self,
        user: UserId,
        audiences: &[Audience],
    ) -> (Uuid, mpsc::Receiver<String>) {
        let connection_id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.outbound_queue);
        let mut subscriptions = self.subscriptions.write().await;
        for audience in audiences {
            subscriptions
                .entry(*audience)
                .or_default()
                .insert(connection_id, Listener::new(user, sender.clone()));
        }
        (connection_id, receiver)
    }

    pub(crate) async fn unsubscribe(&self, connection_id: Uuid) {
        let mut subscriptions = self.subscriptions.write().await;
        for listeners in subscriptions.values_mut() {
            listeners.remove(&connection_id);
        }
        subscriptions.retain(|_, listeners| !listeners.is_empty());
    }
}

impl RealtimeNotifier for RealtimeHub {
    async fn notify(
        &self,
        audiences: &[Audience],
        event_type: &'static str,
        payload: serde_json::Value,
    ) {
        let payload = match build_event(event_type, audiences, payload) {
            Ok(payload) => payload,
            Err(reason) => {
                record_realtime_event_dropped(event_type, reason);
                warn!(
                    event = "realtime.notify.dropped",
                    event_type,
                    reason,
                    "dropped realtime event before fanout"
                );
                return;
            }
        };

        let mut subscriptions = self.subscriptions.write().await;
        let delivered = dispatch_payload(
            &mut subscriptions,
            audiences,
            &payload,
            self.max_event_bytes,
            event_type,
        );
        drop(subscriptions);

        record_realtime_event_emitted(event_type);
        tracing::debug!(event = "realtime.notify", event_type, delivered);
    }

    async fn revoke(&self, user: UserId, audiences: &[Audience]) {
        let mut subscriptions = self.subscriptions.write().await;
        let revoked = revoke_listeners(&mut subscriptions, user, audiences);
        drop(subscriptions);
        if revoked > 0 {
            tracing::info!(
                event = "realtime.revoke",
                user_id = %user,
                revoked,
                "stopped realtime delivery after access was withdrawn"
            );
        }
    }
}

/// Wraps `payload` in a versioned envelope. Fails with a drop reason for
/// types missing from the manifest, for audiences that miss the declared
/// scope, and for unencodable payloads.
pub(crate) fn build_event(
    event_type: &'static str,
    audiences: &[Audience],
    payload: serde_json::Value,
) -> Result<String, &'static str> {
    let Some(entry) = realtime_event_manifest().entry(event_type) else {
        return Err(REALTIME_DROP_REASON_UNKNOWN_EVENT);
    };
    if !audiences.iter().any(|audience| audience.scope() == entry.scope) {
        return Err(REALTIME_DROP_REASON_SCOPE_MISMATCH);
    }
    let event_type = EventType::try_from(String::from(event_type))
        .map_err(|_| REALTIME_DROP_REASON_UNKNOWN_EVENT)?;
    encode_envelope(&Envelope::new(event_type, payload)).map_err(|error| match error {
        ProtocolError::OversizedPayload { .. } => REALTIME_DROP_REASON_OVERSIZED_OUTBOUND,
        _ => REALTIME_DROP_REASON_SERIALIZE_ERROR,
    })
}

/// Delivers `payload` at most once per connection across every audience and
/// prunes closed or saturated queues. Returns the number of deliveries.
pub(crate) fn dispatch_payload(
    subscriptions: &mut Subscriptions,
    audiences: &[Audience],
    payload: &str,
    max_payload_bytes: usize,
    event_type: &'static str,
) -> usize {
    if payload.len() > max_payload_bytes {
        record_realtime_event_dropped(event_type, REALTIME_DROP_REASON_OVERSIZED_OUTBOUND);
        warn!(
            event = "realtime.fanout.oversized_outbound",
            event_type,
            payload_bytes = payload.len(),
            max_payload_bytes,
            "dropped outbound payload because it exceeds configured max size"
        );
        return 0;
    }

    let mut seen_connections = HashSet::new();
    let mut delivered = 0usize;

    for audience in audiences {
        let Some(listeners) = subscriptions.get_mut(audience) else {
            continue;
        };

        let mut stale_connections = Vec::new();
        for (connection_id, listener) in listeners.iter() {
            if !seen_connections.insert(*connection_id) {
                continue;
            }

            match listener.sender.try_send(payload.to_owned()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    record_realtime_event_dropped(event_type, REALTIME_DROP_REASON_CLOSED);
                    stale_connections.push(*connection_id);
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    record_realtime_event_dropped(event_type, REALTIME_DROP_REASON_FULL_QUEUE);
                    warn!(
                        event = "realtime.fanout.full_queue",
                        event_type,
                        connection_id = %connection_id,
                        "dropped slow realtime subscriber"
                    );
                    stale_connections.push(*connection_id);
                }
            }
        }

        for connection_id in stale_connections {
            listeners.remove(&connection_id);
        }
    }

    subscriptions.retain(|_, listeners| !listeners.is_empty());
    delivered
}

/// Drops every listener `user` holds on `audiences`. Returns how many went.
pub(crate) fn revoke_listeners(
    subscriptions: &mut Subscriptions,
    user: UserId,
    audiences: &[Audience],
) -> usize {
    let mut revoked = 0usize;
    for audience in audiences {
        if let Some(listeners) = subscriptions.get_mut(audience) {
            let before = listeners.len();
            listeners.retain(|_, listener| listener.user != user);
            revoked += before - listeners.len();
        }
    }
    subscriptions.retain(|_, listeners| !listeners.is_empty());
    revoked
}

pub(crate) async fn realtime_ws(
    State(state): State<AppState>,
    Actor(actor): Actor,
    Query(query): Query<RealtimeQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ServiceError> {
    let guard = PermissionGuard::new(&state.store);
    let mut audiences = vec![Audience::User(actor)];
    if let Some(workspace) = query.workspace_id {
        let workspace: WorkspaceId = workspace.parse()?;
        guard.ensure_workspace_member(workspace, actor).await?;
        audiences.push(Audience::Workspace(workspace));
    }
    if let Some(board) = query.board_id {
        let board: BoardId = board.parse()?;
        guard.ensure_board_viewer(board, actor).await?;
        audiences.push(Audience::Board(board));
    }

    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        handle_realtime_connection(hub, socket, actor, audiences).await;
    }))
}

async fn handle_realtime_connection(
    hub: RealtimeHub,
    socket: WebSocket,
    actor: UserId,
    audiences: Vec<Audience>,
) {
    let (connection_id, mut outbound_rx) = hub.subscribe(actor, &audiences).await;
    let (mut sink, mut stream) = socket.split();

    if let Ok(ready) = build_event(
        "ready",
        &[Audience::User(actor)],
        serde_json::json!({ "user_id": actor, "connection_id": connection_id.to_string() }),
    ) {
        if sink.send(Message::Text(ready.into())).await.is_ok() {
            record_realtime_event_emitted("ready");
        }
    }

    let send_task = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(Duration::from_secs(30));
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    if sink.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                maybe_payload = outbound_rx.recv() => {
                    match maybe_payload {
                        Some(payload) => {
                            if sink.send(Message::Text(payload.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });

    // subscribers have nothing to say; drain until the client goes away
    let mut disconnect_reason = "connection_closed";
    while let Some(incoming) = stream.next().await {
        match incoming {
            Ok(Message::Close(_)) => {
                disconnect_reason = "client_close";
                break;
            }
            Ok(_) => continue,
            Err(_) => {
                disconnect_reason = "socket_error";
                break;
            }
        }
    }

    hub.unsubscribe(connection_id).await;
    send_task.abort();
    tracing::info!(
        event = "realtime.disconnect",
        connection_id = %connection_id,
        user_id = %actor,
        reason = disconnect_reason
    );
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use corkboard_core::{BoardId, UserId, WorkspaceId};
    use serde_json::Value;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::{
        build_event, dispatch_payload, revoke_listeners, Audience, Listener, RealtimeHub,
        RealtimeNotifier,
    };
    use crate::server::metrics::{
        metrics_state, REALTIME_DROP_REASON_SCOPE_MISMATCH, REALTIME_DROP_REASON_UNKNOWN_EVENT,
    };

    fn dropped_count(event_type: &str, reason: &'static str) -> u64 {
        metrics_state()
            .realtime_events_dropped
            .lock()
            .ok()
            .and_then(|dropped| dropped.get(&(event_type.to_owned(), reason)).copied())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn delivers_once_per_connection_across_audiences() {
        let owner = UserId::new();
        let board = Audience::Board(BoardId::new());
        let user = Audience::User(owner);
        let both_id = Uuid::new_v4();
        let board_only_id = Uuid::new_v4();
        let (both_sender, mut both_receiver) = mpsc::channel::<String>(2);
        let (board_sender, mut board_receiver) = mpsc::channel::<String>(2);

        let mut subscriptions = HashMap::from([
            (
                board,
                HashMap::from([
                    (both_id, Listener::new(owner, both_sender.clone())),
                    (board_only_id, Listener::new(UserId::new(), board_sender)),
                ]),
            ),
            (user, HashMap::from([(both_id, Listener::new(owner, both_sender))])),
        ]);

        let delivered = dispatch_payload(
            &mut subscriptions,
            &[board, user],
            "payload",
            "payload".len(),
            "item_move",
        );

        assert_eq!(delivered, 2);
        assert_eq!(both_receiver.recv().await.as_deref(), Some("payload"));
        assert!(both_receiver.try_recv().is_err());
        assert_eq!(board_receiver.recv().await.as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn prunes_closed_and_full_queues() {
        let user = UserId::new();
        let board = Audience::Board(BoardId::new());
        let keep_id = Uuid::new_v4();
        let full_id = Uuid::new_v4();
        let closed_id = Uuid::new_v4();
        let (keep_sender, _keep_receiver) = mpsc::channel::<String>(2);
        let (full_sender, mut full_receiver) = mpsc::channel::<String>(1);
        full_sender
            .try_send(String::from("occupied"))
            .expect("queue should fill");
        let (closed_sender, closed_receiver) = mpsc::channel::<String>(1);
        drop(closed_receiver);

        let mut subscriptions = HashMap::from([(
            board,
            HashMap::from([
                (keep_id, Listener::new(user, keep_sender)),
                (full_id, Listener::new(user, full_sender)),
                (closed_id, Listener::new(user, closed_sender)),
            ]),
        )]);

        let delivered =
            dispatch_payload(&mut subscriptions, &[board], "payload", 64, "item_create");

        assert_eq!(delivered, 1);
        let listeners = subscriptions.get(&board).expect("keep listener remains");
        assert!(listeners.contains_key(&keep_id));
        assert!(!listeners.contains_key(&full_id));
        assert!(!listeners.contains_key(&closed_id));
        assert_eq!(full_receiver.recv().await.as_deref(), Some("occupied"));
    }

    #[tokio::test]
    async fn oversized_payloads_are_not_delivered() {
        let board = Audience::Board(BoardId::new());
        let connection_id = Uuid::new_v4();
        let (sender, mut receiver) = mpsc::channel::<String>(1);
        let mut subscriptions = HashMap::from([(
            board,
            HashMap::from([(connection_id, Listener::new(UserId::new(), sender))]),
        )]);

        let delivered = dispatch_payload(&mut subscriptions, &[board], "payload", 3, "item_move");

        assert_eq!(delivered, 0);
        assert!(receiver.try_recv().is_err());
        assert!(subscriptions[&board].contains_key(&connection_id));
    }

    #[test]
    fn revoking_a_user_leaves_other_listeners_and_audiences_alone() {
        let gone = UserId::new();
        let stays = UserId::new();
        let board = Audience::Board(BoardId::new());
        let private = Audience::User(gone);
        let gone_id = Uuid::new_v4();
        let stays_id = Uuid::new_v4();
        let (gone_sender, _gone_receiver) = mpsc::channel::<String>(1);
        let (stays_sender, _stays_receiver) = mpsc::channel::<String>(1);

        let mut subscriptions = HashMap::from([
            (
                board,
                HashMap::from([
                    (gone_id, Listener::new(gone, gone_sender.clone())),
                    (stays_id, Listener::new(stays, stays_sender)),
                ]),
            ),
            (private, HashMap::from([(gone_id, Listener::new(gone, gone_sender))])),
        ]);

        assert_eq!(revoke_listeners(&mut subscriptions, gone, &[board]), 1);
        assert!(!subscriptions[&board].contains_key(&gone_id));
        assert!(subscriptions[&board].contains_key(&stays_id));
        assert!(subscriptions[&private].contains_key(&gone_id));
        assert_eq!(revoke_listeners(&mut subscriptions, gone, &[board]), 0);
    }

    #[test]
    fn events_are_checked_against_the_manifest() {
        let board = Audience::Board(BoardId::new());
        assert_eq!(
            build_event("message_create", &[board], serde_json::json!({})),
            Err(REALTIME_DROP_REASON_UNKNOWN_EVENT)
        );
        assert_eq!(
            build_event(
                "item_move",
                &[Audience::Workspace(WorkspaceId::new())],
                serde_json::json!({})
            ),
            Err(REALTIME_DROP_REASON_SCOPE_MISMATCH)
        );

        let encoded = build_event("item_move", &[board], serde_json::json!({"position": 2}))
            .expect("declared board event should encode");
        let envelope: Value = serde_json::from_str(&encoded).expect("envelope is json");
        assert_eq!(envelope["v"], 1);
        assert_eq!(envelope["t"], "item_move");
        assert_eq!(envelope["d"]["position"], 2);
    }

    #[tokio::test]
    async fn hub_fans_out_to_subscribers_and_forgets_them_on_unsubscribe() {
        let hub = RealtimeHub::new(4, corkboard_protocol::MAX_EVENT_BYTES);
        let workspace = Audience::Workspace(WorkspaceId::new());
        let (connection_id, mut receiver) = hub.subscribe(UserId::new(), &[workspace]).await;

        hub.notify(&[workspace], "board_create", serde_json::json!({"name": "Roadmap"}))
            .await;
        let received = receiver.recv().await.expect("event delivered");
        assert!(received.contains("\"t\":\"board_create\""));

        hub.unsubscribe(connection_id).await;
        hub.notify(&[workspace], "board_create", serde_json::json!({"name": "Backlog"}))
            .await;
        assert!(receiver.recv().await.is_none());

        let before = dropped_count("not_declared", REALTIME_DROP_REASON_UNKNOWN_EVENT);
        hub.notify(&[workspace], "not_declared", serde_json::json!({}))
            .await;
        assert_eq!(
            dropped_count("not_declared", REALTIME_DROP_REASON_UNKNOWN_EVENT),
            before + 1
        );
    }

    #[tokio::test]
    async fn revoked_users_stop_hearing_board_events() {
        let hub = RealtimeHub::new(4, corkboard_protocol::MAX_EVENT_BYTES);
        let removed = UserId::new();
        let teammate = UserId::new();
        let board = Audience::Board(BoardId::new());
        let (_, mut removed_rx) = hub
            .subscribe(removed, &[Audience::User(removed), board])
            .await;
        let (_, mut teammate_rx) = hub.subscribe(teammate, &[board]).await;

        hub.revoke(removed, &[board]).await;
        hub.notify(&[board], "item_create", serde_json::json!({"title": "Secret"}))
            .await;
        assert!(teammate_rx.recv().await.is_some());
        assert!(removed_rx.try_recv().is_err());

        hub.notify(
            &[board, Audience::User(removed)],
            "board_member_remove",
            serde_json::json!({"user_id": removed}),
        )
        .await;
        let notice = removed_rx.recv().await.expect("own removal still delivered");
        assert!(notice.contains("\"t\":\"board_member_remove\""));
    }
}
