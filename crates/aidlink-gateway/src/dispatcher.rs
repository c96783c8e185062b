use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use aidlink_types::events::GatewayEvent;
use aidlink_types::models::PresenceMeta;

use crate::presence::PresenceRoster;

/// Manages all connected clients: gateway event fan-out plus the live
/// presence membership.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for gateway events — every connection receives
    /// the stream and filters conversation-scoped events itself
    broadcast_tx: broadcast::Sender<GatewayEvent>,

    /// Presence membership, keyed by user
    roster: RwLock<PresenceRoster>,

    /// Which connection tracks which user. Presence ownership is
    /// per-connection: a user goes offline only when their last tracking
    /// connection untracks, and a stale disconnect cannot take a newer
    /// connection offline.
    tracking: RwLock<HashMap<Uuid, Uuid>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                roster: RwLock::new(PresenceRoster::new()),
                tracking: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Subscribe to gateway events. Returns a broadcast receiver; dropping
    /// it is the unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Broadcast an event to all connected clients.
    pub fn broadcast(&self, event: GatewayEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Track a user's presence from one connection. A join event goes out
    /// only on the offline-to-online transition.
    pub async fn track(&self, conn_id: Uuid, user_id: Uuid, meta: PresenceMeta) {
        let went_online = {
            let mut tracking = self.inner.tracking.write().await;
            tracking.insert(conn_id, user_id);
            self.inner.roster.write().await.join(user_id, meta.clone())
        };

        if went_online {
            self.broadcast(GatewayEvent::PresenceJoin { user_id, meta });
        }
    }

    /// Stop tracking for a connection. The user goes offline (and a leave
    /// event goes out) only when no other connection still tracks them.
    pub async fn untrack(&self, conn_id: Uuid) {
        let now = Utc::now();
        let went_offline = {
            let mut tracking = self.inner.tracking.write().await;
            let Some(user_id) = tracking.remove(&conn_id) else {
                return;
            };
            if tracking.values().any(|u| *u == user_id) {
                return;
            }
            self.inner
                .roster
                .write()
                .await
                .leave(user_id, now)
                .then_some(user_id)
        };

        if let Some(user_id) = went_offline {
            self.broadcast(GatewayEvent::PresenceLeave {
                user_id,
                last_seen: now,
            });
        }
    }

    /// Wire-shaped membership snapshot for a sync event.
    pub async fn snapshot(&self) -> HashMap<Uuid, Vec<PresenceMeta>> {
        self.inner.roster.read().await.snapshot()
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.roster.read().await.is_online(user_id)
    }

    pub async fn last_seen(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.inner.roster.read().await.last_seen(user_id)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str) -> PresenceMeta {
        PresenceMeta {
            display_name: name.to_string(),
            avatar_url: None,
            online_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn track_and_untrack_broadcast_join_and_leave() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let user = Uuid::new_v4();
        let conn = Uuid::new_v4();

        dispatcher.track(conn, user, meta("Avery")).await;
        match rx.try_recv().unwrap() {
            GatewayEvent::PresenceJoin { user_id, meta } => {
                assert_eq!(user_id, user);
                assert_eq!(meta.display_name, "Avery");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let before = Utc::now();
        dispatcher.untrack(conn).await;
        match rx.try_recv().unwrap() {
            GatewayEvent::PresenceLeave { user_id, last_seen } => {
                assert_eq!(user_id, user);
                assert!((last_seen - before).num_milliseconds().abs() < 1_000);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert!(!dispatcher.is_online(user).await);
        assert!(dispatcher.last_seen(user).await.is_some());
    }

    #[tokio::test]
    async fn user_stays_online_while_any_connection_tracks() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();
        let user = Uuid::new_v4();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        dispatcher.track(first, user, meta("Avery")).await;
        dispatcher.track(second, user, meta("Avery")).await;

        // One join for the transition; the second track is not one.
        assert!(matches!(
            rx.try_recv().unwrap(),
            GatewayEvent::PresenceJoin { .. }
        ));
        assert!(rx.try_recv().is_err());

        // The stale connection leaving does not take the user offline.
        dispatcher.untrack(first).await;
        assert!(rx.try_recv().is_err());
        assert!(dispatcher.is_online(user).await);

        dispatcher.untrack(second).await;
        assert!(matches!(
            rx.try_recv().unwrap(),
            GatewayEvent::PresenceLeave { .. }
        ));
        assert!(!dispatcher.is_online(user).await);
    }

    #[tokio::test]
    async fn untrack_of_unknown_connection_is_silent() {
        let dispatcher = Dispatcher::new();
        let mut rx = dispatcher.subscribe();

        dispatcher.untrack(Uuid::new_v4()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_reflects_tracked_users() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        dispatcher.track(Uuid::new_v4(), user, meta("Avery")).await;

        let membership = dispatcher.snapshot().await;
        assert_eq!(membership.len(), 1);
        assert_eq!(membership[&user][0].display_name, "Avery");
    }
}
