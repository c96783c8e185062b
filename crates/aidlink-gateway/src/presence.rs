use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use aidlink_types::models::PresenceMeta;

/// Presence state machine for one membership channel. Every tracked user
/// is either offline (absent from the map) or online (present with
/// metadata); last-seen is recorded at the moment of leaving.
///
/// The same machine serves both sides of the wire: the server roster is
/// mutated through `join`/`leave` by track/untrack handling, and a client
/// view is mutated by applying `sync`/`join`/`leave` events as they
/// arrive. State is reconstructed from the live snapshot, never read from
/// durable storage.
#[derive(Debug, Clone, Default)]
pub struct PresenceRoster {
    online: HashMap<Uuid, PresenceMeta>,
    last_seen: HashMap<Uuid, DateTime<Utc>>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition a user to online. Metadata is last-write-wins. Returns
    /// true when the user was offline before.
    pub fn join(&mut self, user_id: Uuid, meta: PresenceMeta) -> bool {
        self.online.insert(user_id, meta).is_none()
    }

    /// Transition a user to offline, recording last-seen = leave time.
    /// Returns true when the user was online before.
    pub fn leave(&mut self, user_id: Uuid, at: DateTime<Utc>) -> bool {
        let was_online = self.online.remove(&user_id).is_some();
        if was_online {
            self.last_seen.insert(user_id, at);
        }
        was_online
    }

    /// Reconcile against a full membership snapshot, overriding anything
    /// previously inferred. Users missing from the snapshot go offline
    /// with last-seen = reconcile time.
    pub fn sync(&mut self, membership: &HashMap<Uuid, Vec<PresenceMeta>>, at: DateTime<Utc>) {
        let gone: Vec<Uuid> = self
            .online
            .keys()
            .filter(|id| !membership.contains_key(id))
            .copied()
            .collect();
        for id in gone {
            self.leave(id, at);
        }

        for (id, metas) in membership {
            if let Some(meta) = metas.last() {
                self.online.insert(*id, meta.clone());
            }
        }
    }

    pub fn is_online(&self, user_id: Uuid) -> bool {
        self.online.contains_key(&user_id)
    }

    pub fn meta(&self, user_id: Uuid) -> Option<&PresenceMeta> {
        self.online.get(&user_id)
    }

    pub fn last_seen(&self, user_id: Uuid) -> Option<DateTime<Utc>> {
        self.last_seen.get(&user_id).copied()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Wire-shaped membership map for a sync event.
    pub fn snapshot(&self) -> HashMap<Uuid, Vec<PresenceMeta>> {
        self.online
            .iter()
            .map(|(id, meta)| (*id, vec![meta.clone()]))
            .collect()
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

    #[test]
    fn join_then_leave_records_last_seen() {
        let mut roster = PresenceRoster::new();
        let user = Uuid::new_v4();

        assert!(roster.join(user, meta("Avery")));
        assert!(roster.is_online(user));
        assert!(roster.last_seen(user).is_none());

        let before = Utc::now();
        assert!(roster.leave(user, before));
        assert!(!roster.is_online(user));

        let last_seen = roster.last_seen(user).unwrap();
        assert!((last_seen - before).num_milliseconds().abs() < 50);
    }

    #[test]
    fn rejoin_is_not_a_transition_and_updates_meta() {
        let mut roster = PresenceRoster::new();
        let user = Uuid::new_v4();

        assert!(roster.join(user, meta("Old Name")));
        assert!(!roster.join(user, meta("New Name")));
        assert_eq!(roster.meta(user).unwrap().display_name, "New Name");
    }

    #[test]
    fn leave_when_offline_is_a_noop() {
        let mut roster = PresenceRoster::new();
        let user = Uuid::new_v4();

        assert!(!roster.leave(user, Utc::now()));
        assert!(roster.last_seen(user).is_none());
    }

    #[test]
    fn sync_fully_reconciles_membership() {
        let mut roster = PresenceRoster::new();
        let stays = Uuid::new_v4();
        let goes = Uuid::new_v4();
        let appears = Uuid::new_v4();

        roster.join(stays, meta("Stays"));
        roster.join(goes, meta("Goes"));

        let mut membership = HashMap::new();
        membership.insert(stays, vec![meta("Stays Renamed")]);
        membership.insert(appears, vec![meta("Appears")]);

        let at = Utc::now();
        roster.sync(&membership, at);

        assert!(roster.is_online(stays));
        assert_eq!(roster.meta(stays).unwrap().display_name, "Stays Renamed");
        assert!(roster.is_online(appears));
        assert!(!roster.is_online(goes));
        assert_eq!(roster.last_seen(goes), Some(at));
        assert_eq!(roster.online_count(), 2);
    }

    #[test]
    fn snapshot_round_trips_through_sync() {
        let mut server = PresenceRoster::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        server.join(a, meta("A"));
        server.join(b, meta("B"));

        // A client that inferred someone else online reconciles fully.
        let mut client = PresenceRoster::new();
        client.join(Uuid::new_v4(), meta("Ghost"));
        client.sync(&server.snapshot(), Utc::now());

        assert_eq!(client.online_count(), 2);
        assert!(client.is_online(a));
        assert!(client.is_online(b));
    }
}
