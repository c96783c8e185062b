use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::warn;
use uuid::Uuid;

use aidlink_types::models::Identity;

use crate::collab::ProfileStore;

/// Resolves a user id to a display identity through one ordered fallback
/// chain: cached self-profile, profile store lookup, display name from any
/// post authored by the id, generic placeholder. Each step is tried only
/// if the prior yields nothing; this is the only fallback chain in the
/// repository.
pub struct ProfileResolver {
    profiles: Arc<dyn ProfileStore>,
    self_cache: RwLock<HashMap<Uuid, Identity>>,
}

impl ProfileResolver {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self {
            profiles,
            self_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Prime the cache with a caller's own session identity so resolving
    /// their id never needs a lookup.
    pub fn prime(&self, identity: Identity) {
        self.self_cache
            .write()
            .expect("profile cache lock poisoned")
            .insert(identity.user_id, identity);
    }

    /// Resolution never fails a render: lookup errors are logged and the
    /// chain falls through to the next step.
    pub fn resolve(&self, id: Uuid) -> Identity {
        if let Some(cached) = self
            .self_cache
            .read()
            .expect("profile cache lock poisoned")
            .get(&id)
        {
            return cached.clone();
        }

        match self.profiles.profile_by_id(id) {
            Ok(Some(identity)) => return identity,
            Ok(None) => {}
            Err(e) => warn!("profile lookup failed for {}: {}", id, e),
        }

        match self.profiles.author_name_from_posts(id) {
            Ok(Some(name)) => {
                return Identity {
                    user_id: id,
                    display_name: name,
                    avatar_url: None,
                }
            }
            Ok(None) => {}
            Err(e) => warn!("post author lookup failed for {}: {}", id, e),
        }

        Identity::placeholder(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidlink_types::error::CoreError;

    #[derive(Default)]
    struct FakeProfileStore {
        profiles: HashMap<Uuid, Identity>,
        post_names: HashMap<Uuid, String>,
        failing: bool,
    }

    impl ProfileStore for FakeProfileStore {
        fn profile_by_id(&self, id: Uuid) -> Result<Option<Identity>, CoreError> {
            if self.failing {
                return Err(CoreError::Storage("profiles down".into()));
            }
            Ok(self.profiles.get(&id).cloned())
        }

        fn author_name_from_posts(&self, id: Uuid) -> Result<Option<String>, CoreError> {
            if self.failing {
                return Err(CoreError::Storage("posts down".into()));
            }
            Ok(self.post_names.get(&id).cloned())
        }
    }

    #[test]
    fn cached_self_wins_over_the_store() {
        let id = Uuid::new_v4();
        let mut store = FakeProfileStore::default();
        store.profiles.insert(
            id,
            Identity {
                user_id: id,
                display_name: "Store Name".into(),
                avatar_url: None,
            },
        );

        let resolver = ProfileResolver::new(Arc::new(store));
        resolver.prime(Identity {
            user_id: id,
            display_name: "Session Name".into(),
            avatar_url: Some("https://cdn.example/a.png".into()),
        });

        assert_eq!(resolver.resolve(id).display_name, "Session Name");
    }

    #[test]
    fn store_profile_is_second_choice() {
        let id = Uuid::new_v4();
        let mut store = FakeProfileStore::default();
        store.profiles.insert(
            id,
            Identity {
                user_id: id,
                display_name: "Store Name".into(),
                avatar_url: None,
            },
        );

        let resolver = ProfileResolver::new(Arc::new(store));
        assert_eq!(resolver.resolve(id).display_name, "Store Name");
    }

    #[test]
    fn post_author_name_is_third_choice() {
        let id = Uuid::new_v4();
        let mut store = FakeProfileStore::default();
        store.post_names.insert(id, "Post Author".into());

        let resolver = ProfileResolver::new(Arc::new(store));
        let identity = resolver.resolve(id);
        assert_eq!(identity.display_name, "Post Author");
        assert!(identity.avatar_url.is_none());
    }

    #[test]
    fn placeholder_when_nothing_resolves() {
        let resolver = ProfileResolver::new(Arc::new(FakeProfileStore::default()));
        let id = Uuid::new_v4();

        let identity = resolver.resolve(id);
        assert_eq!(identity.display_name, Identity::PLACEHOLDER_NAME);
        assert_eq!(identity.user_id, id);
    }

    #[test]
    fn lookup_errors_fall_through_to_placeholder() {
        let store = FakeProfileStore {
            failing: true,
            ..Default::default()
        };
        let resolver = ProfileResolver::new(Arc::new(store));

        let identity = resolver.resolve(Uuid::new_v4());
        assert_eq!(identity.display_name, Identity::PLACEHOLDER_NAME);
    }
}
