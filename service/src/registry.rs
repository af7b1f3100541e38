//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Live session registry
//!
//! Sessions are appended by the accept path and erased only by a reaper
//! sweep. Both run concurrently on the worker pool; the concurrent maps
//! provide the locking around every mutation.

use crate::{Result, ServiceError, Session, SessionId, SessionStatus};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use metrics::{counter, gauge};
use std::sync::Arc;
use tracing::{debug, info};

/// Registry of live sessions
pub struct SessionRegistry<M> {
    /// Sessions by key (lock-free concurrent map)
    sessions: DashMap<SessionId, Arc<Session<M>>>,
    /// Logged in identities
    identities: DashMap<String, SessionId>,
}

impl<M> Default for SessionRegistry<M> {
    fn default() -> Self {
        Self {
            sessions: DashMap::new(),
            identities: DashMap::new(),
        }
    }
}

impl<M> SessionRegistry<M>
where
    M: Clone + Default + Send + Sync + 'static,
{
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session.
    pub fn insert(&self, session: Arc<Session<M>>) {
        let id = session.id();
        if self.sessions.insert(id, session).is_none() {
            gauge!("zard.sessions.active").increment(1.0);
            debug!(session = %id, total = self.sessions.len(), "Session registered");
        }
    }

    /// Look up a registered session.
    pub fn get(&self, id: SessionId) -> Option<Arc<Session<M>>> {
        self.sessions.get(&id).map(|entry| entry.value().clone())
    }

    /// Check if a session is registered.
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Number of registered sessions, reapable ones included.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if no session is registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Keys of all registered sessions, in ascending order.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// The session logged in as `identity`, if any.
    pub fn find_by_identity(&self, identity: &str) -> Option<Arc<Session<M>>> {
        let id = *self.identities.get(identity)?;
        self.get(id)
    }

    /// Log `session` in as `identity`.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Busy`] if another live session holds `identity`, or
    /// the session already logged in.
    pub fn login(&self, session: &Session<M>, identity: &str) -> Result<()> {
        match self.identities.entry(identity.to_string()) {
            Entry::Occupied(entry) => Err(ServiceError::Busy(format!(
                "identity `{}` is already logged in on {}",
                identity,
                entry.get()
            ))),
            Entry::Vacant(entry) => {
                session.set_identity(identity)?;
                entry.insert(session.id());
                info!(session = %session.id(), identity, "Session logged in");
                Ok(())
            }
        }
    }

    /// Remove every reapable session. Returns how many were removed.
    pub fn reap(&self) -> usize {
        let candidates: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().status() == SessionStatus::Reapable)
            .map(|entry| *entry.key())
            .collect();

        let mut reaped = 0;
        for id in candidates {
            let removed = self
                .sessions
                .remove_if(&id, |_, session| session.status() == SessionStatus::Reapable);
            if let Some((_, session)) = removed {
                if let Some(identity) = session.identity() {
                    self.identities.remove_if(identity, |_, owner| *owner == id);
                }
                debug!(session = %id, "Session reaped");
                reaped += 1;
            }
        }

        if reaped > 0 {
            gauge!("zard.sessions.active").decrement(reaped as f64);
            counter!("zard.sessions.reaped").increment(reaped as u64);
        }
        reaped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Connection, StreamTransport};
    use tokio::runtime::Handle;

    fn session(id: u64) -> Arc<Session<()>> {
        let (reader, _) = tokio::io::duplex(16);
        let (_, writer) = tokio::io::duplex(16);
        let transport = StreamTransport::new(Connection::new(Handle::current()), reader, writer);
        Session::new(SessionId::new(id), transport)
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let registry = SessionRegistry::new();
        registry.insert(session(2));
        registry.insert(session(1));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains(SessionId::new(1)));
        assert_eq!(registry.ids(), vec![SessionId::new(1), SessionId::new(2)]);
        assert!(registry.get(SessionId::new(3)).is_none());
    }

    #[tokio::test]
    async fn test_duplicate_login_is_busy() {
        let registry = SessionRegistry::new();
        let alice = session(1);
        let impostor = session(2);
        registry.insert(alice.clone());
        registry.insert(impostor.clone());

        registry.login(&alice, "alice").unwrap();
        assert!(registry.login(&impostor, "alice").unwrap_err().is_busy());
        assert!(registry.login(&alice, "bob").unwrap_err().is_busy());
        assert_eq!(registry.find_by_identity("alice").unwrap().id(), alice.id());
        assert!(registry.find_by_identity("bob").is_none());
    }

    #[tokio::test]
    async fn test_reap_releases_identity() {
        let registry = SessionRegistry::new();
        let alice = session(1);
        registry.insert(alice.clone());
        registry.login(&alice, "alice").unwrap();

        alice.set_status(SessionStatus::Reapable);
        assert_eq!(registry.reap(), 1);
        assert!(registry.is_empty());
        assert!(registry.find_by_identity("alice").is_none());

        let again = session(2);
        registry.insert(again.clone());
        registry.login(&again, "alice").unwrap();
    }
}
