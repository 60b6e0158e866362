// SPDX-License-Identifier: Apache-2.0
//! Listener registry: opaque tokens to (component, method) bindings.
//!
//! Clients never see component identities; event-handler attributes carry an
//! opaque token, and the registry routes echoes of that token back to the
//! bound method. Entries live exactly as long as the owning element keeps
//! the handler prop.

use blake3::Hasher;
use rustc_hash::FxHashMap;

use umbra_proto::ListenerId;

use crate::descriptor::CallbackSpec;

/// Engine-root-owned token table.
pub(crate) struct ListenerRegistry {
    session_id: String,
    counter: u64,
    bindings: FxHashMap<ListenerId, CallbackSpec>,
}

impl ListenerRegistry {
    pub(crate) fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            counter: 0,
            bindings: FxHashMap::default(),
        }
    }

    /// Allocates a fresh token for a binding. Tokens are domain-separated
    /// blake3 digests over (session id, counter): namespaced per session and
    /// not enumerable from DOM ids.
    pub(crate) fn register(&mut self, spec: CallbackSpec) -> ListenerId {
        let mut hasher = Hasher::new();
        hasher.update(b"listener:");
        hasher.update(self.session_id.as_bytes());
        hasher.update(&self.counter.to_le_bytes());
        self.counter += 1;

        let digest = hasher.finalize();
        let id = ListenerId(digest.to_hex().as_str()[..32].to_string());
        self.bindings.insert(id.clone(), spec);
        id
    }

    /// Drops a binding; stale client echoes of the token resolve to nothing.
    pub(crate) fn deregister(&mut self, id: &ListenerId) {
        self.bindings.remove(id);
    }

    /// Resolves a client-echoed token.
    pub(crate) fn lookup(&self, id: &ListenerId) -> Option<CallbackSpec> {
        self.bindings.get(id).cloned()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.bindings.len()
    }
}
