// SPDX-License-Identifier: Apache-2.0
//! Engine root: patch queue, event loop, callback routing.
//!
//! One [`Engine`] owns one shadow tree plus the engine-root singletons
//! (id generators, listener registry, head registry, output queue). It is a
//! single-threaded, cooperative structure: every tree mutation runs on the
//! caller's task, and all patches produced by one top-level update commit as
//! one ordered batch.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashSet;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use umbra_proto::{DomId, EventPayload, IdNode, ListenerId, Patch, PatchSet};

use crate::component::{ComponentResolver, EngineEvent, ScopeId};
use crate::descriptor::Descriptor;
use crate::listener::ListenerRegistry;
use crate::vnode::{Ctx, DocumentNode, HeadRegistry};

/// Session-level engine settings.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Identifier namespacing generated listener tokens; supplied by the
    /// session transport.
    pub session_id: String,
    /// Text rendered in the placeholder subtree substituted for a failed
    /// component render.
    pub error_placeholder: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session_id: "local".to_string(),
            error_placeholder: "component failed to render".to_string(),
        }
    }
}

/// Engine-root-owned singletons shared by every node in the tree.
///
/// Interior mutability is `Cell`/`RefCell`: there is no preemptive
/// parallelism in the cooperative model, so no borrow is ever held across a
/// suspension point.
pub(crate) struct EngineShared {
    pub(crate) config: EngineConfig,
    pub(crate) resolver: Rc<dyn ComponentResolver>,
    pub(crate) listeners: RefCell<ListenerRegistry>,
    pub(crate) head: RefCell<HeadRegistry>,
    pub(crate) events: mpsc::UnboundedSender<EngineEvent>,
    dom_ids: Cell<u64>,
    scope_ids: Cell<u64>,
    assets_seen: RefCell<FxHashSet<String>>,
}

impl EngineShared {
    /// Next process-unique DOM id, assigned in creation order and never
    /// reused.
    pub(crate) fn next_dom_id(&self) -> DomId {
        let next = self.dom_ids.get() + 1;
        self.dom_ids.set(next);
        DomId(next)
    }

    pub(crate) fn next_scope_id(&self) -> ScopeId {
        let next = self.scope_ids.get() + 1;
        self.scope_ids.set(next);
        ScopeId(next)
    }

    /// Records an asset sighting; true exactly once per filename.
    pub(crate) fn note_asset(&self, filename: &str) -> bool {
        self.assets_seen.borrow_mut().insert(filename.to_string())
    }
}

/// Server-side DOM engine for one session.
///
/// Not `Send` by design: the engine and its components run on one thread
/// inside a [`tokio::task::LocalSet`]. A threaded transport talks to it
/// through the patch queue and its own channel discipline.
pub struct Engine {
    shared: Rc<EngineShared>,
    document: DocumentNode,
    event_rx: mpsc::UnboundedReceiver<EngineEvent>,
    patch_tx: Option<mpsc::UnboundedSender<PatchSet>>,
    patch_rx: Mutex<mpsc::UnboundedReceiver<PatchSet>>,
    cancel: CancellationToken,
}

impl Engine {
    /// New engine with the given configuration and component resolver.
    #[must_use]
    pub fn new(config: EngineConfig, resolver: impl ComponentResolver + 'static) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (patch_tx, patch_rx) = mpsc::unbounded_channel();
        let session_id = config.session_id.clone();
        Self {
            shared: Rc::new(EngineShared {
                config,
                resolver: Rc::new(resolver),
                listeners: RefCell::new(ListenerRegistry::new(session_id)),
                head: RefCell::new(HeadRegistry::new()),
                events: event_tx,
                dom_ids: Cell::new(0),
                scope_ids: Cell::new(0),
                assets_seen: RefCell::new(FxHashSet::default()),
            }),
            document: DocumentNode::new(),
            event_rx,
            patch_tx: Some(patch_tx),
            patch_rx: Mutex::new(patch_rx),
            cancel: CancellationToken::new(),
        }
    }

    /// Diffs the tree against a new root descriptor.
    ///
    /// The resulting batch always commits, even when empty, so a transport
    /// (or a test) observes idempotent renders as empty patch sets. Rerender
    /// wakes raised during the pass (e.g. from mount hooks) are flushed as a
    /// follow-up batch.
    pub fn render(&mut self, descriptor: impl Into<Descriptor>) {
        let mut patches = PatchSet::new();
        {
            let mut ctx = Ctx {
                patches: &mut patches,
                shared: self.shared.as_ref(),
                slots: Rc::default(),
                cancel: self.cancel.clone(),
                path: Vec::new(),
            };
            self.document.update(descriptor.into(), &mut ctx);
            self.document.refresh_head(&mut ctx);
        }
        self.commit(patches);
        self.flush();
    }

    /// Serializes the current tree (synthetic head first) as HTML.
    #[must_use]
    pub fn to_html(&self) -> String {
        self.document.to_html()
    }

    /// Hydration id tree matching the HTML from [`Self::to_html`].
    #[must_use]
    pub fn dom_id_tree(&self) -> IdNode {
        self.document.id_tree()
    }

    /// Hydration patch for a freshly connected client.
    #[must_use]
    pub fn initialize_patch(&self) -> Patch {
        Patch::Initialize {
            id_tree: self.dom_id_tree(),
        }
    }

    /// Next committed patch batch; `None` once the engine has shut down and
    /// the queue drained.
    pub async fn dequeue(&self) -> Option<PatchSet> {
        self.patch_rx.lock().await.recv().await
    }

    /// Non-blocking variant of [`Self::dequeue`] for poll-style transports.
    pub fn try_dequeue(&mut self) -> Option<PatchSet> {
        self.patch_rx.get_mut().try_recv().ok()
    }

    /// Routes a client-originated event to the bound component method.
    ///
    /// Stale tokens (the client raced an unmount) resolve to nothing;
    /// handler faults are logged. Neither affects the render loop.
    pub fn callback(&mut self, listener: &ListenerId, payload: EventPayload) {
        let Some(spec) = self.shared.listeners.borrow().lookup(listener) else {
            tracing::debug!(%listener, "ignoring stale listener token");
            return;
        };
        match self.document.deliver(spec.scope, &spec.method, &payload) {
            None => tracing::warn!(
                scope = %spec.scope,
                method = %spec.method,
                "listener bound to a scope that no longer exists"
            ),
            Some(Err(fault)) => tracing::warn!(
                scope = %spec.scope,
                method = %spec.method,
                "callback fault: {fault}"
            ),
            Some(Ok(())) => {}
        }
        self.flush();
    }

    /// Processes pending rerender wakes and component emits without
    /// blocking, committing at most one batch.
    pub fn flush(&mut self) {
        let mut events = Vec::new();
        while let Ok(event) = self.event_rx.try_recv() {
            events.push(event);
        }
        self.process_events(events);
    }

    /// Drives the engine until [`Self::shutdown`]. Wakes for one event,
    /// drains the rest of the queue, and commits the coalesced pass as one
    /// batch.
    pub async fn run(&mut self) {
        let cancel = self.cancel.clone();
        loop {
            let first = tokio::select! {
                () = cancel.cancelled() => return,
                event = self.event_rx.recv() => event,
            };
            let Some(first) = first else { return };
            let mut events = vec![first];
            while let Ok(event) = self.event_rx.try_recv() {
                events.push(event);
            }
            self.process_events(events);
        }
    }

    /// Commits a liveness probe.
    pub fn ping(&self, timestamp: u64) {
        let mut set = PatchSet::new();
        set.push(Patch::Ping { timestamp });
        self.commit(set);
    }

    /// Commits an opaque state handoff supplied by the state-serialization
    /// collaborator.
    pub fn transfer(&self, payload: Vec<u8>) {
        let mut set = PatchSet::new();
        set.push(Patch::Transfer { payload });
        self.commit(set);
    }

    /// Unmounts the whole tree and closes the patch queue. One-way: the
    /// cancellation reaches every component task, and `dequeue` returns
    /// `None` after the final batch.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        let mut patches = PatchSet::new();
        {
            let mut ctx = Ctx {
                patches: &mut patches,
                shared: self.shared.as_ref(),
                slots: Rc::default(),
                cancel: self.cancel.clone(),
                path: Vec::new(),
            };
            self.document.unmount_all(&mut ctx);
        }
        self.commit(patches);
        self.patch_tx = None;
    }

    /// Rerender wakes coalesce per scope: however many times a component
    /// signalled since the last pass, it renders once.
    fn process_events(&mut self, events: Vec<EngineEvent>) {
        if events.is_empty() {
            return;
        }
        let mut patches = PatchSet::new();
        let mut scopes: Vec<ScopeId> = Vec::new();
        for event in events {
            match event {
                EngineEvent::Rerender(scope) => {
                    if !scopes.contains(&scope) {
                        scopes.push(scope);
                    }
                }
                EngineEvent::Emit { name, payload } => {
                    patches.push(Patch::Event { name, payload });
                }
            }
        }
        {
            let mut ctx = Ctx {
                patches: &mut patches,
                shared: self.shared.as_ref(),
                slots: Rc::default(),
                cancel: self.cancel.clone(),
                path: Vec::new(),
            };
            for scope in scopes {
                if !self.document.rerender_scope(scope, &mut ctx) {
                    tracing::debug!(%scope, "dropping rerender wake for unmounted scope");
                }
            }
            self.document.refresh_head(&mut ctx);
        }
        if !patches.is_empty() {
            self.commit(patches);
        }
    }

    fn commit(&self, patches: PatchSet) {
        if let Some(tx) = &self.patch_tx {
            let _ = tx.send(patches);
        }
    }
}
