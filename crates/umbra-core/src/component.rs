// SPDX-License-Identifier: Apache-2.0
//! Component seam.
//!
//! Collaborators (the template compiler, application code) supply behavior
//! through [`Component`] instances created by a [`ComponentResolver`]. Each
//! live instance gets a [`Scope`]: the capability handle it uses to request
//! rerenders, bind event callbacks, emit client events, and run background
//! tasks that die with the component.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use umbra_proto::EventPayload;

use crate::descriptor::{CallbackSpec, Descriptor, PropValue, Props};

/// Engine-assigned identity of one live component instance.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ScopeId(pub u64);

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Failure at the component boundary.
///
/// Nothing in this enum unwinds past the owning component: render faults
/// become a diagnostic patch plus a placeholder subtree, event faults are
/// logged, and the rest of the tree is unaffected.
#[derive(Debug, Error)]
pub enum RenderFault {
    /// Application-reported render failure.
    #[error("{0}")]
    Message(String),
    /// An event arrived for a method the component does not handle.
    #[error("unknown callback method `{method}`")]
    UnknownMethod {
        /// Requested method name.
        method: String,
    },
    /// The resolver does not know the requested component type.
    #[error("unknown component type `{type_name}`")]
    UnknownComponent {
        /// Requested type name.
        type_name: String,
    },
}

impl RenderFault {
    /// Convenience constructor for application-reported failures.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Stable kind identifier used in diagnostic patches.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "render",
            Self::UnknownMethod { .. } => "unknown_method",
            Self::UnknownComponent { .. } => "unknown_component",
        }
    }
}

/// Internal wake delivered from scopes to the engine event loop.
#[derive(Debug)]
pub(crate) enum EngineEvent {
    /// A component requested a rerender; coalesced per scope before the loop
    /// reconciles.
    Rerender(ScopeId),
    /// A component emitted a client-bound event.
    Emit {
        /// Event name.
        name: String,
        /// Opaque payload forwarded to the client.
        payload: EventPayload,
    },
}

/// Capability handle given to a component at construction.
///
/// Cloneable and cheap; a component typically keeps one and hands clones to
/// the futures it spawns.
#[derive(Clone, Debug)]
pub struct Scope {
    id: ScopeId,
    events: mpsc::UnboundedSender<EngineEvent>,
    cancel: CancellationToken,
}

impl Scope {
    pub(crate) fn new(
        id: ScopeId,
        events: mpsc::UnboundedSender<EngineEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self { id, events, cancel }
    }

    /// Identity of the owning component instance.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Requests a rerender of the owning component.
    ///
    /// Idempotent between loop wakes: multiple pending requests coalesce
    /// into one render pass. State-mutating component methods call this
    /// after mutating.
    pub fn rerender(&self) {
        let _ = self.events.send(EngineEvent::Rerender(self.id));
    }

    /// Binds one of the component's methods as an event-handler prop value.
    #[must_use]
    pub fn callback(&self, method: impl Into<Arc<str>>) -> PropValue {
        PropValue::Callback(CallbackSpec {
            scope: self.id,
            method: method.into(),
        })
    }

    /// Emits a named event to the client, outside the DOM patch vocabulary.
    pub fn emit(&self, name: impl Into<String>, payload: EventPayload) {
        let _ = self.events.send(EngineEvent::Emit {
            name: name.into(),
            payload,
        });
    }

    /// Spawns a background task scoped to the component's lifetime.
    ///
    /// The future is dropped when the component unmounts. Must run inside a
    /// [`tokio::task::LocalSet`]; the engine is single-threaded by design.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + 'static,
    {
        let cancel = self.cancel.clone();
        tokio::task::spawn_local(async move {
            tokio::select! {
                () = cancel.cancelled() => {}
                () = future => {}
            }
        });
    }

    /// Cancellation signal observed by the component's background tasks.
    #[must_use]
    pub fn cancelled(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// One live component instance.
///
/// Implementations hold their own state; the engine drives the lifecycle:
/// `render` on every (re)render, `mount` once after the initial subtree is
/// built, `set_props` when the parent passes new props, `handle_event` for
/// client callbacks, `unmount` exactly once at teardown.
pub trait Component {
    /// Produces the descriptor tree for the current state.
    ///
    /// # Errors
    ///
    /// A fault here is isolated: the engine emits a diagnostic patch and
    /// substitutes a placeholder subtree.
    fn render(&self) -> Result<Descriptor, RenderFault>;

    /// Called once after the component's initial subtree has mounted.
    fn mount(&mut self, _scope: &Scope) {}

    /// Called exactly once when the component unmounts.
    fn unmount(&mut self) {}

    /// Replaces the props passed down by the parent.
    fn set_props(&mut self, _props: Props) {}

    /// Invokes a callback method bound through [`Scope::callback`].
    ///
    /// # Errors
    ///
    /// Faults are logged by the engine and do not affect the render loop.
    fn handle_event(&mut self, method: &str, _payload: EventPayload) -> Result<(), RenderFault> {
        Err(RenderFault::UnknownMethod {
            method: method.to_string(),
        })
    }
}

/// Diagnostic metadata for one component type, used in render-error patches.
#[derive(Clone, Default, Debug)]
pub struct ComponentMeta {
    /// Source path of the module that defines the component.
    pub file: Option<String>,
    /// Original template source for overlay display.
    pub source: Option<String>,
}

/// Collaborator that maps component type names to live instances.
pub trait ComponentResolver {
    /// Instantiates a component of the given registered type.
    ///
    /// Constructor side effects must be deferred to [`Component::mount`].
    ///
    /// # Errors
    ///
    /// Returns [`RenderFault::UnknownComponent`] for unregistered types; the
    /// engine isolates the failure like any other render fault.
    fn resolve(
        &self,
        type_name: &str,
        props: &Props,
        scope: &Scope,
    ) -> Result<Box<dyn Component>, RenderFault>;

    /// Stylesheet assets attached to the given component type, surfaced as
    /// `AddStyleSheet` patches and synthetic head links exactly once each.
    fn assets_for(&self, _type_name: &str) -> Vec<String> {
        Vec::new()
    }

    /// Diagnostic metadata for render-error patches.
    fn component_meta(&self, _type_name: &str) -> Option<ComponentMeta> {
        None
    }
}

/// Resolver for descriptor-only sessions; rejects every component type.
#[derive(Clone, Copy, Default, Debug)]
pub struct NoComponents;

impl ComponentResolver for NoComponents {
    fn resolve(
        &self,
        type_name: &str,
        _props: &Props,
        _scope: &Scope,
    ) -> Result<Box<dyn Component>, RenderFault> {
        Err(RenderFault::UnknownComponent {
            type_name: type_name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rerender_wakes_carry_the_scope_id() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scope = Scope::new(ScopeId(9), tx, CancellationToken::new());
        scope.rerender();
        scope.rerender();
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Rerender(ScopeId(9)))));
        assert!(matches!(rx.try_recv(), Ok(EngineEvent::Rerender(ScopeId(9)))));
    }

    #[test]
    fn callback_binds_scope_and_method() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let scope = Scope::new(ScopeId(3), tx, CancellationToken::new());
        let PropValue::Callback(spec) = scope.callback("increment") else {
            unreachable!("callback() always builds a callback prop");
        };
        assert_eq!(spec.scope, ScopeId(3));
        assert_eq!(spec.method.as_ref(), "increment");
    }
}
