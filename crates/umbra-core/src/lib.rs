// SPDX-License-Identifier: Apache-2.0
//! umbra-core: server-side DOM reconciliation engine.
//!
//! Components render immutable [`Descriptor`] trees; a stateful shadow tree
//! of VNodes diffs each new description against the previous one and emits an
//! ordered, atomically committed [`PatchSet`](umbra_proto::PatchSet) that a
//! transport mirrors into a browser DOM. The engine owns the listener
//! registry routing client events back into component methods, the head
//! aggregation side channel, and the per-component rerender/cancellation
//! machinery.
//!
//! The HTTP/session transport, the template compiler, and the asset pipeline
//! are external collaborators: they supply [`Component`] implementations
//! through a [`ComponentResolver`] and consume the patch stream via
//! [`Engine::dequeue`].
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod component;
mod descriptor;
mod engine;
mod html;
mod listener;
mod style;
mod vnode;

/// Component seam: instance trait, scope handle, resolver, render faults.
pub use component::{
    Component, ComponentMeta, ComponentResolver, NoComponents, RenderFault, Scope, ScopeId,
};
/// Declarative descriptor model.
pub use descriptor::{
    identity_hash, CallbackSpec, Descriptor, ElementDescriptor, ElementKind, IdentityHash,
    PropValue, Props,
};
/// Engine root and its configuration.
pub use engine::{Engine, EngineConfig};
/// Inline style value model.
pub use style::{StyleMap, StyleValue};

/// Re-exported wire types the engine surface speaks in.
pub use umbra_proto::{DomId, EventPayload, IdNode, ListenerId, Patch, PatchSet};
