// SPDX-License-Identifier: Apache-2.0
//! Stateful shadow tree and the children reconciliation algorithm.
//!
//! Each live VNode mirrors one descriptor, owns a process-unique [`DomId`]
//! for its whole DOM lifetime, and knows how to mount, update against a new
//! descriptor, and unmount, emitting patches into the pass-scoped
//! [`PatchSet`] as a side effect. Children are matched by identity hash with
//! FIFO order within each hash bucket: O(n), stable for keyed and unkeyed
//! lists, and deliberately not a minimal-edit-distance diff.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use umbra_proto::{DomId, EventPayload, IdNode, ListenerId, Patch, PatchSet, RenderErrorPatch};

use crate::component::{Component, RenderFault, Scope, ScopeId};
use crate::descriptor::{
    identity_hash, normalize_children, CallbackSpec, Descriptor, ElementDescriptor, ElementKind,
    IdentityHash, PropValue, Props, SlotContent,
};
use crate::engine::EngineShared;
use crate::html::{attribute_name, escape_attribute, escape_comment, escape_text, is_void_element};
use crate::style::{diff_style, style_to_css, StyleMap};

/// Per-pass reconciliation context.
///
/// One `Ctx` lives for one top-level update; every patch-emitting operation
/// invoked while it is open appends to the same set, which is what makes a
/// whole pass commit as a single ordered batch.
pub(crate) struct Ctx<'a> {
    /// Open patch set of the current pass.
    pub(crate) patches: &'a mut PatchSet,
    /// Engine-root-owned singletons.
    pub(crate) shared: &'a EngineShared,
    /// Projected children of the nearest enclosing component.
    pub(crate) slots: Rc<SlotContent>,
    /// Cancellation parent for components created during this pass.
    pub(crate) cancel: CancellationToken,
    /// Component ancestry, for render-error diagnostics.
    pub(crate) path: Vec<String>,
}

/// Listener reference written into event-handler attributes.
fn listener_js_reference(token: &ListenerId) -> String {
    format!("Umbra.callback(event,'{token}')")
}

// ---------------------------------------------------------------------------
// Children list
// ---------------------------------------------------------------------------

/// Ordered list container for the live children of one tree position.
///
/// `parent` is set only for the list that owns the complete child list of a
/// DOM element; nested lists (component and slot output) never emit
/// `ReplaceChildren` themselves, the enclosing element-level list does.
pub(crate) struct ChildrenNode {
    parent: Option<DomId>,
    nodes: Vec<VNode>,
    order: Vec<DomId>,
}

impl ChildrenNode {
    pub(crate) fn new(parent: Option<DomId>) -> Self {
        Self {
            parent,
            nodes: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Reconciles the live children against a new descriptor list.
    ///
    /// Existing nodes are grouped into FIFO buckets by identity hash; each
    /// new descriptor pops a match from the front of its bucket and updates
    /// it in place, or mounts a fresh node. Leftovers unmount. One
    /// `ReplaceChildren` is emitted when and only when the root id sequence
    /// changed.
    pub(crate) fn reconcile(&mut self, children: Vec<Descriptor>, ctx: &mut Ctx<'_>) {
        let descriptors = normalize_children(children);

        let mut buckets: FxHashMap<IdentityHash, VecDeque<usize>> = FxHashMap::default();
        for (index, node) in self.nodes.iter().enumerate() {
            buckets.entry(node.identity()).or_default().push_back(index);
        }
        let mut existing: Vec<Option<VNode>> = self.nodes.drain(..).map(Some).collect();

        let mut next = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let hash = identity_hash(&descriptor);
            let matched = buckets
                .get_mut(&hash)
                .and_then(VecDeque::pop_front)
                .and_then(|index| existing[index].take());
            match matched {
                Some(mut node) => {
                    node.update(descriptor, ctx);
                    next.push(node);
                }
                None => next.push(VNode::mount(descriptor, ctx)),
            }
        }

        // Leftovers unmount in their original relative order.
        for node in existing.into_iter().flatten() {
            node.unmount(ctx, true);
        }

        self.nodes = next;
        self.refresh_order(ctx);
    }

    /// Recomputes the root id sequence, emitting `ReplaceChildren` when this
    /// list owns a DOM parent and the sequence changed.
    pub(crate) fn refresh_order(&mut self, ctx: &mut Ctx<'_>) {
        let mut order = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            node.dom_root_ids(&mut order);
        }
        if order != self.order {
            if let Some(parent_id) = self.parent {
                ctx.patches.push(Patch::ReplaceChildren {
                    parent_id,
                    child_ids: order.clone(),
                });
            }
            self.order = order;
        }
    }

    pub(crate) fn unmount_all(&mut self, ctx: &mut Ctx<'_>, remove_dom: bool) {
        for node in self.nodes.drain(..) {
            node.unmount(ctx, remove_dom);
        }
        self.order.clear();
    }

    pub(crate) fn dom_root_ids(&self, out: &mut Vec<DomId>) {
        for node in &self.nodes {
            node.dom_root_ids(out);
        }
    }

    pub(crate) fn write_html(&self, out: &mut String) {
        for node in &self.nodes {
            node.write_html(out);
        }
    }

    pub(crate) fn id_nodes(&self, out: &mut Vec<IdNode>) {
        for node in &self.nodes {
            node.id_nodes(out);
        }
    }

    /// Finds and rerenders the component owning `scope`; on the unwind path
    /// every list refreshes its order so a changed component root bubbles up
    /// to the nearest element-owned list.
    pub(crate) fn rerender_scope(&mut self, scope: ScopeId, ctx: &mut Ctx<'_>) -> bool {
        let mut found = false;
        for node in &mut self.nodes {
            if node.rerender_scope(scope, ctx) {
                found = true;
                break;
            }
        }
        if found {
            self.refresh_order(ctx);
        }
        found
    }

    pub(crate) fn deliver(
        &mut self,
        scope: ScopeId,
        method: &str,
        payload: &EventPayload,
    ) -> Option<Result<(), RenderFault>> {
        self.nodes
            .iter_mut()
            .find_map(|node| node.deliver(scope, method, payload))
    }
}

// ---------------------------------------------------------------------------
// VNode variants
// ---------------------------------------------------------------------------

/// One live shadow node.
pub(crate) enum VNode {
    Element(ElementNode),
    Text(TextNode),
    Comment(CommentNode),
    Component(ComponentNode),
    Slot(SlotNode),
    Head(HeadNode),
}

impl VNode {
    fn mount(descriptor: Descriptor, ctx: &mut Ctx<'_>) -> Self {
        let identity = identity_hash(&descriptor);
        match descriptor {
            Descriptor::Element(el) => match el.kind.clone() {
                ElementKind::Tag(tag) => Self::Element(ElementNode::mount(identity, tag, el, ctx)),
                ElementKind::Component(name) => {
                    Self::Component(ComponentNode::mount(identity, name, el, ctx))
                }
                ElementKind::Slot => Self::Slot(SlotNode::mount(identity, &el, ctx)),
                ElementKind::Head => Self::Head(HeadNode::mount(identity, el, ctx)),
            },
            Descriptor::Text(content) => Self::Text(TextNode::mount(identity, &content, ctx)),
            Descriptor::Comment(content) => {
                Self::Comment(CommentNode::mount(identity, &content, ctx))
            }
            Descriptor::Fragment(_) | Descriptor::Nothing => {
                unreachable!("fragments and nothing are normalized away before mounting")
            }
        }
    }

    fn identity(&self) -> IdentityHash {
        match self {
            Self::Element(n) => n.identity,
            Self::Text(n) => n.identity,
            Self::Comment(n) => n.identity,
            Self::Component(n) => n.identity,
            Self::Slot(n) => n.identity,
            Self::Head(n) => n.identity,
        }
    }

    fn update(&mut self, descriptor: Descriptor, ctx: &mut Ctx<'_>) {
        match (&mut *self, descriptor) {
            (Self::Element(node), Descriptor::Element(el)) => node.update(el, ctx),
            (Self::Component(node), Descriptor::Element(el)) => node.update(el, ctx),
            (Self::Slot(node), Descriptor::Element(_)) => node.update(ctx),
            (Self::Head(node), Descriptor::Element(el)) => node.update(el, ctx),
            (Self::Text(node), Descriptor::Text(content)) => node.update(&content, ctx),
            (Self::Comment(node), Descriptor::Comment(content)) => node.update(&content, ctx),
            _ => unreachable!("identity match guarantees a shape match"),
        }
    }

    /// Releases the node. `remove_dom` is true only for the detachment
    /// roots: a removed element destroys its client subtree with one
    /// `RemoveNode`, so descendants release resources without emitting.
    fn unmount(self, ctx: &mut Ctx<'_>, remove_dom: bool) {
        match self {
            Self::Element(node) => node.unmount(ctx, remove_dom),
            Self::Text(node) => node.unmount(ctx, remove_dom),
            Self::Comment(node) => node.unmount(ctx, remove_dom),
            Self::Component(node) => node.unmount(ctx, remove_dom),
            Self::Slot(node) => node.unmount(ctx, remove_dom),
            Self::Head(node) => node.unmount(ctx),
        }
    }

    /// DOM root ids this node contributes to its parent's child list.
    fn dom_root_ids(&self, out: &mut Vec<DomId>) {
        match self {
            Self::Element(n) => out.push(n.id),
            Self::Text(n) => out.push(n.id),
            Self::Comment(n) => out.push(n.id),
            Self::Component(n) => n.children.dom_root_ids(out),
            Self::Slot(n) => n.children.dom_root_ids(out),
            Self::Head(_) => {}
        }
    }

    fn write_html(&self, out: &mut String) {
        match self {
            Self::Element(n) => n.write_html(out),
            Self::Text(n) => n.write_html(out),
            Self::Comment(n) => n.write_html(out),
            Self::Component(n) => n.children.write_html(out),
            Self::Slot(n) => n.children.write_html(out),
            Self::Head(_) => {}
        }
    }

    fn id_nodes(&self, out: &mut Vec<IdNode>) {
        match self {
            Self::Element(n) => out.push(n.id_node()),
            Self::Text(n) => out.push(IdNode::leaf(n.id, "#text")),
            Self::Comment(n) => out.push(IdNode::leaf(n.id, "#comment")),
            Self::Component(n) => n.children.id_nodes(out),
            Self::Slot(n) => n.children.id_nodes(out),
            Self::Head(_) => {}
        }
    }

    fn rerender_scope(&mut self, scope: ScopeId, ctx: &mut Ctx<'_>) -> bool {
        match self {
            Self::Element(n) => n.children.rerender_scope(scope, ctx),
            Self::Component(n) => n.rerender_scope(scope, ctx),
            Self::Slot(n) => n.children.rerender_scope(scope, ctx),
            Self::Text(_) | Self::Comment(_) | Self::Head(_) => false,
        }
    }

    fn deliver(
        &mut self,
        scope: ScopeId,
        method: &str,
        payload: &EventPayload,
    ) -> Option<Result<(), RenderFault>> {
        match self {
            Self::Element(n) => n.children.deliver(scope, method, payload),
            Self::Component(n) => n.deliver(scope, method, payload),
            Self::Slot(n) => n.children.deliver(scope, method, payload),
            Self::Text(_) | Self::Comment(_) | Self::Head(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

pub(crate) struct ElementNode {
    identity: IdentityHash,
    id: DomId,
    tag: Arc<str>,
    props: Props,
    /// Live listener tokens per event-handler prop name.
    listeners: BTreeMap<Arc<str>, (ListenerId, CallbackSpec)>,
    children: ChildrenNode,
}

impl ElementNode {
    pub(crate) fn mount(
        identity: IdentityHash,
        tag: Arc<str>,
        el: ElementDescriptor,
        ctx: &mut Ctx<'_>,
    ) -> Self {
        let id = ctx.shared.next_dom_id();
        ctx.patches.push(Patch::CreateElement {
            id,
            tag: tag.to_string(),
        });
        let mut node = Self {
            identity,
            id,
            tag,
            props: Props::new(),
            listeners: BTreeMap::new(),
            children: ChildrenNode::new(Some(id)),
        };
        node.diff_props(el.props, ctx);
        node.children.reconcile(el.children, ctx);
        node
    }

    fn update(&mut self, el: ElementDescriptor, ctx: &mut Ctx<'_>) {
        self.diff_props(el.props, ctx);
        self.children.reconcile(el.children, ctx);
    }

    fn unmount(mut self, ctx: &mut Ctx<'_>, remove_dom: bool) {
        self.children.unmount_all(ctx, false);
        for (token, _) in self.listeners.values() {
            ctx.shared.listeners.borrow_mut().deregister(token);
        }
        if remove_dom {
            ctx.patches.push(Patch::RemoveNode { id: self.id });
        }
    }

    /// Diffs old against new props over the union of their keys (§4.4):
    /// style maps per CSS property, `on*` props through the listener
    /// registry, `class` through its fast path, everything else as a plain
    /// attribute with string-equality skip.
    fn diff_props(&mut self, new: Props, ctx: &mut Ctx<'_>) {
        let old = mem::take(&mut self.props);
        let keys: BTreeSet<Arc<str>> = old.keys().chain(new.keys()).cloned().collect();
        for name in &keys {
            self.diff_prop(name, old.get(name), new.get(name), ctx);
        }
        self.props = new;
    }

    fn diff_prop(
        &mut self,
        name: &Arc<str>,
        old: Option<&PropValue>,
        new: Option<&PropValue>,
        ctx: &mut Ctx<'_>,
    ) {
        fn as_style(v: Option<&PropValue>) -> Option<&StyleMap> {
            match v {
                Some(PropValue::Style(map)) => Some(map),
                _ => None,
            }
        }
        if name.as_ref() == "style" && (as_style(old).is_some() || as_style(new).is_some()) {
            diff_style(self.id, as_style(old), as_style(new), ctx.patches);
            return;
        }
        if name.starts_with("on") {
            self.diff_listener(name, new, ctx);
            return;
        }

        let was_set = old.is_some_and(|v| !v.is_falsy());
        match new {
            Some(value) if !value.is_falsy() => {
                let rendered = value.stringify();
                if was_set && old.map(PropValue::stringify) == Some(rendered.clone()) {
                    return;
                }
                if name.as_ref() == "class" {
                    ctx.patches.push(Patch::SetClassName {
                        id: self.id,
                        value: rendered,
                    });
                } else {
                    ctx.patches.push(Patch::SetAttribute {
                        id: self.id,
                        name: attribute_name(name),
                        value: rendered,
                    });
                }
            }
            _ if was_set => ctx.patches.push(Patch::RemoveAttribute {
                id: self.id,
                name: attribute_name(name),
            }),
            _ => {}
        }
    }

    /// Listener identity is (scope, method) equality: an unchanged binding
    /// keeps its token and emits nothing.
    fn diff_listener(&mut self, name: &Arc<str>, new: Option<&PropValue>, ctx: &mut Ctx<'_>) {
        let new_spec = match new {
            Some(PropValue::Callback(spec)) => Some(spec),
            _ => None,
        };
        let unchanged = matches!(
            (self.listeners.get(name), new_spec),
            (Some((_, bound)), Some(spec)) if bound == spec
        );
        if unchanged {
            return;
        }
        let previous = self.listeners.remove(name);
        if let Some((token, _)) = &previous {
            ctx.shared.listeners.borrow_mut().deregister(token);
        }
        match new_spec {
            Some(spec) => {
                let token = ctx.shared.listeners.borrow_mut().register(spec.clone());
                ctx.patches.push(Patch::SetAttribute {
                    id: self.id,
                    name: attribute_name(name),
                    value: listener_js_reference(&token),
                });
                self.listeners.insert(name.clone(), (token, spec.clone()));
            }
            None => {
                if previous.is_some() {
                    ctx.patches.push(Patch::RemoveAttribute {
                        id: self.id,
                        name: attribute_name(name),
                    });
                }
            }
        }
    }

    fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (name, value) in &self.props {
            if value.is_falsy() {
                continue;
            }
            out.push(' ');
            match value {
                PropValue::Bool(true) => out.push_str(&attribute_name(name)),
                PropValue::Callback(_) => {
                    out.push_str(&attribute_name(name));
                    out.push_str("=\"");
                    if let Some((token, _)) = self.listeners.get(name) {
                        escape_attribute(&listener_js_reference(token), out);
                    }
                    out.push('"');
                }
                PropValue::Style(map) => {
                    out.push_str("style=\"");
                    escape_attribute(&style_to_css(map), out);
                    out.push('"');
                }
                other => {
                    out.push_str(&attribute_name(name));
                    out.push_str("=\"");
                    escape_attribute(&other.stringify(), out);
                    out.push('"');
                }
            }
        }
        out.push('>');
        if is_void_element(&self.tag) {
            return;
        }
        self.children.write_html(out);
        out.push_str("</");
        out.push_str(&self.tag);
        out.push('>');
    }

    fn id_node(&self) -> IdNode {
        let mut children = Vec::new();
        self.children.id_nodes(&mut children);
        IdNode::branch(self.id, self.tag.to_uppercase(), children)
    }
}

// ---------------------------------------------------------------------------
// Text & comment
// ---------------------------------------------------------------------------

pub(crate) struct TextNode {
    identity: IdentityHash,
    id: DomId,
    content: Arc<str>,
}

impl TextNode {
    fn mount(identity: IdentityHash, content: &Arc<str>, ctx: &mut Ctx<'_>) -> Self {
        let id = ctx.shared.next_dom_id();
        ctx.patches.push(Patch::CreateTextNode {
            id,
            content: content.to_string(),
        });
        Self {
            identity,
            id,
            content: content.clone(),
        }
    }

    fn update(&mut self, content: &Arc<str>, ctx: &mut Ctx<'_>) {
        if self.content.as_ref() != content.as_ref() {
            ctx.patches.push(Patch::SetTextContent {
                id: self.id,
                content: content.to_string(),
            });
            self.content = content.clone();
        }
    }

    fn unmount(self, ctx: &mut Ctx<'_>, remove_dom: bool) {
        if remove_dom {
            ctx.patches.push(Patch::RemoveNode { id: self.id });
        }
    }

    fn write_html(&self, out: &mut String) {
        if self.content.is_empty() {
            // An empty text node would be dropped by the HTML parser and
            // break hydration id assignment.
            out.push_str("&ZeroWidthSpace;");
        } else {
            escape_text(&self.content, out);
        }
    }
}

pub(crate) struct CommentNode {
    identity: IdentityHash,
    id: DomId,
    content: Arc<str>,
}

impl CommentNode {
    fn mount(identity: IdentityHash, content: &Arc<str>, ctx: &mut Ctx<'_>) -> Self {
        let id = ctx.shared.next_dom_id();
        ctx.patches.push(Patch::CreateComment {
            id,
            content: content.to_string(),
        });
        Self {
            identity,
            id,
            content: content.clone(),
        }
    }

    fn update(&mut self, content: &Arc<str>, ctx: &mut Ctx<'_>) {
        if self.content.as_ref() != content.as_ref() {
            ctx.patches.push(Patch::SetTextContent {
                id: self.id,
                content: content.to_string(),
            });
            self.content = content.clone();
        }
    }

    fn unmount(self, ctx: &mut Ctx<'_>, remove_dom: bool) {
        if remove_dom {
            ctx.patches.push(Patch::RemoveNode { id: self.id });
        }
    }

    fn write_html(&self, out: &mut String) {
        out.push_str("<!--");
        out.push_str(&escape_comment(&self.content));
        out.push_str("-->");
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

pub(crate) struct ComponentNode {
    identity: IdentityHash,
    scope_id: ScopeId,
    type_name: Arc<str>,
    /// `None` when the resolver rejected the type; the node then renders the
    /// placeholder until unmounted.
    instance: Option<Box<dyn Component>>,
    scope: Scope,
    cancel: CancellationToken,
    slots: Rc<SlotContent>,
    children: ChildrenNode,
}

impl ComponentNode {
    fn mount(
        identity: IdentityHash,
        type_name: Arc<str>,
        el: ElementDescriptor,
        ctx: &mut Ctx<'_>,
    ) -> Self {
        let scope_id = ctx.shared.next_scope_id();
        let cancel = ctx.cancel.child_token();
        let scope = Scope::new(scope_id, ctx.shared.events.clone(), cancel.clone());

        let mut node = Self {
            identity,
            scope_id,
            type_name: type_name.clone(),
            instance: None,
            scope,
            cancel,
            slots: Rc::new(SlotContent::group(el.children)),
            children: ChildrenNode::new(None),
        };

        match ctx
            .shared
            .resolver
            .resolve(&type_name, &el.props, &node.scope)
        {
            Ok(instance) => node.instance = Some(instance),
            Err(fault) => node.report_fault(&fault, ctx),
        }

        for asset in ctx.shared.resolver.assets_for(&type_name) {
            if ctx.shared.note_asset(&asset) {
                ctx.patches.push(Patch::AddStyleSheet {
                    filename: asset.clone(),
                });
                ctx.shared.head.borrow_mut().add_asset(asset);
            }
        }

        node.render_into(ctx);
        if let Some(instance) = &mut node.instance {
            instance.mount(&node.scope);
        }
        node
    }

    /// Parent passed new props and children: props are replaced and a render
    /// is forced regardless, since slots may depend on the projected
    /// children even when props are unchanged.
    fn update(&mut self, el: ElementDescriptor, ctx: &mut Ctx<'_>) {
        self.slots = Rc::new(SlotContent::group(el.children));
        if let Some(instance) = &mut self.instance {
            instance.set_props(el.props);
        }
        self.render_into(ctx);
    }

    /// Renders the instance and diffs the result into the children list,
    /// with slot content, cancellation parent, and ancestry path scoped to
    /// this component.
    fn render_into(&mut self, ctx: &mut Ctx<'_>) {
        let rendered = match &self.instance {
            Some(instance) => match instance.render() {
                Ok(descriptor) => descriptor,
                Err(fault) => {
                    self.report_fault(&fault, ctx);
                    self.placeholder(ctx)
                }
            },
            None => self.placeholder(ctx),
        };

        let prev_slots = mem::replace(&mut ctx.slots, Rc::clone(&self.slots));
        let prev_cancel = mem::replace(&mut ctx.cancel, self.cancel.clone());
        ctx.path.push(self.type_name.to_string());
        self.children.reconcile(vec![rendered], ctx);
        ctx.path.pop();
        ctx.cancel = prev_cancel;
        ctx.slots = prev_slots;
    }

    fn placeholder(&self, ctx: &Ctx<'_>) -> Descriptor {
        Descriptor::tag("div")
            .with_prop("class", "umbra-render-error")
            .with_child(ctx.shared.config.error_placeholder.as_str())
            .into()
    }

    /// Converts a component-boundary fault into a diagnostic patch. Nothing
    /// unwinds past this point; siblings and ancestors are unaffected.
    fn report_fault(&self, fault: &RenderFault, ctx: &mut Ctx<'_>) {
        tracing::error!(
            component = %self.type_name,
            scope = %self.scope_id,
            kind = fault.kind(),
            "component render fault: {fault}"
        );
        let meta = ctx
            .shared
            .resolver
            .component_meta(&self.type_name)
            .unwrap_or_default();
        let captured = Backtrace::capture();
        let backtrace = if captured.status() == BacktraceStatus::Captured {
            captured.to_string().lines().map(str::to_string).collect()
        } else {
            Vec::new()
        };
        let mut tree_path = ctx.path.clone();
        tree_path.push(self.type_name.to_string());
        ctx.patches.push(Patch::RenderError(RenderErrorPatch {
            file: meta.file,
            kind: fault.kind().to_string(),
            message: fault.to_string(),
            backtrace,
            source: meta.source,
            tree_path,
        }));
    }

    /// Teardown order: cancellation first (stops scope-spawned tasks), then
    /// children, then the instance hook.
    fn unmount(mut self, ctx: &mut Ctx<'_>, remove_dom: bool) {
        self.cancel.cancel();
        self.children.unmount_all(ctx, remove_dom);
        if let Some(instance) = &mut self.instance {
            instance.unmount();
        }
    }

    fn rerender_scope(&mut self, scope: ScopeId, ctx: &mut Ctx<'_>) -> bool {
        if self.scope_id == scope {
            self.render_into(ctx);
            return true;
        }
        let prev_slots = mem::replace(&mut ctx.slots, Rc::clone(&self.slots));
        let prev_cancel = mem::replace(&mut ctx.cancel, self.cancel.clone());
        ctx.path.push(self.type_name.to_string());
        let found = self.children.rerender_scope(scope, ctx);
        ctx.path.pop();
        ctx.cancel = prev_cancel;
        ctx.slots = prev_slots;
        found
    }

    fn deliver(
        &mut self,
        scope: ScopeId,
        method: &str,
        payload: &EventPayload,
    ) -> Option<Result<(), RenderFault>> {
        if self.scope_id != scope {
            return self.children.deliver(scope, method, payload);
        }
        match &mut self.instance {
            Some(instance) => Some(instance.handle_event(method, payload.clone())),
            None => Some(Err(RenderFault::UnknownComponent {
                type_name: self.type_name.to_string(),
            })),
        }
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// Insertion point resolved against the owning component's projected
/// children; re-resolved on every update because the owner always forces a
/// render.
pub(crate) struct SlotNode {
    identity: IdentityHash,
    name: Option<Arc<str>>,
    children: ChildrenNode,
}

impl SlotNode {
    fn mount(identity: IdentityHash, el: &ElementDescriptor, ctx: &mut Ctx<'_>) -> Self {
        let name = match el.props.get("name") {
            Some(PropValue::Text(name)) => Some(name.clone()),
            _ => None,
        };
        let mut node = Self {
            identity,
            name,
            children: ChildrenNode::new(None),
        };
        node.update(ctx);
        node
    }

    fn update(&mut self, ctx: &mut Ctx<'_>) {
        let projected = ctx.slots.resolve(self.name.as_ref());
        self.children.reconcile(projected, ctx);
    }

    fn unmount(mut self, ctx: &mut Ctx<'_>, remove_dom: bool) {
        self.children.unmount_all(ctx, remove_dom);
    }
}

// ---------------------------------------------------------------------------
// Head contribution
// ---------------------------------------------------------------------------

/// A head descriptor occupies no tree position; it registers its children
/// with the engine's head registry and the document re-renders the synthetic
/// head after the pass.
pub(crate) struct HeadNode {
    identity: IdentityHash,
    key: u64,
    content: Vec<Descriptor>,
}

impl HeadNode {
    fn mount(identity: IdentityHash, el: ElementDescriptor, ctx: &mut Ctx<'_>) -> Self {
        let key = ctx.shared.head.borrow_mut().register(el.children.clone());
        Self {
            identity,
            key,
            content: el.children,
        }
    }

    fn update(&mut self, el: ElementDescriptor, ctx: &mut Ctx<'_>) {
        if self.content != el.children {
            ctx.shared
                .head
                .borrow_mut()
                .update(self.key, el.children.clone());
            self.content = el.children;
        }
    }

    fn unmount(self, ctx: &mut Ctx<'_>) {
        ctx.shared.head.borrow_mut().remove(self.key);
    }
}

// ---------------------------------------------------------------------------
// Head registry
// ---------------------------------------------------------------------------

/// Engine-root-owned collector for head contributions and stylesheet assets.
pub(crate) struct HeadRegistry {
    contributions: BTreeMap<u64, Vec<Descriptor>>,
    assets: Vec<String>,
    next_key: u64,
    dirty: bool,
}

impl HeadRegistry {
    pub(crate) fn new() -> Self {
        Self {
            contributions: BTreeMap::new(),
            assets: Vec::new(),
            next_key: 0,
            dirty: false,
        }
    }

    fn register(&mut self, content: Vec<Descriptor>) -> u64 {
        let key = self.next_key;
        self.next_key += 1;
        self.contributions.insert(key, content);
        self.dirty = true;
        key
    }

    fn update(&mut self, key: u64, content: Vec<Descriptor>) {
        self.contributions.insert(key, content);
        self.dirty = true;
    }

    fn remove(&mut self, key: u64) {
        if self.contributions.remove(&key).is_some() {
            self.dirty = true;
        }
    }

    fn add_asset(&mut self, filename: String) {
        self.assets.push(filename);
        self.dirty = true;
    }

    pub(crate) fn take_dirty(&mut self) -> bool {
        mem::take(&mut self.dirty)
    }

    /// Child descriptors of the synthetic head: stylesheet links first, then
    /// contributions in registration order, deduplicated by value so a
    /// contribution re-added with identical content appears exactly once.
    pub(crate) fn build_children(&self) -> Vec<Descriptor> {
        let mut out = Vec::new();
        for asset in &self.assets {
            out.push(
                Descriptor::tag("link")
                    .with_prop("rel", "stylesheet")
                    .with_prop("href", asset.as_str())
                    .into(),
            );
        }
        let mut seen: Vec<&Descriptor> = Vec::new();
        for content in self.contributions.values() {
            for descriptor in content {
                if !seen.contains(&descriptor) {
                    seen.push(descriptor);
                    out.push(descriptor.clone());
                }
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Root of the shadow tree: owns the user children list and the synthetic
/// head element fed by the head registry.
pub(crate) struct DocumentNode {
    id: DomId,
    head_element: Option<ElementNode>,
    children: ChildrenNode,
}

impl DocumentNode {
    pub(crate) fn new() -> Self {
        Self {
            id: DomId(0),
            head_element: None,
            // The client root's child list comes from hydration, not from a
            // ReplaceChildren patch, so the document list owns no DOM parent.
            children: ChildrenNode::new(None),
        }
    }

    pub(crate) fn update(&mut self, root: Descriptor, ctx: &mut Ctx<'_>) {
        self.children.reconcile(vec![root], ctx);
    }

    pub(crate) fn rerender_scope(&mut self, scope: ScopeId, ctx: &mut Ctx<'_>) -> bool {
        self.children.rerender_scope(scope, ctx)
    }

    pub(crate) fn deliver(
        &mut self,
        scope: ScopeId,
        method: &str,
        payload: &EventPayload,
    ) -> Option<Result<(), RenderFault>> {
        self.children.deliver(scope, method, payload)
    }

    /// Re-renders the synthetic head if any contributor changed during the
    /// pass; the head element exists only while the aggregate is non-empty.
    pub(crate) fn refresh_head(&mut self, ctx: &mut Ctx<'_>) {
        let children = {
            let mut registry = ctx.shared.head.borrow_mut();
            if !registry.take_dirty() {
                return;
            }
            registry.build_children()
        };

        if children.is_empty() {
            if let Some(head) = self.head_element.take() {
                head.unmount(ctx, true);
            }
            return;
        }
        match &mut self.head_element {
            Some(head) => head.children.reconcile(children, ctx),
            None => {
                let descriptor = Descriptor::tag("head").with_children(children);
                let identity = identity_hash(&Descriptor::Element(descriptor.clone()));
                self.head_element =
                    Some(ElementNode::mount(identity, Arc::from("head"), descriptor, ctx));
            }
        }
    }

    pub(crate) fn unmount_all(&mut self, ctx: &mut Ctx<'_>) {
        if let Some(head) = self.head_element.take() {
            head.unmount(ctx, true);
        }
        self.children.unmount_all(ctx, true);
    }

    pub(crate) fn to_html(&self) -> String {
        let mut out = String::new();
        if let Some(head) = &self.head_element {
            head.write_html(&mut out);
        }
        self.children.write_html(&mut out);
        out
    }

    pub(crate) fn id_tree(&self) -> IdNode {
        let mut children = Vec::new();
        if let Some(head) = &self.head_element {
            children.push(head.id_node());
        }
        self.children.id_nodes(&mut children);
        IdNode::branch(self.id, "#document", children)
    }
}
