// SPDX-License-Identifier: Apache-2.0
//! Immutable descriptor model.
//!
//! A [`Descriptor`] is the pure-data output of one component render: it says
//! what the UI should look like, nothing about how to get there. The
//! reconciler matches descriptors against live shadow nodes by
//! [`identity_hash`], which deliberately ignores deep content: two
//! descriptors with equal identity are "the same logical node" and the live
//! node is updated in place rather than recreated.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHasher};

use crate::component::ScopeId;
use crate::style::{style_to_css, StyleMap};

/// Ordered property map of an element or component descriptor.
pub type Props = BTreeMap<Arc<str>, PropValue>;

/// One property value.
#[derive(Clone, PartialEq, Debug)]
pub enum PropValue {
    /// Boolean attribute; `true` renders as a bare attribute name, `false`
    /// removes the attribute.
    Bool(bool),
    /// Numeric value, stringified on the wire.
    Number(f64),
    /// Plain text value.
    Text(Arc<str>),
    /// Inline style map, diffed per CSS property.
    Style(StyleMap),
    /// Event handler binding, materialized as an opaque listener token.
    Callback(CallbackSpec),
}

impl PropValue {
    /// True for values that remove the attribute rather than setting it.
    pub(crate) fn is_falsy(&self) -> bool {
        match self {
            Self::Bool(b) => !*b,
            Self::Text(t) => t.is_empty(),
            Self::Number(_) | Self::Style(_) | Self::Callback(_) => false,
        }
    }

    /// Attribute value as written to the DOM (styles and callbacks are
    /// handled by their own diff paths and never reach this).
    pub(crate) fn stringify(&self) -> String {
        match self {
            Self::Bool(_) => String::new(),
            Self::Number(n) => fmt_number(*n),
            Self::Text(t) => t.to_string(),
            Self::Style(map) => style_to_css(map),
            Self::Callback(_) => String::new(),
        }
    }
}

pub(crate) fn fmt_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let i = n as i64;
        i.to_string()
    } else {
        n.to_string()
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Text(Arc::from(v))
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Text(Arc::from(v.as_str()))
    }
}

impl From<StyleMap> for PropValue {
    fn from(v: StyleMap) -> Self {
        Self::Style(v)
    }
}

impl From<CallbackSpec> for PropValue {
    fn from(v: CallbackSpec) -> Self {
        Self::Callback(v)
    }
}

/// The (component instance, method name) pair an event handler binds to.
///
/// The instance is addressed by its engine-assigned [`ScopeId`]; listener
/// identity across updates is equality of this whole pair.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CallbackSpec {
    /// Scope of the component instance that owns the handler method.
    pub scope: ScopeId,
    /// Method name invoked with the client event payload.
    pub method: Arc<str>,
}

/// What an element descriptor instantiates.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum ElementKind {
    /// A plain HTML element with the given lowercase tag name.
    Tag(Arc<str>),
    /// A component instantiated through the resolver.
    Component(Arc<str>),
    /// A named insertion point resolved against the owning component's
    /// projected children (the `name` prop selects the slot group).
    Slot,
    /// Out-of-band contribution to the synthetic document head.
    Head,
}

/// Element-shaped descriptor: tag or component plus children, key, slot
/// routing, and props.
#[derive(Clone, PartialEq, Debug)]
pub struct ElementDescriptor {
    /// Tag, component, slot, or head.
    pub kind: ElementKind,
    /// Ordered child descriptors (pre-normalization; may nest fragments).
    pub children: Vec<Descriptor>,
    /// Reconciliation key distinguishing same-kind siblings.
    pub key: Option<Arc<str>>,
    /// Slot group this descriptor is projected into, when a child of a
    /// component element.
    pub slot: Option<Arc<str>>,
    /// Property map.
    pub props: Props,
}

impl ElementDescriptor {
    /// New descriptor of the given kind with no children or props.
    #[must_use]
    pub fn new(kind: ElementKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
            key: None,
            slot: None,
            props: Props::new(),
        }
    }

    /// Sets the reconciliation key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<Arc<str>>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Routes this descriptor into the named slot of its parent component.
    #[must_use]
    pub fn with_slot(mut self, slot: impl Into<Arc<str>>) -> Self {
        self.slot = Some(slot.into());
        self
    }

    /// Sets one prop.
    #[must_use]
    pub fn with_prop(mut self, name: impl Into<Arc<str>>, value: impl Into<PropValue>) -> Self {
        self.props.insert(name.into(), value.into());
        self
    }

    /// Appends one child.
    #[must_use]
    pub fn with_child(mut self, child: impl Into<Descriptor>) -> Self {
        self.children.push(child.into());
        self
    }

    /// Appends several children.
    #[must_use]
    pub fn with_children<I>(mut self, children: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Descriptor>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

/// Immutable declarative UI node description.
///
/// `Fragment` and `Nothing` exist only pre-normalization: nested child arrays
/// flatten into their parent list and nil-like inputs vanish before any
/// reconciliation looks at the children.
#[derive(Clone, PartialEq, Debug)]
pub enum Descriptor {
    /// Element, component, slot, or head node.
    Element(ElementDescriptor),
    /// Text run.
    Text(Arc<str>),
    /// Comment node.
    Comment(Arc<str>),
    /// Transparent grouping of siblings, flattened during normalization.
    Fragment(Vec<Descriptor>),
    /// Absence of a node, dropped during normalization.
    Nothing,
}

impl Descriptor {
    /// Plain element descriptor builder for the given tag.
    #[must_use]
    pub fn tag(name: impl Into<Arc<str>>) -> ElementDescriptor {
        ElementDescriptor::new(ElementKind::Tag(name.into()))
    }

    /// Component descriptor builder for the given registered type name.
    #[must_use]
    pub fn component(name: impl Into<Arc<str>>) -> ElementDescriptor {
        ElementDescriptor::new(ElementKind::Component(name.into()))
    }

    /// Default-slot insertion point.
    #[must_use]
    pub fn slot() -> ElementDescriptor {
        ElementDescriptor::new(ElementKind::Slot)
    }

    /// Named-slot insertion point.
    #[must_use]
    pub fn named_slot(name: impl Into<Arc<str>>) -> ElementDescriptor {
        ElementDescriptor::new(ElementKind::Slot).with_prop("name", name.into().as_ref())
    }

    /// Head contribution builder; children land in the synthetic document
    /// head instead of this tree position.
    #[must_use]
    pub fn head() -> ElementDescriptor {
        ElementDescriptor::new(ElementKind::Head)
    }

    /// Text descriptor.
    #[must_use]
    pub fn text(content: impl Into<Arc<str>>) -> Self {
        Self::Text(content.into())
    }

    /// Comment descriptor.
    #[must_use]
    pub fn comment(content: impl Into<Arc<str>>) -> Self {
        Self::Comment(content.into())
    }

    /// Slot group this descriptor is routed into, when any.
    pub(crate) fn slot_name(&self) -> Option<&Arc<str>> {
        match self {
            Self::Element(el) => el.slot.as_ref(),
            _ => None,
        }
    }
}

impl From<ElementDescriptor> for Descriptor {
    fn from(el: ElementDescriptor) -> Self {
        Self::Element(el)
    }
}

impl From<&str> for Descriptor {
    fn from(v: &str) -> Self {
        Self::Text(Arc::from(v))
    }
}

impl From<String> for Descriptor {
    fn from(v: String) -> Self {
        Self::Text(Arc::from(v.as_str()))
    }
}

impl From<i64> for Descriptor {
    fn from(v: i64) -> Self {
        Self::Text(Arc::from(v.to_string().as_str()))
    }
}

impl From<f64> for Descriptor {
    fn from(v: f64) -> Self {
        Self::Text(Arc::from(fmt_number(v).as_str()))
    }
}

impl<T: Into<Descriptor>> From<Option<T>> for Descriptor {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Nothing, Into::into)
    }
}

impl<T: Into<Descriptor>> From<Vec<T>> for Descriptor {
    fn from(v: Vec<T>) -> Self {
        Self::Fragment(v.into_iter().map(Into::into).collect())
    }
}

/// Reconciliation identity signature of one descriptor.
///
/// Computed from (kind, tag-or-component, key, slot, and the `type` prop for
/// `input` tags) and used only to decide reuse vs recreate, never as a
/// deep-equality shortcut.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct IdentityHash(u64);

/// Computes the identity signature of a descriptor.
#[must_use]
pub fn identity_hash(descriptor: &Descriptor) -> IdentityHash {
    let mut hasher = FxHasher::default();
    match descriptor {
        Descriptor::Element(el) => {
            match &el.kind {
                ElementKind::Tag(tag) => {
                    0u8.hash(&mut hasher);
                    tag.hash(&mut hasher);
                    // Swapping an input between subtypes (text ↔ checkbox …)
                    // must recreate the node: browsers do not retarget
                    // internal input state across type changes.
                    if tag.as_ref() == "input" {
                        if let Some(PropValue::Text(subtype)) = el.props.get("type") {
                            subtype.hash(&mut hasher);
                        }
                    }
                }
                ElementKind::Component(name) => {
                    1u8.hash(&mut hasher);
                    name.hash(&mut hasher);
                }
                ElementKind::Slot => {
                    2u8.hash(&mut hasher);
                    if let Some(PropValue::Text(name)) = el.props.get("name") {
                        name.hash(&mut hasher);
                    }
                }
                ElementKind::Head => 3u8.hash(&mut hasher),
            }
            el.key.hash(&mut hasher);
            el.slot.hash(&mut hasher);
        }
        Descriptor::Text(_) => 4u8.hash(&mut hasher),
        Descriptor::Comment(_) => 5u8.hash(&mut hasher),
        // Never reach matching; normalized away first.
        Descriptor::Fragment(_) => 6u8.hash(&mut hasher),
        Descriptor::Nothing => 7u8.hash(&mut hasher),
    }
    IdentityHash(hasher.finish())
}

/// Normalizes a raw child list ahead of a children diff: fragments flatten,
/// `Nothing` drops out, and adjacent text runs are separated by an empty
/// comment marker so two adjacent dynamic strings never collapse into one DOM
/// text run on a later update.
pub(crate) fn normalize_children(children: Vec<Descriptor>) -> Vec<Descriptor> {
    let mut flat = Vec::with_capacity(children.len());
    flatten_into(children, &mut flat);

    let mut out = Vec::with_capacity(flat.len());
    for desc in flat {
        if matches!(desc, Descriptor::Text(_))
            && matches!(out.last(), Some(Descriptor::Text(_)))
        {
            out.push(Descriptor::Comment(Arc::from("")));
        }
        out.push(desc);
    }
    out
}

fn flatten_into(children: Vec<Descriptor>, out: &mut Vec<Descriptor>) {
    for desc in children {
        match desc {
            Descriptor::Fragment(inner) => flatten_into(inner, out),
            Descriptor::Nothing => {}
            other => out.push(other),
        }
    }
}

/// Projected children of a component element, grouped by `slot` prop.
#[derive(Default, Debug)]
pub(crate) struct SlotContent {
    default: Vec<Descriptor>,
    named: FxHashMap<Arc<str>, Vec<Descriptor>>,
}

impl SlotContent {
    /// Groups a component element's direct children by their `slot` prop.
    pub(crate) fn group(children: Vec<Descriptor>) -> Self {
        let mut content = Self::default();
        for desc in normalize_children(children) {
            match desc.slot_name().cloned() {
                Some(name) => content.named.entry(name).or_default().push(desc),
                None => content.default.push(desc),
            }
        }
        content
    }

    /// Descriptors projected into the given slot.
    pub(crate) fn resolve(&self, name: Option<&Arc<str>>) -> Vec<Descriptor> {
        match name {
            Some(name) => self.named.get(name).cloned().unwrap_or_default(),
            None => self.default.clone(),
        }
    }
}
