// SPDX-License-Identifier: Apache-2.0
//! Wire schema for the umbra DOM engine.
//!
//! A session transport consumes ordered [`PatchSet`] batches produced by the
//! reconciler and mirrors them into a browser DOM. This crate defines the
//! patch vocabulary, the hydration id tree, and the CBOR codec boundary; it
//! deliberately knows nothing about how patches are produced.
use serde::{Deserialize, Serialize};

pub mod wire;

/// Opaque payload attached to client-originated events (decoded CBOR).
pub type EventPayload = ciborium::value::Value;

/// Process-unique identifier for one live DOM node.
///
/// Assigned once when the owning shadow node is created, stable for the
/// node's whole DOM lifetime, and never reused while any patch referencing
/// it could still be in flight.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomId(pub u64);

impl std::fmt::Display for DomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Opaque token binding a DOM event attribute to a server-side callback.
///
/// Tokens are derived per session; clients echo them back verbatim and must
/// not assume any structure.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListenerId(pub String);

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One node of the hydration id tree sent in [`Patch::Initialize`].
///
/// `children` is `None` for node kinds that cannot have children (text,
/// comments), mirroring the DOM distinction the client runtime relies on.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct IdNode {
    /// Identifier the engine will use in subsequent patches.
    pub id: DomId,
    /// DOM node name (`DIV`, `#text`, `#comment`, …).
    pub name: String,
    /// Child id nodes, in DOM order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<IdNode>>,
}

impl IdNode {
    /// Leaf id node (no child list at all).
    #[must_use]
    pub fn leaf(id: DomId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            children: None,
        }
    }

    /// Container id node with an explicit (possibly empty) child list.
    #[must_use]
    pub fn branch(id: DomId, name: impl Into<String>, children: Vec<IdNode>) -> Self {
        Self {
            id,
            name: name.into(),
            children: Some(children),
        }
    }
}

/// Diagnostic payload for an isolated component render failure.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RenderErrorPatch {
    /// Path of the module whose render failed, when known.
    pub file: Option<String>,
    /// Error kind (type name or stable identifier).
    pub kind: String,
    /// Human-readable message.
    pub message: String,
    /// Captured backtrace lines, possibly empty.
    pub backtrace: Vec<String>,
    /// Original template source for overlay display, when known.
    pub source: Option<String>,
    /// Component ancestry from the document root to the failing component.
    pub tree_path: Vec<String>,
}

/// One DOM mutation instruction.
///
/// Ids are opaque per-node tokens ([`DomId`]). A batch of patches produced by
/// one logical update commits atomically as a [`PatchSet`]; order within the
/// batch is significant.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Patch {
    /// Initial hydration id map for a server-rendered document.
    Initialize {
        /// Root of the id tree.
        id_tree: IdNode,
    },
    /// Instantiate an element node.
    CreateElement {
        /// Id assigned to the new element.
        id: DomId,
        /// Lowercase tag name.
        tag: String,
    },
    /// Instantiate a text node.
    CreateTextNode {
        /// Id assigned to the new text node.
        id: DomId,
        /// Initial character data.
        content: String,
    },
    /// Instantiate a comment node.
    CreateComment {
        /// Id assigned to the new comment node.
        id: DomId,
        /// Initial comment body.
        content: String,
    },
    /// Detach and destroy a node (and, client-side, its subtree).
    RemoveNode {
        /// Node being removed.
        id: DomId,
    },
    /// Set an attribute to a string value.
    SetAttribute {
        /// Target element.
        id: DomId,
        /// Attribute name.
        name: String,
        /// New value (empty string for bare boolean attributes).
        value: String,
    },
    /// Remove an attribute.
    RemoveAttribute {
        /// Target element.
        id: DomId,
        /// Attribute name.
        name: String,
    },
    /// Replace the `class` attribute (fast path for the common case).
    SetClassName {
        /// Target element.
        id: DomId,
        /// New class string.
        value: String,
    },
    /// Set one inline style property.
    SetCssProperty {
        /// Target element.
        id: DomId,
        /// CSS property name (kebab-case).
        name: String,
        /// Formatted value, unit suffix already applied.
        value: String,
    },
    /// Remove one inline style property.
    RemoveCssProperty {
        /// Target element.
        id: DomId,
        /// CSS property name (kebab-case).
        name: String,
    },
    /// Replace the character data of a text or comment node.
    SetTextContent {
        /// Target node.
        id: DomId,
        /// New character data.
        content: String,
    },
    /// Reorder/replace the child list of a parent in one step.
    ReplaceChildren {
        /// Parent element.
        parent_id: DomId,
        /// Complete new child id sequence, in DOM order.
        child_ids: Vec<DomId>,
    },
    /// Reference an out-of-band stylesheet asset exactly once.
    AddStyleSheet {
        /// Asset filename as served by the asset pipeline.
        filename: String,
    },
    /// Liveness probe.
    Ping {
        /// Sender timestamp in milliseconds.
        timestamp: u64,
    },
    /// Opaque state handoff (payload supplied by the state-serialization
    /// collaborator; the engine does not interpret it).
    Transfer {
        /// Serialized session state.
        #[serde(with = "serde_bytes_vec")]
        payload: Vec<u8>,
    },
    /// Component-emitted client event.
    Event {
        /// Event name.
        name: String,
        /// Event payload.
        payload: EventPayload,
    },
    /// Diagnostic overlay for an isolated component render failure.
    RenderError(RenderErrorPatch),
}

/// Ordered batch of patches committed atomically by one logical update.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchSet(pub Vec<Patch>);

impl PatchSet {
    /// Empty patch set.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Appends a patch, preserving causal order.
    pub fn push(&mut self, patch: Patch) {
        self.0.push(patch);
    }

    /// True when no patches were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of patches in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates the patches in commit order.
    pub fn iter(&self) -> std::slice::Iter<'_, Patch> {
        self.0.iter()
    }
}

impl IntoIterator for PatchSet {
    type Item = Patch;
    type IntoIter = std::vec::IntoIter<Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a PatchSet {
    type Item = &'a Patch;
    type IntoIter = std::slice::Iter<'a, Patch>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<Patch> for PatchSet {
    fn from_iter<T: IntoIterator<Item = Patch>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

mod serde_bytes_vec {
    //! CBOR byte-string encoding for `Vec<u8>` payloads (instead of an
    //! integer array).
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        struct BytesVisitor;

        impl<'de> de::Visitor<'de> for BytesVisitor {
            type Value = Vec<u8>;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a byte string")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(v.to_vec())
            }

            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(v)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(b) = seq.next_element::<u8>()? {
                    out.push(b);
                }
                Ok(out)
            }
        }

        deserializer.deserialize_byte_buf(BytesVisitor)
    }
}
