// SPDX-License-Identifier: Apache-2.0
//! CBOR codec boundary for patch sets.
//!
//! Transports frame and ship these bytes however they like (framing,
//! compression, and auth are transport concerns); this module only fixes the
//! payload encoding so every consumer agrees on it.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::PatchSet;

/// Codec failures at the wire boundary.
#[derive(Debug, Error)]
pub enum CodecError {
    /// CBOR serialization failed.
    #[error("cbor encode: {0}")]
    Encode(#[from] ciborium::ser::Error<std::io::Error>),
    /// CBOR deserialization failed.
    #[error("cbor decode: {0}")]
    Decode(#[from] ciborium::de::Error<std::io::Error>),
}

/// Encodes any wire value to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] when serialization fails.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out)?;
    Ok(out)
}

/// Decodes any wire value from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] when the bytes are not a valid encoding of
/// `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(ciborium::de::from_reader(bytes)?)
}

/// Encodes one patch set for transport.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] when serialization fails.
pub fn encode_patch_set(set: &PatchSet) -> Result<Vec<u8>, CodecError> {
    to_cbor(set)
}

/// Decodes one patch set received from transport.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] when the bytes are not a patch set.
pub fn decode_patch_set(bytes: &[u8]) -> Result<PatchSet, CodecError> {
    from_cbor(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DomId, IdNode, Patch};

    #[test]
    fn patch_set_round_trips_through_cbor() {
        let set: PatchSet = [
            Patch::Initialize {
                id_tree: IdNode::branch(DomId(1), "DIV", vec![IdNode::leaf(DomId(2), "#text")]),
            },
            Patch::CreateTextNode {
                id: DomId(2),
                content: "hello".into(),
            },
            Patch::Transfer {
                payload: vec![0, 159, 146, 150],
            },
        ]
        .into_iter()
        .collect();

        let bytes = encode_patch_set(&set).unwrap();
        let decoded = decode_patch_set(&bytes).unwrap();
        assert_eq!(decoded, set);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_patch_set(&[0xff, 0x00, 0x13]).is_err());
    }
}
