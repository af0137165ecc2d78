//! The `codec` module defines the capability every message type must provide
//! to travel through a `Client`.
//!
//! The dispatch and publish paths never look inside a payload; they only move
//! byte sequences. Concrete message types (usually generated from a schema)
//! implement [`Codec`] so that application code can turn them into bytes
//! before publishing and back after receiving.

use bytes::Bytes;
use thiserror::Error;

/// Failure while encoding a message.
///
/// Encoding is deterministic and only fails when the value itself violates an
/// invariant of its wire layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("field `{field}` holds {len} elements, its length prefix allows at most {max}")]
    LengthOverflow {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("invalid message: {0}")]
    Invalid(String),
}

/// Failure while decoding a message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("{0} unexpected trailing bytes")]
    TrailingBytes(usize),
}

/// Two-operation encoding capability.
///
/// `decode` fills `self` from `data`. When it fails the instance is left in an
/// unspecified state and must be discarded by the caller.
pub trait Codec {
    fn encode(&self) -> Result<Vec<u8>, EncodeError>;

    fn decode(&mut self, data: &[u8]) -> Result<(), DecodeError>;

    /// Decodes into a fresh default instance.
    fn decode_new(data: &[u8]) -> Result<Self, DecodeError>
    where
        Self: Default + Sized,
    {
        let mut value = Self::default();
        value.decode(data)?;
        Ok(value)
    }
}

/// Opaque payload with the identity encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPayload(pub Bytes);

impl RawPayload {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_inner(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for RawPayload {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<&'static [u8]> for RawPayload {
    fn from(data: &'static [u8]) -> Self {
        Self(Bytes::from_static(data))
    }
}

impl Codec for RawPayload {
    fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(self.0.to_vec())
    }

    fn decode(&mut self, data: &[u8]) -> Result<(), DecodeError> {
        self.0 = Bytes::copy_from_slice(data);
        Ok(())
    }
}
