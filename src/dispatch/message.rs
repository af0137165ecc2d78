use std::sync::Arc;

use bytes::Bytes;

use crate::codec::{Codec, DecodeError};

/// One message taken off a subscription queue.
///
/// `recv_utime` is the receive time in microseconds since the Unix epoch,
/// stamped on the transport thread when the message was dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Channel the message arrived on.
    pub channel: Arc<str>,
    /// Payload, copied out of the transport's buffer.
    pub data: Bytes,
    /// Receive time in microseconds since the Unix epoch.
    pub recv_utime: i64,
}

impl ReceivedMessage {
    pub fn new(channel: Arc<str>, data: Bytes) -> Self {
        Self {
            channel,
            data,
            recv_utime: chrono::Utc::now().timestamp_micros(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Decodes the payload into a fresh `T`.
    pub fn decode<T: Codec + Default>(&self) -> Result<T, DecodeError> {
        T::decode_new(&self.data)
    }
}
