//! Transport Frames

use bytes::Bytes;

/// One message of the client transport.
///
/// Sessions read `Stream<Item = Result<Frame, E>>` and write `Sink<Frame>`,
/// so any message-framed duplex transport can drive them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Binary(Bytes),
    Text(String),
    Ping(Bytes),
    Pong(Bytes),
    Close,
}

impl Frame {
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Frame::Binary(data.into())
    }
}
