//! WebSocket Transport Adapter
//!
//! Maps axum WebSocket messages onto relay frames and runs one
//! `RelaySession` per upgraded socket.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{future, SinkExt, StreamExt};
use tracing::debug;

use super::AppState;
use crate::auth::AcceptedIdentity;
use crate::relay::{Frame, RelaySession};

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        match message {
            Message::Binary(data) => Frame::Binary(data.into()),
            Message::Text(text) => Frame::Text(text),
            Message::Ping(data) => Frame::Ping(data.into()),
            Message::Pong(data) => Frame::Pong(data.into()),
            Message::Close(_) => Frame::Close,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Binary(data) => Message::Binary(data.to_vec()),
            Frame::Text(text) => Message::Text(text),
            Frame::Ping(data) => Message::Ping(data.to_vec()),
            Frame::Pong(data) => Message::Pong(data.to_vec()),
            Frame::Close => Message::Close(None),
        }
    }
}

/// Relay an upgraded socket until either side closes
pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: AcceptedIdentity) {
    let (sink, stream) = socket.split();
    let inbound = Box::pin(stream.map(|message| message.map(Frame::from)));
    let outbound = Box::pin(sink.with(|frame: Frame| future::ready(Ok::<_, axum::Error>(Message::from(frame)))));

    let session = RelaySession::new(identity, Arc::clone(&state.connector))
        .with_metrics(Arc::clone(&state.metrics));
    let session_id = session.session().session_id.clone();

    // Failures are already logged by the session; nothing goes back to the client
    if let Err(e) = session.run(inbound, outbound).await {
        debug!(session_id = %session_id, kind = e.kind(), "WebSocket session finished with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_frame_mapping() {
        assert_eq!(
            Frame::from(Message::Binary(vec![1, 2, 3])),
            Frame::binary(vec![1u8, 2, 3])
        );
        assert_eq!(Frame::from(Message::Text("hi".to_string())), Frame::Text("hi".to_string()));
        assert_eq!(Frame::from(Message::Close(None)), Frame::Close);

        match Message::from(Frame::binary(vec![0u8, 0])) {
            Message::Binary(data) => assert_eq!(data, vec![0, 0]),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
