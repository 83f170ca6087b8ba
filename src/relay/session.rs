//! Relay Session
//!
//! Drives one client transport through
//! `AwaitingHeader -> Connecting -> Relaying -> Closed`.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Connector, Frame};
use crate::auth::AcceptedIdentity;
use crate::error::RelayError;
use crate::metrics::Metrics;
use crate::protocol::{parse_header, ParsedHeader};

/// Read buffer for the upstream-to-client direction
pub const RELAY_BUFFER_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHeader,
    Connecting,
    Relaying,
    Closed,
}

/// Mutable per-connection state, owned by exactly one `RelaySession`
#[derive(Debug)]
pub struct Session {
    pub session_id: String,
    pub state: SessionState,
    /// Set once, after the first frame has been parsed and the connect succeeded
    pub upstream: Option<TcpStream>,
    pub target_host: Option<String>,
    pub target_port: Option<u16>,
    pub response_header_sent: bool,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub start_time: Instant,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().simple().to_string(),
            state: SessionState::AwaitingHeader,
            upstream: None,
            target_host: None,
            target_port: None,
            response_header_sent: false,
            bytes_up: 0,
            bytes_down: 0,
            start_time: Instant::now(),
        }
    }

    /// `host:port` for log fields, `-` until the header is parsed
    pub fn target(&self) -> String {
        match (&self.target_host, self.target_port) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            _ => "-".to_string(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn transition(&mut self, next: SessionState) {
        debug!(
            session_id = %self.session_id,
            from = ?self.state,
            to = ?next,
            "Session state change"
        );
        self.state = next;
    }

    fn to_stats(&self) -> SessionStats {
        SessionStats {
            session_id: self.session_id.clone(),
            target_host: self.target_host.clone(),
            target_port: self.target_port,
            bytes_up: self.bytes_up,
            bytes_down: self.bytes_down,
            duration: self.duration(),
            response_header_sent: self.response_header_sent,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics of a session that ended without error
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub session_id: String,
    pub target_host: Option<String>,
    pub target_port: Option<u16>,
    pub bytes_up: u64,
    pub bytes_down: u64,
    pub duration: Duration,
    pub response_header_sent: bool,
}

/// Relays one client transport to the TCP target named in its first frame
pub struct RelaySession {
    session: Session,
    identity: AcceptedIdentity,
    connector: Arc<dyn Connector>,
    metrics: Option<Arc<Metrics>>,
}

impl RelaySession {
    pub fn new(identity: AcceptedIdentity, connector: Arc<dyn Connector>) -> Self {
        Self {
            session: Session::new(),
            identity,
            connector,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the session to completion.
    ///
    /// Both ends are closed on return, whatever the outcome. Errors are never
    /// reported to the client.
    pub async fn run<S, K, E>(mut self, mut inbound: S, mut outbound: K) -> Result<SessionStats, RelayError>
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        K: Sink<Frame> + Unpin,
        K::Error: fmt::Display,
        E: fmt::Display,
    {
        if let Some(metrics) = &self.metrics {
            metrics.session_started();
        }
        debug!(session_id = %self.session.session_id, "Session opened");

        let result = self.drive(&mut inbound, &mut outbound).await;
        self.close(&mut outbound).await;

        if let Some(metrics) = &self.metrics {
            metrics.session_finished(
                self.session.duration(),
                self.session.bytes_up,
                self.session.bytes_down,
                result.as_ref().err(),
            );
        }

        match result {
            Ok(()) => {
                info!(
                    session_id = %self.session.session_id,
                    target = %self.session.target(),
                    bytes_up = self.session.bytes_up,
                    bytes_down = self.session.bytes_down,
                    duration_ms = self.session.duration().as_millis() as u64,
                    "Session closed"
                );
                Ok(self.session.to_stats())
            }
            Err(e) => {
                warn!(
                    session_id = %self.session.session_id,
                    target = %self.session.target(),
                    kind = e.kind(),
                    error = %e,
                    "Session ended with error"
                );
                Err(e)
            }
        }
    }

    async fn drive<S, K, E>(&mut self, inbound: &mut S, outbound: &mut K) -> Result<(), RelayError>
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        K: Sink<Frame> + Unpin,
        K::Error: fmt::Display,
        E: fmt::Display,
    {
        let first = match next_binary(inbound).await? {
            Some(data) => data,
            None => {
                debug!(session_id = %self.session.session_id, "Client closed before sending a header");
                return Ok(());
            }
        };

        let header = parse_header(&first, &self.identity)?;
        let host = header.host();
        self.session.target_host = Some(host.clone());
        self.session.target_port = Some(header.port);

        self.session.transition(SessionState::Connecting);
        info!(
            session_id = %self.session.session_id,
            target = %self.session.target(),
            "Connecting to upstream"
        );
        let upstream = self.connector.connect(&host, header.port).await?;
        debug!(
            session_id = %self.session.session_id,
            peer = ?upstream.peer_addr().ok(),
            "Connected to upstream"
        );
        self.session.upstream = Some(upstream);

        let initial = first.slice(header.payload_offset..);
        self.relay(&header, initial, inbound, outbound).await
    }

    async fn relay<S, K, E>(
        &mut self,
        header: &ParsedHeader,
        initial: Bytes,
        inbound: &mut S,
        outbound: &mut K,
    ) -> Result<(), RelayError>
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        K: Sink<Frame> + Unpin,
        K::Error: fmt::Display,
        E: fmt::Display,
    {
        let upstream = match self.session.upstream.take() {
            Some(upstream) => upstream,
            None => return Ok(()),
        };
        let (mut reader, mut writer) = upstream.into_split();

        if !initial.is_empty() {
            writer.write_all(&initial).await?;
            self.session.bytes_up += initial.len() as u64;
        }

        self.session.transition(SessionState::Relaying);
        debug!(
            session_id = %self.session.session_id,
            initial_bytes = initial.len(),
            "Relaying"
        );

        let prefix = header.response_prefix();
        let Session {
            bytes_up,
            bytes_down,
            response_header_sent,
            ..
        } = &mut self.session;

        let result = tokio::select! {
            r = client_to_upstream(inbound, &mut writer, bytes_up) => r,
            r = upstream_to_client(&mut reader, outbound, prefix, response_header_sent, bytes_down) => r,
        };

        // Already closed by the peer is fine
        let _ = writer.shutdown().await;
        result
    }

    async fn close<K>(&mut self, outbound: &mut K)
    where
        K: Sink<Frame> + Unpin,
        K::Error: fmt::Display,
    {
        if let Some(mut upstream) = self.session.upstream.take() {
            let _ = upstream.shutdown().await;
        }
        if let Err(e) = outbound.close().await {
            debug!(session_id = %self.session.session_id, error = %e, "Client transport already closed");
        }
        self.session.transition(SessionState::Closed);
    }
}

/// Wait for the first binary frame, dropping anything else.
/// `None` when the client closes first.
async fn next_binary<S, E>(inbound: &mut S) -> Result<Option<Bytes>, RelayError>
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(frame) = inbound.next().await {
        match frame.map_err(RelayError::transport)? {
            Frame::Binary(data) => return Ok(Some(data)),
            Frame::Close => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

async fn client_to_upstream<S, E>(
    inbound: &mut S,
    writer: &mut OwnedWriteHalf,
    bytes_up: &mut u64,
) -> Result<(), RelayError>
where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(frame) = inbound.next().await {
        match frame.map_err(RelayError::transport)? {
            Frame::Binary(data) => {
                writer.write_all(&data).await?;
                *bytes_up += data.len() as u64;
            }
            Frame::Close => break,
            _ => continue,
        }
    }
    Ok(())
}

async fn upstream_to_client<K>(
    reader: &mut OwnedReadHalf,
    outbound: &mut K,
    prefix: [u8; 2],
    response_header_sent: &mut bool,
    bytes_down: &mut u64,
) -> Result<(), RelayError>
where
    K: Sink<Frame> + Unpin,
    K::Error: fmt::Display,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 && *response_header_sent {
            return Ok(());
        }

        // An upstream that closes without sending anything still gets the prefix
        let mut chunk = BytesMut::with_capacity(prefix.len() + n);
        if !*response_header_sent {
            chunk.put_slice(&prefix);
            *response_header_sent = true;
        }
        chunk.put_slice(&buf[..n]);

        outbound
            .send(Frame::Binary(chunk.freeze()))
            .await
            .map_err(RelayError::transport)?;
        *bytes_down += n as u64;

        if n == 0 {
            return Ok(());
        }
    }
}
