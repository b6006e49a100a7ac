//! Client-side stream consumer.
//!
//! Opens the WebSocket connection, sends one request at a time, reassembles
//! streamed fragments into the transcript, and reconnects with a bounded
//! number of attempts when the connection drops.

mod transcript;

pub use transcript::{ClientMessage, Origin, Transcript};

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use troupe_protocol::{AgentId, ClientFrame, ServerFrame};

/// Wait for the server's connection confirmation frame.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection lifecycle states for the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
            ConnectionState::Failed => write!(f, "failed"),
        }
    }
}

/// Bounded fixed-delay reconnection policy.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
    attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            attempts: 0,
        }
    }

    /// Record a failed attempt. Returns the delay to wait before retrying,
    /// or `None` once the retry budget is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(self.delay)
    }

    /// A successful connection resets the counter.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Errors surfaced to the user of the consumer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Sending was attempted while the connection is not open.
    #[error("connection lost; message not sent")]
    NotConnected,

    /// The retry budget ran out; this is terminal and non-recoverable.
    #[error("connection failed after {attempts} attempts")]
    ConnectionFailed { attempts: u32 },

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,

    #[error("transport error: {0}")]
    Transport(String),
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A chat client: one WebSocket connection plus the transcript it feeds.
pub struct ChatClient {
    url: String,
    policy: ReconnectPolicy,
    state: ConnectionState,
    transcript: Transcript,
    socket: Option<Socket>,
}

impl ChatClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_policy(url, ReconnectPolicy::default())
    }

    pub fn with_policy(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.into(),
            policy,
            state: ConnectionState::Connecting,
            transcript: Transcript::new(),
            socket: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn transcript_mut(&mut self) -> &mut Transcript {
        &mut self.transcript
    }

    /// Connect, retrying within the policy's budget.
    ///
    /// Ends in `Open` (counter reset) or, after exhausting the budget, in the
    /// terminal `Failed` state with a single [`ClientError::ConnectionFailed`].
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        loop {
            self.state = ConnectionState::Connecting;

            match self.try_connect().await {
                Ok(socket) => {
                    self.socket = Some(socket);
                    self.state = ConnectionState::Open;
                    self.policy.reset();
                    info!("connected to {}", self.url);
                    return Ok(());
                }
                Err(reason) => {
                    warn!("connection attempt failed: {reason}");
                    match self.policy.next_delay() {
                        Some(delay) => {
                            self.state = ConnectionState::Reconnecting;
                            info!(
                                "reconnecting in {:?} (attempt {}/{})",
                                delay,
                                self.policy.attempts(),
                                self.policy.max_attempts()
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            self.state = ConnectionState::Failed;
                            return Err(ClientError::ConnectionFailed {
                                attempts: self.policy.max_attempts(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// One connection attempt: open the socket and wait for the server's
    /// confirmation frame.
    async fn try_connect(&self) -> Result<Socket, String> {
        let (mut socket, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| e.to_string())?;

        match tokio::time::timeout(CONFIRM_TIMEOUT, socket.next()).await {
            Ok(Some(Ok(WsMessage::Text(text)))) => {
                match serde_json::from_str::<ServerFrame>(text.as_str()) {
                    Ok(ServerFrame::Connected { content }) => {
                        debug!("connection confirmed: {content}");
                    }
                    Ok(other) => warn!("expected connected frame, got {other:?}"),
                    Err(e) => warn!("unparseable first frame: {e}"),
                }
                Ok(socket)
            }
            Ok(Some(Ok(_))) => Ok(socket),
            Ok(Some(Err(e))) => Err(e.to_string()),
            Ok(None) => Err("connection closed during handshake".to_string()),
            Err(_) => Err("timed out waiting for connection confirmation".to_string()),
        }
    }

    /// Send one request. Rejected locally when the connection is not open;
    /// the transcript records the user entry before the frame leaves.
    pub async fn send(&mut self, agent: AgentId, text: &str) -> Result<String, ClientError> {
        if self.state != ConnectionState::Open {
            return Err(ClientError::NotConnected);
        }
        let socket = self.socket.as_mut().ok_or(ClientError::NotConnected)?;

        let local_id = self.transcript.push_user(text);

        let frame = ClientFrame::new(agent, text);
        let json = serde_json::to_string(&frame)
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        if let Err(e) = socket.send(WsMessage::Text(json.into())).await {
            self.state = ConnectionState::Reconnecting;
            self.socket = None;
            return Err(ClientError::Transport(e.to_string()));
        }

        Ok(local_id)
    }

    /// Receive the next server frame, applying it to the transcript.
    ///
    /// On close or transport failure the socket is dropped and the state
    /// moves to `Reconnecting`; the caller decides whether to `connect()`
    /// again.
    pub async fn recv(&mut self) -> Result<ServerFrame, ClientError> {
        loop {
            let socket = self.socket.as_mut().ok_or(ClientError::NotConnected)?;

            match socket.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerFrame>(text.as_str()) {
                        Ok(frame) => {
                            self.transcript.apply(&frame);
                            return Ok(frame);
                        }
                        Err(e) => {
                            warn!("failed to parse server frame: {e}");
                            continue;
                        }
                    }
                }
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Binary(_) | WsMessage::Frame(_))) => continue,
                Some(Ok(WsMessage::Close(_))) | None => {
                    self.socket = None;
                    self.state = ConnectionState::Reconnecting;
                    return Err(ClientError::Closed);
                }
                Some(Err(e)) => {
                    self.socket = None;
                    self.state = ConnectionState::Reconnecting;
                    return Err(ClientError::Transport(e.to_string()));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_within_bound() {
        let mut policy = ReconnectPolicy::new(3, Duration::from_secs(2));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(policy.next_delay(), Some(Duration::from_secs(2)));
        assert_eq!(policy.attempts(), 3);
        // Budget exhausted.
        assert_eq!(policy.next_delay(), None);
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn test_policy_reset_on_success() {
        let mut policy = ReconnectPolicy::new(3, Duration::from_millis(10));
        policy.next_delay();
        policy.next_delay();
        assert_eq!(policy.attempts(), 2);

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        // Full budget available again.
        assert!(policy.next_delay().is_some());
    }

    #[test]
    fn test_policy_zero_attempts_fails_immediately() {
        let mut policy = ReconnectPolicy::new(0, Duration::from_secs(2));
        assert_eq!(policy.next_delay(), None);
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(ConnectionState::Open.to_string(), "open");
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn test_send_rejected_when_not_open() {
        let mut client = ChatClient::new("ws://127.0.0.1:9/api/ws");
        let err = client.send(AgentId::Frontend, "hi").await.unwrap_err();
        assert!(matches!(err, ClientError::NotConnected));
        // No transcript entry is recorded for a rejected send.
        assert!(client.transcript().entries().is_empty());
    }
}
