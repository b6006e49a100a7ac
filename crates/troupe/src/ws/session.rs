//! Per-connection session dispatcher.
//!
//! One `Session` owns the request-handling sequence of one WebSocket
//! connection: parse the inbound frame, resolve the agent, invoke the
//! completion backend, and forward stream events in arrival order. Frames are
//! processed strictly sequentially; the next inbound frame is not read until
//! the in-flight stream reaches its terminal event, so an early second
//! request simply waits in the transport and is answered afterwards.

use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use troupe_protocol::{ClientFrame, DecodeError, ServerFrame};

use crate::completion::{CompletionBackend, StreamEvent};
use crate::persona;

/// Confirmation text sent once per connection, immediately after accept.
pub const CONNECTED_MESSAGE: &str = "Successfully connected to agent server";

const ERR_INVALID_FORMAT: &str = "Invalid message format";
const ERR_UNKNOWN_TYPE: &str = "Unknown message type";
const ERR_PROVIDER: &str = "Sorry, I encountered an error. Please try again.";

/// The outbound side of the connection disappeared; the session is over.
#[derive(Debug)]
pub struct SessionClosed;

/// Request-handling state for one connection.
pub struct Session {
    backend: Arc<dyn CompletionBackend>,
}

impl Session {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Handle one inbound text frame, sending response frames to `out`.
    ///
    /// Every per-request failure is converted into an `error` frame and the
    /// session stays usable; `Err(SessionClosed)` means only that the
    /// outbound channel is gone (transport closed underneath us).
    pub async fn handle_frame(
        &mut self,
        raw: &str,
        out: &mpsc::Sender<ServerFrame>,
    ) -> Result<(), SessionClosed> {
        let frame = match ClientFrame::decode(raw) {
            Ok(frame) => frame,
            Err(DecodeError::Malformed(reason)) => {
                debug!("rejecting malformed frame: {reason}");
                return self.send_error(out, ERR_INVALID_FORMAT).await;
            }
            Err(DecodeError::UnknownAgent(kind)) => {
                warn!("rejecting request for unknown agent {kind:?}");
                return self.send_error(out, ERR_UNKNOWN_TYPE).await;
            }
        };

        // Sender discipline: a request with no text has no well-defined
        // completion, so it never reaches the backend.
        if frame.content.trim().is_empty() {
            debug!("rejecting request with empty content for agent {}", frame.agent);
            return self.send_error(out, ERR_INVALID_FORMAT).await;
        }

        self.dispatch(frame, out).await
    }

    /// Run one completion stream to its terminal event, forwarding frames in
    /// arrival order.
    async fn dispatch(
        &mut self,
        frame: ClientFrame,
        out: &mpsc::Sender<ServerFrame>,
    ) -> Result<(), SessionClosed> {
        let persona = persona::resolve(frame.agent);
        debug!(
            "dispatching request to {} ({} chars)",
            persona.name,
            frame.content.len()
        );

        let mut events = self.backend.stream(persona, &frame.content).await;
        let mut terminated = false;

        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            let response = match event {
                StreamEvent::Started { message_id } => ServerFrame::StreamStart { message_id },
                StreamEvent::Fragment { message_id, text } => ServerFrame::StreamChunk {
                    message_id,
                    content: text,
                },
                StreamEvent::Ended { message_id } => ServerFrame::StreamEnd { message_id },
                StreamEvent::Failed { reason } => {
                    // The detailed cause stays in the log; the client only
                    // ever sees the generic retry text.
                    warn!("completion failed for {}: {reason}", persona.name);
                    ServerFrame::Error {
                        content: ERR_PROVIDER.to_string(),
                    }
                }
            };

            out.send(response).await.map_err(|_| SessionClosed)?;

            if terminal {
                terminated = true;
                break;
            }
        }

        // A backend that dies without a terminal event still must not leave
        // the client hanging on a half-open stream.
        if !terminated {
            warn!(
                "completion stream for {} ended without a terminal event",
                persona.name
            );
            return self.send_error(out, ERR_PROVIDER).await;
        }

        Ok(())
    }

    async fn send_error(
        &self,
        out: &mpsc::Sender<ServerFrame>,
        message: &str,
    ) -> Result<(), SessionClosed> {
        out.send(ServerFrame::Error {
            content: message.to_string(),
        })
        .await
        .map_err(|_| SessionClosed)
    }
}
