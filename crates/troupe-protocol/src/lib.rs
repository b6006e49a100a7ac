//! Canonical wire protocol types for Troupe agent communication.
//!
//! This crate defines the frame formats exchanged between clients and the
//! server over one WebSocket connection:
//!
//! ```text
//! Client --[ClientFrame: {type: <agent id>, content}]--> Server
//! Client <--[ServerFrame: connected / stream_* / error]-- Server
//! ```
//!
//! Every frame is one JSON object per WebSocket text message. Clients speak
//! only this protocol; they do not know or care which completion provider
//! sits behind an agent.
//!
//! ## Design principles
//!
//! 1. **The agent set is closed.** [`AgentId`] is an enum, not a string; an
//!    identifier received over the wire is checked against the set before
//!    anything else happens.
//! 2. **Streamed frames correlate by `messageId`.** Every frame belonging to
//!    one streamed response carries the same server-minted identifier.
//! 3. **Decoding classifies errors.** [`ClientFrame::decode`] distinguishes a
//!    malformed frame from a well-formed frame naming an unknown agent, so
//!    the server can answer each with the right error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Agent identifiers
// ============================================================================

/// The closed set of selectable agent personas.
///
/// Wire names are the lowercase variant names (`"frontend"`, `"design"`,
/// `"backend"`, `"fullstack"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentId {
    Frontend,
    Design,
    Backend,
    Fullstack,
}

impl AgentId {
    /// All agent identifiers, in display order.
    pub const ALL: [AgentId; 4] = [
        AgentId::Frontend,
        AgentId::Design,
        AgentId::Backend,
        AgentId::Fullstack,
    ];

    /// Parse a wire identifier. Anything outside the closed set yields `None`.
    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "frontend" => Some(AgentId::Frontend),
            "design" => Some(AgentId::Design),
            "backend" => Some(AgentId::Backend),
            "fullstack" => Some(AgentId::Fullstack),
            _ => None,
        }
    }

    /// The identifier as it appears in the `type` field on the wire.
    pub fn as_wire(&self) -> &'static str {
        match self {
            AgentId::Frontend => "frontend",
            AgentId::Design => "design",
            AgentId::Backend => "backend",
            AgentId::Fullstack => "fullstack",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl std::str::FromStr for AgentId {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AgentId::from_wire(s).ok_or_else(|| DecodeError::UnknownAgent(s.to_string()))
    }
}

// ============================================================================
// Frames (Client -> Server)
// ============================================================================

/// A request frame sent by a client: one agent identifier plus the user text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Which agent persona should answer.
    #[serde(rename = "type")]
    pub agent: AgentId,
    /// The user's free-text request.
    pub content: String,
}

impl ClientFrame {
    pub fn new(agent: AgentId, content: impl Into<String>) -> Self {
        Self {
            agent,
            content: content.into(),
        }
    }

    /// Decode one inbound text frame.
    ///
    /// A frame that is not a JSON object of shape `{type: string, content:
    /// string}` is [`DecodeError::Malformed`]; a well-formed frame whose
    /// `type` falls outside the closed agent set is
    /// [`DecodeError::UnknownAgent`].
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        #[derive(Deserialize)]
        struct RawFrame {
            #[serde(rename = "type")]
            kind: String,
            content: String,
        }

        let frame: RawFrame =
            serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;
        let agent = AgentId::from_wire(&frame.kind)
            .ok_or(DecodeError::UnknownAgent(frame.kind))?;

        Ok(ClientFrame {
            agent,
            content: frame.content,
        })
    }
}

/// Why an inbound frame could not be decoded into a [`ClientFrame`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Not JSON, or not the `{type, content}` shape.
    #[error("malformed frame: {0}")]
    Malformed(String),
    /// Well-formed, but `type` names no known agent.
    #[error("unknown agent id: {0}")]
    UnknownAgent(String),
}

// ============================================================================
// Frames (Server -> Client)
// ============================================================================

/// Frames sent from the server to a client.
///
/// All frames belonging to one streamed response share one `messageId`. The
/// relative order is always `stream_start`, zero or more `stream_chunk`, then
/// exactly one of `stream_end` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Connection confirmation, sent once immediately after accept.
    Connected { content: String },

    /// A completion stream has begun.
    StreamStart {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    /// One incremental piece of generated text.
    StreamChunk {
        #[serde(rename = "messageId")]
        message_id: String,
        content: String,
    },

    /// The stream completed gracefully.
    StreamEnd {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    /// A request-level or stream-level error. Generic, non-sensitive text only.
    Error { content: String },
}

impl ServerFrame {
    /// The `messageId` carried by this frame, if any.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            ServerFrame::StreamStart { message_id }
            | ServerFrame::StreamChunk { message_id, .. }
            | ServerFrame::StreamEnd { message_id } => Some(message_id),
            ServerFrame::Connected { .. } | ServerFrame::Error { .. } => None,
        }
    }
}
