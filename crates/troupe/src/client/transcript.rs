//! In-memory transcript assembled from server stream frames.

use chrono::{DateTime, Utc};
use log::warn;
use troupe_protocol::ServerFrame;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    User,
    Agent,
}

/// One transcript entry.
///
/// Agent entries are keyed by the server-issued message id and grow as
/// chunks arrive; user entries use locally generated `local-<n>` ids and are
/// never mutated after creation.
#[derive(Debug, Clone)]
pub struct ClientMessage {
    pub id: String,
    pub content: String,
    pub origin: Origin,
    pub streaming: bool,
    pub created_at: DateTime<Utc>,
}

/// The transcript of one chat, owned exclusively by the consumer.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: Vec<ClientMessage>,
    next_local_id: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ClientMessage] {
        &self.entries
    }

    pub fn last(&self) -> Option<&ClientMessage> {
        self.entries.last()
    }

    /// Record user-submitted text immediately, independent of any server
    /// acknowledgement. Returns the locally generated id.
    pub fn push_user(&mut self, text: &str) -> String {
        let id = format!("local-{}", self.next_local_id);
        self.next_local_id += 1;
        self.entries.push(ClientMessage {
            id: id.clone(),
            content: text.to_string(),
            origin: Origin::User,
            streaming: false,
            created_at: Utc::now(),
        });
        id
    }

    /// Apply one server frame.
    ///
    /// `connected` and `error` frames leave the transcript untouched; a
    /// stream frame whose message id matches no entry is a protocol
    /// violation and is logged, never a crash.
    pub fn apply(&mut self, frame: &ServerFrame) {
        match frame {
            ServerFrame::StreamStart { message_id } => {
                self.entries.push(ClientMessage {
                    id: message_id.clone(),
                    content: String::new(),
                    origin: Origin::Agent,
                    streaming: true,
                    created_at: Utc::now(),
                });
            }
            ServerFrame::StreamChunk {
                message_id,
                content,
            } => match self.agent_entry_mut(message_id) {
                Some(entry) => entry.content.push_str(content),
                None => warn!("stream_chunk for unknown message {message_id}"),
            },
            ServerFrame::StreamEnd { message_id } => match self.agent_entry_mut(message_id) {
                Some(entry) => entry.streaming = false,
                None => warn!("stream_end for unknown message {message_id}"),
            },
            ServerFrame::Connected { .. } | ServerFrame::Error { .. } => {}
        }
    }

    fn agent_entry_mut(&mut self, id: &str) -> Option<&mut ClientMessage> {
        self.entries
            .iter_mut()
            .find(|entry| entry.origin == Origin::Agent && entry.id == id)
    }
}
