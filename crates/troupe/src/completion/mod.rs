//! Streaming completion adapter.
//!
//! Turns a persona plus user text into a stream of [`StreamEvent`]s. The
//! dispatcher consumes the events from a channel, which keeps the
//! "exactly one terminal event" contract visible in one place instead of
//! being spread across nested callbacks.

mod client;
mod error;

pub use client::CompletionClient;
pub use error::CompletionError;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::persona::Persona;

/// Buffer size for the event channel handed to the dispatcher.
const EVENT_BUFFER_SIZE: usize = 32;

/// Events emitted by one completion stream.
///
/// A stream emits `Started` first, then zero or more `Fragment`s, then
/// exactly one of `Ended` or `Failed`. All events of one stream share one
/// `message_id`, minted when the stream begins and never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Started { message_id: String },
    Fragment { message_id: String, text: String },
    Ended { message_id: String },
    Failed { reason: String },
}

impl StreamEvent {
    /// Whether this event terminates its stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Ended { .. } | StreamEvent::Failed { .. }
        )
    }
}

/// A source of streamed completions.
///
/// The returned receiver observes the event sequence documented on
/// [`StreamEvent`]. Implementations do not retry; recovery is the caller's
/// concern.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream(&self, persona: &Persona, user_text: &str) -> mpsc::Receiver<StreamEvent>;
}

fn event_channel() -> (mpsc::Sender<StreamEvent>, mpsc::Receiver<StreamEvent>) {
    mpsc::channel(EVENT_BUFFER_SIZE)
}
