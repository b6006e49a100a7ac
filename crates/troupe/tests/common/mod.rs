//! Test utilities and common setup.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use axum::Router;
use troupe::api::{self, AppState};
use troupe::completion::{CompletionBackend, StreamEvent};
use troupe::persona::Persona;
use troupe::settings::Settings;

/// One scripted completion stream.
pub struct Script {
    events: Vec<StreamEvent>,
    /// Optional pause before the final event, to hold a stream open.
    pre_terminal_delay: Option<Duration>,
}

impl Script {
    pub fn new(events: Vec<StreamEvent>) -> Self {
        Self {
            events,
            pre_terminal_delay: None,
        }
    }

    pub fn with_pre_terminal_delay(mut self, delay: Duration) -> Self {
        self.pre_terminal_delay = Some(delay);
        self
    }
}

/// Completion backend that replays one script per call, in order.
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptedBackend {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
        })
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    async fn stream(&self, _persona: &Persona, _user_text: &str) -> mpsc::Receiver<StreamEvent> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Script::new(Vec::new()));

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let last = script.events.len().saturating_sub(1);
            for (i, event) in script.events.into_iter().enumerate() {
                if i == last {
                    if let Some(delay) = script.pre_terminal_delay {
                        tokio::time::sleep(delay).await;
                    }
                }
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        rx
    }
}

pub fn started(id: &str) -> StreamEvent {
    StreamEvent::Started {
        message_id: id.to_string(),
    }
}

pub fn fragment(id: &str, text: &str) -> StreamEvent {
    StreamEvent::Fragment {
        message_id: id.to_string(),
        text: text.to_string(),
    }
}

pub fn ended(id: &str) -> StreamEvent {
    StreamEvent::Ended {
        message_id: id.to_string(),
    }
}

pub fn failed(reason: &str) -> StreamEvent {
    StreamEvent::Failed {
        reason: reason.to_string(),
    }
}

/// Create a test router backed by the given completion backend.
pub fn test_router(backend: Arc<dyn CompletionBackend>) -> Router {
    let state = AppState::new(backend, Settings::default());
    api::create_router(state)
}

/// Serve a test app on an ephemeral port, returning its address.
pub async fn spawn_server(backend: Arc<dyn CompletionBackend>) -> SocketAddr {
    let router = test_router(backend);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
