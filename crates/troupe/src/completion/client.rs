//! OpenAI-compatible streaming completion client.
//!
//! Speaks the `POST {base_url}/chat/completions` SSE protocol: one request
//! per completion, `stream: true`, chunked deltas terminated by a
//! `data: [DONE]` sentinel.

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};
use reqwest::RequestBuilder;
use reqwest_eventsource::{Event, RequestBuilderExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{CompletionBackend, CompletionError, StreamEvent, event_channel};
use crate::persona::Persona;
use crate::settings::ProviderSettings;

/// Client for an OpenAI-compatible chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    /// Bounded wait applied to every SSE read, including the first.
    request_timeout: Duration,
}

impl CompletionClient {
    /// Build a client from provider settings, reading the API key from the
    /// configured environment variable.
    pub fn from_settings(settings: &ProviderSettings) -> Result<Self, CompletionError> {
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| CompletionError::MissingApiKey(settings.api_key_env.clone()))?;

        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: settings.model.clone(),
            max_tokens: settings.max_tokens,
            request_timeout: Duration::from_secs(settings.request_timeout_secs),
        })
    }

    fn build_request(&self, persona: &Persona, user_text: &str) -> RequestBuilder {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: persona.instruction.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_text.to_string(),
                },
            ],
            temperature: persona.temperature,
            max_tokens: self.max_tokens,
            stream: true,
        };

        self.http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
    }
}

#[async_trait]
impl CompletionBackend for CompletionClient {
    async fn stream(&self, persona: &Persona, user_text: &str) -> mpsc::Receiver<StreamEvent> {
        let (tx, rx) = event_channel();
        let request = self.build_request(persona, user_text);
        let message_id = Uuid::new_v4().to_string();
        let timeout = self.request_timeout;

        tokio::spawn(run_stream(request, message_id, timeout, tx));

        rx
    }
}

/// Drive one completion stream to its single terminal event.
async fn run_stream(
    request: RequestBuilder,
    message_id: String,
    timeout: Duration,
    tx: mpsc::Sender<StreamEvent>,
) {
    if tx
        .send(StreamEvent::Started {
            message_id: message_id.clone(),
        })
        .await
        .is_err()
    {
        // Consumer already gone (client disconnected before dispatch).
        return;
    }

    if let Err(err) = pump(request, &message_id, timeout, &tx).await {
        warn!("completion stream {message_id} failed: {err}");
        let _ = tx
            .send(StreamEvent::Failed {
                reason: err.to_string(),
            })
            .await;
    }
}

/// Forward provider deltas until the stream ends. Any `Err` becomes exactly
/// one `Failed` event in the caller.
async fn pump(
    request: RequestBuilder,
    message_id: &str,
    timeout: Duration,
    tx: &mpsc::Sender<StreamEvent>,
) -> Result<(), CompletionError> {
    let mut source = request
        .eventsource()
        .map_err(|e| CompletionError::Request(e.to_string()))?;

    loop {
        let next = tokio::time::timeout(timeout, source.next())
            .await
            .map_err(|_| CompletionError::Timeout(timeout))?;

        match next {
            None => {
                // Source exhausted without a sentinel; treat as graceful end.
                let _ = tx
                    .send(StreamEvent::Ended {
                        message_id: message_id.to_string(),
                    })
                    .await;
                return Ok(());
            }
            Some(Ok(Event::Open)) => {
                debug!("completion stream {message_id} connected");
            }
            Some(Ok(Event::Message(msg))) => {
                if msg.data == "[DONE]" {
                    source.close();
                    let _ = tx
                        .send(StreamEvent::Ended {
                            message_id: message_id.to_string(),
                        })
                        .await;
                    return Ok(());
                }

                if let Some(text) = extract_delta(&msg.data) {
                    let sent = tx
                        .send(StreamEvent::Fragment {
                            message_id: message_id.to_string(),
                            text,
                        })
                        .await;
                    if sent.is_err() {
                        // Client went away mid-stream; abandon the call.
                        source.close();
                        return Ok(());
                    }
                }
            }
            Some(Err(reqwest_eventsource::Error::StreamEnded)) => {
                let _ = tx
                    .send(StreamEvent::Ended {
                        message_id: message_id.to_string(),
                    })
                    .await;
                return Ok(());
            }
            Some(Err(e)) => {
                source.close();
                return Err(CompletionError::Stream(e.to_string()));
            }
        }
    }
}

/// Pull the text delta out of one SSE chunk. Empty deltas are suppressed.
fn extract_delta(data: &str) -> Option<String> {
    let chunk: ChatChunk = match serde_json::from_str(data) {
        Ok(chunk) => chunk,
        Err(e) => {
            warn!("unparseable completion chunk: {e}");
            return None;
        }
    };

    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty())
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}
