//! Exercise explanations from a locally hosted language model.
//!
//! Any server speaking the OpenAI chat-completions protocol works
//! (llama.cpp, Ollama, LM Studio...). Responses are streamed as server-sent
//! events and forwarded chunk by chunk; the text itself is never interpreted.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:11434/v1";
pub const DEFAULT_MODEL: &str = "phi3:mini";
const SYSTEM_PROMPT: &str = "You are a concise, practical CrossFit coach.";
const TEMPERATURE: f32 = 0.2;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ExplainError {
  #[error("Invalid explainer endpoint '{0}'")]
  InvalidEndpoint(String),
  #[error("Explainer needs https or a localhost endpoint, got '{0}'")]
  InsecureEndpoint(String),
  #[error("Explainer unreachable at {0}. Is the model server running?")]
  Unreachable(String),
  #[error("Explainer request failed: {0}")]
  Http(#[from] reqwest::Error),
  #[error("Malformed explainer response: {0}")]
  Decode(#[from] serde_json::Error),
}

/// Coaching text for an exercise name, delivered as a stream of chunks.
pub trait Explainer: Send + Sync {
  /// Capability check. `Err` carries a message fit for the status line.
  fn ready(&self) -> BoxFuture<'static, Result<(), ExplainError>>;

  /// Model for subsequent requests.
  fn set_model(&self, name: &str);

  fn model(&self) -> String;

  /// Chunks arrive in emission order; dropping the stream abandons the request.
  fn explain(&self, name: &str) -> BoxStream<'static, Result<String, ExplainError>>;
}

pub fn coaching_prompt(name: &str) -> String {
  format!(
    "You are a CrossFit Level 2 coach. Explain how to perform \"{}\".\n\
     Sections:\n\
     - How to perform (clear cues)\n\
     - Standards & range of motion\n\
     - Scaling options\n\
     - Common faults\n\
     - Safety notes\n\
     Limit to ~120-180 words.",
    name
  )
}

/// Only https or loopback endpoints are accepted.
pub fn check_endpoint(base_url: &str) -> Result<(), ExplainError> {
  let url = reqwest::Url::parse(base_url).map_err(|_| ExplainError::InvalidEndpoint(base_url.to_string()))?;
  if url.scheme() == "https" {
    return Ok(());
  }
  let host = url.host_str().unwrap_or_default().trim_start_matches('[').trim_end_matches(']');
  let loopback = host == "localhost" || host.parse::<std::net::IpAddr>().map_or(false, |ip| ip.is_loopback());
  if url.scheme() == "http" && loopback {
    Ok(())
  } else {
    Err(ExplainError::InsecureEndpoint(base_url.to_string()))
  }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
  model: String,
  messages: Vec<ChatMessage>,
  temperature: f32,
  stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
  role: &'static str,
  content: String,
}

impl ChatRequest {
  fn coaching(model: String, name: &str) -> Self {
    Self {
      model,
      messages: vec![
        ChatMessage { role: "system", content: SYSTEM_PROMPT.to_string() },
        ChatMessage { role: "user", content: coaching_prompt(name) },
      ],
      temperature: TEMPERATURE,
      stream: true,
    }
  }
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
  #[serde(default)]
  choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
  #[serde(default)]
  delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
  #[serde(default)]
  content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
  Delta(String),
  Done,
}

/// One line of an event stream. Comments, other fields and empty deltas yield `None`.
pub fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, ExplainError> {
  let Some(data) = line.trim().strip_prefix("data:") else {
    return Ok(None);
  };
  let data = data.trim();
  if data == "[DONE]" {
    return Ok(Some(SseEvent::Done));
  }
  if data.is_empty() {
    return Ok(None);
  }
  let chunk: ChatChunk = serde_json::from_str(data)?;
  let text = chunk.choices.into_iter().next().and_then(|c| c.delta.content);
  Ok(text.filter(|t| !t.is_empty()).map(SseEvent::Delta))
}

/// Splits a byte stream into lines. Bytes are buffered until a newline so a
/// multi-byte character cut across two network reads is decoded intact.
#[derive(Debug, Default)]
pub struct SseDecoder {
  pending: Vec<u8>,
}

impl SseDecoder {
  pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>, ExplainError> {
    self.pending.extend_from_slice(bytes);
    let mut events = Vec::new();
    while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
      let line: Vec<u8> = self.pending.drain(..=pos).collect();
      if let Some(event) = parse_sse_line(&String::from_utf8_lossy(&line))? {
        events.push(event);
      }
    }
    Ok(events)
  }
}

pub struct HttpExplainer {
  http: reqwest::Client,
  base_url: String,
  model: RwLock<String>,
}

impl HttpExplainer {
  pub fn new(base_url: &str, model: &str) -> Result<Self, ExplainError> {
    let http = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT).build()?;
    Ok(Self { http, base_url: base_url.trim_end_matches('/').to_string(), model: RwLock::new(model.to_string()) })
  }
}

impl Explainer for HttpExplainer {
  fn ready(&self) -> BoxFuture<'static, Result<(), ExplainError>> {
    let http = self.http.clone();
    let base_url = self.base_url.clone();
    async move {
      check_endpoint(&base_url)?;
      let response = http
        .get(format!("{}/models", base_url))
        .send()
        .await
        .map_err(|_| ExplainError::Unreachable(base_url.clone()))?;
      response.error_for_status()?;
      Ok(())
    }
    .boxed()
  }

  fn set_model(&self, name: &str) {
    let mut model = self.model.write().unwrap_or_else(PoisonError::into_inner);
    if *model != name {
      info!("Explainer model switched from {} to {}", model, name);
      *model = name.to_string();
    }
  }

  fn model(&self) -> String {
    self.model.read().unwrap_or_else(PoisonError::into_inner).clone()
  }

  fn explain(&self, name: &str) -> BoxStream<'static, Result<String, ExplainError>> {
    let (tx, rx) = unbounded();
    let request = self
      .http
      .post(format!("{}/chat/completions", self.base_url))
      .json(&ChatRequest::coaching(self.model(), name));
    tokio::spawn(async move {
      if let Err(e) = stream_completion(request, &tx).await {
        warn!("Explanation request failed: {}", e);
        let _ = tx.unbounded_send(Err(e));
      }
    });
    rx.boxed()
  }
}

async fn stream_completion(
  request: reqwest::RequestBuilder,
  tx: &UnboundedSender<Result<String, ExplainError>>,
) -> Result<(), ExplainError> {
  let response = request.send().await?.error_for_status()?;
  let mut body = response.bytes_stream();
  let mut decoder = SseDecoder::default();
  while let Some(bytes) = body.next().await {
    for event in decoder.feed(&bytes?)? {
      match event {
        SseEvent::Delta(text) => {
          if tx.unbounded_send(Ok(text)).is_err() {
            // Receiver dropped: the request was superseded.
            return Ok(());
          }
        }
        SseEvent::Done => return Ok(()),
      }
    }
  }
  Ok(())
}
