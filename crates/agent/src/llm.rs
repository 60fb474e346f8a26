//! Chat-completion transport.
//!
//! [`ChatCompletionTransport`] is the single suspension point of a
//! recommendation turn. [`HttpChatCompletionTransport`] talks to an
//! OpenAI-compatible endpoint; [`ScriptedTransport`] replays canned outcomes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GATED_MARKER: &str = "gated";
const ERROR_BODY_MAX_CHARS: usize = 500;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<CompletionMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub response_format: ResponseFormat,
}

impl ChatCompletionRequest {
    pub fn new(
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        user_message: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            model: model.into(),
            messages: vec![
                CompletionMessage { role: "system".to_string(), content: system_prompt.into() },
                CompletionMessage { role: "user".to_string(), content: user_message.into() },
            ],
            temperature,
            max_tokens,
            response_format: ResponseFormat::json_object(),
        }
    }

    pub fn user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|message| message.role == "user")
            .map(|message| message.content.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMessage {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self { kind: "json_object".to_string() }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion request failed: {0}")]
    Network(String),
    #[error("completion endpoint returned HTTP {status}")]
    Status { status: u16, body: String },
    #[error("could not decode completion response: {0}")]
    Decode(String),
    #[error("completion response carried no message content")]
    EmptyCompletion,
}

impl TransportError {
    /// 403 whose body says the selected model is access-restricted.
    pub fn is_gated_model(&self) -> bool {
        match self {
            Self::Status { status, body } => {
                *status == 403 && body.to_lowercase().contains(GATED_MARKER)
            }
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Network(_) => "network",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
            Self::EmptyCompletion => "empty_completion",
        }
    }
}

#[async_trait]
pub trait ChatCompletionTransport: Send + Sync {
    /// Sends one request and returns the first choice's message content.
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<String, TransportError>;
}

pub struct HttpChatCompletionTransport {
    client: Client,
    endpoint: String,
    api_key: SecretString,
}

impl HttpChatCompletionTransport {
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self::with_client(Client::new(), endpoint, api_key)
    }

    pub fn with_client(client: Client, endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self { client, endpoint: endpoint.into(), api_key }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for HttpChatCompletionTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpChatCompletionTransport")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[redacted]")
            .finish()
    }
}

#[async_trait]
impl ChatCompletionTransport for HttpChatCompletionTransport {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<String, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|error| TransportError::Network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_MAX_CHARS).collect(),
            });
        }

        let envelope: CompletionEnvelope =
            response.json().await.map_err(|error| TransportError::Decode(error.to_string()))?;

        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message)
            .and_then(|message| message.content)
            .ok_or(TransportError::EmptyCompletion)
    }
}

/// Outcome replayed by [`ScriptedTransport`].
#[derive(Clone, Debug)]
pub enum ScriptedReply {
    Content(String),
    Failure(TransportError),
    /// Sleeps before answering with the content.
    Delayed(Duration, String),
    Panic(String),
}

/// Replays queued replies in order and records every request it receives.
/// Once the queue is drained it keeps answering with the last reply.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    replies: Arc<Mutex<VecDeque<ScriptedReply>>>,
    last: Arc<Mutex<Option<ScriptedReply>>>,
    requests: Arc<Mutex<Vec<ChatCompletionRequest>>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn replying(content: impl Into<String>) -> Self {
        Self::new([ScriptedReply::Content(content.into())])
    }

    pub fn failing(error: TransportError) -> Self {
        Self::new([ScriptedReply::Failure(error)])
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        let mut replies = match self.replies.lock() {
            Ok(replies) => replies,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut last = match self.last.lock() {
            Ok(last) => last,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(reply) = replies.pop_front() {
            *last = Some(reply.clone());
            return Some(reply);
        }
        last.clone()
    }
}

#[async_trait]
impl ChatCompletionTransport for ScriptedTransport {
    async fn complete(&self, request: &ChatCompletionRequest) -> Result<String, TransportError> {
        match self.requests.lock() {
            Ok(mut requests) => requests.push(request.clone()),
            Err(poisoned) => poisoned.into_inner().push(request.clone()),
        }

        match self.next_reply() {
            Some(ScriptedReply::Content(content)) => Ok(content),
            Some(ScriptedReply::Failure(error)) => Err(error),
            Some(ScriptedReply::Delayed(delay, content)) => {
                tokio::time::sleep(delay).await;
                Ok(content)
            }
            Some(ScriptedReply::Panic(message)) => panic!("{message}"),
            None => Err(TransportError::Network("no scripted reply queued".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ChatCompletionRequest, ChatCompletionTransport, ScriptedReply, ScriptedTransport,
        TransportError,
    };

    fn request() -> ChatCompletionRequest {
        ChatCompletionRequest::new("model-a", "system", "veste pluie", 0.5, 300)
    }

    #[test]
    fn request_serialises_to_chat_completion_shape() {
        let value = serde_json::to_value(request()).expect("serialise");
        assert_eq!(value["model"], "model-a");
        assert_eq!(value["messages"][0]["role"], "system");
        assert_eq!(value["messages"][1]["role"], "user");
        assert_eq!(value["messages"][1]["content"], "veste pluie");
        assert_eq!(value["temperature"], 0.5);
        assert_eq!(value["max_tokens"], 300);
        assert_eq!(value["response_format"]["type"], "json_object");
    }

    #[test]
    fn gated_detection_needs_403_and_marker() {
        let gated = TransportError::Status {
            status: 403,
            body: "{\"error\":\"Model is GATED\"}".to_string(),
        };
        let forbidden = TransportError::Status { status: 403, body: "forbidden".to_string() };
        let server = TransportError::Status { status: 500, body: "gated".to_string() };

        assert!(gated.is_gated_model());
        assert!(!forbidden.is_gated_model());
        assert!(!server.is_gated_model());
    }

    #[tokio::test]
    async fn scripted_transport_replays_in_order_then_repeats_last() {
        let transport = ScriptedTransport::new([
            ScriptedReply::Content("first".to_string()),
            ScriptedReply::Failure(TransportError::EmptyCompletion),
        ]);

        assert_eq!(transport.complete(&request()).await, Ok("first".to_string()));
        assert_eq!(transport.complete(&request()).await, Err(TransportError::EmptyCompletion));
        assert_eq!(transport.complete(&request()).await, Err(TransportError::EmptyCompletion));
        assert_eq!(transport.call_count(), 3);
        assert_eq!(transport.requests()[0].user_message(), Some("veste pluie"));
    }
}
