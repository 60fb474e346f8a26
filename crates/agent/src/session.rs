//! Per-conversation state machine: `idle -> loading -> idle`.
//!
//! A session owns its transcript, displayed products and shopping context.
//! Only one request is in flight at a time; `send_message` calls that arrive
//! while loading are ignored. Each request is tagged with the transcript epoch
//! it started in, and `clear_chat` bumps the epoch so a late answer is dropped
//! instead of landing in the cleared transcript.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use shopper_core::context::infer_context;
use shopper_core::{ChatMessage, Product, RecommendationResult, ShoppingContext};
use tracing::{debug, error, info};

use crate::client::RecommendationClient;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IgnoreReason {
    Empty,
    Busy,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Ignored(IgnoreReason),
    Completed(RecommendationResult),
    /// The transcript was cleared while the request was in flight.
    Discarded,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub messages: Vec<ChatMessage>,
    pub recommended_products: Vec<Product>,
    pub is_loading: bool,
    pub current_weather: String,
    pub current_location: String,
}

#[derive(Debug)]
struct SessionState {
    messages: Vec<ChatMessage>,
    recommended_products: Vec<Product>,
    is_loading: bool,
    context: ShoppingContext,
    epoch: u64,
}

#[derive(Clone, Debug)]
pub struct ChatSession {
    client: RecommendationClient,
    state: Arc<Mutex<SessionState>>,
}

/// Resets `is_loading` when the turn task finishes, however it finishes.
struct LoadingGuard {
    state: Arc<Mutex<SessionState>>,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        lock(&self.state).is_loading = false;
    }
}

fn lock(state: &Mutex<SessionState>) -> MutexGuard<'_, SessionState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// One full turn: ask the model, then append the answer unless the transcript
/// was cleared in the meantime. Runs detached from the caller, so dropping the
/// `send_message` future neither cancels it nor frees the session early.
async fn run_turn(
    client: RecommendationClient,
    state: Arc<Mutex<SessionState>>,
    message: String,
    context: ShoppingContext,
    epoch: u64,
) -> SendOutcome {
    let _loading = LoadingGuard { state: Arc::clone(&state) };

    let request = {
        let client = client.clone();
        tokio::spawn(async move { client.ask(&message, &context).await })
    };
    let result = match request.await {
        Ok(result) => result,
        Err(join_error) => {
            error!(
                event_name = "session.request_panicked",
                error = %join_error,
                "recommendation task failed"
            );
            RecommendationResult::technical_error()
        }
    };

    let mut current = lock(&state);
    if current.epoch != epoch {
        info!(
            event_name = "session.stale_result_discarded",
            request_epoch = epoch,
            current_epoch = current.epoch,
            "transcript cleared while request was in flight"
        );
        return SendOutcome::Discarded;
    }

    current.recommended_products = client.catalog().by_ids(result.recommended_ids());
    current
        .messages
        .push(ChatMessage::assistant(result.reply(), result.recommended_ids().to_vec()));
    SendOutcome::Completed(result)
}

impl ChatSession {
    pub fn new(client: RecommendationClient, context: ShoppingContext) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(SessionState {
                messages: Vec::new(),
                recommended_products: Vec::new(),
                is_loading: false,
                context,
                epoch: 0,
            })),
        }
    }

    pub async fn send_message(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(IgnoreReason::Empty);
        }

        let (epoch, context) = {
            let mut state = lock(&self.state);
            if state.is_loading {
                debug!(event_name = "session.send_ignored", reason = "busy", "request already in flight");
                return SendOutcome::Ignored(IgnoreReason::Busy);
            }
            state.messages.push(ChatMessage::user(text));
            state.is_loading = true;
            state.context = infer_context(text, &state.context);
            (state.epoch, state.context.clone())
        };

        let turn = tokio::spawn(run_turn(
            self.client.clone(),
            Arc::clone(&self.state),
            text.to_string(),
            context,
            epoch,
        ));
        match turn.await {
            Ok(outcome) => outcome,
            Err(join_error) => {
                error!(
                    event_name = "session.turn_failed",
                    error = %join_error,
                    "chat turn task failed"
                );
                SendOutcome::Completed(RecommendationResult::technical_error())
            }
        }
    }

    pub fn clear_chat(&self) {
        let mut state = lock(&self.state);
        state.messages.clear();
        state.recommended_products.clear();
        state.epoch += 1;
    }

    /// Affects subsequent requests only.
    pub fn update_weather(&self, weather: impl Into<String>) {
        lock(&self.state).context.weather = weather.into();
    }

    pub fn update_context(&self, weather: impl Into<String>, location: Option<String>) {
        let mut state = lock(&self.state);
        state.context.weather = weather.into();
        if let Some(location) = location {
            state.context.location = location;
        }
    }

    pub fn context(&self) -> ShoppingContext {
        lock(&self.state).context.clone()
    }

    pub fn is_loading(&self) -> bool {
        lock(&self.state).is_loading
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.state).messages.clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = lock(&self.state);
        SessionSnapshot {
            messages: state.messages.clone(),
            recommended_products: state.recommended_products.clone(),
            is_loading: state.is_loading,
            current_weather: state.context.weather.clone(),
            current_location: state.context.location.clone(),
        }
    }

    pub fn client(&self) -> &RecommendationClient {
        &self.client
    }
}
