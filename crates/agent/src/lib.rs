//! Recommendation agent - talks to the chat-completion endpoint on behalf of a
//! shopping conversation.
//!
//! - `llm`: transport seam to the OpenAI-compatible endpoint (HTTP + scripted)
//! - `client`: one request/response cycle, with demo mode and fallbacks
//! - `session`: per-conversation transcript, loading state and context
//!
//! # Safety Principle
//!
//! The model only proposes product ids. Which products are shown is decided
//! by the catalogue: unknown and out-of-stock ids never reach the shopper.

pub mod client;
pub mod llm;
pub mod session;

pub use client::{AskError, ClientSettings, RecommendationClient};
pub use llm::{
    ChatCompletionRequest, ChatCompletionTransport, HttpChatCompletionTransport, ScriptedReply,
    ScriptedTransport, TransportError,
};
pub use session::{ChatSession, IgnoreReason, SendOutcome, SessionSnapshot};
