use std::sync::Arc;
use std::time::Duration;

use shopper_core::config::LlmConfig;
use shopper_core::events::{EventSink, RecommendationEvent, TracingEventSink};
use shopper_core::recommendation::prompt::build_system_prompt;
use shopper_core::recommendation::recovery::{RecoveryPipeline, RecoveryTier};
use shopper_core::recommendation::stock::StockFilter;
use shopper_core::{Catalog, RecommendationResult, ShoppingContext};
use thiserror::Error;

use crate::llm::{
    ChatCompletionRequest, ChatCompletionTransport, HttpChatCompletionTransport, TransportError,
};

#[derive(Clone, Debug, PartialEq)]
pub struct ClientSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl From<&LlmConfig> for ClientSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Why a turn could not be answered from the model. Never leaves the client:
/// [`AskError::into_result`] turns each variant into a user-facing reply.
#[derive(Debug, Error)]
pub enum AskError {
    #[error("user message is empty")]
    EmptyMessage,
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl AskError {
    pub fn into_result(self, model: &str) -> RecommendationResult {
        match self {
            Self::Transport(error) if error.is_gated_model() => {
                RecommendationResult::gated_model(model)
            }
            Self::EmptyMessage | Self::Transport(_) => RecommendationResult::technical_error(),
        }
    }
}

/// One request/response cycle against the completion endpoint. Without a
/// transport the client is in demo mode and never touches the network.
#[derive(Clone)]
pub struct RecommendationClient {
    transport: Option<Arc<dyn ChatCompletionTransport>>,
    catalog: Arc<Catalog>,
    settings: ClientSettings,
    recovery: Arc<RecoveryPipeline>,
    events: Arc<dyn EventSink>,
}

impl RecommendationClient {
    pub fn new(
        transport: Option<Arc<dyn ChatCompletionTransport>>,
        catalog: Arc<Catalog>,
        settings: ClientSettings,
    ) -> Self {
        let recovery = Arc::new(RecoveryPipeline::new(catalog.max_id()));
        Self { transport, catalog, settings, recovery, events: Arc::new(TracingEventSink) }
    }

    /// HTTP transport when a usable credential is configured, demo mode otherwise.
    pub fn from_config(config: &LlmConfig, catalog: Arc<Catalog>) -> Self {
        let transport = config.credential().map(|api_key| {
            Arc::new(HttpChatCompletionTransport::new(config.completions_url(), api_key.clone()))
                as Arc<dyn ChatCompletionTransport>
        });
        Self::new(transport, catalog, ClientSettings::from(config))
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn is_demo_mode(&self) -> bool {
        self.transport.is_none()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Always yields a result; every failure maps to a fallback reply.
    pub async fn ask(&self, message: &str, context: &ShoppingContext) -> RecommendationResult {
        let Some(transport) = self.transport.as_ref() else {
            self.events.emit(RecommendationEvent::warn(
                "client.demo_mode",
                "no credential configured; answering in demo mode",
            ));
            return RecommendationResult::demo_mode();
        };

        match self.try_ask(transport.as_ref(), message, context).await {
            Ok(result) => result,
            Err(error) => {
                self.events.emit(self.failure_event(&error));
                error.into_result(&self.settings.model)
            }
        }
    }

    fn failure_event(&self, error: &AskError) -> RecommendationEvent {
        match error {
            AskError::Transport(transport) if transport.is_gated_model() => {
                RecommendationEvent::error("client.gated_model", error.to_string())
                    .with_metadata("model", self.settings.model.clone())
            }
            AskError::Transport(transport) => {
                RecommendationEvent::error("client.request_failed", error.to_string())
                    .with_metadata("kind", transport.kind())
            }
            AskError::EmptyMessage => {
                RecommendationEvent::warn("client.request_failed", error.to_string())
                    .with_metadata("kind", "empty_message")
            }
        }
    }

    async fn try_ask(
        &self,
        transport: &dyn ChatCompletionTransport,
        message: &str,
        context: &ShoppingContext,
    ) -> Result<RecommendationResult, AskError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AskError::EmptyMessage);
        }

        let system_prompt =
            build_system_prompt(self.catalog.all(), &context.weather, &context.location);
        let request = ChatCompletionRequest::new(
            self.settings.model.clone(),
            system_prompt,
            message,
            self.settings.temperature,
            self.settings.max_tokens,
        );

        self.events.emit(
            RecommendationEvent::debug("client.request_sent", "sending completion request")
                .with_metadata("model", self.settings.model.clone())
                .with_metadata("weather", context.weather.clone())
                .with_metadata("location", context.location.clone()),
        );

        let raw = tokio::time::timeout(self.settings.timeout, transport.complete(&request))
            .await
            .map_err(|_| TransportError::Timeout(self.settings.timeout))??;

        let recovered = self.recovery.recover(&raw, self.events.as_ref());
        if recovered.tier == RecoveryTier::Fallback {
            return Ok(recovered.result);
        }

        let outcome = StockFilter::new(&self.catalog).apply(recovered.result, self.events.as_ref());
        Ok(outcome.result)
    }
}

impl std::fmt::Debug for RecommendationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecommendationClient")
            .field("demo_mode", &self.is_demo_mode())
            .field("settings", &self.settings)
            .field("catalog_size", &self.catalog.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use shopper_core::config::AppConfig;
    use shopper_core::events::InMemoryEventSink;
    use shopper_core::recommendation::{
        DEMO_MODE_REPLY, FRIENDLY_FALLBACK_REPLY, TECHNICAL_ERROR_REPLY,
    };
    use shopper_core::{Catalog, ProductId, ShoppingContext};

    use super::{ClientSettings, RecommendationClient};
    use crate::llm::{ChatCompletionTransport, ScriptedReply, ScriptedTransport, TransportError};

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::from_json_str(
                r#"[
                    {"id":1,"name":"Veste Imperméable","category":"Randonnée","price":89,
                     "weather_tags":["pluie"],"stock_level":5},
                    {"id":2,"name":"T-shirt","category":"Running","price":29,
                     "weather_tags":["soleil"],"stock_level":0},
                    {"id":3,"name":"Gants","category":"Vélo","price":22,
                     "weather_tags":["froid"],"stock_level":3}
                ]"#,
            )
            .expect("catalogue"),
        )
    }

    fn settings() -> ClientSettings {
        ClientSettings {
            model: "mistralai/Mistral-7B-Instruct-v0.3".to_string(),
            temperature: 0.5,
            max_tokens: 300,
            timeout: Duration::from_millis(200),
        }
    }

    fn client(transport: &ScriptedTransport, sink: &InMemoryEventSink) -> RecommendationClient {
        let transport: Arc<dyn ChatCompletionTransport> = Arc::new(transport.clone());
        RecommendationClient::new(Some(transport), catalog(), settings())
            .with_event_sink(Arc::new(sink.clone()))
    }

    fn context() -> ShoppingContext {
        ShoppingContext::new("pluie", "Lyon")
    }

    #[tokio::test]
    async fn demo_mode_never_calls_transport() {
        let sink = InMemoryEventSink::default();
        let client = RecommendationClient::new(None, catalog(), settings())
            .with_event_sink(Arc::new(sink.clone()));

        let result = client.ask("une veste", &context()).await;

        assert!(client.is_demo_mode());
        assert_eq!(result.reply(), DEMO_MODE_REPLY);
        assert!(result.recommended_ids().is_empty());
        assert!(sink.contains("client.demo_mode"));
    }

    #[tokio::test]
    async fn placeholder_key_in_config_means_demo_mode() {
        let mut config = AppConfig::default();
        config.llm.api_key = Some("ta_cle_featherless_ici".to_string().into());
        let client = RecommendationClient::from_config(&config.llm, catalog());
        assert!(client.is_demo_mode());

        config.llm.api_key = Some("real-key".to_string().into());
        let client = RecommendationClient::from_config(&config.llm, catalog());
        assert!(!client.is_demo_mode());
    }

    #[tokio::test]
    async fn successful_reply_is_recovered_and_stock_filtered() {
        let sink = InMemoryEventSink::default();
        let transport = ScriptedTransport::replying(
            r#"{"reply":"Prends la veste","recommended_ids":[1,2]}"#,
        );

        let result = client(&transport, &sink).ask("  une veste  ", &context()).await;

        assert_eq!(result.reply(), "Prends la veste");
        assert_eq!(result.recommended_ids(), vec![ProductId(1)]);
        assert!(sink.contains("stock.dropped"));

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_message(), Some("une veste"));
        assert!(requests[0].messages[0].content.contains("Météo prévue : \"pluie\""));
        assert!(requests[0].messages[0].content.contains("\"Lyon\""));
    }

    #[tokio::test]
    async fn gated_model_gets_actionable_reply() {
        let sink = InMemoryEventSink::default();
        let transport = ScriptedTransport::failing(TransportError::Status {
            status: 403,
            body: "The model is gated".to_string(),
        });

        let result = client(&transport, &sink).ask("une veste", &context()).await;

        assert!(result.reply().contains("mistralai/Mistral-7B-Instruct-v0.3"));
        assert!(result.reply().contains("Qwen/Qwen2.5-7B-Instruct"));
        assert!(result.recommended_ids().is_empty());
        assert!(sink.contains("client.gated_model"));
    }

    #[tokio::test]
    async fn other_http_failures_get_technical_reply() {
        let sink = InMemoryEventSink::default();
        let transport = ScriptedTransport::failing(TransportError::Status {
            status: 500,
            body: "boom".to_string(),
        });

        let result = client(&transport, &sink).ask("une veste", &context()).await;

        assert_eq!(result.reply(), TECHNICAL_ERROR_REPLY);
        assert!(sink.contains("client.request_failed"));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out_to_technical_reply() {
        let sink = InMemoryEventSink::default();
        let transport = ScriptedTransport::new([ScriptedReply::Delayed(
            Duration::from_secs(5),
            r#"{"reply":"trop tard","recommended_ids":[1]}"#.to_string(),
        )]);

        let result = client(&transport, &sink).ask("une veste", &context()).await;

        assert_eq!(result.reply(), TECHNICAL_ERROR_REPLY);
        let failure = sink
            .events()
            .into_iter()
            .find(|event| event.event_type == "client.request_failed")
            .expect("failure event");
        assert_eq!(failure.metadata.get("kind").map(String::as_str), Some("timeout"));
    }

    #[tokio::test]
    async fn unrecoverable_text_gets_friendly_fallback() {
        let sink = InMemoryEventSink::default();
        let transport = ScriptedTransport::replying("{ [ ] }");

        let result = client(&transport, &sink).ask("une veste", &context()).await;

        assert_eq!(result.reply(), FRIENDLY_FALLBACK_REPLY);
        assert!(result.recommended_ids().is_empty());
    }

    #[tokio::test]
    async fn blank_message_is_not_sent() {
        let sink = InMemoryEventSink::default();
        let transport = ScriptedTransport::replying("{}");

        let result = client(&transport, &sink).ask("   ", &context()).await;

        assert_eq!(result.reply(), TECHNICAL_ERROR_REPLY);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn salvaged_ids_are_stock_filtered_too() {
        let sink = InMemoryEventSink::default();
        let transport = ScriptedTransport::replying(
            "Je te conseille \"recommended_ids\": [3, 2, 12] voilà",
        );

        let result = client(&transport, &sink).ask("des gants", &context()).await;

        assert_eq!(result.recommended_ids(), vec![ProductId(3)]);
    }
}
