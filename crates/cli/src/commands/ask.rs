use std::sync::Arc;

use serde::Serialize;
use shopper_agent::RecommendationClient;
use shopper_core::{infer_context, Product, RecommendationResult, ShoppingContext};
use tokio::runtime::Runtime;

use super::{load_runtime, to_data, CommandResult, EXIT_USAGE};

const COMMAND: &str = "ask";

#[derive(Debug, Serialize)]
struct AskOutput {
    context: ShoppingContext,
    demo_mode: bool,
    result: RecommendationResult,
    products: Vec<Product>,
}

pub fn run(message: String, weather: Option<String>, location: Option<String>) -> CommandResult {
    let (config, catalog) = match load_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let client = RecommendationClient::from_config(&config.llm, Arc::new(catalog));
    let mut context = infer_context(&message, &config.session.initial_context());
    if let Some(weather) = weather {
        context.weather = weather;
    }
    if let Some(location) = location {
        context.location = location;
    }

    runtime.block_on(execute(&client, &message, context))
}

/// Runs one recommendation cycle against an already configured client.
pub async fn execute(
    client: &RecommendationClient,
    message: &str,
    context: ShoppingContext,
) -> CommandResult {
    if message.trim().is_empty() {
        return CommandResult::failure(COMMAND, "invalid_argument", "message must not be blank", EXIT_USAGE);
    }

    let result = client.ask(message, &context).await;
    let products = client.catalog().by_ids(result.recommended_ids());
    let output = AskOutput { context, demo_mode: client.is_demo_mode(), result, products };

    CommandResult::success_with_data(COMMAND, output.result.reply().to_string(), to_data(&output))
}

pub(crate) fn build_runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(command, "runtime", format!("failed to start async runtime: {error}"), 1)
    })
}
