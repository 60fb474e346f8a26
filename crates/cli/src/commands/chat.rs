use std::io::{self, BufRead, Write};
use std::sync::Arc;

use shopper_agent::{ChatSession, IgnoreReason, RecommendationClient, SendOutcome};
use tokio::runtime::Runtime;

use super::ask::build_runtime;
use super::{load_runtime, CommandResult};

const COMMAND: &str = "chat";

const HELP: &str = "commands: /weather <tag>, /clear, /help, /quit";

pub fn run() -> CommandResult {
    let (config, catalog) = match load_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };
    let runtime = match build_runtime(COMMAND) {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let client = RecommendationClient::from_config(&config.llm, Arc::new(catalog));
    let session = ChatSession::new(client, config.session.initial_context());

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    match run_loop(&runtime, &session, stdin.lock(), &mut stdout) {
        Ok(turns) => CommandResult::success(COMMAND, format!("chat ended after {turns} turns")),
        Err(error) => CommandResult::failure(COMMAND, "io", error.to_string(), 1),
    }
}

/// Reads lines until EOF or `/quit`. Returns how many messages reached the model.
pub fn run_loop(
    runtime: &Runtime,
    session: &ChatSession,
    input: impl BufRead,
    output: &mut impl Write,
) -> io::Result<usize> {
    let context = session.context();
    if session.client().is_demo_mode() {
        writeln!(output, "(demo mode: set SHOPPER_LLM_API_KEY to enable recommendations)")?;
    }
    writeln!(output, "météo: {} | lieu: {} | {HELP}", context.weather, context.location)?;

    let mut turns = 0;
    for line in input.lines() {
        let line = line?;
        let text = line.trim();

        if text.is_empty() {
            continue;
        }

        if let Some(command) = text.strip_prefix('/') {
            let (name, argument) = command.split_once(' ').unwrap_or((command, ""));
            match name {
                "quit" | "exit" => break,
                "clear" => {
                    session.clear_chat();
                    writeln!(output, "conversation effacée")?;
                }
                "weather" if !argument.trim().is_empty() => {
                    session.update_weather(argument.trim());
                    writeln!(output, "météo: {}", argument.trim())?;
                }
                "weather" => writeln!(output, "usage: /weather <tag>")?,
                "help" => writeln!(output, "{HELP}")?,
                other => writeln!(output, "unknown command `/{other}` ({HELP})")?,
            }
            continue;
        }

        match runtime.block_on(session.send_message(text)) {
            SendOutcome::Completed(result) => {
                turns += 1;
                writeln!(output, "shopper> {}", result.reply())?;
                for product in session.snapshot().recommended_products {
                    writeln!(
                        output,
                        "  - #{} {} ({}€, {})",
                        product.id, product.name, product.price, product.category
                    )?;
                }
            }
            SendOutcome::Ignored(IgnoreReason::Busy) => {
                writeln!(output, "a request is already in flight")?;
            }
            SendOutcome::Ignored(IgnoreReason::Empty) => {}
            SendOutcome::Discarded => writeln!(output, "(reply discarded)")?,
        }
    }

    output.flush()?;
    Ok(turns)
}
