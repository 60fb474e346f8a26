pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

use commands::catalog::CatalogArgs;

#[derive(Debug, Parser)]
#[command(
    name = "shopper",
    about = "Shopper operator CLI",
    long_about = "Inspect configuration and catalogue, render the system prompt, and talk to the recommendation agent.",
    after_help = "Examples:\n  shopper doctor --json\n  shopper catalog --weather pluie --in-stock\n  shopper ask \"il pleut à Lyon, que prendre pour courir ?\"\n  shopper chat"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, catalogue loading and LLM credential readiness")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List or summarise catalogue products")]
    Catalog {
        #[arg(long, help = "Filter by category (randonnée, running, vélo)")]
        category: Option<String>,
        #[arg(long, help = "Filter by weather tag")]
        weather: Option<String>,
        #[arg(long, help = "Case-insensitive search over name and description")]
        search: Option<String>,
        #[arg(long, help = "Only products with stock")]
        in_stock: bool,
        #[arg(long, help = "Print catalogue statistics instead of products")]
        stats: bool,
    },
    #[command(about = "Print the system prompt sent to the model")]
    Prompt {
        #[arg(long)]
        weather: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    #[command(about = "Run one recommendation cycle and print the JSON result")]
    Ask {
        message: String,
        #[arg(long)]
        weather: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    #[command(about = "Interactive shopping conversation over stdin")]
    Chat,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::CommandResult::raw(commands::config::run()),
        Command::Doctor { json } => commands::CommandResult::raw(commands::doctor::run(json)),
        Command::Catalog { category, weather, search, in_stock, stats } => {
            commands::catalog::run(CatalogArgs { category, weather, search, in_stock, stats })
        }
        Command::Prompt { weather, location } => commands::prompt::run(weather, location),
        Command::Ask { message, weather, location } => {
            commands::ask::run(message, weather, location)
        }
        Command::Chat => commands::chat::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
