mod chat;
mod config;
mod input;
mod llm;
mod ocr;
mod speech;
mod web;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::chat::TurnHandler;
use crate::config::Config;
use crate::input::InputNormalizer;
use crate::llm::OllamaClient;
use crate::ocr::OcrClient;
use crate::speech::SpeechClient;
use crate::web::AppState;
use crate::web::handlers::merge_models;

#[derive(Parser)]
#[command(name = "parley")]
#[command(version)]
#[command(about = "Local multimodal chat UI for Ollama", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the web UI
    Serve {
        /// Address to bind, overriding the config file
        #[arg(long)]
        host: Option<String>,
        /// Port to bind, overriding the config file
        #[arg(long)]
        port: Option<u16>,
    },
    /// List the models offered in the selector
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        // parley with no args = start the UI
        None => serve(config, None, None).await,
        Some(Commands::Serve { host, port }) => serve(config, host, port).await,
        Some(Commands::Models) => list_models(config).await,
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,parley=debug"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .compact()
        .init();
}

async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    // Service clients are constructed once and shared across requests
    let ollama = Arc::new(OllamaClient::new(&config.ollama_url));
    let speech = Arc::new(SpeechClient::new(&config.speech_url));
    let ocr = Arc::new(OcrClient::new(&config.ocr_url, &config.ocr_languages));

    let normalizer = Arc::new(InputNormalizer::new(speech, ocr));
    let turns = Arc::new(TurnHandler::new(ollama.clone(), config.system_prompt.clone()));

    let state = AppState {
        config: Arc::new(config),
        ollama,
        normalizer,
        turns,
    };

    println!("🚀 Chat started at http://{host}:{port} (type 'exit' to end a session)");

    web::serve(state, &host, port).await
}

async fn list_models(config: Config) -> Result<()> {
    let ollama = OllamaClient::new(&config.ollama_url);

    let installed = match ollama.list_models().await {
        Ok(models) => models,
        Err(e) => {
            println!("⚠️  Could not reach Ollama ({e}); showing suggestions only.");
            Vec::new()
        }
    };

    println!("📋 Available models:\n");
    for model in merge_models(&config.model_suggestions, installed) {
        if model == config.default_model {
            println!("  • {model} (default)");
        } else {
            println!("  • {model}");
        }
    }

    Ok(())
}
