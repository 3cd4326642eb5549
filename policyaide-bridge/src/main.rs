//! policyaide-bridge — census tool agent demo
//!
//! Offers the `census_data` tool to an OpenAI model and walks a handful of
//! example policy questions through the loop, one at a time. Requires
//! `OPENAI_API_KEY`; the MCP lookup endpoint comes from the config file's
//! `[bridge]` section (defaults to a local dev instance).

use clap::Parser;
use policyaide_bridge::{AgentClient, CensusToolDispatcher, McpClient};
use policyaide_core::PolicyAideConfig;
use tracing_subscriber::{fmt, EnvFilter};

const EXAMPLE_QUESTIONS: &[&str] = &[
    "How many people live in Travis County, Texas?",
    "What is the population of Austin, TX?",
    "Compare the populations of Texas and California.",
];

#[derive(Parser, Debug)]
#[command(author, version, about = "Census tool bridge demo for PolicyAide")]
struct Args {
    /// Explicit config path; skips the candidate-path search
    #[arg(short, long)]
    config: Option<String>,

    /// Questions to run (defaults to the built-in examples)
    questions: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // The demo only needs the [bridge] section; a missing config file falls
    // back to the local-dev defaults instead of failing like the server does.
    let bridge_config = match &args.config {
        Some(path) => match PolicyAideConfig::load(path) {
            Ok(c) => c.bridge,
            Err(e) => {
                eprintln!("Failed to load config from {}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => PolicyAideConfig::discover()
            .map(|(c, _)| c.bridge)
            .unwrap_or_default(),
    };

    let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let agent = match AgentClient::new(api_key, bridge_config.openai_model.clone()) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mcp = match McpClient::new(&bridge_config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to create MCP client: {}", e);
            std::process::exit(1);
        }
    };
    let dispatcher = CensusToolDispatcher { mcp };

    let questions: Vec<String> = if args.questions.is_empty() {
        EXAMPLE_QUESTIONS.iter().map(|q| q.to_string()).collect()
    } else {
        args.questions
    };

    // One question at a time — single-flight, awaited sequentially.
    for question in &questions {
        println!("Q: {}", question);
        match agent.run(&dispatcher, question).await {
            Ok(answer) => println!("A: {}\n", answer),
            Err(e) => eprintln!("agent error: {}\n", e),
        }
    }

    Ok(())
}
