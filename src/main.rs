// SPDX-License-Identifier: MIT

use std::sync::Arc;

use clap::{Parser, Subcommand};
use dotenv::dotenv;

use neurocore_rs::engine::context::Context;
use neurocore_rs::engine::flow::{FlowLoader, FlowStore, FLOWS_FILE};
use neurocore_rs::engine::runner::FlowEngine;
use neurocore_rs::engine::settings::{EngineSettings, SETTINGS_FILE};
use neurocore_rs::nodes::BuiltinProvider;
use neurocore_rs::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file
    #[arg(long, default_value = SETTINGS_FILE)]
    settings: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a flow from a definition file
    Run {
        /// Path to the flow file (JSON or YAML)
        #[arg(short, long)]
        file: String,

        /// Initial context as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Shortcut: wrap a user message into the initial context
        #[arg(short, long)]
        message: Option<String>,

        /// Start from this node instead of the computed entry points
        #[arg(long)]
        start_node: Option<String>,
    },
    /// Invoke a single node without walking the graph
    Node {
        /// Path to the flow file (JSON or YAML)
        #[arg(short, long)]
        file: String,

        /// Node id to invoke
        #[arg(short, long)]
        node: String,

        /// Input context as a JSON object
        #[arg(short, long)]
        input: Option<String>,
    },
    /// Start the HTTP trigger surface
    Serve {
        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// Path to the flow store file
        #[arg(long, default_value = FLOWS_FILE)]
        flows: String,
    },
}

fn build_engine(settings: EngineSettings) -> FlowEngine {
    let provider = Arc::new(BuiltinProvider::new(Arc::new(settings.clone())));
    FlowEngine::new(provider, settings)
}

fn initial_context(input: Option<String>, message: Option<String>) -> anyhow::Result<Context> {
    if let Some(input) = input {
        let value: serde_json::Value = serde_json::from_str(&input)?;
        return Ok(Context::from_value(value));
    }
    if let Some(message) = message {
        return Ok(Context::from_value(serde_json::json!({
            "messages": [{"role": "user", "content": message}]
        })));
    }
    Ok(Context::new())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let settings = EngineSettings::load(&args.settings);

    match args.command {
        Commands::Run {
            file,
            input,
            message,
            start_node,
        } => {
            let engine = build_engine(settings);
            let flow = Arc::new(FlowLoader::load(&file)?);
            let initial = initial_context(input, message)?;

            let report = engine
                .run_from(flow, initial, start_node.as_deref())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            let pending = engine.list_background_runs(None);
            if !pending.is_empty() {
                log::info!(
                    "Cancelling {} scheduled background run(s) before exit",
                    pending.len()
                );
            }
            engine.shutdown();
        }
        Commands::Node { file, node, input } => {
            let engine = build_engine(settings);
            let flow = FlowLoader::load(&file)?;
            let initial = initial_context(input, None)?;

            match engine.run_single_node(&flow, &node, initial).await? {
                Some(output) => println!("{}", serde_json::to_string_pretty(&output)?),
                None => println!("Node '{}' stopped the branch", node),
            }
        }
        Commands::Serve { port, flows } => {
            let engine = build_engine(settings);
            let store = Arc::new(FlowStore::open(&flows)?);
            server::serve(engine, store, port).await?;
        }
    }

    Ok(())
}
