use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};

use flowengine::utils::LoggingConfig;
use flowengine::{
    load_definition_from_path, ActionRegistry, EnvConfig, FlowEngine, MemoryFlowRepository,
    MemoryStore, PassThrough,
};

#[derive(Parser)]
#[command(name = "flowengine", version, about = "Workflow execution engine CLI", author)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 用内存协作者运行定义，输出最终的流程 JSON
    Run {
        #[arg(long)]
        definition: PathBuf,
        #[arg(long, default_value = "default")]
        tenant: String,
        #[arg(long, default_value = "cli-flow")]
        flow: String,
        /// 初始上下文（JSON 对象）
        #[arg(long)]
        context: Option<String>,
    },
    /// 校验定义文件
    Validate {
        #[arg(long)]
        definition: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    LoggingConfig::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            definition,
            tenant,
            flow,
            context,
        } => handle_run(definition, tenant, flow, context).await?,
        Command::Validate { definition } => handle_validate(definition)?,
    }
    Ok(())
}

async fn handle_run(
    path: PathBuf,
    tenant: String,
    flow_id: String,
    context: Option<String>,
) -> anyhow::Result<()> {
    let definition = load_definition_from_path(&path)?;
    let initial = match context {
        Some(raw) => serde_json::from_str::<Map<String, Value>>(&raw)
            .context("--context must be a JSON object")?,
        None => Map::new(),
    };

    let mut actions = ActionRegistry::with_builtins();
    for node in &definition.nodes {
        if !actions.contains_type(&node.node_type) {
            actions.register_type(&node.node_type, Arc::new(PassThrough));
        }
    }

    let engine = FlowEngine::new(
        Arc::new(MemoryFlowRepository::new()),
        Arc::new(MemoryStore::new()),
        Arc::new(actions),
    )
    .with_config(EnvConfig::engine_config()?);

    engine.create_flow(&tenant, &flow_id, definition).await?;
    let flow = engine.run_flow_with(&tenant, &flow_id, initial).await?;
    println!("{}", serde_json::to_string_pretty(&flow)?);
    Ok(())
}

fn handle_validate(path: PathBuf) -> anyhow::Result<()> {
    let definition = load_definition_from_path(&path)?;
    println!(
        "{}: {} nodes, start node {}",
        path.display(),
        definition.nodes.len(),
        definition
            .start_node()
            .map(|node| node.node_id.as_str())
            .unwrap_or("<none>")
    );
    Ok(())
}
