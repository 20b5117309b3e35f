mod config;

use clap::{Parser, Subcommand};
use conclave_oracle::{completion_oracle, CompletionOracle, HttpRetrievalOracle};
use conclave_orchestrator::{
    AgentId, JsonMap, Orchestrator, TaskKind, TaskSubmission, Workflow,
};
use conclave_store::FileStore;
use config::ConclaveConfig;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conclave", about = "Conclave: multi-agent compliance orchestrator")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "conclave.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered agents
    Agents,
    /// Submit one task and wait for it to settle
    Task {
        /// analysis, research, validation, synthesis or monitoring
        #[arg(short, long)]
        kind: String,
        /// The question or instruction
        query: String,
        #[arg(long)]
        context: Option<String>,
        /// Extra task parameters as a JSON object
        #[arg(long)]
        params: Option<String>,
    },
    /// Run a workflow definition to completion
    Workflow {
        /// Workflow JSON file
        file: PathBuf,
        /// Variables as a JSON object
        #[arg(long)]
        vars: Option<String>,
    },
    /// Open a collaboration session
    Collaborate {
        objective: String,
        /// Participant agent id (repeatable)
        #[arg(short, long = "agent")]
        agents: Vec<String>,
    },
    /// Fire schedule triggers until Ctrl-C
    Triggers {
        /// JSON file holding one workflow or an array of workflows
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = ConclaveConfig::load(&cli.config).await?;

    let completion: Arc<dyn CompletionOracle> = Arc::from(completion_oracle(config.model.clone()));
    let retrieval = Arc::new(HttpRetrievalOracle::new(config.retrieval.clone()));
    let store = Arc::new(FileStore::new(config.data_dir.clone()).await?);

    let mut orchestrator = Orchestrator::builder(completion, retrieval)
        .store(store)
        .config(config.orchestrator.clone())
        .build();
    orchestrator.start();

    match cli.command {
        Commands::Agents => {
            let agents = orchestrator.list_agents().await;
            println!("Registered agents:");
            for agent in &agents {
                let caps: Vec<&str> = agent.capabilities.iter().map(String::as_str).collect();
                println!("  {} ({}): {}", agent.id, agent.kind, agent.name);
                println!("    capabilities: {}", caps.join(", "));
            }
            println!("\nTotal: {} agent(s)", agents.len());
        }
        Commands::Task {
            kind,
            query,
            context,
            params,
        } => {
            let kind: TaskKind = serde_json::from_value(Value::String(kind.clone()))
                .map_err(|_| anyhow::anyhow!("Unknown task kind '{kind}'"))?;
            let mut submission = TaskSubmission::new(kind, query);
            if let Some(context) = context {
                submission = submission.with_context(context);
            }
            for (key, value) in parse_object(params.as_deref())? {
                submission = submission.with_parameter(key, value);
            }

            let task = orchestrator.execute_task(submission).await;
            info!(task_id = %task.id, "waiting for task");
            let settled = orchestrator.wait_for_task(task.id).await?;
            println!("{}", serde_json::to_string_pretty(&settled)?);
        }
        Commands::Workflow { file, vars } => {
            let workflow: Workflow = read_json(&file).await?;
            let variables = parse_object(vars.as_deref())?;
            let context = orchestrator.run_workflow(workflow, variables).await?;
            println!("{}", serde_json::to_string_pretty(&context)?);
        }
        Commands::Collaborate { objective, agents } => {
            let participants = agents.into_iter().map(AgentId::from).collect();
            let session = orchestrator
                .start_collaboration(&objective, participants)
                .await;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Commands::Triggers { file } => {
            let raw: Value = read_json(&file).await?;
            let workflows: Vec<Workflow> = match raw {
                Value::Array(_) => serde_json::from_value(raw)?,
                single => vec![serde_json::from_value(single)?],
            };
            let armed = orchestrator.start_triggers(workflows).await?;
            if armed == 0 {
                println!("No enabled schedule triggers found in {}", file.display());
                return Ok(());
            }
            println!("{armed} schedule trigger(s) armed, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            info!("shutting down");
        }
    }

    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read '{}': {e}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

fn parse_object(raw: Option<&str>) -> anyhow::Result<JsonMap> {
    match raw {
        None => Ok(JsonMap::new()),
        Some(text) => match serde_json::from_str(text)? {
            Value::Object(map) => Ok(map),
            _ => Err(anyhow::anyhow!("Expected a JSON object, got: {text}")),
        },
    }
}
