//! sandbox-agent CLI
//!
//! Runs one prompt through the tool-calling loop against a sandboxed
//! working directory, carrying the conversation over between runs.

mod approval;
mod config;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{
    AgentBuilder, ConversationStore, FileConversationStore, GateConfig, GenerationOptions,
    LlmProvider, LlmReviewer, Part, Role, RunOutcome, Sandbox, SecurityGate, ToolRegistry,
    ToolSource, Turn,
};
use agent_runtime::{GeminiProvider, OllamaProvider};
use agent_tools::{ManifestSource, builtin_source};

use crate::approval::TerminalApproval;
use crate::config::{AppConfig, ProviderChoice};

/// AI code assistant working inside a sandboxed directory
#[derive(Parser, Debug)]
#[command(name = "sandbox-agent", version, about)]
struct Cli {
    /// Prompt to send to the agent
    prompt: String,

    /// Enable verbose output (debug logging, token usage)
    #[arg(long)]
    verbose: bool,

    /// Start a fresh session (clear saved conversation)
    #[arg(long)]
    new: bool,

    /// Attach an image to the prompt
    #[arg(long, value_name = "PATH")]
    image: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(cli).await {
        Ok(RunOutcome::Completed { text, .. }) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Ok(RunOutcome::BudgetExceeded { iterations }) => {
            eprintln!("Maximum iterations ({iterations}) reached");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<RunOutcome> {
    let config = AppConfig::from_env()?;
    let tools_config = config.tools();

    std::fs::create_dir_all(&config.working_dir).with_context(|| {
        format!("cannot create working directory {}", config.working_dir.display())
    })?;
    let sandbox = Sandbox::with_limits(&config.working_dir, tools_config.limits.clone())?;
    let root = sandbox.root().to_path_buf();
    tracing::info!(root = %root.display(), "Sandbox ready");

    // Conversation store
    let store = Arc::new(FileConversationStore::in_dir(&root));
    if cli.new {
        store.clear()?;
        tracing::info!("Started a fresh session");
    }

    // Initialize LLM provider
    let provider: Arc<dyn LlmProvider> = match &config.provider {
        ProviderChoice::Gemini { api_key } => Arc::new(GeminiProvider::new(api_key.clone())?),
        ProviderChoice::Ollama { host, port } => Arc::new(OllamaProvider::new(host.clone(), *port)?),
    };
    match provider.health_check().await {
        Ok(true) => tracing::info!("Connected to {}", provider.name()),
        Ok(false) | Err(_) => tracing::warn!("{} not reachable, requests may fail", provider.name()),
    }

    // Initialize tools: built-ins first so workspace manifests can replace them
    let tools = ToolRegistry::with_sources(vec![
        Arc::new(builtin_source(tools_config.clone())) as Arc<dyn ToolSource>,
        Arc::new(ManifestSource::new(&root, &tools_config)),
    ]);
    tracing::info!("Registered {} tools", tools.len());
    for name in tools.names() {
        tracing::debug!("  • {}", name);
    }

    let generation = GenerationOptions {
        model: config.model.clone(),
        ..Default::default()
    };
    let reviewer = Arc::new(LlmReviewer::new(provider.clone(), &generation));
    let gate = Arc::new(SecurityGate::new(
        GateConfig::default(),
        reviewer,
        Arc::new(TerminalApproval),
    ));

    let agent = AgentBuilder::new()
        .provider(provider)
        .tools(Arc::new(tools))
        .gate(gate)
        .store(store)
        .sandbox_root(root)
        .model(config.model)
        .max_iterations(config.max_iterations)
        .build()?;

    let mut parts = vec![Part::text(cli.prompt.as_str())];
    if let Some(image) = &cli.image {
        parts.push(read_image(image)?);
    }
    tracing::debug!(prompt = %cli.prompt, "User prompt");

    Ok(agent.run(Turn::new(Role::User, parts)).await?)
}

fn read_image(path: &Path) -> Result<Part> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let mime = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => bail!("unsupported image type: {}", path.display()),
    };
    let data =
        std::fs::read(path).with_context(|| format!("cannot read image {}", path.display()))?;
    Ok(Part::media(mime, data))
}
