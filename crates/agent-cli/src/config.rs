//! Environment configuration

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use agent_core::sandbox::SandboxLimits;
use agent_tools::ToolsConfig;

/// Which reasoning backend to talk to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProviderChoice {
    Gemini { api_key: String },
    Ollama { host: String, port: u16 },
}

/// Settings read from the environment (and `.env`)
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub working_dir: PathBuf,
    pub max_iterations: usize,
    pub max_chars: usize,
    pub exec_timeout: Duration,
    pub python: String,
    pub provider: ProviderChoice,
    pub model: String,
    pub brave_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("AGENT_PROVIDER").as_deref().unwrap_or("gemini") {
            "gemini" => ProviderChoice::Gemini {
                api_key: get("GEMINI_API_KEY")
                    .context("GEMINI_API_KEY environment variable not set")?,
            },
            "ollama" => ProviderChoice::Ollama {
                host: get("OLLAMA_HOST").unwrap_or_else(|| "http://localhost".into()),
                port: parse_or(get("OLLAMA_PORT"), "OLLAMA_PORT", 11434)?,
            },
            other => bail!("AGENT_PROVIDER must be 'gemini' or 'ollama', got '{other}'"),
        };

        let default_model = match provider {
            ProviderChoice::Gemini { .. } => "gemini-2.5-flash",
            ProviderChoice::Ollama { .. } => "llama3.2",
        };

        let max_iterations = parse_or(get("AGENT_MAX_ITERS"), "AGENT_MAX_ITERS", 20)?;
        if max_iterations == 0 {
            bail!("AGENT_MAX_ITERS must be at least 1");
        }

        Ok(Self {
            working_dir: get("AGENT_WORKING_DIR")
                .map_or_else(|| PathBuf::from("./agent_workspace"), PathBuf::from),
            max_iterations,
            max_chars: parse_or(get("AGENT_MAX_CHARS"), "AGENT_MAX_CHARS", 10_000)?,
            exec_timeout: Duration::from_secs(parse_or(
                get("AGENT_EXEC_TIMEOUT_SECS"),
                "AGENT_EXEC_TIMEOUT_SECS",
                30,
            )?),
            python: get("AGENT_PYTHON").unwrap_or_else(|| "python3".into()),
            provider,
            model: get("AGENT_MODEL").unwrap_or_else(|| default_model.into()),
            brave_api_key: get("BRAVE_API_KEY"),
        })
    }

    pub fn tools(&self) -> ToolsConfig {
        ToolsConfig {
            limits: SandboxLimits {
                max_chars: self.max_chars,
                exec_timeout: self.exec_timeout,
            },
            python: self.python.clone(),
            brave_api_key: self.brave_api_key.clone(),
        }
    }
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.map_or(Ok(default), |v| {
        v.trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: '{v}'"))
    })
}
