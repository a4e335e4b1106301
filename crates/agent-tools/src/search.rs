//! `search_web` tool: Brave Search web results.
//!
//! Needs a subscription token (`BRAVE_API_KEY`). Results come back as a
//! numbered markdown list of title, link and description.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use agent_core::error::{AgentError, Result};
use agent_core::tool::{Tool, ToolDeclaration, params};

pub const SEARCH_WEB: &str = "search_web";

const BRAVE_API_URL: &str = "https://api.search.brave.com/res/v1/web/search";

const DEFAULT_COUNT: i64 = 5;
const MAX_COUNT: i64 = 10;

pub struct SearchWebTool {
    api_key: Option<String>,
    client: reqwest::Client,
}

impl SearchWebTool {
    pub fn new(api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { api_key, client }
    }

    fn clamp_count(requested: Option<i64>) -> i64 {
        requested.unwrap_or(DEFAULT_COUNT).clamp(1, MAX_COUNT)
    }
}

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: BraveWeb,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
}

fn format_results(results: &[BraveResult]) -> String {
    if results.is_empty() {
        return "No results found.".into();
    }
    results
        .iter()
        .enumerate()
        .map(|(i, r)| {
            format!(
                "{}. [{}]({})\n   {}",
                i + 1,
                r.title.as_deref().unwrap_or("No title"),
                r.url.as_deref().unwrap_or("No link"),
                r.description.as_deref().unwrap_or("No description"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn status_message(status: StatusCode) -> String {
    match status {
        StatusCode::TOO_MANY_REQUESTS => "Rate limit exceeded for Brave Search API.".into(),
        StatusCode::UNAUTHORIZED => "Invalid Brave API Key.".into(),
        other => format!("Brave API returned status code {}", other.as_u16()),
    }
}

#[async_trait]
impl Tool for SearchWebTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            SEARCH_WEB,
            "Searches the internet for real-time information using Brave Search.",
            json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The search query (e.g., 'python 3.12 release date', 'fix error X')."
                    },
                    "count": {
                        "type": "integer",
                        "description": "Number of results to return (default 5, at most 10)."
                    }
                },
                "required": ["query"]
            }),
        )
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<String> {
        let query = params::required_str(args, "query")?;
        let count = Self::clamp_count(params::optional_i64(args, "count"));

        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AgentError::ToolExecution(
                "BRAVE_API_KEY not found in environment variables.".into(),
            ));
        };

        tracing::info!(%query, count, "Searching the web");
        let response = self
            .client
            .get(BRAVE_API_URL)
            .query(&[("q", query.to_string()), ("count", count.to_string())])
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("Error connecting to search API: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(AgentError::ToolExecution(status_message(status)));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| AgentError::ToolExecution(format!("Failed to parse search results: {e}")))?;

        Ok(format_results(&body.web.results))
    }
}
