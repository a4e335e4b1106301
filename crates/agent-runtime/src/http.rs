//! Shared HTTP error mapping for the backends

use agent_core::error::{AgentError, Result};
use reqwest::{Response, StatusCode};

/// Connection-level failures mean the backend is unreachable
pub(crate) fn transport_error(err: reqwest::Error) -> AgentError {
    if err.is_timeout() {
        AgentError::ProviderUnavailable(format!("request timed out: {err}"))
    } else {
        AgentError::ProviderUnavailable(err.to_string())
    }
}

/// Map non-success statuses onto the error taxonomy
pub(crate) async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

pub(crate) fn status_error(status: StatusCode, body: &str) -> AgentError {
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    match status {
        StatusCode::TOO_MANY_REQUESTS => AgentError::RateLimited(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AgentError::Auth(detail),
        s if s.is_server_error() => AgentError::ProviderUnavailable(detail),
        _ => AgentError::Provider(detail),
    }
}
