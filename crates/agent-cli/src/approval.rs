//! Terminal approval prompt

use std::io::{BufRead, Write};

use async_trait::async_trait;
use serde_json::{Map, Value};

use agent_core::security::ApprovalPort;

/// Asks the operator on stdin; only `y` approves
pub struct TerminalApproval;

impl TerminalApproval {
    fn is_yes(answer: &str) -> bool {
        answer.trim().eq_ignore_ascii_case("y")
    }

    fn prompt(tool_name: &str, args: &Map<String, Value>) -> bool {
        let mut stdout = std::io::stdout().lock();
        // A broken stdout or stdin denies.
        let shown = writeln!(
            stdout,
            "\n[SECURITY ALERT] Agent wants to execute: {tool_name}\n    Args: {}",
            Value::Object(args.clone())
        )
        .and_then(|()| write!(stdout, ">> Allow? (y/N): "))
        .and_then(|()| stdout.flush());
        if shown.is_err() {
            return false;
        }

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) => Self::is_yes(&answer),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl ApprovalPort for TerminalApproval {
    async fn approve(&self, tool_name: &str, args: &Map<String, Value>) -> bool {
        let tool_name = tool_name.to_string();
        let args = args.clone();
        let approved = tokio::task::spawn_blocking(move || Self::prompt(&tool_name, &args))
            .await
            .unwrap_or(false);
        if !approved {
            println!("Denied by user.");
        }
        approved
    }
}
