//! Subcommand implementations.
//!
//! - `run`: Socket Mode listener plus dispatcher
//! - `jobs`: manual enqueue and queue inspection
//! - `workspaces`: recorded installations

pub mod jobs;
pub mod run;
pub mod workspaces;

use serde::Serialize;

/// Envelope for `--json` output.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

pub fn print_json<T: Serialize>(data: T) -> Result<(), linkcast::LinkcastError> {
    let text = serde_json::to_string_pretty(&ApiResponse::ok(data))?;
    println!("{}", text);
    Ok(())
}
