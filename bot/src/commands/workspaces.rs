use linkcast::db::installation_repo;
use linkcast::LinkcastError;
use serde::Serialize;

use super::print_json;
use crate::state::AppState;

/// Installation summary without the stored credential.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSummary {
    pub team_id: String,
    pub team_name: Option<String>,
    pub bot_user_id: Option<String>,
    pub updated_at: String,
}

pub fn list(state: &AppState, json: bool) -> Result<(), LinkcastError> {
    let workspaces: Vec<WorkspaceSummary> = installation_repo::list(&state.db)?
        .into_iter()
        .map(|row| WorkspaceSummary {
            team_id: row.team_id,
            team_name: row.team_name,
            bot_user_id: row.bot_user_id,
            updated_at: row.updated_at,
        })
        .collect();

    if json {
        return print_json(workspaces);
    }

    if workspaces.is_empty() {
        println!("No workspaces recorded. Set a token key and run the bot once.");
    }
    for ws in &workspaces {
        println!(
            "{}  {}  (updated {})",
            ws.team_id,
            ws.team_name.as_deref().unwrap_or("-"),
            ws.updated_at
        );
    }
    Ok(())
}
