//! Chat workspaces the bot serves, resolved once at startup.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};

use super::slack::SlackClient;
use super::{ChatApi, ChatError};
use crate::config::{SlackConfig, WorkspaceCredentials};
use crate::db::installation_repo::{self, InstallationRow};
use crate::db::{format_timestamp, Database};
use crate::sanitize;
use crate::secrets::{self, TokenEncryptor};

/// One workspace's identity plus an API handle bound to its bot token.
///
/// Passed explicitly to everything that talks to that workspace.
#[derive(Clone)]
pub struct WorkspaceContext {
    pub team_id: String,
    pub team_name: String,
    pub bot_user_id: Option<String>,
    pub bot_id: Option<String>,
    api: Arc<dyn ChatApi>,
}

impl WorkspaceContext {
    pub fn new(
        team_id: impl Into<String>,
        team_name: impl Into<String>,
        api: Arc<dyn ChatApi>,
    ) -> Self {
        Self {
            team_id: team_id.into(),
            team_name: team_name.into(),
            bot_user_id: None,
            bot_id: None,
            api,
        }
    }

    pub fn api(&self) -> &dyn ChatApi {
        self.api.as_ref()
    }
}

impl fmt::Debug for WorkspaceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkspaceContext")
            .field("team_id", &self.team_id)
            .field("team_name", &self.team_name)
            .field("bot_user_id", &self.bot_user_id)
            .field("bot_id", &self.bot_id)
            .field("api", &"<redacted>")
            .finish()
    }
}

/// A bot/app token pair before it has been checked against the API.
pub struct CandidateWorkspace {
    /// `WS1`, `WS2`, ... for env-discovered pairs, `config[n]` otherwise.
    pub label: String,
    pub bot_token: SecretString,
    pub app_token: Option<SecretString>,
}

#[derive(Debug, Default)]
pub struct WorkspaceRegistry {
    workspaces: Vec<WorkspaceContext>,
    app_token: Option<SecretString>,
}

impl WorkspaceRegistry {
    pub fn new(workspaces: Vec<WorkspaceContext>, app_token: Option<SecretString>) -> Self {
        Self {
            workspaces,
            app_token,
        }
    }

    /// Looks up a workspace by team id. Without a team id (single-workspace
    /// deployments, jobs queued from the CLI) the first workspace is used.
    pub fn get(&self, team_id: Option<&str>) -> Option<&WorkspaceContext> {
        match team_id {
            Some(team_id) => self.workspaces.iter().find(|ws| ws.team_id == team_id),
            None => self.workspaces.first(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorkspaceContext> {
        self.workspaces.iter()
    }

    pub fn len(&self) -> usize {
        self.workspaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workspaces.is_empty()
    }

    /// App-level token of the first workspace that has one; Socket Mode
    /// runs on it.
    pub fn app_token(&self) -> Option<&SecretString> {
        self.app_token.as_ref()
    }

    /// Resolves every configured and `SLACK_WS<n>_*` workspace, verifies
    /// each bot token with `auth.test`, and records the installations.
    ///
    /// Workspaces whose token fails verification are skipped; having none
    /// left is an error.
    pub async fn load_from_env(config: &SlackConfig, db: &Database) -> Result<Self, ChatError> {
        let mut candidates = configured_workspaces(&config.workspaces)?;
        candidates.extend(discover_env_workspaces(std::env::vars()));
        info!(count = candidates.len(), "Found chat workspace credentials");

        let encryptor = match secrets::resolve_secret_optional(
            config.token_key.as_deref(),
            config.token_key_file.as_deref(),
            config.token_key_env_var.as_deref(),
        )? {
            Some(key) => Some(TokenEncryptor::from_secret(&key)?),
            None => {
                debug!("No token key configured, installations will not be stored");
                None
            }
        };

        let mut workspaces = Vec::new();
        let mut app_token = None;

        for candidate in candidates {
            let client = SlackClient::new(&config.api_base_url, candidate.bot_token.clone())?;
            let auth = match client.auth_test().await {
                Ok(auth) => auth,
                Err(e) => {
                    warn!(
                        workspace = %candidate.label,
                        token = %sanitize::redact_token(candidate.bot_token.expose_secret()),
                        error = %e,
                        "Skipping workspace: token verification failed"
                    );
                    continue;
                }
            };

            if workspaces
                .iter()
                .any(|ws: &WorkspaceContext| ws.team_id == auth.team_id)
            {
                warn!(
                    team_id = %auth.team_id,
                    workspace = %candidate.label,
                    "Duplicate workspace, skipping"
                );
                continue;
            }

            if let Some(ref encryptor) = encryptor {
                if let Err(e) = store_installation(db, encryptor, &auth, &candidate.bot_token) {
                    error!(team_id = %auth.team_id, error = %e, "Failed to store installation");
                }
            }

            if app_token.is_none() {
                app_token = candidate.app_token.clone();
            }

            info!(team_id = %auth.team_id, team_name = %auth.team_name, "Loaded workspace");
            let mut context = WorkspaceContext::new(auth.team_id, auth.team_name, Arc::new(client));
            context.bot_user_id = auth.bot_user_id;
            context.bot_id = auth.bot_id;
            workspaces.push(context);
        }

        if workspaces.is_empty() {
            return Err(ChatError::NoWorkspaces);
        }
        if app_token.is_none() {
            warn!("No app token found; Socket Mode cannot start");
        }

        Ok(Self::new(workspaces, app_token))
    }
}

fn configured_workspaces(
    entries: &[WorkspaceCredentials],
) -> Result<Vec<CandidateWorkspace>, ChatError> {
    entries
        .iter()
        .enumerate()
        .map(|(i, creds)| {
            Ok(CandidateWorkspace {
                label: format!("config[{}]", i),
                bot_token: secrets::resolve_secret(
                    creds.bot_token.as_deref(),
                    creds.bot_token_file.as_deref(),
                    creds.bot_token_env_var.as_deref(),
                )?,
                app_token: secrets::resolve_secret_optional(
                    creds.app_token.as_deref(),
                    creds.app_token_file.as_deref(),
                    creds.app_token_env_var.as_deref(),
                )?,
            })
        })
        .collect()
}

/// Finds `SLACK_WS<n>_BOT_TOKEN` variables (with optional
/// `SLACK_WS<n>_APP_TOKEN`) ordered by `n`.
pub fn discover_env_workspaces<I>(vars: I) -> Vec<CandidateWorkspace>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: Vec<(String, String)> = vars.into_iter().collect();
    let mut numbered: Vec<(u32, String)> = vars
        .iter()
        .filter_map(|(key, value)| {
            let n = key
                .strip_prefix("SLACK_WS")?
                .strip_suffix("_BOT_TOKEN")?
                .parse::<u32>()
                .ok()?;
            (!value.trim().is_empty()).then(|| (n, value.trim().to_string()))
        })
        .collect();
    numbered.sort_by_key(|(n, _)| *n);

    numbered
        .into_iter()
        .map(|(n, bot_token)| {
            let app_key = format!("SLACK_WS{}_APP_TOKEN", n);
            let app_token = vars
                .iter()
                .find(|(key, value)| *key == app_key && !value.trim().is_empty())
                .map(|(_, value)| SecretString::from(value.trim().to_string()));
            CandidateWorkspace {
                label: format!("WS{}", n),
                bot_token: SecretString::from(bot_token),
                app_token,
            }
        })
        .collect()
}

fn store_installation(
    db: &Database,
    encryptor: &TokenEncryptor,
    auth: &super::slack::AuthInfo,
    bot_token: &SecretString,
) -> Result<(), ChatError> {
    let now = format_timestamp(&Utc::now());
    installation_repo::upsert(
        db,
        &InstallationRow {
            team_id: auth.team_id.clone(),
            team_name: Some(auth.team_name.clone()),
            enterprise_id: String::new(),
            bot_user_id: auth.bot_user_id.clone(),
            bot_id: auth.bot_id.clone(),
            bot_token_encrypted: encryptor.seal(&auth.team_id, bot_token.expose_secret())?,
            installed_at: now.clone(),
            updated_at: now,
        },
    )?;
    Ok(())
}
