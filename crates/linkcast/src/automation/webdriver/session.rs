use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::client::{ElementRef, WebDriverClient, WebDriverError};
use crate::automation::markers::Selector;
use crate::automation::{AutomationError, FetchedArtifact, SessionDriver};
use crate::config::AutomationConfig;
use crate::jobs::MediaKind;
use crate::sanitize::redact_url;

/// Consecutive polling failures tolerated while waiting on generation.
const MAX_POLL_ERRORS: u32 = 10;

#[derive(Error, Debug)]
enum WaitError {
    #[error("{selector} not found within {}s", after.as_secs())]
    TimedOut { selector: String, after: Duration },

    #[error(transparent)]
    Driver(#[from] WebDriverError),
}

/// Drives the generation service through chromedriver (or any W3C driver).
///
/// The browser runs with a persistent profile directory so the service's
/// sign-in survives restarts. Downloads land in a dedicated directory and
/// are picked up by watching it for new files.
pub struct WebDriverSession {
    config: AutomationConfig,
    client: WebDriverClient,
}

impl WebDriverSession {
    pub fn new(config: AutomationConfig) -> Result<Self, AutomationError> {
        let client = WebDriverClient::new(&config.webdriver_url)
            .map_err(|e| AutomationError::SessionInit(e.to_string()))?;
        Ok(Self { config, client })
    }

    async fn find(&self, selector: &Selector) -> Result<Vec<ElementRef>, WebDriverError> {
        self.client.find_elements(&selector.to_locator()).await
    }

    async fn wait_for(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<ElementRef, WaitError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.find(selector).await {
                Ok(found) => {
                    if let Some(first) = found.into_iter().next() {
                        return Ok(first);
                    }
                }
                Err(e) if e.is_stale() => {}
                Err(e) => return Err(e.into()),
            }
            if Instant::now() >= deadline {
                return Err(WaitError::TimedOut {
                    selector: selector.to_string(),
                    after: timeout,
                });
            }
            sleep(self.config.poll_interval()).await;
        }
    }

    async fn click_when_ready(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        let element = self.wait_for(selector, timeout).await?;
        self.client.click(&element).await?;
        Ok(())
    }

    async fn settle(&self) {
        sleep(self.config.settle_delay()).await;
    }

    async fn signed_out(&self) -> bool {
        match self.client.current_url().await {
            Ok(current) => url::Url::parse(&current)
                .ok()
                .and_then(|u| u.host_str().map(|h| h.ends_with(&self.config.markers.sign_in_host)))
                .unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn wait_for_download(
        &self,
        before: &HashSet<PathBuf>,
        timeout: Duration,
    ) -> Result<PathBuf, String> {
        let deadline = Instant::now() + timeout;
        loop {
            let now = list_completed_downloads(&self.config.download_dir)
                .await
                .map_err(|e| format!("cannot read download dir: {}", e))?;
            if let Some(path) = now.into_iter().find(|p| !before.contains(p)) {
                return Ok(path);
            }
            if Instant::now() >= deadline {
                return Err(format!("no download finished within {}s", timeout.as_secs()));
            }
            sleep(self.config.poll_interval()).await;
        }
    }
}

#[async_trait]
impl SessionDriver for WebDriverSession {
    async fn open_session(&mut self) -> Result<(), AutomationError> {
        if self.client.has_session() {
            return Err(AutomationError::SessionInit("a session is already open".into()));
        }
        for dir in [&self.config.user_data_dir, &self.config.download_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AutomationError::SessionInit(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }

        info!(
            driver = %self.config.webdriver_url,
            headless = self.config.headless,
            "Opening browser session"
        );
        self.client
            .new_session(chrome_capabilities(&self.config))
            .await
            .map_err(|e| AutomationError::SessionInit(e.to_string()))?;

        let home = self.config.markers.home_url.clone();
        self.client
            .navigate(&home)
            .await
            .map_err(|e| AutomationError::SessionInit(e.to_string()))?;

        let marker = self.config.markers.create_workspace.clone();
        if let Err(e) = self.wait_for(&marker, self.config.element_timeout()).await {
            if self.signed_out().await {
                return Err(AutomationError::SessionInit(format!(
                    "browser profile at {} is not signed in",
                    self.config.user_data_dir.display()
                )));
            }
            return Err(AutomationError::SessionInit(format!(
                "service home did not load: {}",
                e
            )));
        }
        Ok(())
    }

    async fn create_workspace(&mut self) -> Result<(), AutomationError> {
        const STEP: &str = "createWorkspace";
        let err = |e: WaitError| AutomationError::step(STEP, e);

        self.client
            .navigate(&self.config.markers.home_url)
            .await
            .map_err(|e| AutomationError::step(STEP, e))?;
        self.click_when_ready(&self.config.markers.create_workspace, self.config.element_timeout())
            .await
            .map_err(err)?;
        self.settle().await;
        debug!("Workspace created");
        Ok(())
    }

    async fn attach_source(&mut self, url: String) -> Result<(), AutomationError> {
        const STEP: &str = "attachSource";
        let err = |e: WaitError| AutomationError::step(STEP, e);
        let markers = &self.config.markers;
        let timeout = self.config.element_timeout();

        self.click_when_ready(&markers.source_type_website, timeout)
            .await
            .map_err(err)?;
        self.settle().await;

        let input = self.wait_for(&markers.source_url_input, timeout).await.map_err(err)?;
        self.client
            .clear(&input)
            .await
            .map_err(|e| AutomationError::step(STEP, e))?;
        self.client
            .send_keys(&input, &url)
            .await
            .map_err(|e| AutomationError::step(STEP, e))?;

        self.click_when_ready(&markers.source_submit, timeout)
            .await
            .map_err(err)?;
        self.wait_for(&markers.source_ready, self.config.source_ready_timeout())
            .await
            .map_err(err)?;

        debug!(url = %redact_url(&url), "Source attached");
        Ok(())
    }

    async fn start_generation(&mut self, kind: MediaKind) -> Result<(), AutomationError> {
        const STEP: &str = "startGeneration";
        let err = |e: WaitError| AutomationError::step(STEP, e);
        let markers = self.config.markers.generation(kind);
        let timeout = self.config.element_timeout();

        // A retry after a slow indicator must not trigger a second run.
        let running = self
            .find(&markers.in_progress)
            .await
            .map_err(|e| AutomationError::step(STEP, e))?;
        if !running.is_empty() {
            debug!(%kind, "Generation already running");
            return Ok(());
        }

        self.click_when_ready(&markers.trigger, timeout).await.map_err(err)?;
        self.wait_for(&markers.in_progress, timeout).await.map_err(err)?;
        info!(%kind, "Generation started");
        Ok(())
    }

    async fn await_generation(&mut self, kind: MediaKind) -> Result<(), AutomationError> {
        let markers = self.config.markers.generation(kind);
        let timeout = self.config.generation_timeout(kind);
        let deadline = Instant::now() + timeout;
        let mut errors = 0u32;

        loop {
            let check = async {
                let running = self.find(&markers.in_progress).await?;
                let cards = self.find(&markers.artifact_card).await?;
                Ok::<bool, WebDriverError>(running.is_empty() && !cards.is_empty())
            };
            match check.await {
                Ok(true) => {
                    info!(%kind, "Generation finished");
                    return Ok(());
                }
                Ok(false) => errors = 0,
                Err(e) => {
                    errors += 1;
                    warn!(%kind, error = %e, errors, "Polling generation state failed");
                    if errors >= MAX_POLL_ERRORS {
                        return Err(AutomationError::step("awaitGeneration", e));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Err(AutomationError::GenerationTimeout { kind, timeout });
            }
            sleep(self.config.generation_poll_interval()).await;
        }
    }

    async fn fetch_artifact(
        &mut self,
        kind: MediaKind,
    ) -> Result<FetchedArtifact, AutomationError> {
        const STEP: &str = "fetchArtifact";
        let markers = &self.config.markers;

        let card = self
            .find(&markers.generation(kind).artifact_card)
            .await
            .map_err(|e| AutomationError::step(STEP, e))?
            .into_iter()
            .next()
            .ok_or(AutomationError::ArtifactNotFound { kind })?;
        let action = self
            .client
            .find_elements_from(&card, &markers.download_action.to_locator())
            .await
            .map_err(|e| AutomationError::step(STEP, e))?
            .into_iter()
            .next()
            .ok_or(AutomationError::ArtifactNotFound { kind })?;

        let before: HashSet<PathBuf> = list_completed_downloads(&self.config.download_dir)
            .await
            .map_err(|e| AutomationError::step(STEP, e))?
            .into_iter()
            .collect();
        self.client
            .click(&action)
            .await
            .map_err(|e| AutomationError::step(STEP, e))?;

        let path = self
            .wait_for_download(&before, self.config.download_timeout())
            .await
            .map_err(|e| AutomationError::step(STEP, e))?;
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AutomationError::step(STEP, e))?;
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove downloaded file");
        }

        info!(%kind, bytes = bytes.len(), "Artifact downloaded");
        Ok(FetchedArtifact {
            bytes,
            suggested_filename: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        })
    }

    async fn close_session(&mut self) -> Result<(), AutomationError> {
        if !self.client.has_session() {
            return Ok(());
        }
        self.client
            .delete_session()
            .await
            .map_err(|e| AutomationError::step("closeSession", e))?;
        info!("Browser session closed");
        Ok(())
    }
}

/// Capabilities for a Chrome session with a persistent profile.
pub fn chrome_capabilities(config: &AutomationConfig) -> Value {
    let mut args = vec![
        format!("--user-data-dir={}", config.user_data_dir.display()),
        format!("--lang={}", config.locale),
        "--window-size=1920,1080".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-features=site-per-process".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }

    json!({
        "alwaysMatch": {
            "browserName": "chrome",
            "goog:chromeOptions": {
                "args": args,
                "prefs": {
                    "download.default_directory": config.download_dir.to_string_lossy(),
                    "download.prompt_for_download": false,
                    "intl.accept_languages": config.locale,
                }
            }
        }
    })
}

fn is_partial_download(name: &str) -> bool {
    name.starts_with('.')
        || name.ends_with(".crdownload")
        || name.ends_with(".part")
        || name.ends_with(".tmp")
}

async fn list_completed_downloads(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if is_partial_download(&name.to_string_lossy()) {
            continue;
        }
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
