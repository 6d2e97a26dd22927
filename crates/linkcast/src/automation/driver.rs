use async_trait::async_trait;

use super::AutomationError;
use crate::jobs::MediaKind;

/// A downloaded artifact as handed back by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArtifact {
    pub bytes: Vec<u8>,
    /// Filename the service offered, if any. Informational only.
    pub suggested_filename: Option<String>,
}

/// Stateful handle on the external generation service's UI.
///
/// A driver holds at most one live session. Methods after `open_session`
/// operate on that session, and `close_session` must be safe to call at
/// any time, including when nothing is open or a previous call failed.
#[async_trait]
pub trait SessionDriver: Send {
    async fn open_session(&mut self) -> Result<(), AutomationError>;

    async fn create_workspace(&mut self) -> Result<(), AutomationError>;

    async fn attach_source(&mut self, url: String) -> Result<(), AutomationError>;

    /// Triggers generation and returns once the service shows that it started.
    async fn start_generation(&mut self, kind: MediaKind) -> Result<(), AutomationError>;

    /// Blocks until generation of `kind` finishes or its timeout elapses.
    async fn await_generation(&mut self, kind: MediaKind) -> Result<(), AutomationError>;

    async fn fetch_artifact(&mut self, kind: MediaKind) -> Result<FetchedArtifact, AutomationError>;

    async fn close_session(&mut self) -> Result<(), AutomationError>;
}
