use std::fmt;

use crate::jobs::MediaKind;

/// Pipeline stages as reported through the job's progress and step label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    OpeningSession,
    CreatingWorkspace,
    AttachingSource,
    Generating,
    Downloading(MediaKind),
    Uploading(MediaKind),
    Completed,
}

impl JobPhase {
    pub fn progress(&self) -> u8 {
        match self {
            JobPhase::OpeningSession => 10,
            JobPhase::CreatingWorkspace => 20,
            JobPhase::AttachingSource => 30,
            JobPhase::Generating => 40,
            JobPhase::Downloading(MediaKind::Audio) => 70,
            JobPhase::Downloading(MediaKind::Video) => 80,
            JobPhase::Uploading(MediaKind::Audio) => 85,
            JobPhase::Uploading(MediaKind::Video) => 95,
            JobPhase::Completed => 100,
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobPhase::OpeningSession => write!(f, "Opening session"),
            JobPhase::CreatingWorkspace => write!(f, "Creating workspace"),
            JobPhase::AttachingSource => write!(f, "Attaching source"),
            JobPhase::Generating => write!(f, "Generating audio and video"),
            JobPhase::Downloading(kind) => write!(f, "Downloading {}", kind),
            JobPhase::Uploading(kind) => write!(f, "Uploading {}", kind),
            JobPhase::Completed => write!(f, "Completed"),
        }
    }
}
