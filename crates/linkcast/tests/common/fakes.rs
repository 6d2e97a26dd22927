//! In-memory stand-ins for the automation session, object storage, the
//! notifier and the chat API.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use linkcast::automation::{AutomationError, FetchedArtifact, SessionDriver};
use linkcast::chat::ChatApi;
use linkcast::jobs::{Artifact, Job, JobId, MediaKind};
use linkcast::{ChatError, JobNotifier, ObjectStorage, StorageError};

/// What a [`ScriptedDriver`] should get wrong.
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// Number of leading `attach_source` calls that fail. `u32::MAX` fails forever.
    pub attach_failures: u32,
    /// Number of leading `start_generation` calls that fail.
    pub start_failures: u32,
    pub fail_open: bool,
    pub timeout_on: Option<MediaKind>,
    pub missing_artifact: Option<MediaKind>,
    pub panic_on_fetch: bool,
    /// `close_session` records the call, then panics.
    pub panic_on_close: bool,
}

/// Shared record of everything a driver was asked to do.
#[derive(Debug, Default)]
pub struct DriverLog {
    pub calls: Vec<String>,
    pub open: bool,
    pub opens: u32,
    pub closes: u32,
    /// Set if `open_session` was called while a session was already open.
    pub overlapped: bool,
}

impl DriverLog {
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(prefix)).count()
    }
}

pub struct ScriptedDriver {
    script: Script,
    log: Arc<Mutex<DriverLog>>,
    attach_attempts: u32,
    start_attempts: u32,
}

impl ScriptedDriver {
    pub fn new(script: Script) -> (Self, Arc<Mutex<DriverLog>>) {
        let log = Arc::new(Mutex::new(DriverLog::default()));
        let driver = Self {
            script,
            log: Arc::clone(&log),
            attach_attempts: 0,
            start_attempts: 0,
        };
        (driver, log)
    }

    pub fn happy() -> (Self, Arc<Mutex<DriverLog>>) {
        Self::new(Script::default())
    }

    fn record(&self, call: impl Into<String>) {
        self.log.lock().unwrap().calls.push(call.into());
    }

    fn require_open(&self) -> Result<(), AutomationError> {
        if self.log.lock().unwrap().open {
            Ok(())
        } else {
            Err(AutomationError::NotOpen)
        }
    }
}

pub fn artifact_bytes(kind: MediaKind) -> Vec<u8> {
    match kind {
        MediaKind::Audio => vec![1u8; 1536],
        MediaKind::Video => vec![2u8; 4096],
    }
}

#[async_trait]
impl SessionDriver for ScriptedDriver {
    async fn open_session(&mut self) -> Result<(), AutomationError> {
        self.record("open");
        if self.script.fail_open {
            return Err(AutomationError::SessionInit("profile locked".into()));
        }
        let mut log = self.log.lock().unwrap();
        if log.open {
            log.overlapped = true;
        }
        log.open = true;
        log.opens += 1;
        Ok(())
    }

    async fn create_workspace(&mut self) -> Result<(), AutomationError> {
        self.require_open()?;
        self.record("createWorkspace");
        Ok(())
    }

    async fn attach_source(&mut self, url: String) -> Result<(), AutomationError> {
        self.require_open()?;
        self.record(format!("attachSource:{}", url));
        self.attach_attempts += 1;
        if self.attach_attempts <= self.script.attach_failures {
            return Err(AutomationError::step("attachSource", "source dialog never appeared"));
        }
        Ok(())
    }

    async fn start_generation(&mut self, kind: MediaKind) -> Result<(), AutomationError> {
        self.require_open()?;
        self.record(format!("startGeneration:{}", kind));
        self.start_attempts += 1;
        if self.start_attempts <= self.script.start_failures {
            return Err(AutomationError::step("startGeneration", "button disabled"));
        }
        Ok(())
    }

    async fn await_generation(&mut self, kind: MediaKind) -> Result<(), AutomationError> {
        self.require_open()?;
        self.record(format!("awaitGeneration:{}", kind));
        if self.script.timeout_on == Some(kind) {
            return Err(AutomationError::GenerationTimeout {
                kind,
                timeout: Duration::from_secs(600),
            });
        }
        Ok(())
    }

    async fn fetch_artifact(
        &mut self,
        kind: MediaKind,
    ) -> Result<FetchedArtifact, AutomationError> {
        self.require_open()?;
        self.record(format!("fetchArtifact:{}", kind));
        if self.script.panic_on_fetch {
            panic!("driver exploded while downloading {}", kind);
        }
        if self.script.missing_artifact == Some(kind) {
            return Err(AutomationError::ArtifactNotFound { kind });
        }
        Ok(FetchedArtifact {
            bytes: artifact_bytes(kind),
            suggested_filename: Some(format!("download.{}", kind.extension())),
        })
    }

    async fn close_session(&mut self) -> Result<(), AutomationError> {
        self.record("close");
        {
            let mut log = self.log.lock().unwrap();
            log.open = false;
            log.closes += 1;
        }
        if self.script.panic_on_close {
            panic!("browser vanished during close");
        }
        Ok(())
    }
}

/// Keeps uploaded objects in a map.
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: AtomicBool,
}

impl MemoryStorage {
    pub fn failing() -> Self {
        let storage = Self::default();
        storage.fail_uploads.store(true, Ordering::SeqCst);
        storage
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        filename: &str,
        _content_type: &str,
    ) -> Result<String, StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::WriteFile {
                path: filename.into(),
                source: std::io::Error::other("bucket unavailable"),
            });
        }
        let mut objects = self.objects.lock().unwrap();
        let key = format!("media/{}-{}", objects.len() + 1, filename);
        objects.insert(key.clone(), bytes);
        Ok(key)
    }

    async fn public_reference(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        if !self.objects.lock().unwrap().contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!("https://cdn.test/{}?ttl={}", key, ttl.as_secs()))
    }
}

/// Remembers which jobs it was told about.
#[derive(Default)]
pub struct RecordingNotifier {
    pub completions: Mutex<Vec<(JobId, usize)>>,
    pub failures: Mutex<Vec<Job>>,
    fail: AtomicBool,
    panic: AtomicBool,
}

impl RecordingNotifier {
    /// A notifier whose every call errors after recording.
    pub fn broken() -> Self {
        let notifier = Self::default();
        notifier.fail.store(true, Ordering::SeqCst);
        notifier
    }

    /// A notifier whose every call panics after recording.
    pub fn panicking() -> Self {
        let notifier = Self::default();
        notifier.panic.store(true, Ordering::SeqCst);
        notifier
    }

    pub fn completed_ids(&self) -> Vec<JobId> {
        self.completions.lock().unwrap().iter().map(|(id, _)| *id).collect()
    }

    pub fn failed_ids(&self) -> Vec<JobId> {
        self.failures.lock().unwrap().iter().map(|job| job.id).collect()
    }

    fn result(&self) -> Result<(), ChatError> {
        if self.panic.load(Ordering::SeqCst) {
            panic!("notifier lost its connection");
        }
        if self.fail.load(Ordering::SeqCst) {
            Err(ChatError::NoWorkspaces)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobNotifier for RecordingNotifier {
    async fn notify_completion(&self, job: &Job, artifacts: &[Artifact]) -> Result<(), ChatError> {
        self.completions.lock().unwrap().push((job.id, artifacts.len()));
        self.result()
    }

    async fn notify_failure(&self, job: &Job) -> Result<(), ChatError> {
        self.failures.lock().unwrap().push(job.clone());
        self.result()
    }
}

/// A message posted through [`RecordingChatApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    pub channel: String,
    pub thread_ts: String,
    pub text: String,
    pub ts: String,
}

/// Chat API fake that hands out increasing message timestamps.
#[derive(Default)]
pub struct RecordingChatApi {
    pub posted: Mutex<Vec<Posted>>,
    pub deleted: Mutex<Vec<(String, String)>>,
    pub parent_text: Mutex<Option<String>>,
}

impl RecordingChatApi {
    pub fn with_parent(text: &str) -> Self {
        let api = Self::default();
        *api.parent_text.lock().unwrap() = Some(text.to_string());
        api
    }

    pub fn posted(&self) -> Vec<Posted> {
        self.posted.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<(String, String)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatApi for RecordingChatApi {
    async fn post_message(
        &self,
        channel: &str,
        thread_ts: &str,
        text: &str,
    ) -> Result<String, ChatError> {
        let mut posted = self.posted.lock().unwrap();
        let ts = format!("1700000100.{:06}", posted.len() + 1);
        posted.push(Posted {
            channel: channel.to_string(),
            thread_ts: thread_ts.to_string(),
            text: text.to_string(),
            ts: ts.clone(),
        });
        Ok(ts)
    }

    async fn delete_message(&self, channel: &str, ts: &str) -> Result<(), ChatError> {
        self.deleted
            .lock()
            .unwrap()
            .push((channel.to_string(), ts.to_string()));
        Ok(())
    }

    async fn thread_parent_text(
        &self,
        _channel: &str,
        _thread_ts: &str,
    ) -> Result<Option<String>, ChatError> {
        Ok(self.parent_text.lock().unwrap().clone())
    }
}
