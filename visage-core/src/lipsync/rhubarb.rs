//! External phonetic alignment via the Rhubarb Lip Sync executable.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::audio::WorkFile;
use crate::error::AlignmentError;

/// One phoneme-level cue as emitted by the alignment tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCue {
    pub start: f64,
    pub end: f64,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<f32>,
}

impl RawCue {
    pub fn new(start: f64, end: f64, value: impl Into<String>) -> Self {
        Self {
            start,
            end,
            value: value.into(),
            intensity: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMetadata {
    #[serde(default)]
    pub sound_file: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Alignment tool output: `{ mouthCues: [{start, end, value}], metadata? }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCues {
    pub mouth_cues: Vec<RawCue>,
    #[serde(default)]
    pub metadata: Option<RawMetadata>,
}

impl RawCues {
    pub fn new(mouth_cues: Vec<RawCue>) -> Self {
        Self {
            mouth_cues,
            metadata: None,
        }
    }
}

/// Parse the JSON file written by the alignment tool.
pub fn parse_cues(bytes: &[u8]) -> Result<RawCues, AlignmentError> {
    serde_json::from_slice(bytes).map_err(|e| AlignmentError::Parse {
        message: e.to_string(),
    })
}

/// Produces raw phoneme cues for a WAV file.
#[async_trait]
pub trait PhoneticAligner: Send + Sync {
    /// `dialog` is an optional transcript hint for the tool.
    async fn align(&self, wav: &Path, dialog: Option<&str>) -> Result<RawCues, AlignmentError>;

    fn name(&self) -> &str;
}

/// Runs `rhubarb -f json -r phonetic` as a child process.
#[derive(Debug, Clone)]
pub struct RhubarbAligner {
    program: PathBuf,
    timeout: Duration,
    work_dir: PathBuf,
}

impl RhubarbAligner {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout,
            work_dir: work_dir.into(),
        }
    }

    /// The first candidate that exists on disk or on `PATH`.
    pub fn discover(candidates: &[String], timeout: Duration, work_dir: &Path) -> Option<Self> {
        let program = candidates.iter().find_map(|c| locate(c))?;
        debug!(program = %program.display(), "Found phonetic alignment tool");
        Some(Self::new(program, timeout, work_dir))
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// Resolve a candidate path. Bare names are searched on `PATH`.
fn locate(candidate: &str) -> Option<PathBuf> {
    let path = Path::new(candidate);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }
    let dirs = std::env::var_os("PATH")?;
    std::env::split_paths(&dirs)
        .map(|dir| dir.join(candidate))
        .find(|p| p.is_file())
}

#[async_trait]
impl PhoneticAligner for RhubarbAligner {
    async fn align(&self, wav: &Path, dialog: Option<&str>) -> Result<RawCues, AlignmentError> {
        let output = WorkFile::new(&self.work_dir, "lipsync", "json");
        let dialog_file = match dialog {
            Some(text) => {
                Some(WorkFile::create(&self.work_dir, "dialog", "txt", text.as_bytes()).await?)
            }
            None => None,
        };

        let mut command = Command::new(&self.program);
        command
            .args(["-f", "json", "-r", "phonetic", "--threads", "4", "-o"])
            .arg(output.path());
        if let Some(file) = &dialog_file {
            command.arg("-d").arg(file.path());
        }
        command
            .arg(wav)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            program = %self.program.display(),
            wav = %wav.display(),
            dialog = dialog_file.is_some(),
            "Running phonetic alignment"
        );

        let child = command.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AlignmentError::ToolUnavailable,
            _ => AlignmentError::Io(e),
        })?;
        let result = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AlignmentError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(AlignmentError::ToolFailed {
                message: format!("exit {}: {}", result.status, stderr.trim()),
            });
        }

        parse_cues(&output.read().await?)
    }

    fn name(&self) -> &str {
        "rhubarb"
    }
}

/// A scripted aligner for tests.
pub struct MockPhoneticAligner {
    results: Mutex<VecDeque<Result<RawCues, AlignmentError>>>,
    dialogs: Mutex<Vec<Option<String>>>,
    call_count: AtomicUsize,
}

impl MockPhoneticAligner {
    pub fn with_results(results: Vec<Result<RawCues, AlignmentError>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            dialogs: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Answers one call with `cues`.
    pub fn with_cues(cues: RawCues) -> Self {
        Self::with_results(vec![Ok(cues)])
    }

    /// Behaves as if the executable were missing.
    pub fn unavailable() -> Self {
        Self::with_results(Vec::new())
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Dialog hints received, in call order.
    pub fn dialogs(&self) -> Vec<Option<String>> {
        self.dialogs.lock().unwrap().clone()
    }
}

#[async_trait]
impl PhoneticAligner for MockPhoneticAligner {
    async fn align(&self, _wav: &Path, dialog: Option<&str>) -> Result<RawCues, AlignmentError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.dialogs.lock().unwrap().push(dialog.map(str::to_string));
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AlignmentError::ToolUnavailable))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cues() {
        let json = br#"{
            "metadata": {"soundFile": "/tmp/a.wav", "duration": 1.25},
            "mouthCues": [
                {"start": 0.00, "end": 0.12, "value": "X"},
                {"start": 0.12, "end": 0.40, "value": "B"}
            ]
        }"#;
        let cues = parse_cues(json).unwrap();
        assert_eq!(cues.mouth_cues.len(), 2);
        assert_eq!(cues.mouth_cues[1].value, "B");
        assert_eq!(cues.metadata.unwrap().duration, Some(1.25));
    }

    #[test]
    fn test_parse_cues_without_metadata() {
        let cues = parse_cues(br#"{"mouthCues": []}"#).unwrap();
        assert!(cues.mouth_cues.is_empty());
        assert!(cues.metadata.is_none());
        assert!(matches!(
            parse_cues(b"not json"),
            Err(AlignmentError::Parse { .. })
        ));
    }

    #[test]
    fn test_discover_missing_tool() {
        let candidates = vec![
            "/nonexistent/bin/rhubarb".to_string(),
            "visage-no-such-aligner-binary".to_string(),
        ];
        let found = RhubarbAligner::discover(
            &candidates,
            Duration::from_secs(1),
            &std::env::temp_dir(),
        );
        assert!(found.is_none());
    }

    #[test]
    fn test_discover_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("rhubarb");
        std::fs::write(&program, b"").unwrap();
        let candidates = vec![
            "/nonexistent/bin/rhubarb".to_string(),
            program.to_string_lossy().into_owned(),
        ];
        let found =
            RhubarbAligner::discover(&candidates, Duration::from_secs(1), dir.path()).unwrap();
        assert_eq!(found.program(), program.as_path());
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let aligner = RhubarbAligner::new(
            "/nonexistent/visage-rhubarb",
            Duration::from_secs(1),
            dir.path(),
        );
        let err = aligner
            .align(&dir.path().join("in.wav"), Some("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, AlignmentError::ToolUnavailable));
        // Dialog hint file is removed again
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_mock_aligner_records_dialogs() {
        let mock = MockPhoneticAligner::with_cues(RawCues::new(vec![RawCue::new(0.0, 0.5, "D")]));
        let path = Path::new("/tmp/unused.wav");
        assert!(mock.align(path, Some("hi")).await.is_ok());
        assert!(matches!(
            mock.align(path, None).await,
            Err(AlignmentError::ToolUnavailable)
        ));
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.dialogs(), vec![Some("hi".to_string()), None]);
    }
}
