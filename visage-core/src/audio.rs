//! Audio plumbing: transient work files, external re-encoding, WAV helpers.
//!
//! Re-encoding shells out to ffmpeg. Every file written here is owned by a
//! [`WorkFile`], which is named uniquely per operation and removed when
//! dropped, on success and failure paths alike.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use rand::Rng;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::AudioError;
use crate::language::LanguageTag;

/// A uniquely named temporary file, deleted on drop.
#[derive(Debug)]
pub struct WorkFile {
    path: PathBuf,
}

impl WorkFile {
    /// Reserve a fresh path `<dir>/<prefix>_<millis>_<random>.<ext>`.
    pub fn new(dir: &Path, prefix: &str, extension: &str) -> Self {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: u32 = rand::thread_rng().r#gen();
        let name = format!("{prefix}_{millis}_{suffix:08x}.{extension}");
        Self {
            path: dir.join(name),
        }
    }

    /// Reserve a path and write `bytes` to it.
    pub async fn create(
        dir: &Path,
        prefix: &str,
        extension: &str,
        bytes: &[u8],
    ) -> std::io::Result<Self> {
        let file = Self::new(dir, prefix, extension);
        tokio::fs::write(&file.path, bytes).await?;
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.path).await
    }
}

impl Drop for WorkFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove work file"),
        }
    }
}

/// Directory for work files: the configured one, else the system temp dir.
pub fn work_dir(configured: Option<&Path>) -> PathBuf {
    configured
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir)
}

/// File extension for an uploaded audio MIME type.
pub fn extension_for_mime(mime: Option<&str>) -> &'static str {
    let mime = mime.unwrap_or_default().to_ascii_lowercase();
    let base = mime.split(';').next().unwrap_or_default().trim();
    match base {
        "audio/webm" | "video/webm" => "webm",
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/wav" | "audio/wave" | "audio/x-wav" => "wav",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => "m4a",
        "audio/flac" | "audio/x-flac" => "flac",
        _ => "webm",
    }
}

/// Content type to declare when uploading a file with `extension`.
pub fn mime_for_extension(extension: &str) -> &'static str {
    match extension {
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        _ => "audio/webm",
    }
}

/// WAV conversion parameters used before phonetic alignment.
fn alignment_wav_args(language: LanguageTag) -> (u32, Option<&'static str>) {
    match language {
        LanguageTag::En => (22050, None),
        LanguageTag::Es => (22050, Some("highpass=f=80,lowpass=f=8000")),
        LanguageTag::Fr => (22050, Some("highpass=f=85,lowpass=f=7800")),
        LanguageTag::De => (22050, Some("highpass=f=90,lowpass=f=8200")),
        LanguageTag::It => (22050, Some("highpass=f=80,lowpass=f=7600")),
        LanguageTag::Pt => (22050, Some("highpass=f=75,lowpass=f=7400")),
        LanguageTag::Ru => (16000, Some("highpass=f=95,lowpass=f=8500")),
        LanguageTag::Ja => (16000, Some("highpass=f=70,lowpass=f=7000")),
        LanguageTag::Zh => (16000, Some("highpass=f=70,lowpass=f=7200")),
        LanguageTag::Ar => (16000, Some("highpass=f=85,lowpass=f=7800")),
        LanguageTag::Hi => (16000, Some("highpass=f=75,lowpass=f=7600")),
    }
}

/// Thin async wrapper around the ffmpeg executable.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Re-encode speech to mono 16 kHz MP3 tuned for transcription.
    pub async fn normalize_for_transcription(
        &self,
        input: &[u8],
        extension: &str,
        dir: &Path,
    ) -> Result<Vec<u8>, AudioError> {
        let source = WorkFile::create(dir, "stt_input", extension, input).await?;
        let target = WorkFile::new(dir, "stt_normalized", "mp3");
        let source_path = source.path().to_string_lossy().into_owned();
        let target_path = target.path().to_string_lossy().into_owned();
        self.run(&[
            "-y",
            "-i",
            source_path.as_str(),
            "-ac",
            "1",
            "-ar",
            "16000",
            "-b:a",
            "128k",
            "-af",
            "highpass=f=80,lowpass=f=8000,volume=1.5",
            target_path.as_str(),
        ])
        .await?;
        Ok(target.read().await?)
    }

    /// Convert synthesized speech to a 16-bit mono WAV for phonetic alignment.
    pub async fn to_alignment_wav(
        &self,
        input: &[u8],
        language: LanguageTag,
        dir: &Path,
    ) -> Result<WorkFile, AudioError> {
        let source = WorkFile::create(dir, "tts_audio", "mp3", input).await?;
        let target = WorkFile::new(dir, "tts_audio", "wav");
        let (rate, filter) = alignment_wav_args(language);
        let rate = rate.to_string();
        let source_path = source.path().to_string_lossy().into_owned();
        let target_path = target.path().to_string_lossy().into_owned();

        let mut args = vec![
            "-y",
            "-i",
            source_path.as_str(),
            "-ar",
            rate.as_str(),
            "-ac",
            "1",
            "-acodec",
            "pcm_s16le",
        ];
        if let Some(filter) = filter {
            args.extend(["-af", filter]);
        }
        args.push(target_path.as_str());

        self.run(&args).await?;
        Ok(target)
    }

    async fn run(&self, args: &[&str]) -> Result<(), AudioError> {
        debug!(program = %self.program, ?args, "Running audio converter");
        let child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AudioError::ConverterMissing {
                    program: self.program.clone(),
                },
                _ => AudioError::Io(e),
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AudioError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .join(" | ");
            return Err(AudioError::ConversionFailed {
                message: format!("{} exited with {}: {}", self.program, output.status, tail),
            });
        }
        Ok(())
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| AudioError::Decode {
                message: format!("WAV write error: {e}"),
            })?;
        for &s in samples {
            let sample = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(sample).map_err(|e| AudioError::Decode {
                message: format!("WAV write error: {e}"),
            })?;
        }
        writer.finalize().map_err(|e| AudioError::Decode {
            message: format!("WAV finalize error: {e}"),
        })?;
    }
    Ok(cursor.into_inner())
}

/// Duration in seconds of an in-memory WAV, if it parses as one.
pub fn wav_duration(bytes: &[u8]) -> Option<f64> {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes)).ok()?;
    let spec = reader.spec();
    if spec.sample_rate == 0 || spec.channels == 0 {
        return None;
    }
    let frames = reader.len() as f64 / spec.channels as f64;
    Some(frames / spec.sample_rate as f64)
}

/// Duration in seconds of a WAV file on disk.
pub async fn wav_file_duration(path: &Path) -> Option<f64> {
    let bytes = tokio::fs::read(path).await.ok()?;
    wav_duration(&bytes)
}
