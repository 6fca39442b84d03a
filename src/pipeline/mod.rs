//! Conversion pipeline orchestrator.
//!
//! Sequences workspace allocation → input staging → conversion →
//! validation → relay → cleanup for the two pipelines:
//! audio → transcript and slide deck → thumbnail.
//!
//! The object store is injected at construction; nothing here touches the
//! network or the filesystem outside the job's own workspace.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::converter::{invoke, resolve_executable, Invocation};
use crate::error::ConvertError;
use crate::relay::{HttpObjectStore, ObjectStore, Relay};
use crate::transcript::{TranscriptNormalizer, WhisperTimestampNormalizer};
use crate::validate::{validate_output, OutputKind};
use crate::workspace::{Workspace, WorkspaceManager};

/// One invocation of the pipeline for a single input.
pub struct ConversionJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    AudioToText,
    DeckToImage,
}

impl ConversionJob {
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            created_at: Utc::now(),
        }
    }
}

/// Caller-supplied input: raw bytes, or a reference to an object already
/// in remote storage.
pub enum MediaSource {
    Bytes(Vec<u8>),
    Stored { key: String },
}

/// A finished transcript, returned inline.
#[derive(Debug)]
pub struct Transcript {
    pub job_id: Uuid,
    pub text: String,
}

/// A thumbnail delivered to object storage.
#[derive(Debug)]
pub struct StoredThumbnail {
    pub job_id: Uuid,
    pub key: String,
}

pub struct MediaPipeline {
    config: PipelineConfig,
    workspaces: WorkspaceManager,
    relay: Relay,
    normalizer: Box<dyn TranscriptNormalizer>,
    admission: Semaphore,
}

impl MediaPipeline {
    pub fn new(config: PipelineConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let workspaces = WorkspaceManager::new(config.limits.temp_root());
        let admission = Semaphore::new(config.limits.max_concurrent_conversions.max(1));
        let normalizer = Box::new(WhisperTimestampNormalizer::new()?);

        Ok(Self {
            config,
            workspaces,
            relay: Relay::new(store),
            normalizer,
            admission,
        })
    }

    /// Build a pipeline whose relay talks to the HTTP object store named
    /// in the config.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let base_url = config
            .storage
            .base_url
            .clone()
            .context("storage.base_url is required for an HTTP-backed pipeline")?;
        Self::new(config, Arc::new(HttpObjectStore::new(base_url)))
    }

    /// Convert an audio recording into a plaintext transcript.
    pub async fn transcribe_audio(
        &self,
        file_name: &str,
        source: MediaSource,
        cancel: &CancellationToken,
    ) -> Result<Transcript, ConvertError> {
        let _permit = self.admit(cancel).await?;
        let job = ConversionJob::new(JobKind::AudioToText);
        info!("Job {} started: transcribe {:?}", job.id, file_name);

        let workspace = self.workspaces.allocate(&job.id)?;
        let result = self
            .run_transcribe(&job, &workspace, file_name, source, cancel)
            .await;
        // Cleanup is an unconditional finalizer, not a success-path step.
        workspace.release();

        match &result {
            Ok(t) => info!("Job {} complete: {} chars of transcript", job.id, t.text.len()),
            Err(e) => warn!("Job {} failed: {}", job.id, e),
        }
        result
    }

    /// Render the first page of a slide deck and publish it as a thumbnail.
    pub async fn render_thumbnail(
        &self,
        file_name: &str,
        source: MediaSource,
        dest_key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredThumbnail, ConvertError> {
        let _permit = self.admit(cancel).await?;
        let job = ConversionJob::new(JobKind::DeckToImage);
        info!("Job {} started: thumbnail {:?} -> {}", job.id, file_name, dest_key);

        let workspace = self.workspaces.allocate(&job.id)?;
        let result = self
            .run_thumbnail(&job, &workspace, file_name, source, dest_key, cancel)
            .await;
        workspace.release();

        match &result {
            Ok(t) => info!("Job {} complete: thumbnail at {}", job.id, t.key),
            Err(e) => warn!("Job {} failed: {}", job.id, e),
        }
        result
    }

    /// Wait for a converter slot; bounded so load cannot fork unbounded
    /// subprocesses.
    async fn admit(&self, cancel: &CancellationToken) -> Result<SemaphorePermit<'_>, ConvertError> {
        tokio::select! {
            // The semaphore is only ever closed on shutdown, which jobs
            // observe as cancellation.
            permit = self.admission.acquire() => permit.map_err(|_| ConvertError::Cancelled),
            _ = cancel.cancelled() => Err(ConvertError::Cancelled),
        }
    }

    async fn run_transcribe(
        &self,
        job: &ConversionJob,
        workspace: &Workspace,
        file_name: &str,
        source: MediaSource,
        cancel: &CancellationToken,
    ) -> Result<Transcript, ConvertError> {
        let staged = self.stage_input(workspace, file_name, source, cancel).await?;
        let timeout = self.config.limits.convert_timeout();

        // Resample/remix to mono at the configured rate; speech models
        // expect a fixed input shape regardless of the capture container.
        let resampled = workspace.dir().join("resampled.wav");
        let ffmpeg = resolve_executable(
            self.config.audio.ffmpeg_path.as_deref().unwrap_or("ffmpeg"),
        )?;
        let resample = Invocation::new(ffmpeg, workspace.dir())
            .args(["-v", "error", "-hide_banner", "-nostats", "-nostdin", "-y", "-i"])
            .arg(&staged)
            .args(["-ac", "1", "-ar"])
            .arg(self.config.audio.sample_rate.to_string())
            .arg(&resampled);

        let outcome = invoke(resample, timeout, cancel).await?;
        if !outcome.success() {
            return Err(ConvertError::ConversionFailed {
                exit_code: outcome.exit_code,
                diagnostic: outcome.stderr,
            });
        }

        // Speech-to-text converter writes its transcript next to the
        // input, appending `.txt`.
        let whisper = resolve_executable(
            self.config
                .audio
                .whisper_path
                .as_deref()
                .unwrap_or("whisper-cli"),
        )?;
        let mut transcribe = Invocation::new(whisper, workspace.dir());
        if let Some(model) = &self.config.audio.model_path {
            transcribe = transcribe.args(["-m", model.as_str()]);
        }
        if let Some(language) = &self.config.audio.language {
            transcribe = transcribe.args(["-l", language.as_str()]);
        }
        let transcribe = transcribe
            .args(["-otxt", "-of"])
            .arg(&resampled)
            .arg("-f")
            .arg(&resampled);

        let outcome = invoke(transcribe, timeout, cancel).await?;
        if !outcome.success() {
            return Err(ConvertError::ConversionFailed {
                exit_code: outcome.exit_code,
                diagnostic: outcome.stderr,
            });
        }

        let transcript_path = append_extension(&resampled, "txt");
        validate_output(&transcript_path, OutputKind::PlainText)?;

        let raw = tokio::fs::read(&transcript_path)
            .await
            .map_err(|e| ConvertError::OutputMalformed(format!("unreadable transcript: {e}")))?;
        let text = self
            .normalizer
            .normalize(&String::from_utf8_lossy(&raw));

        // A transcript of nothing but timestamps is still an empty result.
        if text.is_empty() {
            return Err(ConvertError::OutputEmpty);
        }

        Ok(Transcript {
            job_id: job.id,
            text,
        })
    }

    async fn run_thumbnail(
        &self,
        job: &ConversionJob,
        workspace: &Workspace,
        file_name: &str,
        source: MediaSource,
        dest_key: &str,
        cancel: &CancellationToken,
    ) -> Result<StoredThumbnail, ConvertError> {
        let staged = self.stage_input(workspace, file_name, source, cancel).await?;
        let timeout = self.config.limits.convert_timeout();

        // Document-to-image converter writes a single-page raster next to
        // the input, appending `.png`.
        let converter = resolve_executable(
            self.config
                .deck
                .converter_path
                .as_deref()
                .unwrap_or("deck2png"),
        )?;
        let render = Invocation::new(converter, workspace.dir())
            .args(self.config.deck.extra_args.iter().map(String::as_str))
            .arg(&staged);

        let outcome = invoke(render, timeout, cancel).await?;
        if !outcome.success() {
            return Err(ConvertError::ConversionFailed {
                exit_code: outcome.exit_code,
                diagnostic: outcome.stderr,
            });
        }

        let image_path = append_extension(&staged, "png");
        validate_output(&image_path, OutputKind::RasterImage)?;

        let bytes = tokio::fs::read(&image_path)
            .await
            .map_err(|e| ConvertError::OutputMalformed(format!("unreadable thumbnail: {e}")))?;

        self.relay
            .upload(
                dest_key,
                "image/png",
                bytes,
                self.config.limits.upload_timeout(),
                cancel,
            )
            .await?;

        Ok(StoredThumbnail {
            job_id: job.id,
            key: dest_key.to_string(),
        })
    }

    /// Write the input payload into the workspace, fetching it from the
    /// object store first when the caller passed a reference.
    async fn stage_input(
        &self,
        workspace: &Workspace,
        file_name: &str,
        source: MediaSource,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ConvertError> {
        let bytes = match source {
            MediaSource::Bytes(bytes) => bytes,
            MediaSource::Stored { key } => {
                tokio::select! {
                    result = self.relay.store().download(&key) => result
                        .map_err(|e| ConvertError::Staging(format!("download of {key} failed: {e}")))?,
                    _ = cancel.cancelled() => return Err(ConvertError::Cancelled),
                }
            }
        };

        let size = bytes.len() as u64;
        let limit = self.config.limits.max_input_bytes;
        if size > limit {
            return Err(ConvertError::InputTooLarge { size, limit });
        }

        let staged = workspace.stage_path(file_name);
        tokio::fs::write(&staged, &bytes)
            .await
            .map_err(|e| ConvertError::Staging(format!("failed to write staged input: {e}")))?;

        debug!("Staged {} bytes at {:?}", size, staged);
        Ok(staged)
    }
}

/// `resampled.wav` -> `resampled.wav.txt`: the converters append their
/// output extension to the full input path rather than replacing it.
fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(".");
    os.push(ext);
    PathBuf::from(os)
}
