//! Segment encoder collaborator
//!
//! A served stream is a chain of segments. Each segment renders the current
//! clip (minus the lead-in already played in the previous overlap) and
//! crossfades into the first `X` seconds of the next clip, encoded as
//! Ogg/Opus and forwarded chunk by chunk to the client.

use async_trait::async_trait;
use axum::body::Bytes;
use dreams_common::{Clip, CrossfadeTiming, Error, FadeCurve, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Bytes read from the encoder per forwarded chunk
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Characters of encoder stderr kept for error reports
const STDERR_TAIL_CHARS: usize = 2000;

/// Timing of one segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfadeDirective {
    /// Seconds skipped at the start of the current clip
    pub lead_in_s: f64,
    pub clip_duration_s: f64,
    pub crossfade_s: f64,
    pub curve: FadeCurve,
}

impl CrossfadeDirective {
    /// First segment of a stream: the current clip plays from its start
    pub fn first(timing: &CrossfadeTiming, curve: FadeCurve) -> Self {
        Self {
            lead_in_s: 0.0,
            clip_duration_s: timing.clip_duration_s,
            crossfade_s: timing.crossfade_s,
            curve,
        }
    }

    /// Later segments: the first `X` seconds went out in the previous overlap
    pub fn chained(timing: &CrossfadeTiming, curve: FadeCurve) -> Self {
        Self {
            lead_in_s: timing.crossfade_s,
            ..Self::first(timing, curve)
        }
    }

    /// Audible length of the rendered segment
    pub fn segment_duration_s(&self) -> f64 {
        self.clip_duration_s - self.lead_in_s
    }

    /// ffmpeg `-filter_complex` graph for this segment
    pub fn filter_graph(&self) -> String {
        let curve = self.curve.ffmpeg_name();
        format!(
            "[0:a]atrim=start={lead}:end={dur},asetpts=PTS-STARTPTS[a0];\
             [1:a]atrim=0:{xf},asetpts=PTS-STARTPTS[a1];\
             [a0][a1]acrossfade=d={xf}:c1={curve}:c2={curve}:o=1[out]",
            lead = self.lead_in_s,
            dur = self.clip_duration_s,
            xf = self.crossfade_s,
            curve = curve,
        )
    }
}

/// One encoder run
#[derive(Debug, Clone)]
pub struct SegmentJob {
    pub current: Clip,
    pub next: Clip,
    pub current_path: PathBuf,
    pub next_path: PathBuf,
    pub directive: CrossfadeDirective,
}

impl SegmentJob {
    pub fn new(audio_dir: &Path, current: Clip, next: Clip, directive: CrossfadeDirective) -> Self {
        Self {
            current_path: dreams_common::Catalog::asset_path(audio_dir, &current),
            next_path: dreams_common::Catalog::asset_path(audio_dir, &next),
            current,
            next,
            directive,
        }
    }
}

/// How an encode ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentOutcome {
    /// All encoded bytes were forwarded
    Completed,
    /// The client went away mid-segment
    ClientGone,
}

/// Renders one segment and pushes encoded bytes into `sink`
#[async_trait]
pub trait SegmentEncoder: Send + Sync + 'static {
    async fn encode(&self, job: &SegmentJob, sink: &mpsc::Sender<Bytes>) -> Result<SegmentOutcome>;
}

/// ffmpeg subprocess encoder (libopus, 128 kbit/s VBR, Ogg on stdout)
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
    bitrate: String,
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            bitrate: "128k".to_string(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Check that the encoder binary runs; logs the version line
    pub async fn probe(&self) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Encode(format!("Failed to run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            return Err(Error::Encode(format!(
                "{} -version exited with {}",
                self.program.display(),
                output.status
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        info!("Encoder: {}", version);
        Ok(version)
    }

    /// Command-line arguments for one segment
    pub fn args(&self, job: &SegmentJob) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            job.current_path.to_string_lossy().into_owned(),
            "-i".to_string(),
            job.next_path.to_string_lossy().into_owned(),
            "-filter_complex".to_string(),
            job.directive.filter_graph(),
            "-map".to_string(),
            "[out]".to_string(),
            "-c:a".to_string(),
            "libopus".to_string(),
            "-b:a".to_string(),
            self.bitrate.clone(),
            "-vbr".to_string(),
            "on".to_string(),
            "-f".to_string(),
            "ogg".to_string(),
            "pipe:1".to_string(),
        ]
    }
}

fn check_asset(clip: &Clip, path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(Error::asset_unavailable(
            clip.id,
            format!("{} not found", path.display()),
        ))
    }
}

fn tail(text: &str, max_chars: usize) -> &str {
    let count = text.chars().count();
    if count <= max_chars {
        return text.trim();
    }
    let start = text
        .char_indices()
        .nth(count - max_chars)
        .map(|(i, _)| i)
        .unwrap_or(0);
    text[start..].trim()
}

#[async_trait]
impl SegmentEncoder for FfmpegEncoder {
    async fn encode(&self, job: &SegmentJob, sink: &mpsc::Sender<Bytes>) -> Result<SegmentOutcome> {
        check_asset(&job.current, &job.current_path)?;
        check_asset(&job.next, &job.next_path)?;

        let args = self.args(job);
        debug!("Spawning {} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Encode(format!("Failed to spawn {}: {}", self.program.display(), e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Internal("encoder stdout not captured".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Internal("encoder stderr not captured".to_string()))?;

        // Drain stderr concurrently so a chatty encoder never blocks on it
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            String::from_utf8_lossy(&buf).into_owned()
        });

        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = stdout.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if sink.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                debug!("Client gone during {} -> {}", job.current.name, job.next.name);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill encoder: {}", e);
                }
                stderr_task.abort();
                return Ok(SegmentOutcome::ClientGone);
            }
        }

        let status = child.wait().await?;
        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::Encode(format!(
                "{} exited with {}: {}",
                self.program.display(),
                status,
                tail(&stderr_text, STDERR_TAIL_CHARS)
            )));
        }

        Ok(SegmentOutcome::Completed)
    }
}
