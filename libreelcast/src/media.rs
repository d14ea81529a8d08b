//! Video sources and media probing
//!
//! A [`VideoSource`] is the read-only handle to the video bytes. Every reader
//! asks for an explicit `(offset, len)` range, so adapters running
//! concurrently never share a cursor. Measured properties come from a
//! [`MediaProbe`]; the validator trusts those, not caller-declared values.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use crate::error::{ProbeError, ReelcastError, Result};

const FINGERPRINT_BLOCK: u64 = 1024 * 1024;

/// Read-only handle to the video content
#[derive(Debug, Clone)]
pub enum VideoSource {
    /// In-memory buffer
    Memory(Arc<[u8]>),
    /// File on disk, opened fresh for every range read
    File { path: PathBuf, len: u64 },
}

impl VideoSource {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        VideoSource::Memory(Arc::from(bytes))
    }

    /// Open a file source
    ///
    /// # Errors
    ///
    /// Returns `ReelcastError::InvalidInput` if the path does not exist or is
    /// not a regular file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| {
            ReelcastError::InvalidInput(format!("Video file not found: {} ({})", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(ReelcastError::InvalidInput(format!(
                "Video source is not a file: {}",
                path.display()
            )));
        }

        Ok(VideoSource::File {
            path: path.to_path_buf(),
            len: metadata.len(),
        })
    }

    /// Drain a byte stream into an in-memory source
    pub async fn from_stream<R: AsyncRead + Unpin>(mut reader: R) -> Result<Self> {
        let mut buffer = Vec::new();
        reader.read_to_end(&mut buffer).await.map_err(|e| {
            ReelcastError::InvalidInput(format!("Failed to read video stream: {}", e))
        })?;
        Ok(Self::from_bytes(buffer))
    }

    pub fn len(&self) -> u64 {
        match self {
            VideoSource::Memory(bytes) => bytes.len() as u64,
            VideoSource::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lowercase file extension, if the source is a file
    pub fn extension(&self) -> Option<String> {
        match self {
            VideoSource::File { path, .. } => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.to_lowercase()),
            VideoSource::Memory(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            VideoSource::Memory(bytes) => format!("<memory: {} bytes>", bytes.len()),
            VideoSource::File { path, .. } => path.display().to_string(),
        }
    }

    /// Read up to `len` bytes starting at `offset`
    ///
    /// Returns fewer bytes only at the end of the content.
    pub async fn read_range(&self, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
        let total = self.len();
        if offset >= total {
            return Ok(Vec::new());
        }
        let end = total.min(offset.saturating_add(len));

        match self {
            VideoSource::Memory(bytes) => Ok(bytes[offset as usize..end as usize].to_vec()),
            VideoSource::File { path, .. } => {
                let mut file = tokio::fs::File::open(path).await?;
                file.seek(std::io::SeekFrom::Start(offset)).await?;
                let mut buffer = vec![0u8; (end - offset) as usize];
                file.read_exact(&mut buffer).await?;
                Ok(buffer)
            }
        }
    }

    /// SHA-256 of the full content, hex encoded
    pub async fn fingerprint(&self) -> std::io::Result<String> {
        let mut hasher = Sha256::new();
        match self {
            VideoSource::Memory(bytes) => hasher.update(bytes),
            VideoSource::File { .. } => {
                let mut offset = 0;
                while offset < self.len() {
                    let block = self.read_range(offset, FINGERPRINT_BLOCK).await?;
                    if block.is_empty() {
                        break;
                    }
                    offset += block.len() as u64;
                    hasher.update(&block);
                }
            }
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Properties measured from the content
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedMedia {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    /// Container short name, e.g. "mp4"
    pub container: String,
    /// Video codec name as reported by the probe, e.g. "h264"
    pub video_codec: String,
    pub size_bytes: u64,
    pub fps: Option<f64>,
    pub bitrate: Option<u64>,
}

impl ProbedMedia {
    /// Width over height; zero when the height is unknown
    pub fn aspect_ratio(&self) -> f64 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f64 / self.height as f64
        }
    }
}

/// Collaborator that measures a source's properties
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, source: &VideoSource) -> std::result::Result<ProbedMedia, ProbeError>;
}

/// Probe returning a fixed answer
#[derive(Debug, Clone)]
pub struct StaticProbe {
    result: std::result::Result<ProbedMedia, ProbeError>,
}

impl StaticProbe {
    pub fn new(media: ProbedMedia) -> Self {
        Self { result: Ok(media) }
    }

    pub fn failing(error: ProbeError) -> Self {
        Self { result: Err(error) }
    }
}

#[async_trait]
impl MediaProbe for StaticProbe {
    async fn probe(&self, _source: &VideoSource) -> std::result::Result<ProbedMedia, ProbeError> {
        self.result.clone()
    }
}

/// Probe backed by the `ffprobe` binary
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ffprobe"),
        }
    }
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, source: &VideoSource) -> std::result::Result<ProbedMedia, ProbeError> {
        let input = match source {
            VideoSource::File { path, .. } => path.display().to_string(),
            VideoSource::Memory(_) => "pipe:0".to_string(),
        };

        let mut child = tokio::process::Command::new(&self.binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(&input)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProbeError::Unavailable(format!("{}: {}", self.binary.display(), e)))?;

        if let (VideoSource::Memory(bytes), Some(mut stdin)) = (source, child.stdin.take()) {
            let bytes = bytes.clone();
            tokio::spawn(async move {
                // ffprobe may close stdin early once it has seen enough
                let _ = stdin.write_all(&bytes).await;
            });
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProbeError::Failed(e.to_string()))?;

        if !output.status.success() {
            return Err(ProbeError::Failed(format!(
                "ffprobe exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!("ffprobe output for {}: {} bytes", source.describe(), stdout.len());
        parse_ffprobe_output(&stdout, source.extension().as_deref(), source.len())
    }
}

#[derive(Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

/// Parse `ffprobe -print_format json` output
///
/// `extension_hint` picks the container name out of ffprobe's
/// comma-separated demuxer list ("mov,mp4,m4a,...").
pub fn parse_ffprobe_output(
    json: &str,
    extension_hint: Option<&str>,
    fallback_size: u64,
) -> std::result::Result<ProbedMedia, ProbeError> {
    let parsed: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| ProbeError::Malformed(e.to_string()))?;

    let stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ProbeError::Malformed("no video stream found".to_string()))?;

    let format = parsed
        .format
        .ok_or_else(|| ProbeError::Malformed("no format section".to_string()))?;

    let duration_secs = format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| ProbeError::Malformed("missing duration".to_string()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(ProbeError::Malformed("missing video dimensions".to_string())),
    };

    let names: Vec<&str> = format
        .format_name
        .as_deref()
        .unwrap_or("")
        .split(',')
        .filter(|n| !n.is_empty())
        .collect();
    let container = match extension_hint {
        Some(ext) if names.contains(&ext) => ext.to_string(),
        _ => names.first().map(|n| n.to_string()).unwrap_or_default(),
    };

    Ok(ProbedMedia {
        duration_secs,
        width,
        height,
        container,
        video_codec: stream.codec_name.clone().unwrap_or_default(),
        size_bytes: format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(fallback_size),
        fps: stream.r_frame_rate.as_deref().and_then(parse_frame_rate),
        bitrate: format.bit_rate.as_deref().and_then(|b| b.parse().ok()),
    })
}

/// Parse "30000/1001" or "30" into frames per second
fn parse_frame_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            (den != 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}
