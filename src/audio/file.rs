use async_trait::async_trait;
use hound::{SampleFormat, WavReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{BridgeError, Result};

/// Decoded WAV file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples normalised to [-1, 1]
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .map_err(|e| BridgeError::Permission(format!("cannot open {}: {}", path.display(), e)))?;

        let spec = reader.spec();
        let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BridgeError::Decode(format!("failed to read samples: {}", e)))?,
            (SampleFormat::Int, 16) => reader
                .into_samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BridgeError::Decode(format!("failed to read samples: {}", e)))?,
            (format, bits) => {
                return Err(BridgeError::Decode(format!(
                    "unsupported WAV encoding: {:?} {} bits",
                    format, bits
                )))
            }
        };

        let duration_seconds = samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Replays a WAV file as if it were a live microphone
///
/// Buffers of `buffer_duration_ms` are emitted at real-time pace; the frame
/// channel closes once the file is exhausted.
pub struct WavFileBackend {
    file: Arc<AudioFile>,
    buffer_duration_ms: u64,
    label: String,
    capturing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn open(path: impl AsRef<Path>, config: AudioBackendConfig) -> Result<Self> {
        let file = AudioFile::open(path)?;
        let label = format!("wav file ({})", file.path);

        Ok(Self {
            file: Arc::new(file),
            buffer_duration_ms: config.buffer_duration_ms.max(1),
            label,
            capturing: Arc::new(AtomicBool::new(false)),
            task: None,
        })
    }
}

#[async_trait]
impl AudioBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(16);

        let file = Arc::clone(&self.file);
        let capturing = Arc::clone(&self.capturing);
        let buffer_ms = self.buffer_duration_ms;

        let samples_per_buffer =
            ((file.sample_rate as u64 * buffer_ms / 1000) as usize).max(1) * file.channels as usize;

        capturing.store(true, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(buffer_ms));

            for (index, chunk) in file.samples.chunks(samples_per_buffer).enumerate() {
                ticker.tick().await;

                if !capturing.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: file.sample_rate,
                    channels: file.channels,
                    timestamp_ms: index as u64 * buffer_ms,
                };

                if tx.send(frame).await.is_err() {
                    break;
                }
            }

            capturing.store(false, Ordering::SeqCst);
            debug!("WAV replay finished: {}", file.path);
        });

        self.task = Some(task);
        info!("File capture started: {}", self.label);

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
            info!("File capture stopped: {}", self.label);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.label
    }
}
