use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::mpsc;

use crate::error::Result;

/// Raw captured audio (f32 samples in [-1, 1], interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (interleaved when `channels > 1`)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Duration of the frame in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Sample rate the capture path delivers to the session
    pub target_sample_rate: u32,
    /// Target channel count (the bridge always sends mono)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
    /// Input device name; `None` picks the host default
    pub device_name: Option<String>,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            target_channels: 1,
            buffer_duration_ms: 100,
            device_name: None,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal input device (all platforms)
/// - File: WAV file replayed in real time (demos, hands-free runs)
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Microphone input (all platforms)
    Microphone,
    /// WAV file input, paced like a live microphone
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Acquire a capture backend for the given source
    ///
    /// Opening the device is the permission check: a missing or refused
    /// input device fails here with `BridgeError::Permission`.
    pub fn create(source: &AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                let backend = super::microphone::MicrophoneBackend::open(config)?;
                Ok(Box::new(backend))
            }
            AudioSource::File(path) => {
                let backend = super::file::WavFileBackend::open(path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}
