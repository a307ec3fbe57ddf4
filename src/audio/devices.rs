use async_trait::async_trait;
use tokio::sync::mpsc;

use super::backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioSource};
use super::mixer::UnitId;
use super::output::{AudioSink, SpeakerSink};
use crate::error::{BridgeError, Result};

/// Per-session access to the capture and playback devices
///
/// The bridge asks for a fresh capture backend and output sink for every
/// session and releases both on teardown.
#[async_trait]
pub trait AudioDevices: Send + Sync {
    /// Acquire the capture device (the microphone permission step)
    async fn open_capture(&self, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>>;

    /// Open an output running a clock at `sample_rate`
    async fn open_output(
        &self,
        sample_rate: u32,
        ended_tx: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Box<dyn AudioSink>>;
}

/// Real devices through cpal (or a WAV file standing in for the microphone)
#[derive(Debug, Clone)]
pub struct CpalDevices {
    pub source: AudioSource,
    pub output_device: Option<String>,
}

impl CpalDevices {
    pub fn new(source: AudioSource, output_device: Option<String>) -> Self {
        Self {
            source,
            output_device,
        }
    }
}

impl Default for CpalDevices {
    fn default() -> Self {
        Self::new(AudioSource::Microphone, None)
    }
}

#[async_trait]
impl AudioDevices for CpalDevices {
    async fn open_capture(&self, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        let source = self.source.clone();
        tokio::task::spawn_blocking(move || AudioBackendFactory::create(&source, config))
            .await
            .map_err(|e| BridgeError::Device(format!("capture open task failed: {}", e)))?
    }

    async fn open_output(
        &self,
        sample_rate: u32,
        ended_tx: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Box<dyn AudioSink>> {
        let device_name = self.output_device.clone();
        let sink = tokio::task::spawn_blocking(move || SpeakerSink::open(sample_rate, device_name, ended_tx))
            .await
            .map_err(|e| BridgeError::Device(format!("output open task failed: {}", e)))??;
        Ok(Box::new(sink))
    }
}
