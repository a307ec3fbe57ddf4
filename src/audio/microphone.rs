// Microphone capture through cpal
//
// cpal streams are not Send, so the stream is built and owned by a dedicated
// thread. Opening the backend builds and plays the stream, which is where the
// OS grants or refuses microphone access. Frames are queued on a bounded
// tokio channel that `start()` hands over to the session.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use crate::error::{BridgeError, Result};

/// Frames buffered between the device thread and the session
const FRAME_CHANNEL_CAPACITY: usize = 64;

pub struct MicrophoneBackend {
    label: String,
    capturing: Arc<AtomicBool>,
    frames: Option<mpsc::Receiver<AudioFrame>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    /// Acquire the input device and start its stream
    ///
    /// Blocks until the device thread reports that the stream is playing; a
    /// refused or missing device fails here with `BridgeError::Permission`.
    pub fn open(config: AudioBackendConfig) -> Result<Self> {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<String>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let device_name = config.device_name.clone();

        let worker = std::thread::Builder::new()
            .name("microphone-capture".to_string())
            .spawn(move || {
                let (stream, label) = match build_capture_stream(device_name.as_deref(), frame_tx) {
                    Ok(built) => built,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(BridgeError::Permission(format!(
                        "failed to start input stream: {}",
                        e
                    ))));
                    return;
                }

                let _ = ready_tx.send(Ok(label));

                // Park until stop() or the backend is dropped
                let _ = stop_rx.recv();

                drop(stream);
                debug!("Microphone capture thread exiting");
            })
            .map_err(|e| BridgeError::Device(format!("failed to spawn capture thread: {}", e)))?;

        let label = match ready_rx.recv() {
            Ok(Ok(label)) => label,
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(BridgeError::Device("capture thread exited early".to_string()));
            }
        };

        info!("Microphone acquired: {}", label);

        Ok(Self {
            label,
            capturing: Arc::new(AtomicBool::new(false)),
            frames: Some(frame_rx),
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }
}

#[async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let frames = self
            .frames
            .take()
            .ok_or_else(|| BridgeError::Device("microphone already started or released".to_string()))?;

        self.capturing.store(true, Ordering::SeqCst);
        info!("Microphone capture started: {}", self.label);

        Ok(frames)
    }

    async fn stop(&mut self) -> Result<()> {
        self.frames = None;

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(worker) = self.worker.take() {
            tokio::task::spawn_blocking(move || {
                if worker.join().is_err() {
                    error!("Microphone capture thread panicked");
                }
            })
            .await
            .map_err(|e| BridgeError::Device(format!("failed to join capture thread: {}", e)))?;

            info!("Microphone released: {}", self.label);
        }

        self.capturing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl Drop for MicrophoneBackend {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

/// Find the requested (or default) input device and its default config
fn resolve_input(device_name: Option<&str>) -> Result<(cpal::Device, cpal::SupportedStreamConfig)> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(wanted) => {
            let mut devices = host
                .input_devices()
                .map_err(|e| BridgeError::Permission(format!("cannot enumerate input devices: {}", e)))?;

            #[allow(deprecated)]
            let found = devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false));

            found.ok_or_else(|| BridgeError::Permission(format!("input device '{}' not found", wanted)))?
        }
        None => host
            .default_input_device()
            .ok_or_else(|| BridgeError::Permission("no input device available".to_string()))?,
    };

    let config = device
        .default_input_config()
        .map_err(|e| BridgeError::Permission(format!("input device refused configuration: {}", e)))?;

    Ok((device, config))
}

/// Build the cpal input stream; runs on the capture thread
fn build_capture_stream(
    device_name: Option<&str>,
    frame_tx: mpsc::Sender<AudioFrame>,
) -> Result<(cpal::Stream, String)> {
    let (device, config) = resolve_input(device_name)?;

    let sample_rate = u32::from(config.sample_rate());
    let channels = config.channels();

    #[allow(deprecated)]
    let label = format!(
        "microphone ({}, {}Hz, {}ch)",
        device.name().unwrap_or_else(|_| "unknown".to_string()),
        sample_rate,
        channels
    );
    let started = Instant::now();

    let err_fn = |e: cpal::StreamError| error!("Microphone stream error: {}", e);

    let forward = move |samples: Vec<f32>| {
        let frame = AudioFrame {
            samples,
            sample_rate,
            channels,
            timestamp_ms: started.elapsed().as_millis() as u64,
        };
        if frame_tx.try_send(frame).is_err() {
            warn!("Capture channel full or closed, dropping device buffer");
        }
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &config.clone().into(),
            move |data: &[f32], _: &_| forward(data.to_vec()),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &config.clone().into(),
            move |data: &[i16], _: &_| {
                forward(data.iter().map(|&s| s as f32 / 32768.0).collect())
            },
            err_fn,
            None,
        ),
        other => {
            return Err(BridgeError::Device(format!(
                "unsupported input sample format: {:?}",
                other
            )))
        }
    };

    let stream = stream.map_err(|e| BridgeError::Permission(format!("failed to open input stream: {}", e)))?;
    Ok((stream, label))
}
