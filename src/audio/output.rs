// Audio output sink: accepts playback units with explicit start times on a running clock
//
// `SpeakerSink` drives the default (or named) cpal output device. As with
// capture, the cpal stream is owned by a dedicated thread; the sink itself only
// touches the shared mixer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::mixer::{PlaybackMixer, UnitId};
use crate::error::{BridgeError, Result};

/// Destination for scheduled playback
///
/// Natural ends are reported on the channel handed to the sink at creation.
pub trait AudioSink: Send {
    /// Running clock of the sink, in seconds
    fn current_time(&self) -> f64;

    /// Sample rate the sink expects for scheduled units
    fn sample_rate(&self) -> u32;

    /// Queue `samples` to start at `start_time` seconds on the sink clock
    fn schedule(&mut self, id: UnitId, samples: Vec<f32>, start_time: f64) -> Result<()>;

    /// Stop a unit immediately, whether playing or still queued
    fn stop(&mut self, id: UnitId);

    /// Release the output device; further calls are no-ops
    fn close(&mut self);
}

/// cpal-backed speaker output
pub struct SpeakerSink {
    mixer: Arc<Mutex<PlaybackMixer>>,
    stop_tx: Option<std_mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SpeakerSink {
    /// Open the output device and start the (initially silent) stream
    pub fn open(
        source_rate: u32,
        device_name: Option<String>,
        ended_tx: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Self> {
        let mixer = Arc::new(Mutex::new(PlaybackMixer::new(source_rate)));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread_mixer = Arc::clone(&mixer);
        let worker = std::thread::Builder::new()
            .name("speaker-output".to_string())
            .spawn(move || {
                let stream = match build_output_stream(device_name.as_deref(), thread_mixer, ended_tx) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(BridgeError::Device(format!(
                        "failed to start output stream: {}",
                        e
                    ))));
                    return;
                }

                let _ = ready_tx.send(Ok(()));
                let _ = stop_rx.recv();
                drop(stream);
                debug!("Speaker output thread exiting");
            })
            .map_err(|e| BridgeError::Device(format!("failed to spawn output thread: {}", e)))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = worker.join();
                return Err(e);
            }
            Err(_) => {
                let _ = worker.join();
                return Err(BridgeError::Device("output thread exited early".to_string()));
            }
        }

        info!("Speaker output opened ({}Hz source clock)", source_rate);

        Ok(Self {
            mixer,
            stop_tx: Some(stop_tx),
            worker: Some(worker),
        })
    }

    fn with_mixer<T>(&self, f: impl FnOnce(&mut PlaybackMixer) -> T) -> Option<T> {
        match self.mixer.lock() {
            Ok(mut mixer) => Some(f(&mut mixer)),
            Err(_) => {
                error!("Playback mixer lock poisoned");
                None
            }
        }
    }
}

impl AudioSink for SpeakerSink {
    fn current_time(&self) -> f64 {
        self.with_mixer(|m| m.current_time()).unwrap_or(0.0)
    }

    fn sample_rate(&self) -> u32 {
        self.with_mixer(|m| m.source_rate()).unwrap_or(0)
    }

    fn schedule(&mut self, id: UnitId, samples: Vec<f32>, start_time: f64) -> Result<()> {
        if self.stop_tx.is_none() {
            return Err(BridgeError::Device("output already closed".to_string()));
        }
        self.with_mixer(|m| m.add(id, samples, start_time))
            .ok_or_else(|| BridgeError::Device("playback mixer unavailable".to_string()))
    }

    fn stop(&mut self, id: UnitId) {
        self.with_mixer(|m| m.remove(id));
    }

    fn close(&mut self) {
        self.with_mixer(|m| m.clear());

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            release_worker(worker);
        }
    }
}

impl Drop for SpeakerSink {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

/// Join the device thread without parking an async worker on it
fn release_worker(worker: JoinHandle<()>) {
    let join = move || {
        if worker.join().is_err() {
            error!("Speaker output thread panicked");
        }
        info!("Speaker output closed");
    };

    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => {
            runtime.spawn_blocking(join);
        }
        Err(_) => join(),
    }
}

fn build_output_stream(
    device_name: Option<&str>,
    mixer: Arc<Mutex<PlaybackMixer>>,
    ended_tx: mpsc::UnboundedSender<UnitId>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(wanted) => {
            let mut devices = host
                .output_devices()
                .map_err(|e| BridgeError::Device(format!("cannot enumerate output devices: {}", e)))?;

            #[allow(deprecated)]
            let found = devices.find(|d| d.name().map(|n| n == wanted).unwrap_or(false));

            found.ok_or_else(|| BridgeError::Device(format!("output device '{}' not found", wanted)))?
        }
        None => host
            .default_output_device()
            .ok_or_else(|| BridgeError::Device("no output device available".to_string()))?,
    };

    let config = device
        .default_output_config()
        .map_err(|e| BridgeError::Device(format!("output device refused configuration: {}", e)))?;

    let device_rate = u32::from(config.sample_rate());
    let channels = config.channels() as usize;

    let err_fn = |e: cpal::StreamError| error!("Speaker stream error: {}", e);

    let mut render = move |out: &mut [f32]| {
        let ended = match mixer.lock() {
            Ok(mut m) => m.render(out, channels, device_rate),
            Err(_) => {
                out.iter_mut().for_each(|s| *s = 0.0);
                return;
            }
        };
        for id in ended {
            let _ = ended_tx.send(id);
        }
    };

    let stream = match config.sample_format() {
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config.clone().into(),
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render(data),
            err_fn,
            None,
        ),
        cpal::SampleFormat::I16 => {
            let mut scratch: Vec<f32> = Vec::new();
            device.build_output_stream(
                &config.clone().into(),
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    scratch.resize(data.len(), 0.0);
                    render(&mut scratch);
                    for (dst, &src) in data.iter_mut().zip(scratch.iter()) {
                        *dst = crate::audio::codec::f32_to_i16(src);
                    }
                },
                err_fn,
                None,
            )
        }
        other => {
            return Err(BridgeError::Device(format!(
                "unsupported output sample format: {:?}",
                other
            )))
        }
    };

    stream.map_err(|e| BridgeError::Device(format!("failed to open output stream: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_release_does_not_block_the_runtime() {
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let (done_tx, done_rx) = std_mpsc::channel::<()>();
        let worker = std::thread::spawn(move || {
            let _ = stop_rx.recv();
            std::thread::sleep(Duration::from_millis(50));
            let _ = done_tx.send(());
        });

        let _ = stop_tx.send(());
        release_worker(worker);

        // Returned before the thread finished
        assert!(done_rx.try_recv().is_err());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(done_rx.try_recv().is_ok());
    }

    #[test]
    fn test_release_outside_runtime_joins_inline() {
        let (done_tx, done_rx) = std_mpsc::channel::<()>();
        let worker = std::thread::spawn(move || {
            let _ = done_tx.send(());
        });

        release_worker(worker);
        assert!(done_rx.try_recv().is_ok());
    }
}
