// Shared in-memory doubles for driving the bridge without devices or network
#![allow(dead_code)]

use async_trait::async_trait;
use live_audio_bridge::audio::codec::encode_chunk;
use live_audio_bridge::audio::{AudioBackend, AudioBackendConfig, AudioDevices, AudioFrame, AudioSink, UnitId};
use live_audio_bridge::live::{
    Blob, ClientMessage, LiveChannel, LiveConnector, LiveInbound, LiveSender, ServerEvent, SetupMessage,
};
use live_audio_bridge::{BridgeCallbacks, BridgeError, Result, Speaker};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

// ============================================================================
// Capture
// ============================================================================

pub struct ChannelCapture {
    frames: Option<mpsc::Receiver<AudioFrame>>,
    refuse_start: bool,
    capturing: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

#[async_trait]
impl AudioBackend for ChannelCapture {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.refuse_start {
            return Err(BridgeError::Permission("stream refused to start".to_string()));
        }
        let frames = self
            .frames
            .take()
            .ok_or_else(|| BridgeError::Device("capture already started".to_string()))?;
        self.capturing.store(true, Ordering::SeqCst);
        Ok(frames)
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        self.released.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "channel capture"
    }
}

// ============================================================================
// Output
// ============================================================================

#[derive(Debug, Default)]
pub struct SinkState {
    pub now: f64,
    /// (id, sample count, start time)
    pub scheduled: Vec<(UnitId, usize, f64)>,
    pub stopped: Vec<UnitId>,
    pub closed: bool,
}

/// Output with a hand-driven clock
pub struct ManualSink {
    state: Arc<Mutex<SinkState>>,
}

impl AudioSink for ManualSink {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().now
    }

    fn sample_rate(&self) -> u32 {
        24000
    }

    fn schedule(&mut self, id: UnitId, samples: Vec<f32>, start_time: f64) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .scheduled
            .push((id, samples.len(), start_time));
        Ok(())
    }

    fn stop(&mut self, id: UnitId) {
        self.state.lock().unwrap().stopped.push(id);
    }

    fn close(&mut self) {
        self.state.lock().unwrap().closed = true;
    }
}

// ============================================================================
// Devices
// ============================================================================

#[derive(Default)]
pub struct MockDevices {
    pub deny_microphone: bool,
    pub fail_output: bool,
    pub fail_capture_start: bool,
    pub capturing: Arc<AtomicBool>,
    pub capture_released: Arc<AtomicBool>,
    pub outputs_opened: AtomicUsize,
    pub sink: Arc<Mutex<SinkState>>,
    frame_tx: Mutex<Option<mpsc::Sender<AudioFrame>>>,
    ended_tx: Mutex<Option<mpsc::UnboundedSender<UnitId>>>,
}

impl MockDevices {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying_microphone() -> Arc<Self> {
        Arc::new(Self {
            deny_microphone: true,
            ..Self::default()
        })
    }

    pub fn failing_output() -> Arc<Self> {
        Arc::new(Self {
            fail_output: true,
            ..Self::default()
        })
    }

    pub fn failing_capture_start() -> Arc<Self> {
        Arc::new(Self {
            fail_capture_start: true,
            ..Self::default()
        })
    }

    /// Push a frame as if the microphone produced it
    pub async fn push_frame(&self, frame: AudioFrame) {
        let tx = self.frame_tx.lock().unwrap().clone();
        if let Some(tx) = tx {
            let _ = tx.send(frame).await;
        }
    }

    /// Report a natural end of playback from the output
    pub fn end_unit(&self, id: UnitId) {
        if let Some(tx) = self.ended_tx.lock().unwrap().as_ref() {
            let _ = tx.send(id);
        }
    }

    pub fn set_clock(&self, now: f64) {
        self.sink.lock().unwrap().now = now;
    }

    pub fn scheduled(&self) -> Vec<(UnitId, usize, f64)> {
        self.sink.lock().unwrap().scheduled.clone()
    }

    pub fn stopped(&self) -> Vec<UnitId> {
        self.sink.lock().unwrap().stopped.clone()
    }

    pub fn sink_closed(&self) -> bool {
        self.sink.lock().unwrap().closed
    }
}

#[async_trait]
impl AudioDevices for MockDevices {
    async fn open_capture(&self, _config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        if self.deny_microphone {
            return Err(BridgeError::Permission("NotAllowedError".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        *self.frame_tx.lock().unwrap() = Some(tx);

        Ok(Box::new(ChannelCapture {
            frames: Some(rx),
            refuse_start: self.fail_capture_start,
            capturing: Arc::clone(&self.capturing),
            released: Arc::clone(&self.capture_released),
        }))
    }

    async fn open_output(
        &self,
        _sample_rate: u32,
        ended_tx: mpsc::UnboundedSender<UnitId>,
    ) -> Result<Box<dyn AudioSink>> {
        if self.fail_output {
            return Err(BridgeError::Device("no output device available".to_string()));
        }

        self.outputs_opened.fetch_add(1, Ordering::SeqCst);
        *self.ended_tx.lock().unwrap() = Some(ended_tx);

        Ok(Box::new(ManualSink {
            state: Arc::clone(&self.sink),
        }))
    }
}

// ============================================================================
// Live service
// ============================================================================

pub struct RecordingSender {
    sent: Arc<Mutex<Vec<ClientMessage>>>,
    closed: Arc<AtomicBool>,
}

impl LiveSender for RecordingSender {
    fn send(&mut self, message: ClientMessage) -> Result<()> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockConnector {
    pub refuse: Option<String>,
    pub sent: Arc<Mutex<Vec<ClientMessage>>>,
    pub closed: Arc<AtomicBool>,
    pub setups: Mutex<Vec<SetupMessage>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    inbound_tx: Mutex<Option<mpsc::UnboundedSender<LiveInbound>>>,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            refuse: Some(reason.to_string()),
            ..Self::default()
        })
    }

    /// Connector whose handshake completes only when the returned sender fires
    pub fn gated() -> (Arc<Self>, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        let connector = Self {
            gate: Mutex::new(Some(rx)),
            ..Self::default()
        };
        (Arc::new(connector), tx)
    }

    pub fn is_connected(&self) -> bool {
        self.inbound_tx.lock().unwrap().is_some()
    }

    /// Deliver inbound traffic as if the service sent it
    pub fn inject(&self, inbound: LiveInbound) {
        if let Some(tx) = self.inbound_tx.lock().unwrap().as_ref() {
            let _ = tx.send(inbound);
        }
    }

    pub fn event(&self, event: ServerEvent) {
        self.inject(LiveInbound::Event(event));
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveConnector for MockConnector {
    async fn connect(&self, setup: SetupMessage) -> Result<LiveChannel> {
        self.setups.lock().unwrap().push(setup);

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        if let Some(reason) = &self.refuse {
            return Err(BridgeError::Connection(reason.clone()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inbound_tx.lock().unwrap() = Some(tx);

        Ok(LiveChannel {
            sender: Box::new(RecordingSender {
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            }),
            inbound: rx,
        })
    }
}

// ============================================================================
// Callbacks
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Update(String, bool, Speaker),
    TurnComplete(Speaker),
    Error(String),
    Close,
}

#[derive(Default)]
pub struct RecordingCallbacks {
    pub events: Mutex<Vec<Notification>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Notification) -> bool) -> usize {
        self.events().iter().filter(|n| pred(n)).count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Error(message) => Some(message),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.count(|n| *n == Notification::Close)
    }
}

impl BridgeCallbacks for RecordingCallbacks {
    fn on_transcript_update(&self, text: &str, is_final: bool, speaker: Speaker) {
        self.events
            .lock()
            .unwrap()
            .push(Notification::Update(text.to_string(), is_final, speaker));
    }

    fn on_turn_complete(&self, speaker: Speaker) {
        self.events.lock().unwrap().push(Notification::TurnComplete(speaker));
    }

    fn on_error(&self, message: &str) {
        self.events.lock().unwrap().push(Notification::Error(message.to_string()));
    }

    fn on_close(&self) {
        self.events.lock().unwrap().push(Notification::Close);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Let queued dispatcher work run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Synthesized speech of `secs` seconds at 24 kHz
pub fn speech(secs: f64) -> ServerEvent {
    let samples = vec![0.25_f32; (secs * 24000.0).round() as usize];
    let chunk = encode_chunk(&samples, 24000);
    ServerEvent::Audio(Blob {
        mime_type: chunk.mime_type,
        data: chunk.data,
    })
}

pub fn mic_frame(samples: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![0.1; samples],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    }
}
