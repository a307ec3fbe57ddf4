//! The live audio bridge
//!
//! `LiveAudioBridge` owns at most one session. Everything a session reacts to
//! (connection result, capture frames, service events, decoded audio, playback
//! ends, stop requests) arrives as a `BridgeEvent` on one ordered channel and
//! is handled by a single dispatcher task, which alone owns the session state:
//! the capture backend, the connection sender, the playback scheduler and the
//! transcript buffers.
//!
//! Decoding runs on the blocking pool and comes back tagged with a sequence
//! number and the interruption epoch. Decoded audio is applied in arrival
//! order; anything decoded before an interruption, or after teardown, is
//! discarded.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::callbacks::BridgeCallbacks;
use super::config::{new_session_id, SessionConfig};
use super::stats::{SessionState, SessionStats};
use super::transcript::{Speaker, TranscriptAggregator};
use crate::audio::codec::{decode_chunk, sample_rate_from_mime};
use crate::audio::{
    AudioBackend, AudioDevices, AudioFrame, AudioSink, CaptureProcessor, LinearResampler, PlaybackScheduler,
    UnitId,
};
use crate::error::{BridgeError, Result};
use crate::live::{Blob, ClientMessage, LiveChannel, LiveConnector, LiveInbound, LiveSender, ServerEvent};

/// Inputs to the session dispatcher
enum BridgeEvent {
    /// Connection attempt finished
    Connected(Result<LiveChannel>),
    /// Raw frame from the capture backend
    Frame(AudioFrame),
    /// The capture backend stopped producing frames
    CaptureEnded,
    /// Event from the live service
    Server(ServerEvent),
    /// The connection failed mid-session
    TransportError(BridgeError),
    /// The service closed the connection
    ServiceClosed(Option<String>),
    /// Off-thread decode finished
    Decoded {
        seq: u64,
        epoch: u64,
        result: Result<Vec<f32>>,
    },
    /// A scheduled unit finished playing
    PlaybackEnded(UnitId),
    /// Caller asked to stop
    Stop,
}

struct ActiveSession {
    events_tx: mpsc::UnboundedSender<BridgeEvent>,
    stats_rx: watch::Receiver<SessionStats>,
    dispatcher: Option<JoinHandle<()>>,
}

/// Bridge between the microphone, the live service and the speaker
pub struct LiveAudioBridge {
    config: SessionConfig,
    devices: Arc<dyn AudioDevices>,
    connector: Arc<dyn LiveConnector>,
    session: Option<ActiveSession>,
    sessions_started: u64,
}

impl LiveAudioBridge {
    pub fn new(config: SessionConfig, devices: Arc<dyn AudioDevices>, connector: Arc<dyn LiveConnector>) -> Self {
        Self {
            config,
            devices,
            connector,
            session: None,
            sessions_started: 0,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current session state (`Idle` when no session was started)
    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|s| s.stats_rx.borrow().state)
            .unwrap_or(SessionState::Idle)
    }

    /// Snapshot of the current (or last) session's statistics
    pub fn stats(&self) -> SessionStats {
        match &self.session {
            Some(session) => session.stats_rx.borrow().clone(),
            None => SessionStats::new(self.config.session_id.clone()),
        }
    }

    /// Start a session
    ///
    /// Acquires the microphone and the output device and starts capture, then
    /// returns while the connection is established in the background. Frames
    /// captured before the service acknowledges the setup are dropped.
    /// Failures are reported through `on_error` and returned.
    pub async fn start_session(&mut self, callbacks: Arc<dyn BridgeCallbacks>) -> Result<()> {
        if self.state().is_active() {
            let err = BridgeError::SessionActive;
            warn!("Refusing to start: {}", err);
            callbacks.on_error(&err.user_message());
            return Err(err);
        }

        // A finished session is forgotten; the bridge is idle again
        self.session = None;
        if self.sessions_started > 0 {
            self.config.session_id = new_session_id();
        }
        self.sessions_started += 1;

        info!("Starting session: {}", self.config.session_id);

        let mut capture = match self.devices.open_capture(self.config.capture_config()).await {
            Ok(capture) => capture,
            Err(e) => {
                error!("Failed to acquire microphone: {}", e);
                callbacks.on_error(&e.user_message());
                return Err(e);
            }
        };

        let (ended_tx, mut ended_rx) = mpsc::unbounded_channel::<UnitId>();
        let mut sink = match self.devices.open_output(self.config.playback_sample_rate, ended_tx).await {
            Ok(sink) => sink,
            Err(e) => {
                error!("Failed to open audio output: {}", e);
                if let Err(stop_err) = capture.stop().await {
                    warn!("Failed to release microphone: {}", stop_err);
                }
                callbacks.on_error(&e.user_message());
                return Err(e);
            }
        };

        let mut frames = match capture.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Failed to start capture: {}", e);
                sink.close();
                if let Err(stop_err) = capture.stop().await {
                    warn!("Failed to release microphone: {}", stop_err);
                }
                callbacks.on_error(&e.user_message());
                return Err(e);
            }
        };
        info!("Capture started ({})", capture.name());

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (stats_tx, stats_rx) = watch::channel(SessionStats::new(self.config.session_id.clone()));

        let mut dispatcher = Dispatcher::new(
            self.config.clone(),
            callbacks,
            events_tx.clone(),
            Some(capture),
            PlaybackScheduler::new(sink),
            stats_tx,
        );

        let frame_tx = events_tx.clone();
        dispatcher.tasks.push(tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if frame_tx.send(BridgeEvent::Frame(frame)).is_err() {
                    return;
                }
            }
            let _ = frame_tx.send(BridgeEvent::CaptureEnded);
        }));

        let playback_tx = events_tx.clone();
        dispatcher.tasks.push(tokio::spawn(async move {
            while let Some(id) = ended_rx.recv().await {
                if playback_tx.send(BridgeEvent::PlaybackEnded(id)).is_err() {
                    break;
                }
            }
        }));

        info!("Session {} connecting", self.config.session_id);
        let handle = tokio::spawn(dispatcher.run(events_rx));

        // Connection setup proceeds in the background
        let connector = Arc::clone(&self.connector);
        let setup = self.config.setup_message();
        let connect_tx = events_tx.clone();
        tokio::spawn(async move {
            let result = connector.connect(setup).await;
            if let Err(mpsc::error::SendError(event)) = connect_tx.send(BridgeEvent::Connected(result)) {
                // Session already torn down: release the fresh connection
                if let BridgeEvent::Connected(Ok(mut channel)) = event {
                    info!("Closing connection that completed after teardown");
                    channel.sender.close();
                }
            }
        });

        self.session = Some(ActiveSession {
            events_tx,
            stats_rx,
            dispatcher: Some(handle),
        });

        Ok(())
    }

    /// Request a clean close and tear the session down
    ///
    /// Returns the final statistics. Calling it without a running session is
    /// a no-op.
    pub async fn stop_session(&mut self) -> Result<SessionStats> {
        if let Some(session) = &self.session {
            if session.dispatcher.is_some() {
                info!("Stopping session {}", self.config.session_id);
                let _ = session.events_tx.send(BridgeEvent::Stop);
            }
        }

        self.wait_closed().await?;
        Ok(self.stats())
    }

    /// Wait until the current session has been torn down
    pub async fn wait_closed(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };

        if let Some(handle) = session.dispatcher.as_mut() {
            let joined = handle.await;
            session.dispatcher = None;
            joined.map_err(|e| BridgeError::Transport(format!("session dispatcher failed: {}", e)))?;
        }

        Ok(())
    }
}

impl Drop for LiveAudioBridge {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            if session.dispatcher.is_some() {
                let _ = session.events_tx.send(BridgeEvent::Stop);
            }
        }
    }
}

struct Dispatcher {
    config: SessionConfig,
    callbacks: Arc<dyn BridgeCallbacks>,
    events_tx: mpsc::UnboundedSender<BridgeEvent>,
    state: SessionState,
    capture: Option<Box<dyn AudioBackend>>,
    processor: CaptureProcessor,
    sender: Option<Box<dyn LiveSender>>,
    playback: Option<PlaybackScheduler>,
    transcripts: TranscriptAggregator,
    stats: SessionStats,
    stats_tx: watch::Sender<SessionStats>,
    /// Bumped on every interruption
    epoch: u64,
    /// Sequence number for the next inbound audio chunk
    next_seq: u64,
    /// Sequence number the scheduler is waiting for
    next_apply: u64,
    /// Decoded chunks waiting for earlier ones to finish
    pending: BTreeMap<u64, Result<Vec<f32>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    fn new(
        config: SessionConfig,
        callbacks: Arc<dyn BridgeCallbacks>,
        events_tx: mpsc::UnboundedSender<BridgeEvent>,
        capture: Option<Box<dyn AudioBackend>>,
        playback: PlaybackScheduler,
        stats_tx: watch::Sender<SessionStats>,
    ) -> Self {
        let mut stats = SessionStats::new(config.session_id.clone());
        stats.state = SessionState::Connecting;
        stats_tx.send_replace(stats.clone());

        Self {
            processor: CaptureProcessor::new(config.capture_sample_rate, config.frame_size),
            config,
            callbacks,
            events_tx,
            state: SessionState::Connecting,
            capture,
            sender: None,
            playback: Some(playback),
            transcripts: TranscriptAggregator::new(),
            stats,
            stats_tx,
            epoch: 0,
            next_seq: 0,
            next_apply: 0,
            pending: BTreeMap::new(),
            tasks: Vec::new(),
        }
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<BridgeEvent>) {
        while let Some(event) = events.recv().await {
            self.handle(event).await;
            self.publish_stats();

            if self.state == SessionState::Closed {
                break;
            }
        }

        debug!("Session {} dispatcher exiting", self.config.session_id);
    }

    async fn handle(&mut self, event: BridgeEvent) {
        match event {
            BridgeEvent::Connected(result) => self.on_connected(result).await,
            BridgeEvent::Frame(frame) => self.on_frame(frame),
            BridgeEvent::CaptureEnded => {
                // File input runs out before the interviewer is done; keep listening
                info!("Capture source ended, session stays open");
            }
            BridgeEvent::Server(event) => self.on_server_event(event).await,
            BridgeEvent::TransportError(e) => self.fail(e).await,
            BridgeEvent::ServiceClosed(reason) => {
                info!(
                    "Live service closed the session ({})",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.teardown().await;
            }
            BridgeEvent::Decoded { seq, epoch, result } => self.on_decoded(seq, epoch, result).await,
            BridgeEvent::PlaybackEnded(id) => {
                if let Some(playback) = self.playback.as_mut() {
                    playback.on_unit_ended(id);
                }
            }
            BridgeEvent::Stop => {
                info!("Stop requested");
                if let Some(sender) = self.sender.as_mut() {
                    sender.close();
                }
                self.teardown().await;
            }
        }
    }

    async fn on_connected(&mut self, result: Result<LiveChannel>) {
        let channel = match result {
            Ok(channel) => channel,
            Err(e) => {
                self.fail(e).await;
                return;
            }
        };

        if self.state != SessionState::Connecting {
            info!("Ignoring connection completed in state {}", self.state);
            let mut sender = channel.sender;
            sender.close();
            return;
        }

        let LiveChannel { sender, mut inbound } = channel;
        self.sender = Some(sender);

        let tx = self.events_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                let event = match message {
                    LiveInbound::Event(event) => BridgeEvent::Server(event),
                    LiveInbound::Error(e) => BridgeEvent::TransportError(e),
                    LiveInbound::Closed(reason) => {
                        let _ = tx.send(BridgeEvent::ServiceClosed(reason));
                        return;
                    }
                };
                if tx.send(event).is_err() {
                    return;
                }
            }
            let _ = tx.send(BridgeEvent::ServiceClosed(None));
        }));

        self.state = SessionState::Open;
        info!("Session {} open", self.config.session_id);
    }

    fn on_frame(&mut self, frame: AudioFrame) {
        if self.state != SessionState::Open {
            self.stats.frames_dropped += 1;
            debug!("Dropping capture frame in state {}", self.state);
            return;
        }

        let Some(sender) = self.sender.as_mut() else {
            self.stats.frames_dropped += 1;
            return;
        };

        for chunk in self.processor.process(frame) {
            match sender.send(ClientMessage::audio(chunk)) {
                Ok(()) => self.stats.frames_sent += 1,
                Err(e) => {
                    // The reader reports the underlying fault; stop feeding the writer
                    warn!("Failed to send audio frame: {}", e);
                    self.stats.frames_dropped += 1;
                }
            }
        }
    }

    async fn on_server_event(&mut self, event: ServerEvent) {
        if self.state != SessionState::Open {
            debug!("Ignoring service event in state {}", self.state);
            return;
        }

        match event {
            ServerEvent::SetupComplete => debug!("Duplicate setup acknowledgement"),
            ServerEvent::InputTranscript(text) => self.on_transcript(Speaker::Victim, &text),
            ServerEvent::OutputTranscript(text) => self.on_transcript(Speaker::Interviewer, &text),
            ServerEvent::Audio(blob) => self.decode(blob),
            ServerEvent::Interrupted => self.interrupt(),
            ServerEvent::TurnComplete => {
                for speaker in self.transcripts.complete_turn() {
                    debug!("Turn complete for {}", speaker);
                    self.stats.turns_finalized += 1;
                    self.callbacks.on_turn_complete(speaker);
                }
            }
            ServerEvent::GoAway { time_left } => {
                warn!(
                    "Live service will close the connection soon (time left: {})",
                    time_left.as_deref().unwrap_or("unknown")
                );
            }
            ServerEvent::Error(message) => self.fail(BridgeError::Transport(message)).await,
        }
    }

    fn on_transcript(&mut self, speaker: Speaker, text: &str) {
        let update = self.transcripts.push_partial(speaker, text);
        self.callbacks
            .on_transcript_update(&update.text, update.is_final, update.speaker);
    }

    fn decode(&mut self, blob: Blob) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let epoch = self.epoch;

        let target_rate = self.config.playback_sample_rate;
        let source_rate = sample_rate_from_mime(&blob.mime_type).unwrap_or(target_rate);
        if source_rate != target_rate {
            debug!("Inbound audio at {}Hz, resampling to {}Hz", source_rate, target_rate);
        }

        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let work = tokio::task::spawn_blocking(move || -> Result<Vec<f32>> {
                let samples = decode_chunk(&blob.data)?;
                if source_rate == target_rate {
                    return Ok(samples);
                }
                let mut resampler = LinearResampler::new(source_rate, target_rate)?;
                Ok(resampler.process(&samples))
            });

            // Every sequence number must come back, or later chunks wait forever
            let result = match work.await {
                Ok(result) => result,
                Err(e) => Err(BridgeError::Decode(format!("decode task failed: {}", e))),
            };
            let _ = tx.send(BridgeEvent::Decoded { seq, epoch, result });
        });
    }

    async fn on_decoded(&mut self, seq: u64, epoch: u64, result: Result<Vec<f32>>) {
        if self.state != SessionState::Open || epoch != self.epoch || seq < self.next_apply {
            debug!("Discarding stale decoded chunk {} (epoch {})", seq, epoch);
            return;
        }

        self.pending.insert(seq, result);

        while let Some(result) = self.pending.remove(&self.next_apply) {
            self.next_apply += 1;

            let samples = match result {
                Ok(samples) => samples,
                Err(e) => {
                    warn!("Dropping malformed audio chunk: {}", e);
                    continue;
                }
            };

            if samples.is_empty() {
                continue;
            }

            let Some(playback) = self.playback.as_mut() else {
                return;
            };

            match playback.schedule(samples) {
                Ok(_) => self.stats.audio_units_scheduled += 1,
                Err(e) => {
                    self.fail(e).await;
                    return;
                }
            }
        }
    }

    fn interrupt(&mut self) {
        self.stats.interruptions += 1;
        self.epoch += 1;

        // Everything still decoding belongs to the interrupted turn
        self.pending.clear();
        self.next_apply = self.next_seq;

        if let Some(playback) = self.playback.as_mut() {
            playback.interrupt();
        }
    }

    async fn fail(&mut self, err: BridgeError) {
        if self.state == SessionState::Closed {
            return;
        }
        error!("Session {} failed: {}", self.config.session_id, err);
        self.callbacks.on_error(&err.user_message());
        self.teardown().await;
    }

    /// Release every resource; runs once per session
    async fn teardown(&mut self) {
        if matches!(self.state, SessionState::Closing | SessionState::Closed) {
            return;
        }

        info!("Tearing down session {}", self.config.session_id);
        self.state = SessionState::Closing;
        self.publish_stats();

        for task in self.tasks.drain(..) {
            task.abort();
        }

        if let Some(mut capture) = self.capture.take() {
            if let Err(e) = capture.stop().await {
                warn!("Failed to stop capture: {}", e);
            }
        }

        if let Some(mut playback) = self.playback.take() {
            playback.close();
        }

        if let Some(mut sender) = self.sender.take() {
            sender.close();
        }

        self.transcripts.reset();
        self.pending.clear();

        self.stats.touch();
        self.state = SessionState::Closed;
        info!(
            "Session {} closed: {} frames sent, {} audio units, {} interruptions",
            self.config.session_id,
            self.stats.frames_sent,
            self.stats.audio_units_scheduled,
            self.stats.interruptions
        );

        self.callbacks.on_close();
    }

    fn publish_stats(&mut self) {
        if self.state != SessionState::Closed {
            self.stats.touch();
        }
        self.stats.state = self.state;
        self.stats_tx.send_replace(self.stats.clone());
    }
}
