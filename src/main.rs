use anyhow::{Context, Result};
use clap::Parser;
use live_audio_bridge::{
    AudioSource, BridgeCallbacks, Config, ConversationLog, CpalDevices, GeminiLiveConnector, LiveAudioBridge,
    Speaker,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "live-audio-bridge")]
#[command(about = "Voice interview with a live speech assistant")]
struct Args {
    /// Configuration file (extension optional)
    #[arg(short, long, default_value = "config/live-audio-bridge")]
    config: String,

    /// Replay a WAV file instead of using the microphone
    #[arg(short, long)]
    input_file: Option<PathBuf>,

    /// Prebuilt voice for the interviewer
    #[arg(short, long)]
    voice: Option<String>,
}

/// Prints live transcript activity and keeps the conversation
struct ConsoleCallbacks {
    log: ConversationLog,
}

impl BridgeCallbacks for ConsoleCallbacks {
    fn on_transcript_update(&self, text: &str, is_final: bool, speaker: Speaker) {
        println!("  {} … {}", speaker, text);
        self.log.on_transcript_update(text, is_final, speaker);
    }

    fn on_turn_complete(&self, speaker: Speaker) {
        self.log.on_turn_complete(speaker);
        if let Some(entry) = self.log.finalized().into_iter().rev().find(|e| e.speaker == speaker) {
            println!("{} : {}", speaker, entry.text);
        }
    }

    fn on_error(&self, message: &str) {
        eprintln!("{}", message);
        self.log.on_error(message);
    }

    fn on_close(&self) {
        info!("Session closed");
        self.log.on_close();
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "live_audio_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();

    let mut cfg = Config::load(&args.config)?;
    if args.voice.is_some() {
        cfg.service.voice = args.voice.clone();
    }

    info!("Live Audio Bridge v{}", env!("CARGO_PKG_VERSION"));
    info!("Model: {}", cfg.service.model);

    let api_key = cfg.api_key()?;

    let source = match &args.input_file {
        Some(path) => {
            info!("Input: WAV file {}", path.display());
            AudioSource::File(path.clone())
        }
        None => {
            info!("Input: microphone");
            AudioSource::Microphone
        }
    };

    let devices = Arc::new(CpalDevices::new(source, cfg.audio.output_device.clone()));
    let connector = Arc::new(GeminiLiveConnector::new(
        cfg.service.endpoint.clone(),
        api_key,
        cfg.connect_timeout(),
    ));

    let mut bridge = LiveAudioBridge::new(cfg.session_config(), devices, connector);
    let callbacks = Arc::new(ConsoleCallbacks {
        log: ConversationLog::new(),
    });

    bridge
        .start_session(callbacks.clone())
        .await
        .context("Failed to start session")?;

    info!("Session started, press Ctrl+C to stop");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Stopping session...");
        }
        result = bridge.wait_closed() => {
            result.context("Session ended abnormally")?;
        }
    }

    let stats = bridge.stop_session().await?;

    println!();
    println!("=== Conversation ===");
    println!("{}", callbacks.log.render());
    println!();
    println!("=== Session {} ===", stats.session_id);
    println!("Duration: {:.1}s", stats.duration_secs);
    println!("Frames sent: {} (dropped: {})", stats.frames_sent, stats.frames_dropped);
    println!("Audio units played: {}", stats.audio_units_scheduled);
    println!("Interruptions: {}", stats.interruptions);
    println!("Turns: {}", stats.turns_finalized);

    if !callbacks.log.errors().is_empty() {
        anyhow::bail!("Session ended with an error");
    }

    Ok(())
}
