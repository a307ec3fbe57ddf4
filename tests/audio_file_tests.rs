// Integration tests for WAV file input
//
// These tests write small WAV fixtures with hound and verify they load and
// replay like a live microphone.

use anyhow::Result;
use hound::{SampleFormat, WavSpec, WavWriter};
use live_audio_bridge::audio::{AudioBackend, AudioBackendConfig, AudioFile, WavFileBackend};
use live_audio_bridge::{AudioBackendFactory, AudioSource, BridgeError};
use std::path::Path;
use tempfile::TempDir;

fn write_sine(path: &Path, sample_rate: u32, channels: u16, secs: f32) -> Result<()> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let frames = (sample_rate as f32 * secs) as usize;
    for i in 0..frames {
        let t = i as f32 / sample_rate as f32;
        let value = ((t * 440.0 * std::f32::consts::TAU).sin() * 0.5 * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(value)?;
        }
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("statement.wav");
    write_sine(&path, 16000, 1, 0.5)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 1);
    assert_eq!(audio.samples.len(), 8000);
    assert!((audio.duration_seconds - 0.5).abs() < 1e-6);
    assert!(audio.path.contains("statement.wav"));

    // Samples are normalised
    assert!(audio.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
    assert!(audio.samples.iter().any(|s| s.abs() > 0.4));

    Ok(())
}

#[test]
fn test_stereo_file_duration() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("stereo.wav");
    write_sine(&path, 48000, 2, 0.25)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 24000);
    assert!((audio.duration_seconds - 0.25).abs() < 1e-6);
    Ok(())
}

#[test]
fn test_missing_file_is_refused_input() {
    let result = AudioBackendFactory::create(
        &AudioSource::File("/nonexistent/statement.wav".into()),
        AudioBackendConfig::default(),
    );

    assert!(matches!(result, Err(BridgeError::Permission(_))));
}

#[tokio::test]
async fn test_wav_backend_replays_whole_file() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("statement.wav");
    write_sine(&path, 16000, 1, 0.3)?;

    let config = AudioBackendConfig {
        buffer_duration_ms: 10,
        ..AudioBackendConfig::default()
    };
    let mut backend = WavFileBackend::open(&path, config)?;
    assert!(!backend.is_capturing());

    let mut frames = backend.start().await?;
    assert!(backend.is_capturing());

    let mut total = 0;
    let mut last_timestamp = None;
    while let Some(frame) = frames.recv().await {
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.channels, 1);
        if let Some(previous) = last_timestamp {
            assert!(frame.timestamp_ms > previous);
        }
        last_timestamp = Some(frame.timestamp_ms);
        total += frame.samples.len();
    }

    assert_eq!(total, 4800);
    assert!(!backend.is_capturing());
    backend.stop().await?;
    Ok(())
}

#[tokio::test]
async fn test_wav_backend_stop_ends_stream() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("long.wav");
    write_sine(&path, 16000, 1, 5.0)?;

    let mut backend = WavFileBackend::open(&path, AudioBackendConfig::default())?;
    let mut frames = backend.start().await?;

    assert!(frames.recv().await.is_some());
    backend.stop().await?;

    assert!(!backend.is_capturing());
    // The replay task is gone, so the channel drains and closes
    while frames.recv().await.is_some() {}
    Ok(())
}
