pub mod backend;
pub mod capture;
pub mod codec;
pub mod devices;
pub mod file;
pub mod microphone;
pub mod mixer;
pub mod output;
pub mod playback;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource};
pub use capture::{CaptureProcessor, FrameChunker, LinearResampler};
pub use codec::EncodedChunk;
pub use devices::{AudioDevices, CpalDevices};
pub use file::{AudioFile, WavFileBackend};
pub use microphone::MicrophoneBackend;
pub use mixer::{PlaybackMixer, UnitId};
pub use output::{AudioSink, SpeakerSink};
pub use playback::{PlaybackScheduler, PlaybackUnit};
