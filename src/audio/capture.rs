// Capture path: device buffers -> mono -> 16 kHz -> fixed-size frames -> wire encoding
//
// Device callbacks deliver arbitrary buffer sizes at the device's native rate.
// The processor keeps resampler and framing state across callbacks so that
// the session only ever sees complete frames of `frame_size` samples.

use tracing::{debug, warn};

use super::backend::AudioFrame;
use super::codec::{encode_chunk, EncodedChunk};
use crate::error::{BridgeError, Result};

/// Average interleaved channels into a mono signal
pub fn downmix_to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Streaming linear-interpolation resampler
///
/// Carries the last input sample and the fractional read position between
/// calls, so consecutive buffers join without discontinuities.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    from_rate: u32,
    to_rate: u32,
    step: f64,
    position: f64,
    last: Option<f32>,
}

impl LinearResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(BridgeError::Decode(format!(
                "invalid resampling rates: {}Hz -> {}Hz",
                from_rate, to_rate
            )));
        }

        Ok(Self {
            from_rate,
            to_rate,
            step: from_rate as f64 / to_rate as f64,
            position: 0.0,
            last: None,
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn process(&mut self, input: &[f32]) -> Vec<f32> {
        if self.from_rate == self.to_rate {
            return input.to_vec();
        }
        if input.is_empty() {
            return Vec::new();
        }

        // Virtual buffer: [last] ++ input
        let offset = usize::from(self.last.is_some());
        let len = input.len() + offset;
        let last = self.last;
        let sample = |i: usize| -> f32 {
            if i < offset {
                last.unwrap_or(0.0)
            } else {
                input[i - offset]
            }
        };

        let mut output = Vec::with_capacity((input.len() as f64 / self.step).ceil() as usize + 1);
        let mut pos = self.position;

        while pos + 1.0 < len as f64 {
            let index = pos.floor() as usize;
            let frac = (pos - index as f64) as f32;
            output.push(sample(index) * (1.0 - frac) + sample(index + 1) * frac);
            pos += self.step;
        }

        // The final input sample becomes virtual index 0 of the next call
        self.position = pos - (len - 1) as f64;
        self.last = input.last().copied();

        output
    }
}

/// Accumulates samples and cuts them into exactly `frame_size`-sample frames
#[derive(Debug, Clone)]
pub struct FrameChunker {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameChunker {
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    pub fn push(&mut self, samples: &[f32]) -> Vec<Vec<f32>> {
        self.pending.extend_from_slice(samples);

        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            frames.push(std::mem::replace(&mut self.pending, rest));
        }
        frames
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Turns raw device frames into encoded, fixed-size transmission chunks
pub struct CaptureProcessor {
    target_rate: u32,
    resampler: Option<LinearResampler>,
    chunker: FrameChunker,
}

impl CaptureProcessor {
    pub fn new(target_rate: u32, frame_size: usize) -> Self {
        Self {
            target_rate,
            resampler: None,
            chunker: FrameChunker::new(frame_size),
        }
    }

    pub fn process(&mut self, frame: AudioFrame) -> Vec<EncodedChunk> {
        let mono = downmix_to_mono(&frame.samples, frame.channels);

        // A device switching rates mid-stream restarts the resampler
        let resampler = match &mut self.resampler {
            Some(r) if r.from_rate() == frame.sample_rate => r,
            slot => {
                debug!(
                    "Capture resampler: {}Hz -> {}Hz",
                    frame.sample_rate, self.target_rate
                );
                match LinearResampler::new(frame.sample_rate, self.target_rate) {
                    Ok(resampler) => slot.insert(resampler),
                    Err(e) => {
                        warn!("Dropping capture buffer: {}", e);
                        return Vec::new();
                    }
                }
            }
        };

        let resampled = resampler.process(&mono);

        self.chunker
            .push(&resampled)
            .iter()
            .map(|samples| encode_chunk(samples, self.target_rate))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let mono = downmix_to_mono(&[0.2, 0.4, -1.0, 1.0], 2);
        assert_eq!(mono.len(), 2);
        assert!((mono[0] - 0.3).abs() < 1e-6);
        assert!(mono[1].abs() < 1e-6);
    }

    #[test]
    fn test_resampler_rejects_zero_rate() {
        assert!(matches!(LinearResampler::new(0, 24000), Err(BridgeError::Decode(_))));
        assert!(matches!(LinearResampler::new(16000, 0), Err(BridgeError::Decode(_))));
    }

    #[test]
    fn test_processor_drops_frames_without_rate() {
        let mut processor = CaptureProcessor::new(16000, 4);
        let chunks = processor.process(AudioFrame {
            samples: vec![0.1; 64],
            sample_rate: 0,
            channels: 1,
            timestamp_ms: 0,
        });
        assert!(chunks.is_empty());

        let chunks = processor.process(AudioFrame {
            samples: vec![0.1; 4],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        });
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_resampler_passthrough_at_same_rate() {
        let mut r = LinearResampler::new(16000, 16000).unwrap();
        assert_eq!(r.process(&[0.1, 0.2, 0.3]), vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_resampler_downsamples_by_three() {
        let mut r = LinearResampler::new(48000, 16000).unwrap();
        let input: Vec<f32> = (0..4800).map(|i| i as f32).collect();
        let out = r.process(&input);
        assert_eq!(out.len(), 1600);
        assert_eq!(out[1], 3.0);
    }

    #[test]
    fn test_resampler_is_continuous_across_buffers() {
        let input: Vec<f32> = (0..4410).map(|i| i as f32).collect();

        let mut whole = LinearResampler::new(44100, 16000).unwrap();
        let expected = whole.process(&input);

        let mut split = LinearResampler::new(44100, 16000).unwrap();
        let mut actual = split.process(&input[..1000]);
        actual.extend(split.process(&input[1000..]));

        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-3, "{} != {}", a, e);
        }
    }

    #[test]
    fn test_chunker_emits_exact_frames() {
        let mut chunker = FrameChunker::new(4096);
        assert!(chunker.push(&[0.0; 3000]).is_empty());

        let frames = chunker.push(&[0.0; 6000]);
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 4096));
        assert_eq!(chunker.pending_len(), 9000 - 8192);
    }

    #[test]
    fn test_processor_resamples_and_frames() {
        let mut processor = CaptureProcessor::new(16000, 4096);

        // 48 kHz stereo, 100 ms per callback -> 1600 mono samples at 16 kHz
        let mut chunks = Vec::new();
        for i in 0..3 {
            chunks.extend(processor.process(AudioFrame {
                samples: vec![0.25; 9600],
                sample_rate: 48000,
                channels: 2,
                timestamp_ms: i * 100,
            }));
        }

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].sample_count, 4096);
        assert_eq!(chunks[0].mime_type, "audio/pcm;rate=16000");
    }
}
