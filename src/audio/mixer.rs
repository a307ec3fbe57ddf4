// Output mixer for scheduled playback units
//
// Units are placed on a running clock counted in source frames (24 kHz for
// synthesized speech). Rendering walks the clock forward and sums every unit
// overlapping each frame, clipping the result. Units are sequenced back to
// back so overlap only happens if a caller schedules it explicitly.

use tracing::debug;

/// Identifier of a scheduled playback unit
pub type UnitId = u64;

#[derive(Debug)]
struct MixerUnit {
    id: UnitId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl MixerUnit {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sample-accurate mixer for units scheduled on a source-rate clock
#[derive(Debug)]
pub struct PlaybackMixer {
    source_rate: u32,
    /// Read position in source frames (fractional when the device rate differs)
    position: f64,
    units: Vec<MixerUnit>,
}

impl PlaybackMixer {
    pub fn new(source_rate: u32) -> Self {
        Self {
            source_rate,
            position: 0.0,
            units: Vec::new(),
        }
    }

    /// Current clock time in seconds
    pub fn current_time(&self) -> f64 {
        self.position / self.source_rate as f64
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Place a unit at `start_time` seconds on the clock
    ///
    /// A start time already in the past is clamped to the current position.
    pub fn add(&mut self, id: UnitId, samples: Vec<f32>, start_time: f64) {
        let requested = (start_time * self.source_rate as f64).round().max(0.0) as u64;
        let start_frame = requested.max(self.position.ceil() as u64);

        debug!(
            "Mixer: unit {} at frame {} ({} samples)",
            id,
            start_frame,
            samples.len()
        );

        self.units.push(MixerUnit {
            id,
            start_frame,
            samples,
        });
    }

    /// Drop a unit immediately; returns whether it was still pending
    pub fn remove(&mut self, id: UnitId) -> bool {
        let before = self.units.len();
        self.units.retain(|u| u.id != id);
        self.units.len() != before
    }

    pub fn clear(&mut self) {
        self.units.clear();
    }

    pub fn active_units(&self) -> usize {
        self.units.len()
    }

    /// Render interleaved output for `channels` channels at `device_rate`
    ///
    /// Returns the ids of units that finished playing during this buffer.
    pub fn render(&mut self, out: &mut [f32], channels: usize, device_rate: u32) -> Vec<UnitId> {
        let channels = channels.max(1);
        let step = self.source_rate as f64 / device_rate.max(1) as f64;

        for frame in out.chunks_mut(channels) {
            let index = self.position.floor() as u64;

            let mut sum = 0.0f32;
            for unit in &self.units {
                if index >= unit.start_frame && index < unit.end_frame() {
                    sum += unit.samples[(index - unit.start_frame) as usize];
                }
            }

            let mixed = sum.clamp(-1.0, 1.0);
            for sample in frame.iter_mut() {
                *sample = mixed;
            }

            self.position += step;
        }

        let now = self.position.floor() as u64;
        let mut ended = Vec::new();
        self.units.retain(|unit| {
            if unit.end_frame() <= now {
                ended.push(unit.id);
                false
            } else {
                true
            }
        });

        ended
    }
}
