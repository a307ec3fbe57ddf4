//! Gapless playback scheduling with barge-in
//!
//! Each decoded unit starts at `max(next_start_time, sink clock)` and pushes
//! `next_start_time` forward by its duration, so units that arrive as separate
//! network messages play back to back. An interruption stops every live unit
//! and rewinds `next_start_time` to zero.

use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use super::mixer::UnitId;
use super::output::AudioSink;
use crate::error::Result;

/// A unit handed to the sink
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackUnit {
    pub id: UnitId,
    /// Start time on the sink clock, in seconds
    pub start_time: f64,
    /// Duration in seconds
    pub duration: f64,
}

impl PlaybackUnit {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

pub struct PlaybackScheduler {
    sink: Box<dyn AudioSink>,
    sample_rate: u32,
    next_start_time: f64,
    live: BTreeMap<UnitId, PlaybackUnit>,
    next_id: UnitId,
    closed: bool,
}

impl PlaybackScheduler {
    pub fn new(sink: Box<dyn AudioSink>) -> Self {
        let sample_rate = sink.sample_rate();
        Self {
            sink,
            sample_rate,
            next_start_time: 0.0,
            live: BTreeMap::new(),
            next_id: 0,
            closed: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn live_units(&self) -> impl Iterator<Item = &PlaybackUnit> {
        self.live.values()
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Schedule decoded samples right after the previously scheduled unit
    pub fn schedule(&mut self, samples: Vec<f32>) -> Result<PlaybackUnit> {
        let duration = samples.len() as f64 / self.sample_rate.max(1) as f64;
        let start_time = self.next_start_time.max(self.sink.current_time());

        let id = self.next_id;
        self.next_id += 1;

        self.sink.schedule(id, samples, start_time)?;

        let unit = PlaybackUnit {
            id,
            start_time,
            duration,
        };
        self.next_start_time = unit.end_time();
        self.live.insert(id, unit);

        debug!(
            "Scheduled unit {} at {:.3}s for {:.3}s ({} live)",
            id,
            start_time,
            duration,
            self.live.len()
        );

        Ok(unit)
    }

    /// The sink reported that a unit finished naturally
    pub fn on_unit_ended(&mut self, id: UnitId) -> bool {
        let removed = self.live.remove(&id).is_some();
        if !removed {
            debug!("Ignoring end of unknown or stopped unit {}", id);
        }
        removed
    }

    /// Barge-in: stop everything in flight and restart the clock
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.live.len();
        for id in self.live.keys() {
            self.sink.stop(*id);
        }
        self.live.clear();
        self.next_start_time = 0.0;

        info!("Playback interrupted: {} unit(s) stopped", stopped);
        stopped
    }

    /// Stop all playback and release the sink
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if !self.live.is_empty() {
            self.interrupt();
        }
        self.sink.close();
        self.closed = true;
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        if !self.closed {
            warn!("Playback scheduler dropped without close");
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recorded {
        now: f64,
        scheduled: Vec<(UnitId, usize, f64)>,
        stopped: Vec<UnitId>,
        closed: bool,
    }

    struct ManualSink(Arc<Mutex<Recorded>>);

    impl AudioSink for ManualSink {
        fn current_time(&self) -> f64 {
            self.0.lock().unwrap().now
        }
        fn sample_rate(&self) -> u32 {
            24000
        }
        fn schedule(&mut self, id: UnitId, samples: Vec<f32>, start_time: f64) -> Result<()> {
            self.0.lock().unwrap().scheduled.push((id, samples.len(), start_time));
            Ok(())
        }
        fn stop(&mut self, id: UnitId) {
            self.0.lock().unwrap().stopped.push(id);
        }
        fn close(&mut self) {
            self.0.lock().unwrap().closed = true;
        }
    }

    fn scheduler() -> (PlaybackScheduler, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        let sink = ManualSink(Arc::clone(&recorded));
        (PlaybackScheduler::new(Box::new(sink)), recorded)
    }

    fn secs(s: f64) -> Vec<f32> {
        vec![0.0; (s * 24000.0) as usize]
    }

    #[test]
    fn test_units_are_gapless() {
        let (mut s, _) = scheduler();
        let durations = [0.5, 1.25, 0.75, 2.0];

        let mut expected_start = 0.0;
        for d in durations {
            let unit = s.schedule(secs(d)).unwrap();
            assert!((unit.start_time - expected_start).abs() < 1e-9);
            assert!((unit.duration - d).abs() < 1e-9);
            expected_start += d;
        }

        let units: Vec<_> = s.live_units().copied().collect();
        for pair in units.windows(2) {
            assert!(pair[0].end_time() <= pair[1].start_time + 1e-9);
        }
        assert!((s.next_start_time() - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_never_schedules_in_the_past() {
        let (mut s, recorded) = scheduler();
        s.schedule(secs(1.0)).unwrap();

        recorded.lock().unwrap().now = 3.0;
        let unit = s.schedule(secs(1.0)).unwrap();
        assert_eq!(unit.start_time, 3.0);
        assert_eq!(s.next_start_time(), 4.0);
    }

    #[test]
    fn test_natural_end_removes_from_live_set() {
        let (mut s, _) = scheduler();
        let a = s.schedule(secs(0.5)).unwrap();
        let b = s.schedule(secs(0.5)).unwrap();

        assert!(s.on_unit_ended(a.id));
        assert!(!s.on_unit_ended(a.id));
        assert_eq!(s.live_count(), 1);
        assert_eq!(s.live_units().next().map(|u| u.id), Some(b.id));
    }

    #[test]
    fn test_interrupt_stops_all_and_resets_clock() {
        let (mut s, recorded) = scheduler();
        let first = s.schedule(secs(2.0)).unwrap();
        let second = s.schedule(secs(3.0)).unwrap();
        assert_eq!(second.start_time, 2.0);

        recorded.lock().unwrap().now = 1.0;
        assert_eq!(s.interrupt(), 2);

        assert_eq!(s.live_count(), 0);
        assert_eq!(s.next_start_time(), 0.0);
        assert_eq!(recorded.lock().unwrap().stopped, vec![first.id, second.id]);

        // Next unit starts at the current clock, not after the stale offset
        let next = s.schedule(secs(1.0)).unwrap();
        assert_eq!(next.start_time, 1.0);
    }

    #[test]
    fn test_close_releases_sink_once() {
        let (mut s, recorded) = scheduler();
        s.schedule(secs(1.0)).unwrap();
        s.close();
        s.close();

        let r = recorded.lock().unwrap();
        assert!(r.closed);
        assert_eq!(r.stopped.len(), 1);
    }
}
