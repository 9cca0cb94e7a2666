//! Timeline positions
//!
//! A [`Position`] carries the same point in time in two units at once:
//! musical ticks (tempo-relative, double precision) and audio frames
//! (sample-rate-relative, integer). Ticks are authoritative; the frame
//! count is a cached quantized image under the current [`TempoMap`] and is
//! re-derived whenever the map changes.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::{CoreError, CoreResult, TempoMap};

/// Tick-comparison tolerance for position equality
pub const POSITION_EPSILON: f64 = 1e-6;

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Dual tick/frame time value
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    /// Musical ticks (PPQ-based)
    pub ticks: f64,
    /// Cached frame image of `ticks` under the current tempo map
    pub frames: i64,
}

impl Position {
    pub const ZERO: Self = Self {
        ticks: 0.0,
        frames: 0,
    };

    /// Position from ticks, frame cache derived from the map.
    ///
    /// Non-finite ticks are a programmer error.
    pub fn from_ticks(ticks: f64, map: &TempoMap) -> Self {
        debug_assert!(ticks.is_finite(), "non-finite ticks: {ticks}");
        Self {
            ticks,
            frames: map.ticks_to_frames(ticks),
        }
    }

    /// Position from frames, ticks derived from the map.
    pub fn from_frames(frames: i64, map: &TempoMap) -> Self {
        Self {
            ticks: map.frames_to_ticks(frames),
            frames,
        }
    }

    /// Check the position is usable (finite ticks, non-negative).
    pub fn validate(&self) -> CoreResult<()> {
        if !self.ticks.is_finite() {
            return Err(CoreError::InvalidPosition(format!(
                "non-finite ticks: {}",
                self.ticks
            )));
        }
        if self.ticks < -POSITION_EPSILON {
            return Err(CoreError::InvalidPosition(format!(
                "negative ticks: {}",
                self.ticks
            )));
        }
        Ok(())
    }

    /// Re-derive the frame cache after a tempo map change.
    pub fn update_frames(&mut self, map: &TempoMap) {
        self.frames = map.ticks_to_frames(self.ticks);
    }

    /// Add a (possibly negative) tick delta, keeping the frame cache in sync.
    pub fn add_ticks(&mut self, delta: f64, map: &TempoMap) {
        debug_assert!(delta.is_finite(), "non-finite tick delta: {delta}");
        self.ticks += delta;
        self.update_frames(map);
    }

    /// Add a (possibly negative) frame delta, re-deriving ticks.
    pub fn add_frames(&mut self, delta: i64, map: &TempoMap) {
        self.frames += delta;
        self.ticks = map.frames_to_ticks(self.frames);
    }

    /// Add whole bars at the map's time signature.
    pub fn add_bars(&mut self, bars: i32, map: &TempoMap) {
        let ticks = map.time_signature().ticks_per_bar() as f64 * bars as f64;
        self.add_ticks(ticks, map);
    }

    /// Add whole beats at the map's time signature.
    pub fn add_beats(&mut self, beats: i32, map: &TempoMap) {
        let ticks = map.time_signature().ticks_per_beat() as f64 * beats as f64;
        self.add_ticks(ticks, map);
    }

    /// Half-open containment check `[start, end)` on ticks.
    pub fn is_between_excl_end(&self, start: &Position, end: &Position) -> bool {
        self.ticks >= start.ticks - POSITION_EPSILON && self.ticks < end.ticks - POSITION_EPSILON
    }

    pub fn min(a: Position, b: Position) -> Position {
        if a <= b { a } else { b }
    }

    pub fn max(a: Position, b: Position) -> Position {
        if a >= b { a } else { b }
    }

    /// Convert to a bar/beat/sixteenth/tick quadruple (all 1-indexed except
    /// the tick remainder).
    pub fn to_bbst(&self, map: &TempoMap) -> Bbst {
        let sig = map.time_signature();
        let tpb = sig.ticks_per_bar() as f64;
        let tpbeat = sig.ticks_per_beat() as f64;
        let tps = sig.ticks_per_sixteenth() as f64;

        let total = self.ticks.max(0.0);
        let bar = (total / tpb).floor();
        let rem = total - bar * tpb;
        let beat = (rem / tpbeat).floor();
        let rem = rem - beat * tpbeat;
        let sixteenth = (rem / tps).floor();
        let tick = rem - sixteenth * tps;

        Bbst {
            bar: bar as i32 + 1,
            beat: beat as i32 + 1,
            sixteenth: sixteenth as i32 + 1,
            tick,
        }
    }

    /// Position from a bar/beat/sixteenth/tick quadruple.
    pub fn from_bbst(bbst: Bbst, map: &TempoMap) -> Self {
        let sig = map.time_signature();
        let ticks = (bbst.bar - 1) as f64 * sig.ticks_per_bar() as f64
            + (bbst.beat - 1) as f64 * sig.ticks_per_beat() as f64
            + (bbst.sixteenth - 1) as f64 * sig.ticks_per_sixteenth() as f64
            + bbst.tick;
        Self::from_ticks(ticks, map)
    }

    /// Position at the start of a 1-indexed bar.
    pub fn from_bar(bar: i32, map: &TempoMap) -> Self {
        Self::from_bbst(Bbst::bar(bar), map)
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        (self.ticks - other.ticks).abs() < POSITION_EPSILON
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            Some(Ordering::Equal)
        } else {
            self.ticks.partial_cmp(&other.ticks)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BAR/BEAT/SIXTEENTH/TICK
// ═══════════════════════════════════════════════════════════════════════════════

/// Musical position quadruple (bar.beat.sixteenth.tick, 1-indexed)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbst {
    pub bar: i32,
    pub beat: i32,
    pub sixteenth: i32,
    pub tick: f64,
}

impl Bbst {
    pub fn new(bar: i32, beat: i32, sixteenth: i32, tick: f64) -> Self {
        Self {
            bar,
            beat,
            sixteenth,
            tick,
        }
    }

    /// Start of a bar
    pub fn bar(bar: i32) -> Self {
        Self::new(bar, 1, 1, 0.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_frame_round_trip() {
        let map = TempoMap::new(48000);
        for &ticks in &[0.0, 1.0, 480.5, 960.0, 12345.678] {
            let pos = Position::from_ticks(ticks, &map);
            let back = map.frames_to_ticks(pos.frames);
            // integer frame quantization costs at most half a frame
            let tol = 0.5 / map.frames_per_tick(ticks) + 1e-9;
            assert!(
                (back - ticks).abs() <= tol,
                "round trip for {ticks} gave {back}"
            );
        }
    }

    #[test]
    fn test_epsilon_equality() {
        let map = TempoMap::new(48000);
        let a = Position::from_ticks(960.0, &map);
        let b = Position::from_ticks(960.0 + POSITION_EPSILON / 2.0, &map);
        let c = Position::from_ticks(961.0, &map);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
    }

    #[test]
    fn test_add_ticks_keeps_frames_in_sync() {
        let map = TempoMap::new(48000);
        let mut pos = Position::from_ticks(0.0, &map);
        pos.add_ticks(960.0, &map);
        assert_eq!(pos.frames, 24000);
        pos.add_frames(-24000, &map);
        assert!((pos.ticks - 0.0).abs() < 1e-6);
    }

    #[test]
    fn test_bbst_round_trip() {
        let map = TempoMap::new(48000);
        let bbst = Bbst::new(3, 2, 4, 120.0);
        let pos = Position::from_bbst(bbst, &map);
        let back = pos.to_bbst(&map);
        assert_eq!(back.bar, 3);
        assert_eq!(back.beat, 2);
        assert_eq!(back.sixteenth, 4);
        assert!((back.tick - 120.0).abs() < 1e-6);
    }

    #[test]
    fn test_bar_positions() {
        let map = TempoMap::new(48000);
        // 4/4 at 120 BPM: one bar = 3840 ticks = 2s = 96000 frames
        let bar2 = Position::from_bar(2, &map);
        assert!((bar2.ticks - 3840.0).abs() < 1e-9);
        assert_eq!(bar2.frames, 96000);
    }

    #[test]
    fn test_validate() {
        let map = TempoMap::new(48000);
        assert!(Position::from_ticks(10.0, &map).validate().is_ok());
        let bad = Position {
            ticks: f64::NAN,
            frames: 0,
        };
        assert!(bad.validate().is_err());
        let neg = Position {
            ticks: -5.0,
            frames: -100,
        };
        assert!(neg.validate().is_err());
    }

    #[test]
    fn test_update_frames_after_tempo_change() {
        let mut map = TempoMap::new(48000);
        let mut pos = Position::from_ticks(960.0, &map);
        assert_eq!(pos.frames, 24000);
        map.set_tempo_at_tick(0, 60.0);
        pos.update_frames(&map);
        assert_eq!(pos.frames, 48000);
    }
}
