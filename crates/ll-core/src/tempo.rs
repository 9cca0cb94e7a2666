//! Tempo and Time Signature Map
//!
//! Tick ↔ frame conversion for the whole engine:
//! - PPQ-based musical ticks (960 per quarter note)
//! - Instant tempo changes at arbitrary tick positions
//! - Piecewise-linear tick → frame integration with a cumulative cache
//!
//! ## Time Units
//! - Frames: audio samples (absolute, sample-rate-relative)
//! - Ticks: PPQ-based musical time
//! - Bars/Beats: musical position derived from the time signature

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// CONSTANTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Pulses per quarter note (industry standard: 960)
pub const PPQ: u32 = 960;

/// Minimum tempo
pub const MIN_TEMPO: f64 = 20.0;

/// Maximum tempo
pub const MAX_TEMPO: f64 = 400.0;

// ═══════════════════════════════════════════════════════════════════════════════
// TIME SIGNATURE
// ═══════════════════════════════════════════════════════════════════════════════

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Numerator (beats per bar)
    pub numerator: u8,
    /// Denominator (note value that gets one beat)
    pub denominator: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            numerator: 4,
            denominator: 4,
        }
    }
}

impl TimeSignature {
    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Ticks per beat at this time signature
    pub fn ticks_per_beat(&self) -> u64 {
        PPQ as u64 * 4 / self.denominator as u64
    }

    /// Ticks per bar at this time signature
    pub fn ticks_per_bar(&self) -> u64 {
        self.ticks_per_beat() * self.numerator as u64
    }

    /// Ticks per sixteenth note
    pub fn ticks_per_sixteenth(&self) -> u64 {
        PPQ as u64 / 4
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPO EVENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Instant tempo change event
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TempoEvent {
    /// Position in ticks
    pub tick: u64,
    /// Tempo in BPM
    pub bpm: f64,
}

impl TempoEvent {
    pub fn new(tick: u64, bpm: f64) -> Self {
        Self {
            tick,
            bpm: bpm.clamp(MIN_TEMPO, MAX_TEMPO),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPO MAP
// ═══════════════════════════════════════════════════════════════════════════════

/// Tempo and time signature map
///
/// Conversion contract: `frames_to_ticks(ticks_to_frames(t)) ≈ t` for any
/// fixed map. Live positions cache their frame image and must be re-stamped
/// through [`TempoMap`] whenever the map or sample rate changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoMap {
    /// Tempo events, sorted by tick, first always at tick 0
    tempo_events: Vec<TempoEvent>,
    /// Time signature
    time_signature: TimeSignature,
    /// Sample rate for conversions
    sample_rate: u32,
    /// Cached: cumulative frame position (f64) at each tempo event
    #[serde(skip)]
    frame_cache: Vec<f64>,
}

impl Default for TempoMap {
    fn default() -> Self {
        Self::new(48000)
    }
}

impl TempoMap {
    pub fn new(sample_rate: u32) -> Self {
        let mut map = Self {
            tempo_events: vec![TempoEvent::new(0, 120.0)],
            time_signature: TimeSignature::default(),
            sample_rate,
            frame_cache: Vec::new(),
        };
        map.rebuild_cache();
        map
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate;
        self.rebuild_cache();
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn set_time_signature(&mut self, sig: TimeSignature) {
        self.time_signature = sig;
    }

    /// Frames per tick at the given BPM
    fn frames_per_tick_at_bpm(&self, bpm: f64) -> f64 {
        self.sample_rate as f64 * 60.0 / (bpm * PPQ as f64)
    }

    /// Frames per tick at a tick position
    pub fn frames_per_tick(&self, tick: f64) -> f64 {
        self.frames_per_tick_at_bpm(self.tempo_at_tick(tick))
    }

    /// Must be called after deserialization and after any tempo edit.
    pub fn rebuild_cache(&mut self) {
        self.frame_cache.clear();
        self.frame_cache.reserve(self.tempo_events.len());
        let mut frames = 0.0_f64;
        let mut prev: Option<&TempoEvent> = None;
        for ev in &self.tempo_events {
            if let Some(p) = prev {
                frames += (ev.tick - p.tick) as f64 * self.frames_per_tick_at_bpm(p.bpm);
            }
            self.frame_cache.push(frames);
            prev = Some(ev);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Tempo Management
    // ─────────────────────────────────────────────────────────────────────────────

    /// Get tempo at tick
    pub fn tempo_at_tick(&self, tick: f64) -> f64 {
        let idx = self
            .tempo_events
            .iter()
            .rposition(|e| e.tick as f64 <= tick)
            .unwrap_or(0);
        self.tempo_events[idx].bpm
    }

    /// Insert or replace a tempo change at tick
    pub fn set_tempo_at_tick(&mut self, tick: u64, bpm: f64) {
        match self.tempo_events.binary_search_by_key(&tick, |e| e.tick) {
            Ok(i) => self.tempo_events[i].bpm = bpm.clamp(MIN_TEMPO, MAX_TEMPO),
            Err(i) => self.tempo_events.insert(i, TempoEvent::new(tick, bpm)),
        }
        self.rebuild_cache();
    }

    /// Remove a tempo change (the event at tick 0 cannot be removed)
    pub fn remove_tempo_at_tick(&mut self, tick: u64) {
        if tick == 0 {
            return;
        }
        self.tempo_events.retain(|e| e.tick != tick);
        self.rebuild_cache();
    }

    pub fn tempo_events(&self) -> &[TempoEvent] {
        &self.tempo_events
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Conversion
    // ─────────────────────────────────────────────────────────────────────────────

    /// Convert ticks to exact (fractional) frames
    pub fn ticks_to_frames_f(&self, ticks: f64) -> f64 {
        let idx = self
            .tempo_events
            .iter()
            .rposition(|e| (e.tick as f64) <= ticks)
            .unwrap_or(0);
        let ev = &self.tempo_events[idx];
        self.frame_cache[idx] + (ticks - ev.tick as f64) * self.frames_per_tick_at_bpm(ev.bpm)
    }

    /// Convert ticks to quantized integer frames
    pub fn ticks_to_frames(&self, ticks: f64) -> i64 {
        self.ticks_to_frames_f(ticks).round() as i64
    }

    /// Convert frames to ticks
    pub fn frames_to_ticks(&self, frames: i64) -> f64 {
        let f = frames as f64;
        let idx = self
            .frame_cache
            .iter()
            .rposition(|&cache_f| cache_f <= f)
            .unwrap_or(0);
        let ev = &self.tempo_events[idx];
        ev.tick as f64 + (f - self.frame_cache[idx]) / self.frames_per_tick_at_bpm(ev.bpm)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
