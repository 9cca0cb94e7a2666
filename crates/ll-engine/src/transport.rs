//! Transport
//!
//! Control threads talk to the transport through a bounded request channel;
//! the audio thread drains it once at the top of each callback, then splits
//! the block at the transport loop point and advances the playhead. No
//! locks are held on the audio side.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use smallvec::SmallVec;

use crate::CycleTimeInfo;

const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Control-side transport commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportRequest {
    Play,
    Pause,
    /// Pause and rewind to zero
    Stop,
    /// Jump the playhead to a timeline frame
    Locate(i64),
    SetLoopEnabled(bool),
    /// Half-open loop range in timeline frames
    SetLoopRange { start: i64, end: i64 },
}

/// Cloneable control-side handle
#[derive(Clone)]
pub struct TransportHandle {
    tx: Sender<TransportRequest>,
}

impl TransportHandle {
    /// Send a request; a full queue drops it and reports false.
    pub fn send(&self, request: TransportRequest) -> bool {
        match self.tx.try_send(request) {
            Ok(()) => true,
            Err(TrySendError::Full(r)) => {
                log::warn!("transport queue full, dropping {r:?}");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn play(&self) -> bool {
        self.send(TransportRequest::Play)
    }

    pub fn pause(&self) -> bool {
        self.send(TransportRequest::Pause)
    }

    pub fn stop(&self) -> bool {
        self.send(TransportRequest::Stop)
    }

    pub fn locate(&self, frame: i64) -> bool {
        self.send(TransportRequest::Locate(frame))
    }
}

/// Audio-side transport state
pub struct Transport {
    rx: Receiver<TransportRequest>,
    playhead: i64,
    playing: bool,
    loop_enabled: bool,
    loop_start: i64,
    loop_end: i64,
}

impl Transport {
    /// Create the audio-side transport and its control handle.
    pub fn new() -> (Self, TransportHandle) {
        let (tx, rx) = bounded(REQUEST_QUEUE_CAPACITY);
        (
            Self {
                rx,
                playhead: 0,
                playing: false,
                loop_enabled: false,
                loop_start: 0,
                loop_end: 0,
            },
            TransportHandle { tx },
        )
    }

    pub fn playhead(&self) -> i64 {
        self.playhead
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn loop_range(&self) -> (i64, i64) {
        (self.loop_start, self.loop_end)
    }

    /// Drain pending requests. Call once at the top of each audio callback.
    pub fn process_requests(&mut self) {
        while let Ok(request) = self.rx.try_recv() {
            match request {
                TransportRequest::Play => self.playing = true,
                TransportRequest::Pause => self.playing = false,
                TransportRequest::Stop => {
                    self.playing = false;
                    self.playhead = 0;
                }
                TransportRequest::Locate(frame) => self.playhead = frame.max(0),
                TransportRequest::SetLoopEnabled(enabled) => self.loop_enabled = enabled,
                TransportRequest::SetLoopRange { start, end } => {
                    if start < end {
                        self.loop_start = start.max(0);
                        self.loop_end = end;
                    }
                }
            }
        }
    }

    fn loop_active(&self) -> bool {
        self.loop_enabled && self.loop_end > self.loop_start
    }

    /// Split a block at the transport loop point.
    ///
    /// At most two segments come back; the second starts at the loop start
    /// with its buffer offset after the first. A stopped transport yields
    /// no segments.
    pub fn split_cycle(&self, nframes: u32) -> SmallVec<[CycleTimeInfo; 2]> {
        let mut segments = SmallVec::new();
        if !self.playing || nframes == 0 {
            return segments;
        }
        let start = self.playhead;
        let end = start + nframes as i64;
        if self.loop_active() && start < self.loop_end && end > self.loop_end {
            let first = (self.loop_end - start) as u32;
            segments.push(CycleTimeInfo::new(start, first, 0));
            segments.push(CycleTimeInfo::new(self.loop_start, nframes - first, first));
        } else {
            segments.push(CycleTimeInfo::new(start, nframes, 0));
        }
        segments
    }

    /// Move the playhead past a processed block, wrapping at the loop end.
    pub fn advance(&mut self, nframes: u32) {
        if !self.playing {
            return;
        }
        let mut new_pos = self.playhead + nframes as i64;
        if self.loop_active() && self.playhead < self.loop_end && new_pos >= self.loop_end {
            new_pos = self.loop_start + (new_pos - self.loop_end);
        }
        self.playhead = new_pos;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
