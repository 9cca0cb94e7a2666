//! Processing cycle segments
//!
//! The audio callback hands the engine a contiguous block of frames, but a
//! transport loop wrap can land inside it. The transport splits such a
//! block into at most two segments, each time-contiguous on the timeline,
//! and the fill paths only ever see segments.

/// One time-contiguous slice of an audio processing block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTimeInfo {
    /// Timeline frame at which this segment starts
    pub start_frame: i64,
    /// Segment length in frames
    pub nframes: u32,
    /// Offset of this segment within the host buffer
    pub local_offset: u32,
}

impl CycleTimeInfo {
    pub fn new(start_frame: i64, nframes: u32, local_offset: u32) -> Self {
        Self {
            start_frame,
            nframes,
            local_offset,
        }
    }

    /// Timeline frame one past the segment (exclusive)
    pub fn end_frame(&self) -> i64 {
        self.start_frame + self.nframes as i64
    }
}
