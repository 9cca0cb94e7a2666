//! ll-engine: Sample-accurate playback on top of the timeline model
//!
//! - Transport with loop-aware cycle splitting
//! - MIDI event generation through region loop windows
//! - Audio region rendering with gain, edge fades and seam de-clicking
//! - Lock-free snapshot handoff from the control thread to the audio thread
//! - A control-side project service tying edits to snapshot publication
//!
//! The audio-side entry points never allocate and never error: anything
//! unresolvable renders as silence.

mod audio_fill;
mod cycle;
mod engine;
mod midi_fill;
mod service;
mod snapshot;
mod transport;

pub use audio_fill::*;
pub use cycle::*;
pub use engine::*;
pub use midi_fill::*;
pub use service::*;
pub use snapshot::*;
pub use transport::*;
