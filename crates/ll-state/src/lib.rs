//! ll-state: Timeline object model and its mutation protocol
//!
//! - Arranger objects (regions, notes, automation points, chords, markers)
//! - Regions with loop windows and typed children
//! - Tracks, lanes and the audio/MIDI clip pool
//! - Link-group registry with mirrored content edits
//! - Typed selections
//! - The reversible action engine and bounded undo/redo stacks

mod actions;
mod error;
mod link;
mod object;
mod pool;
mod project;
mod region;
mod selection;
mod track;
mod undo;

pub use actions::*;
pub use error::*;
pub use link::*;
pub use object::*;
pub use pool::*;
pub use project::*;
pub use region::*;
pub use selection::*;
pub use track::*;
pub use undo::*;
