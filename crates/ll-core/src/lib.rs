//! ll-core: Leaf types shared by the Loopline engine
//!
//! - Error taxonomy
//! - Tempo map (tick ↔ frame conversion)
//! - Dual tick/frame timeline positions
//! - MIDI note primitives and per-cycle event buffers
//! - Stable track identity hashing

mod error;
mod ids;
mod midi;
mod position;
mod tempo;

pub use error::*;
pub use ids::*;
pub use midi::*;
pub use position::*;
pub use tempo::*;
