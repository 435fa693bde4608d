pub mod analyzer;
pub mod instrument;
pub mod midi;
pub mod normalizer;
pub mod note;
pub mod synth;
pub mod theory;

pub use instrument::InstrumentManager;
pub use note::{Note, NoteEvent, PitchClass};
pub use theory::InferenceEngine;
