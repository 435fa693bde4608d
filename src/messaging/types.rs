use crate::core::instrument::{EffectType, InstrumentType, ParamValue};
use crate::core::note::{Note, PitchClass};

/// Everything that can happen to the pipeline, from any source
#[derive(Debug, Clone)]
pub enum PipelineMessage {
    UiKeyDown { key: String, note: Note },
    UiKeyUp { key: String, note: Note },
    /// Raw bytes from the MIDI connection with the given generation
    MidiInput { generation: u64, bytes: Vec<u8> },
    MidiDevicesChanged,
    SelectMidiDevice(String),
    /// Posted by the instrument manager whenever a note actually sounds
    NotePlayed(Note),
    PlayNote(Note),
    PlayChord(Vec<Note>),
    AddChord(String),
    AddSuggestion(usize),
    ClearProgression,
    AutoDetectKey,
    SetKey(PitchClass),
    SwitchInstrument(InstrumentType),
    SwitchEffect(EffectType),
    UpdateEffectParam(String, ParamValue),
    Shutdown,
}
