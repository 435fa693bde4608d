//! Turns heterogeneous note input into canonical [`NoteEvent`]s.
//!
//! Stateless: on-screen key presses and raw MIDI channel messages both come
//! out as the same event shape.

use std::time::Instant;

use crate::core::note::{InputId, Note, NoteEvent, NoteKind, NoteSource};

const NOTE_OFF: u8 = 0x80;
const NOTE_ON: u8 = 0x90;

/// On-screen key pressed
pub fn ui_key_down(key: impl Into<String>, note: Note, velocity: f32) -> NoteEvent {
    let velocity = velocity.clamp(0.0, 1.0);
    NoteEvent {
        note: note.with_velocity(velocity),
        velocity,
        source: NoteSource::Ui,
        kind: NoteKind::On,
        input: InputId::UiKey(key.into()),
        timestamp: Instant::now(),
    }
}

/// On-screen key released
pub fn ui_key_up(key: impl Into<String>, note: Note) -> NoteEvent {
    NoteEvent {
        note: note.with_velocity(0.0),
        velocity: 0.0,
        source: NoteSource::Ui,
        kind: NoteKind::Off,
        input: InputId::UiKey(key.into()),
        timestamp: Instant::now(),
    }
}

/// Decode a raw MIDI message.
///
/// Only note-on and note-off are interpreted; note-on with velocity 0 counts
/// as note-off. Everything else, including truncated messages, yields `None`.
pub fn from_midi(message: &[u8]) -> Option<NoteEvent> {
    let [status, data1, data2] = match message {
        [s, d1, d2, ..] => [*s, *d1, *d2],
        _ => return None,
    };
    if data1 > 0x7F {
        return None;
    }

    let kind = match (status & 0xF0, data2) {
        (NOTE_ON, 0) | (NOTE_OFF, _) => NoteKind::Off,
        (NOTE_ON, _) => NoteKind::On,
        _ => return None,
    };

    let velocity = match kind {
        NoteKind::On => data2.min(127) as f32 / 127.0,
        NoteKind::Off => 0.0,
    };

    Some(NoteEvent {
        note: Note::from_midi(data1).with_velocity(velocity),
        velocity,
        source: NoteSource::Midi,
        kind,
        input: InputId::Midi(data1),
        timestamp: Instant::now(),
    })
}
