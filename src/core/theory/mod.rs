//! Chord and key inference.
//!
//! The engine keeps a short window of recently played notes, detects the
//! chord they form, records distinct consecutive chords into a bounded
//! progression and suggests what could come next in the current key.

pub mod chord;
pub mod key;

pub use chord::{detect, ChordQuality, ChordSymbol, Family, CHORD_QUALITIES};
pub use key::{infer_tonic, DiatonicChord, KeyState, ResolvedProgression, PROGRESSION_LIBRARY};

use std::collections::VecDeque;

use crate::core::note::{Note, NoteEvent, PitchClass};
use crate::error::Result;

pub const NOTE_WINDOW: usize = 6;
pub const PROGRESSION_LEN: usize = 8;
pub const MAX_SUGGESTIONS: usize = 6;
/// Progression length required before the key can be auto-detected
pub const MIN_CHORDS_FOR_KEY: usize = 3;

/// Chord qualities offered on every scale degree
const SUGGESTION_VARIANTS: [&str; 4] = ["", "m", "7", "maj7"];

#[derive(Debug)]
pub struct InferenceEngine {
    window: VecDeque<Note>,
    current_chord: Option<ChordSymbol>,
    progression: VecDeque<ChordSymbol>,
    key: KeyState,
    suggestions: Vec<ChordSymbol>,
}

impl Default for InferenceEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine {
    pub fn new() -> Self {
        Self::with_key(PitchClass::C)
    }

    /// Start in `tonic` major with the key's own chords as suggestions
    pub fn with_key(tonic: PitchClass) -> Self {
        let mut engine = Self {
            window: VecDeque::new(),
            current_chord: None,
            progression: VecDeque::new(),
            key: KeyState::new(tonic),
            suggestions: Vec::new(),
        };
        engine.recompute_suggestions();
        engine
    }

    /// Feed a normalized event; note-offs are ignored
    pub fn on_note_event(&mut self, event: &NoteEvent) -> bool {
        event.is_on() && self.on_note_played(event.note)
    }

    /// Push a sounding note and run detection. Returns true when the
    /// progression grew.
    pub fn on_note_played(&mut self, note: Note) -> bool {
        if self.window.len() == NOTE_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(note);

        let notes: Vec<Note> = self.window.iter().copied().collect();
        match detect(&notes).into_iter().next() {
            Some(chord) => {
                log::debug!("Detected {} from {} notes", chord, notes.len());
                self.current_chord = Some(chord.clone());
                self.push_chord(chord)
            }
            None => false,
        }
    }

    /// Append a user-written chord, bypassing detection
    pub fn add_chord(&mut self, symbol: &str) -> Result<bool> {
        let chord: ChordSymbol = symbol.parse()?;
        Ok(self.push_chord(chord))
    }

    /// Append unless it repeats the last entry; oldest entries fall off
    pub fn push_chord(&mut self, chord: ChordSymbol) -> bool {
        if self.progression.back() == Some(&chord) {
            return false;
        }
        if self.progression.len() == PROGRESSION_LEN {
            self.progression.pop_front();
        }
        self.progression.push_back(chord);
        self.recompute_suggestions();
        true
    }

    /// Set the key from the first chord of the progression. Needs at least
    /// `MIN_CHORDS_FOR_KEY` chords; otherwise nothing changes.
    pub fn auto_detect_key(&mut self) -> bool {
        if self.progression.len() < MIN_CHORDS_FOR_KEY {
            log::debug!("Key detection needs {} chords, have {}", MIN_CHORDS_FOR_KEY, self.progression.len());
            return false;
        }
        let Some(first) = self.progression.front() else {
            return false;
        };
        let tonic = infer_tonic(first);
        log::info!("Key detected from {}: {}", first, tonic.key_name());
        self.set_key(tonic);
        true
    }

    pub fn set_key(&mut self, tonic: PitchClass) {
        self.key = KeyState::new(tonic);
        self.recompute_suggestions();
    }

    /// Forget the progression and suggestions; the key and note window stay
    pub fn clear(&mut self) {
        self.progression.clear();
        self.suggestions.clear();
    }

    /// With an empty progression nothing is excluded
    fn recompute_suggestions(&mut self) {
        self.suggestions.clear();
        let last = self.progression.back();

        let scale_variants = self.key.scale().into_iter().flat_map(|(pitch, name)| {
            SUGGESTION_VARIANTS
                .iter()
                .map(move |suffix| ChordSymbol::spelled(pitch, &name, suffix))
        });
        let library = self
            .key
            .common_progressions()
            .into_iter()
            .flat_map(|p| p.chords);

        for chord in scale_variants.chain(library) {
            if self.suggestions.len() == MAX_SUGGESTIONS {
                break;
            }
            if last != Some(&chord) && !self.suggestions.contains(&chord) {
                self.suggestions.push(chord);
            }
        }
    }

    pub fn note_window(&self) -> Vec<Note> {
        self.window.iter().copied().collect()
    }

    pub fn current_chord(&self) -> Option<&ChordSymbol> {
        self.current_chord.as_ref()
    }

    pub fn progression(&self) -> Vec<ChordSymbol> {
        self.progression.iter().cloned().collect()
    }

    pub fn key(&self) -> KeyState {
        self.key
    }

    pub fn suggestions(&self) -> &[ChordSymbol] {
        &self.suggestions
    }

    pub fn diatonic_chords(&self) -> Vec<DiatonicChord> {
        self.key.diatonic_chords()
    }

    pub fn common_progressions(&self) -> Vec<ResolvedProgression> {
        self.key.common_progressions()
    }
}
