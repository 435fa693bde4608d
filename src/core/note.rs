use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The twelve pitch classes, spelled with sharps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    Cs,
    D,
    Ds,
    E,
    F,
    Fs,
    G,
    Gs,
    A,
    As,
    B,
}

pub const PITCH_CLASSES: [PitchClass; 12] = [
    PitchClass::C,
    PitchClass::Cs,
    PitchClass::D,
    PitchClass::Ds,
    PitchClass::E,
    PitchClass::F,
    PitchClass::Fs,
    PitchClass::G,
    PitchClass::Gs,
    PitchClass::A,
    PitchClass::As,
    PitchClass::B,
];

const SHARP_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];
const KEY_NAMES: [&str; 12] = ["C", "Db", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B"];

impl PitchClass {
    /// Semitones above C (0-11)
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Wraps any semitone offset into a pitch class
    pub fn from_index(index: i32) -> Self {
        PITCH_CLASSES[index.rem_euclid(12) as usize]
    }

    pub fn transpose(self, semitones: i32) -> Self {
        Self::from_index(self.index() as i32 + semitones)
    }

    pub fn sharp_name(self) -> &'static str {
        SHARP_NAMES[self.index() as usize]
    }

    /// Conventional spelling of a major key on this tonic (Bb rather than A#)
    pub fn key_name(self) -> &'static str {
        KEY_NAMES[self.index() as usize]
    }

    /// Parse a spelled pitch class such as `C`, `F#`, `Bb` or `E##`.
    /// Returns the pitch class plus the number of bytes consumed.
    pub(crate) fn parse_prefix(text: &str) -> Option<(Self, usize)> {
        let mut chars = text.chars();
        let letter = Letter::from_char(chars.next()?)?;
        let mut offset = 0i32;
        let mut consumed = 1;
        for c in chars {
            match c {
                '#' | '♯' => offset += 1,
                'b' | '♭' => offset -= 1,
                _ => break,
            }
            consumed += c.len_utf8();
        }
        Some((Self::from_index(letter.natural() as i32 + offset), consumed))
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sharp_name())
    }
}

impl FromStr for PitchClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match Self::parse_prefix(s) {
            Some((pc, used)) if used == s.len() => Ok(pc),
            _ => Err(Error::InvalidNote(s.to_string())),
        }
    }
}

/// Natural note letters, used for spelling scales letter by letter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Letter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

const LETTERS: [Letter; 7] = [Letter::C, Letter::D, Letter::E, Letter::F, Letter::G, Letter::A, Letter::B];

impl Letter {
    pub(crate) fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(Letter::C),
            'D' => Some(Letter::D),
            'E' => Some(Letter::E),
            'F' => Some(Letter::F),
            'G' => Some(Letter::G),
            'A' => Some(Letter::A),
            'B' => Some(Letter::B),
            _ => None,
        }
    }

    pub fn natural(self) -> u8 {
        match self {
            Letter::C => 0,
            Letter::D => 2,
            Letter::E => 4,
            Letter::F => 5,
            Letter::G => 7,
            Letter::A => 9,
            Letter::B => 11,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Letter::C => 'C',
            Letter::D => 'D',
            Letter::E => 'E',
            Letter::F => 'F',
            Letter::G => 'G',
            Letter::A => 'A',
            Letter::B => 'B',
        }
    }

    /// The letter `steps` positions above this one, wrapping after B
    pub fn step(self, steps: usize) -> Self {
        let pos = LETTERS.iter().position(|l| *l == self).unwrap_or(0);
        LETTERS[(pos + steps) % LETTERS.len()]
    }

    /// Spell `pitch` using this letter plus however many sharps or flats it needs
    pub fn spell(self, pitch: PitchClass) -> String {
        let mut diff = (pitch.index() as i32 - self.natural() as i32).rem_euclid(12);
        if diff > 6 {
            diff -= 12;
        }
        let accidental = if diff >= 0 { "#" } else { "b" };
        let mut name = String::new();
        name.push(self.as_char());
        for _ in 0..diff.unsigned_abs() {
            name.push_str(accidental);
        }
        name
    }
}

/// A pitch in a specific octave plus a normalized velocity.
///
/// Equality and hashing only look at pitch class and octave, so the same key
/// struck at a different velocity is still the same note.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Note {
    pub pitch_class: PitchClass,
    pub octave: i8,
    pub velocity: f32,
}

pub const DEFAULT_VELOCITY: f32 = 0.8;

impl Note {
    pub fn new(pitch_class: PitchClass, octave: i8) -> Self {
        Self {
            pitch_class,
            octave,
            velocity: DEFAULT_VELOCITY,
        }
    }

    pub fn with_velocity(mut self, velocity: f32) -> Self {
        self.velocity = velocity.clamp(0.0, 1.0);
        self
    }

    /// MIDI note 60 is C4
    pub fn from_midi(number: u8) -> Self {
        let number = number as i32;
        Self::new(PitchClass::from_index(number), (number.div_euclid(12) - 1) as i8)
    }

    pub fn midi(&self) -> i32 {
        (self.octave as i32 + 1) * 12 + self.pitch_class.index() as i32
    }

    pub fn frequency(&self) -> f32 {
        440.0 * 2.0f32.powf((self.midi() as f32 - 69.0) / 12.0)
    }

    pub fn transpose(&self, semitones: i32) -> Self {
        let midi = self.midi() + semitones;
        Self {
            pitch_class: PitchClass::from_index(midi),
            octave: (midi.div_euclid(12) - 1) as i8,
            velocity: self.velocity,
        }
    }
}

impl PartialEq for Note {
    fn eq(&self, other: &Self) -> bool {
        self.pitch_class == other.pitch_class && self.octave == other.octave
    }
}

impl Eq for Note {}

impl Hash for Note {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pitch_class.hash(state);
        self.octave.hash(state);
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.pitch_class, self.octave)
    }
}

impl FromStr for Note {
    type Err = Error;

    /// Parses scientific pitch notation: `C4`, `F#3`, `Bb-1`.
    /// Flats and sharps that cross the octave boundary are normalized, so
    /// `Cb4` is `B3`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidNote(s.to_string());
        let mut chars = s.chars();
        let letter = chars.next().and_then(Letter::from_char).ok_or_else(invalid)?;

        let mut offset = 0i32;
        let mut rest = &s[letter.as_char().len_utf8()..];
        while let Some(c) = rest.chars().next() {
            match c {
                '#' | '♯' => offset += 1,
                'b' | '♭' => offset -= 1,
                _ => break,
            }
            rest = &rest[c.len_utf8()..];
        }

        let octave: i32 = rest.parse().map_err(|_| invalid())?;
        let midi = (octave + 1) * 12 + letter.natural() as i32 + offset;
        if !(0..=127).contains(&midi) {
            return Err(invalid());
        }
        Ok(Note::from_midi(midi as u8))
    }
}

/// Where a note trigger came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteSource {
    Ui,
    Midi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    On,
    Off,
}

/// Raw identifier of the thing that produced a note: an on-screen key or a
/// MIDI note number. Note-off events are matched against this, not the pitch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InputId {
    UiKey(String),
    Midi(u8),
}

/// A canonical note trigger, produced by the normalizer and never mutated
#[derive(Debug, Clone)]
pub struct NoteEvent {
    pub note: Note,
    pub velocity: f32,
    pub source: NoteSource,
    pub kind: NoteKind,
    pub input: InputId,
    pub timestamp: Instant,
}

impl NoteEvent {
    pub fn is_on(&self) -> bool {
        self.kind == NoteKind::On
    }
}
