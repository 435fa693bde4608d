use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::core::note::{Note, PitchClass};
use crate::error::{Error, Result};

/// Which major key a chord most naturally implies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Major,
    Minor,
    Diminished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordQuality {
    pub suffix: &'static str,
    /// Semitones above the root, root included
    pub intervals: &'static [u8],
    pub family: Family,
}

const fn quality(suffix: &'static str, intervals: &'static [u8], family: Family) -> ChordQuality {
    ChordQuality {
        suffix,
        intervals,
        family,
    }
}

/// Detection templates in preference order
pub const CHORD_QUALITIES: &[ChordQuality] = &[
    quality("", &[0, 4, 7], Family::Major),
    quality("m", &[0, 3, 7], Family::Minor),
    quality("dim", &[0, 3, 6], Family::Diminished),
    quality("aug", &[0, 4, 8], Family::Major),
    quality("sus2", &[0, 2, 7], Family::Major),
    quality("sus4", &[0, 5, 7], Family::Major),
    quality("5", &[0, 7], Family::Major),
    quality("6", &[0, 4, 7, 9], Family::Major),
    quality("m6", &[0, 3, 7, 9], Family::Minor),
    quality("7", &[0, 4, 7, 10], Family::Major),
    quality("maj7", &[0, 4, 7, 11], Family::Major),
    quality("m7", &[0, 3, 7, 10], Family::Minor),
    quality("m7b5", &[0, 3, 6, 10], Family::Diminished),
    quality("dim7", &[0, 3, 6, 9], Family::Diminished),
    quality("add9", &[0, 2, 4, 7], Family::Major),
    quality("9", &[0, 2, 4, 7, 10], Family::Major),
];

impl ChordQuality {
    pub fn lookup(suffix: &str) -> Option<&'static ChordQuality> {
        CHORD_QUALITIES.iter().find(|q| q.suffix == suffix)
    }

    fn mask(&self, root: PitchClass) -> u16 {
        self.intervals
            .iter()
            .fold(0, |mask, i| mask | 1 << root.transpose(*i as i32).index())
    }
}

/// A chord name such as `C`, `F#m7` or `Bbmaj7`.
///
/// The root keeps the spelling it was written with for display, but two
/// symbols are equal when root pitch class and suffix match, so `A#m`
/// equals `Bbm`.
#[derive(Debug, Clone)]
pub struct ChordSymbol {
    root: PitchClass,
    root_name: String,
    suffix: String,
}

impl ChordSymbol {
    /// Root spelled with sharps
    pub fn new(root: PitchClass, suffix: &str) -> Self {
        Self::spelled(root, root.sharp_name(), suffix)
    }

    pub fn spelled(root: PitchClass, root_name: &str, suffix: &str) -> Self {
        Self {
            root,
            root_name: root_name.to_string(),
            suffix: suffix.to_string(),
        }
    }

    pub fn root(&self) -> PitchClass {
        self.root
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// `None` for suffixes outside the template table
    pub fn quality(&self) -> Option<&'static ChordQuality> {
        ChordQuality::lookup(&self.suffix)
    }

    /// Unknown suffixes count as major-family
    pub fn family(&self) -> Family {
        self.quality().map_or(Family::Major, |q| q.family)
    }

    /// Close voicing with the root in `octave`
    pub fn voicing(&self, octave: i8) -> Option<Vec<Note>> {
        let root = Note::new(self.root, octave);
        self.quality()
            .map(|q| q.intervals.iter().map(|i| root.transpose(*i as i32)).collect())
    }
}

impl PartialEq for ChordSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root && self.suffix == other.suffix
    }
}

impl Eq for ChordSymbol {}

impl Hash for ChordSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.hash(state);
        self.suffix.hash(state);
    }
}

impl fmt::Display for ChordSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.root_name, self.suffix)
    }
}

impl FromStr for ChordSymbol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidChordSymbol(s.to_string());
        let (root, used) = PitchClass::parse_prefix(s).ok_or_else(invalid)?;
        let (root_name, suffix) = s.split_at(used);
        if suffix.chars().any(char::is_whitespace) {
            return Err(invalid());
        }
        let suffix = match suffix {
            "maj" | "M" => "",
            "min" | "-" => "m",
            "M7" => "maj7",
            "min7" | "-7" => "m7",
            other => other,
        };
        let mut root_name = root_name.to_string();
        if let Some(first) = root_name.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        Ok(Self::spelled(root, &root_name, suffix))
    }
}

/// Chords whose pitch-class set is exactly the set spanned by `notes`.
///
/// Best match first: a root equal to the lowest note wins, then template
/// order. Empty when fewer than two pitch classes are present.
pub fn detect(notes: &[Note]) -> Vec<ChordSymbol> {
    let set = notes.iter().fold(0u16, |mask, n| mask | 1 << n.pitch_class.index());
    if set.count_ones() < 2 {
        return Vec::new();
    }
    let bass = notes.iter().min_by_key(|n| n.midi()).map(|n| n.pitch_class);

    let mut matches: Vec<(bool, usize, PitchClass)> = Vec::new();
    for (order, quality) in CHORD_QUALITIES.iter().enumerate() {
        for root in crate::core::note::PITCH_CLASSES {
            if set & (1 << root.index()) != 0 && quality.mask(root) == set {
                matches.push((Some(root) != bass, order, root));
            }
        }
    }
    matches.sort();
    matches
        .into_iter()
        .map(|(_, order, root)| ChordSymbol::new(root, CHORD_QUALITIES[order].suffix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notes(names: &[&str]) -> Vec<Note> {
        names.iter().map(|n| n.parse().unwrap()).collect()
    }

    fn chord(s: &str) -> ChordSymbol {
        s.parse().unwrap()
    }

    #[test]
    fn test_c_major_triad() {
        let found = detect(&notes(&["C4", "E4", "G4"]));
        assert_eq!(found[0], chord("C"));
        assert_eq!(found[0].to_string(), "C");
    }

    #[test]
    fn test_inversion_still_names_root() {
        let found = detect(&notes(&["E4", "G4", "C5"]));
        assert_eq!(found, vec![chord("C")]);
    }

    #[test]
    fn test_bass_breaks_ties() {
        // C6 and Am7 share a pitch-class set
        let found = detect(&notes(&["A3", "C4", "E4", "G4"]));
        assert_eq!(found[0], chord("Am7"));
        assert_eq!(found[1], chord("C6"));

        let found = detect(&notes(&["C4", "E4", "G4", "A4"]));
        assert_eq!(found[0], chord("C6"));
    }

    #[test]
    fn test_no_match_or_too_few_notes() {
        assert!(detect(&notes(&["C4", "C5"])).is_empty());
        assert!(detect(&notes(&["C4", "C#4", "D4"])).is_empty());
        assert!(detect(&[]).is_empty());
    }

    #[test]
    fn test_power_chord_from_two_notes() {
        assert_eq!(detect(&notes(&["G3", "D4"]))[0], chord("G5"));
    }

    #[test]
    fn test_enharmonic_equality() {
        assert_eq!(chord("A#m"), chord("Bbm"));
        assert_ne!(chord("A#m"), chord("A#"));
        assert_eq!(chord("Bbm").to_string(), "Bbm");
        assert_eq!(chord("bbm").to_string(), "Bbm");
    }

    #[test]
    fn test_parse_aliases_and_errors() {
        assert_eq!(chord("Cmaj").suffix(), "");
        assert_eq!(chord("Dmin").suffix(), "m");
        assert_eq!(chord("FM7").suffix(), "maj7");
        assert!("H7".parse::<ChordSymbol>().is_err());
        assert!("".parse::<ChordSymbol>().is_err());
        assert!("C m".parse::<ChordSymbol>().is_err());
    }

    #[test]
    fn test_voicing() {
        let v = chord("Am").voicing(4).unwrap();
        assert_eq!(v, notes(&["A4", "C5", "E5"]));
        assert!(chord("Cwhatever").voicing(4).is_none());
        assert_eq!(chord("Cwhatever").family(), Family::Major);
        assert_eq!(chord("Bm7b5").family(), Family::Diminished);
    }
}
