use crate::core::note::{Letter, PitchClass};
use crate::core::theory::chord::{ChordSymbol, Family};

const MAJOR_STEPS: [i32; 7] = [0, 2, 4, 5, 7, 9, 11];

const NUMERALS: [&str; 7] = ["I", "ii", "iii", "IV", "V", "vi", "vii°"];

const FUNCTIONS: [&str; 7] = [
    "Tonic",
    "Supertonic",
    "Mediant",
    "Subdominant",
    "Dominant",
    "Submediant",
    "Leading Tone",
];

/// Common functional progressions, by roman numeral
pub const PROGRESSION_LIBRARY: &[&[&str]] = &[
    &["I", "V", "vi", "IV"],
    &["vi", "IV", "I", "V"],
    &["I", "vi", "IV", "V"],
    &["ii", "V", "I"],
    &["I", "IV", "V", "I"],
    &["I", "IV", "vi", "V"],
];

/// One row of the diatonic chord table
#[derive(Debug, Clone, PartialEq)]
pub struct DiatonicChord {
    pub numeral: &'static str,
    pub function: &'static str,
    pub chord: ChordSymbol,
}

/// A progression from the library resolved in a concrete key
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProgression {
    pub numerals: &'static [&'static str],
    pub chords: Vec<ChordSymbol>,
}

/// The current tonic. The mode is always major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    tonic: PitchClass,
}

impl Default for KeyState {
    fn default() -> Self {
        Self::new(PitchClass::C)
    }
}

impl KeyState {
    pub fn new(tonic: PitchClass) -> Self {
        Self { tonic }
    }

    pub fn tonic(&self) -> PitchClass {
        self.tonic
    }

    pub fn name(&self) -> &'static str {
        self.tonic.key_name()
    }

    /// Scale degree roots, spelled letter by letter from the tonic
    pub fn scale(&self) -> Vec<(PitchClass, String)> {
        let first = self.name().chars().next().and_then(Letter::from_char).unwrap_or(Letter::C);
        MAJOR_STEPS
            .iter()
            .enumerate()
            .map(|(degree, step)| {
                let pitch = self.tonic.transpose(*step);
                (pitch, first.step(degree).spell(pitch))
            })
            .collect()
    }

    /// Resolve a roman numeral like `IV`, `vi` or `vii°` to a chord in this
    /// key. Case picks major or minor; a trailing `°` makes it diminished.
    pub fn resolve(&self, numeral: &str) -> Option<ChordSymbol> {
        let (base, diminished) = match numeral.strip_suffix('°') {
            Some(base) => (base, true),
            None => (numeral, false),
        };
        let degree = NUMERALS
            .iter()
            .position(|n| n.trim_end_matches('°').eq_ignore_ascii_case(base))?;
        let suffix = if diminished {
            "dim"
        } else if base.chars().all(|c| c.is_ascii_uppercase()) {
            ""
        } else {
            "m"
        };
        let (pitch, name) = self.scale().swap_remove(degree);
        Some(ChordSymbol::spelled(pitch, &name, suffix))
    }

    pub fn diatonic_chords(&self) -> Vec<DiatonicChord> {
        NUMERALS
            .iter()
            .zip(FUNCTIONS)
            .filter_map(|(numeral, function)| {
                self.resolve(numeral).map(|chord| DiatonicChord {
                    numeral: *numeral,
                    function,
                    chord,
                })
            })
            .collect()
    }

    pub fn common_progressions(&self) -> Vec<ResolvedProgression> {
        PROGRESSION_LIBRARY
            .iter()
            .map(|numerals| ResolvedProgression {
                numerals: *numerals,
                chords: numerals.iter().filter_map(|n| self.resolve(n)).collect(),
            })
            .collect()
    }
}

/// Major-key tonic implied by a single chord
pub fn infer_tonic(chord: &ChordSymbol) -> PitchClass {
    match chord.family() {
        Family::Major => chord.root(),
        Family::Minor => chord.root().transpose(3),
        Family::Diminished => chord.root().transpose(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(key: PitchClass) -> Vec<String> {
        KeyState::new(key).scale().into_iter().map(|(_, n)| n).collect()
    }

    #[test]
    fn test_scale_spelling() {
        assert_eq!(names(PitchClass::C), ["C", "D", "E", "F", "G", "A", "B"]);
        assert_eq!(names(PitchClass::As), ["Bb", "C", "D", "Eb", "F", "G", "A"]);
        assert_eq!(names(PitchClass::Fs), ["F#", "G#", "A#", "B", "C#", "D#", "E#"]);
    }

    #[test]
    fn test_diatonic_table() {
        let table = KeyState::new(PitchClass::G).diatonic_chords();
        let rendered: Vec<String> = table.iter().map(|d| d.chord.to_string()).collect();
        assert_eq!(rendered, ["G", "Am", "Bm", "C", "D", "Em", "F#dim"]);
        assert_eq!(table[4].function, "Dominant");
        assert_eq!(table[6].numeral, "vii°");
    }

    #[test]
    fn test_resolve_numerals() {
        let key = KeyState::new(PitchClass::F);
        assert_eq!(key.resolve("IV").unwrap().to_string(), "Bb");
        assert_eq!(key.resolve("ii").unwrap().to_string(), "Gm");
        assert!(key.resolve("VIII").is_none());
    }

    #[test]
    fn test_common_progressions_in_c() {
        let progressions = KeyState::default().common_progressions();
        assert_eq!(progressions.len(), PROGRESSION_LIBRARY.len());
        let first: Vec<String> = progressions[0].chords.iter().map(|c| c.to_string()).collect();
        assert_eq!(first, ["C", "G", "Am", "F"]);
    }

    #[test]
    fn test_infer_tonic() {
        let parse = |s: &str| s.parse::<ChordSymbol>().unwrap();
        assert_eq!(infer_tonic(&parse("G")), PitchClass::G);
        assert_eq!(infer_tonic(&parse("G7")), PitchClass::G);
        assert_eq!(infer_tonic(&parse("Am")), PitchClass::C);
        assert_eq!(infer_tonic(&parse("Bdim")), PitchClass::C);
    }
}
