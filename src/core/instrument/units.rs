use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::synth::{Envelope, Waveform};
use crate::error::{Error, Result};

/// The voice-producing instruments the manager can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    Synth,
    Fm,
    Am,
    Mono,
    Poly,
    Pluck,
    Membrane,
}

pub const INSTRUMENT_TYPES: [InstrumentType; 7] = [
    InstrumentType::Synth,
    InstrumentType::Fm,
    InstrumentType::Am,
    InstrumentType::Mono,
    InstrumentType::Poly,
    InstrumentType::Pluck,
    InstrumentType::Membrane,
];

/// How a unit handles `release(note)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseMode {
    /// Tracks each sounding pitch separately
    PerNote,
    /// One voice; a release stops whatever it is playing
    SingleVoice,
    /// Notes only die out on their own
    None,
}

/// What a unit type can do, resolved once when the unit is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Separate attack and release triggers
    pub sustain: bool,
    /// Several notes in one trigger
    pub chord: bool,
    pub release: ReleaseMode,
}

/// Fixed default voice parameters for an instrument type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceParams {
    pub waveform: Waveform,
    pub envelope: Envelope,
    /// Modulator-to-carrier frequency ratio (FM/AM)
    pub harmonicity: f32,
    /// FM depth; for membranes, the starting pitch multiple of the sweep
    pub modulation_index: f32,
    /// Maximum simultaneous voices
    pub polyphony: usize,
}

impl InstrumentType {
    pub fn name(self) -> &'static str {
        match self {
            InstrumentType::Synth => "synth",
            InstrumentType::Fm => "fm",
            InstrumentType::Am => "am",
            InstrumentType::Mono => "mono",
            InstrumentType::Poly => "poly",
            InstrumentType::Pluck => "pluck",
            InstrumentType::Membrane => "membrane",
        }
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            InstrumentType::Poly => Capabilities {
                sustain: true,
                chord: true,
                release: ReleaseMode::PerNote,
            },
            InstrumentType::Pluck => Capabilities {
                sustain: false,
                chord: false,
                release: ReleaseMode::None,
            },
            _ => Capabilities {
                sustain: true,
                chord: false,
                release: ReleaseMode::SingleVoice,
            },
        }
    }

    pub fn default_params(self) -> VoiceParams {
        let base = VoiceParams {
            waveform: Waveform::Triangle,
            envelope: Envelope::default(),
            harmonicity: 1.0,
            modulation_index: 0.0,
            polyphony: 1,
        };
        match self {
            InstrumentType::Synth => base,
            InstrumentType::Fm => VoiceParams {
                waveform: Waveform::Sine,
                envelope: Envelope::new(0.01, 0.01, 1.0, 0.5),
                harmonicity: 3.0,
                modulation_index: 10.0,
                ..base
            },
            InstrumentType::Am => VoiceParams {
                waveform: Waveform::Sine,
                envelope: Envelope::new(0.01, 0.01, 1.0, 0.5),
                harmonicity: 3.0,
                ..base
            },
            InstrumentType::Mono => VoiceParams {
                waveform: Waveform::Square,
                envelope: Envelope::new(0.005, 0.1, 0.9, 1.0),
                ..base
            },
            InstrumentType::Poly => VoiceParams {
                polyphony: 32,
                ..base
            },
            InstrumentType::Pluck => VoiceParams {
                waveform: Waveform::Saw,
                envelope: Envelope::new(0.001, 1.0, 0.0, 0.05),
                ..base
            },
            InstrumentType::Membrane => VoiceParams {
                waveform: Waveform::Sine,
                envelope: Envelope::new(0.001, 0.4, 0.01, 1.4),
                modulation_index: 4.0,
                ..base
            },
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InstrumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        INSTRUMENT_TYPES
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| Error::UnknownInstrument(s.to_string()))
    }
}

/// Length of a single-shot trigger: an eighth note at 120 BPM
pub const SINGLE_SHOT: Duration = Duration::from_millis(250);

/// Length of a simultaneous chord trigger: a half note at 120 BPM
pub const CHORD_HOLD: Duration = Duration::from_millis(1000);

/// Gap between arpeggiated chord notes on units without chord support
pub const ARPEGGIO_STEP: Duration = Duration::from_millis(50);
