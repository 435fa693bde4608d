use std::f32::consts::PI;
use std::time::Duration;

use crate::core::instrument::{InstrumentType, VoiceParams};
use crate::core::note::Note;
use crate::core::synth::envelope::EnvelopeState;

/// Headroom so a handful of voices doesn't clip
const VOICE_GAIN: f32 = 0.25;

/// One sounding note inside a voice unit
#[derive(Debug, Clone)]
pub struct Voice {
    pub note: Note,
    frequency: f32,
    velocity: f32,
    phase: f32,
    mod_phase: f32,
    age: f32,
    /// Seconds until an automatic release, for attack-release triggers
    hold: Option<f32>,
    envelope: EnvelopeState,
}

impl Voice {
    fn new(note: Note, velocity: f32, hold: Option<f32>) -> Self {
        Self {
            note,
            frequency: note.frequency(),
            velocity,
            phase: 0.0,
            mod_phase: 0.0,
            age: 0.0,
            hold,
            envelope: EnvelopeState::triggered(),
        }
    }

    pub fn is_releasing(&self) -> bool {
        self.envelope.is_releasing()
    }
}

/// The sound source for one instrument type: a bank of voices sharing
/// the type's fixed parameters.
pub struct VoiceUnit {
    kind: InstrumentType,
    params: VoiceParams,
    voices: Vec<Voice>,
}

impl VoiceUnit {
    pub fn new(kind: InstrumentType, params: VoiceParams) -> Self {
        Self {
            kind,
            params,
            voices: Vec::with_capacity(params.polyphony),
        }
    }

    pub fn kind(&self) -> InstrumentType {
        self.kind
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn attack(&mut self, notes: &[Note], velocity: f32, hold: Option<Duration>) {
        let hold = hold.map(|d| d.as_secs_f32());
        for note in notes {
            if self.params.polyphony <= 1 {
                // Single voice: the new pitch takes over
                self.voices.clear();
            } else if self.voices.len() >= self.params.polyphony {
                self.voices.remove(0);
            }
            self.voices.push(Voice::new(*note, velocity, hold));
        }
    }

    /// Release matching voices; an empty slice releases everything
    pub fn release(&mut self, notes: &[Note]) {
        for voice in &mut self.voices {
            if notes.is_empty() || notes.contains(&voice.note) {
                voice.envelope.release();
            }
        }
    }

    pub fn release_all(&mut self) {
        self.release(&[]);
    }

    /// Add this unit's output into `out`
    pub fn render(&mut self, out: &mut [f32], sample_rate: f32) {
        let dt = 1.0 / sample_rate;
        let kind = self.kind;
        let params = self.params;

        for voice in &mut self.voices {
            for sample in out.iter_mut() {
                if let Some(hold) = voice.hold.as_mut() {
                    *hold -= dt;
                    if *hold <= 0.0 {
                        voice.hold = None;
                        voice.envelope.release();
                    }
                }
                let level = voice.envelope.advance(&params.envelope, dt);
                if voice.envelope.is_idle() {
                    break;
                }
                let value = oscillate(kind, &params, voice, sample_rate);
                *sample += value * level * voice.velocity * VOICE_GAIN;
                voice.age += dt;
            }
        }

        self.voices.retain(|voice| !voice.envelope.is_idle());
    }
}

fn oscillate(kind: InstrumentType, params: &VoiceParams, voice: &mut Voice, sample_rate: f32) -> f32 {
    let mut frequency = voice.frequency;
    if kind == InstrumentType::Membrane {
        // Pitch drops from a multiple of the note down to the note itself
        let sweep = (-voice.age / 0.02).exp();
        frequency *= 1.0 + (params.modulation_index - 1.0).max(0.0) * sweep;
    }

    let modulator_freq = frequency * params.harmonicity;
    voice.mod_phase = (voice.mod_phase + modulator_freq / sample_rate) % 1.0;
    let modulator = (2.0 * PI * voice.mod_phase).sin();

    let value = match kind {
        InstrumentType::Fm => (2.0 * PI * voice.phase + params.modulation_index * modulator).sin(),
        InstrumentType::Am => params.waveform.sample(voice.phase) * (0.5 + 0.5 * modulator),
        _ => params.waveform.sample(voice.phase),
    };

    voice.phase = (voice.phase + frequency / sample_rate) % 1.0;
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::note::PitchClass;

    const SR: f32 = 48000.0;

    fn unit(kind: InstrumentType) -> VoiceUnit {
        VoiceUnit::new(kind, kind.default_params())
    }

    #[test]
    fn test_mono_keeps_one_voice() {
        let mut mono = unit(InstrumentType::Mono);
        mono.attack(&[Note::new(PitchClass::C, 4)], 0.8, None);
        mono.attack(&[Note::new(PitchClass::E, 4)], 0.8, None);
        assert_eq!(mono.voices().len(), 1);
        assert_eq!(mono.voices()[0].note, Note::new(PitchClass::E, 4));
    }

    #[test]
    fn test_poly_releases_per_note() {
        let mut poly = unit(InstrumentType::Poly);
        let c = Note::new(PitchClass::C, 4);
        let e = Note::new(PitchClass::E, 4);
        poly.attack(&[c, e], 0.8, None);
        poly.release(&[c]);
        assert!(poly.voices()[0].is_releasing());
        assert!(!poly.voices()[1].is_releasing());
    }

    #[test]
    fn test_render_produces_sound_then_dies_out() {
        let mut synth = unit(InstrumentType::Synth);
        synth.attack(&[Note::new(PitchClass::A, 4)], 1.0, Some(Duration::from_millis(10)));
        let mut out = vec![0.0; 2048];
        synth.render(&mut out, SR);
        assert!(out.iter().any(|s| s.abs() > 0.01));

        // Default release is one second
        let mut tail = vec![0.0; SR as usize * 2];
        synth.render(&mut tail, SR);
        assert!(synth.voices().is_empty());
    }

    #[test]
    fn test_all_kinds_render_finite() {
        for kind in crate::core::instrument::INSTRUMENT_TYPES {
            let mut u = unit(kind);
            u.attack(&[Note::new(PitchClass::G, 3)], 0.8, None);
            let mut out = vec![0.0; 512];
            u.render(&mut out, SR);
            assert!(out.iter().all(|s| s.is_finite()), "{} produced NaN", kind);
        }
    }
}
