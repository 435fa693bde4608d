//! Built-in software instrument backend.
//!
//! `AudioGraph` holds voice and effect units plus their routing and renders
//! mono blocks; `SoftwareBackend` drives it through [`InstrumentBackend`] and
//! shares it with the audio output callback.

pub mod effects;
pub mod envelope;
pub mod voice;
pub mod waveform;

pub use effects::EffectUnit;
pub use envelope::{Envelope, EnvelopeStage, EnvelopeState};
pub use voice::VoiceUnit;
pub use waveform::Waveform;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::analyzer::SampleTap;
use crate::core::instrument::{
    Destination, EffectParams, EffectType, InstrumentBackend, InstrumentType, ParamValue, UnitHandle, VoiceParams,
};
use crate::core::note::Note;

enum Unit {
    Voice(VoiceUnit),
    Effect(EffectUnit),
}

/// Units, routing, and the render loop
pub struct AudioGraph {
    sample_rate: f32,
    volume: f32,
    next_handle: u64,
    units: BTreeMap<UnitHandle, Unit>,
    routes: BTreeMap<UnitHandle, Destination>,
    scratch: Vec<f32>,
    tap: Option<SampleTap>,
}

impl AudioGraph {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            volume: 0.5,
            next_handle: 0,
            units: BTreeMap::new(),
            routes: BTreeMap::new(),
            scratch: Vec::new(),
            tap: None,
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    /// Mirror every rendered block into `tap`
    pub fn set_tap(&mut self, tap: SampleTap) {
        self.tap = Some(tap);
    }

    fn allocate(&mut self, unit: Unit) -> UnitHandle {
        self.next_handle += 1;
        let handle = UnitHandle(self.next_handle);
        self.units.insert(handle, unit);
        handle
    }

    pub fn route(&self, unit: UnitHandle) -> Option<Destination> {
        self.routes.get(&unit).copied()
    }

    pub fn contains(&self, unit: UnitHandle) -> bool {
        self.units.contains_key(&unit)
    }

    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    /// Number of voices still sounding (including releasing) in a voice unit
    pub fn sounding(&self, unit: UnitHandle) -> usize {
        match self.units.get(&unit) {
            Some(Unit::Voice(v)) => v.voices().len(),
            _ => 0,
        }
    }

    fn voice_mut(&mut self, unit: UnitHandle) -> Option<&mut VoiceUnit> {
        match self.units.get_mut(&unit) {
            Some(Unit::Voice(v)) => Some(v),
            _ => None,
        }
    }

    /// Render one mono block into `out`, overwriting it.
    ///
    /// Voices routed to the sink are mixed directly; voices routed to an
    /// effect are mixed into that effect's input and the effect's output goes
    /// to the sink. Effects routed anywhere other than the sink are silent.
    pub fn render(&mut self, out: &mut [f32]) {
        out.iter_mut().for_each(|s| *s = 0.0);
        self.scratch.resize(out.len(), 0.0);
        let sample_rate = self.sample_rate;

        let voice_handles: Vec<UnitHandle> = self
            .units
            .iter()
            .filter(|(_, unit)| matches!(unit, Unit::Voice(_)))
            .map(|(handle, _)| *handle)
            .collect();

        for handle in voice_handles {
            let route = self.routes.get(&handle).copied();
            self.scratch.iter_mut().for_each(|s| *s = 0.0);
            if let Some(Unit::Voice(voice)) = self.units.get_mut(&handle) {
                voice.render(&mut self.scratch, sample_rate);
            }
            match route {
                Some(Destination::Sink) => {
                    for (o, s) in out.iter_mut().zip(&self.scratch) {
                        *o += s;
                    }
                }
                Some(Destination::Unit(target)) => {
                    if let Some(Unit::Effect(effect)) = self.units.get_mut(&target) {
                        effect.input.resize(out.len(), 0.0);
                        for (i, s) in effect.input.iter_mut().zip(&self.scratch) {
                            *i += s;
                        }
                    }
                }
                None => {}
            }
        }

        for (handle, unit) in self.units.iter_mut() {
            if let Unit::Effect(effect) = unit {
                if self.routes.get(handle) == Some(&Destination::Sink) {
                    effect.render(out);
                } else {
                    effect.input.iter_mut().for_each(|s| *s = 0.0);
                }
            }
        }

        for sample in out.iter_mut() {
            *sample = (*sample * self.volume).clamp(-1.0, 1.0);
        }
        if let Some(tap) = &self.tap {
            tap.push(out);
        }
    }
}

/// [`InstrumentBackend`] over a shared [`AudioGraph`]
#[derive(Clone)]
pub struct SoftwareBackend {
    graph: Arc<Mutex<AudioGraph>>,
}

impl SoftwareBackend {
    pub fn new(graph: Arc<Mutex<AudioGraph>>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> Arc<Mutex<AudioGraph>> {
        Arc::clone(&self.graph)
    }

    fn with_graph<R>(&self, f: impl FnOnce(&mut AudioGraph) -> R) -> Option<R> {
        match self.graph.lock() {
            Ok(mut graph) => Some(f(&mut graph)),
            Err(_) => {
                log::warn!("Audio graph lock poisoned");
                None
            }
        }
    }
}

impl InstrumentBackend for SoftwareBackend {
    fn create_voice_unit(&mut self, kind: InstrumentType, params: &VoiceParams) -> UnitHandle {
        let unit = Unit::Voice(VoiceUnit::new(kind, *params));
        self.with_graph(|g| g.allocate(unit)).unwrap_or(UnitHandle(0))
    }

    fn create_effect_unit(&mut self, kind: EffectType, params: &EffectParams) -> UnitHandle {
        self.with_graph(|g| {
            let unit = Unit::Effect(EffectUnit::new(kind, params, g.sample_rate));
            g.allocate(unit)
        })
        .unwrap_or(UnitHandle(0))
    }

    fn connect(&mut self, src: UnitHandle, dst: Destination) {
        self.with_graph(|g| {
            if g.contains(src) {
                g.routes.insert(src, dst);
            }
        });
    }

    fn disconnect(&mut self, unit: UnitHandle) {
        self.with_graph(|g| g.routes.remove(&unit));
    }

    fn dispose(&mut self, unit: UnitHandle) {
        self.with_graph(|g| {
            g.units.remove(&unit);
            g.routes.remove(&unit);
        });
    }

    fn trigger_attack(&mut self, unit: UnitHandle, notes: &[Note], velocity: f32) {
        self.with_graph(|g| {
            if let Some(voice) = g.voice_mut(unit) {
                voice.attack(notes, velocity, None);
            }
        });
    }

    fn trigger_attack_release(&mut self, unit: UnitHandle, notes: &[Note], duration: Duration, velocity: f32) {
        self.with_graph(|g| {
            if let Some(voice) = g.voice_mut(unit) {
                voice.attack(notes, velocity, Some(duration));
            }
        });
    }

    fn trigger_release(&mut self, unit: UnitHandle, notes: &[Note]) {
        self.with_graph(|g| {
            if let Some(voice) = g.voice_mut(unit) {
                voice.release(notes);
            }
        });
    }

    fn release_all(&mut self, unit: UnitHandle) {
        self.with_graph(|g| {
            if let Some(voice) = g.voice_mut(unit) {
                voice.release_all();
            }
        });
    }

    fn set_param(&mut self, unit: UnitHandle, name: &str, value: &ParamValue) {
        self.with_graph(|g| {
            if let Some(Unit::Effect(effect)) = g.units.get_mut(&unit) {
                effect.set_param(name, value);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::note::PitchClass;

    fn backend() -> SoftwareBackend {
        SoftwareBackend::new(Arc::new(Mutex::new(AudioGraph::new(48000.0))))
    }

    #[test]
    fn test_voice_through_effect_reaches_sink() {
        let mut b = backend();
        let voice = b.create_voice_unit(InstrumentType::Synth, &InstrumentType::Synth.default_params());
        let effect = b.create_effect_unit(EffectType::Distortion, &EffectType::Distortion.default_params());
        b.connect(effect, Destination::Sink);
        b.connect(voice, Destination::Unit(effect));
        b.trigger_attack(voice, &[Note::new(PitchClass::A, 4)], 1.0);

        let graph = b.graph();
        let mut g = graph.lock().unwrap();
        assert_eq!(g.route(voice), Some(Destination::Unit(effect)));
        let mut out = vec![0.0; 1024];
        g.render(&mut out);
        assert!(out.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn test_disconnected_voice_is_silent() {
        let mut b = backend();
        let voice = b.create_voice_unit(InstrumentType::Poly, &InstrumentType::Poly.default_params());
        b.trigger_attack(voice, &[Note::new(PitchClass::C, 4)], 1.0);
        let graph = b.graph();
        let mut g = graph.lock().unwrap();
        let mut out = vec![1.0; 256];
        g.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(g.sounding(voice), 1);
    }

    #[test]
    fn test_dispose_removes_unit_and_route() {
        let mut b = backend();
        let voice = b.create_voice_unit(InstrumentType::Fm, &InstrumentType::Fm.default_params());
        b.connect(voice, Destination::Sink);
        b.dispose(voice);
        let graph = b.graph();
        let g = graph.lock().unwrap();
        assert!(!g.contains(voice));
        assert_eq!(g.route(voice), None);
        assert_eq!(g.unit_count(), 0);
    }

    #[test]
    fn test_render_feeds_tap() {
        let b = backend();
        let tap = SampleTap::new(64);
        let graph = b.graph();
        let mut g = graph.lock().unwrap();
        g.set_tap(tap.clone());
        let mut out = vec![0.0; 32];
        g.render(&mut out);
        assert_eq!(tap.len(), 32);
    }
}
