//! Instrument manager: owns the active voice unit and effect unit, routes
//! audio between them, and tracks which inputs are currently sounding.

pub mod backend;
pub mod effects;
pub mod scheduler;
pub mod units;

pub use backend::{Destination, InstrumentBackend, UnitHandle};
pub use effects::{EffectParams, EffectType, ParamKind, ParamSpec, ParamValue, EFFECT_TYPES};
pub use scheduler::Scheduler;
pub use units::{Capabilities, InstrumentType, ReleaseMode, VoiceParams, INSTRUMENT_TYPES};

use std::collections::HashMap;
use std::time::Instant;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

use crate::core::note::{InputId, Note, NoteEvent, DEFAULT_VELOCITY};
use crate::messaging::PipelineMessage;
use units::{ARPEGGIO_STEP, CHORD_HOLD, SINGLE_SHOT};

/// The user-facing instrument configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub instrument: InstrumentType,
    pub effect: EffectType,
    pub effect_params: EffectParams,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            instrument: InstrumentType::Poly,
            effect: EffectType::None,
            effect_params: EffectParams::new(),
        }
    }
}

/// Maps each raw input to the note it turned on, so the matching note-off
/// releases exactly that note.
#[derive(Debug, Default)]
pub struct ActiveNoteSet {
    notes: HashMap<InputId, Note>,
}

impl ActiveNoteSet {
    /// Store `note` for `input`, returning whatever was there before
    pub fn insert(&mut self, input: InputId, note: Note) -> Option<Note> {
        self.notes.insert(input, note)
    }

    pub fn remove(&mut self, input: &InputId) -> Option<Note> {
        self.notes.remove(input)
    }

    pub fn get(&self, input: &InputId) -> Option<&Note> {
        self.notes.get(input)
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn clear(&mut self) {
        self.notes.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&InputId, &Note)> {
        self.notes.iter()
    }
}

struct VoiceUnit {
    handle: UnitHandle,
    capabilities: Capabilities,
}

struct EffectUnit {
    handle: UnitHandle,
    kind: EffectType,
}

/// Owns exactly one voice unit and at most one effect unit.
///
/// Units are created from the backend and disposed when replaced; handles are
/// never shared outside the manager.
pub struct InstrumentManager<B: InstrumentBackend> {
    backend: B,
    config: InstrumentConfig,
    voice: Option<VoiceUnit>,
    effect: Option<EffectUnit>,
    active: ActiveNoteSet,
    scheduler: Scheduler,
    notifier: Sender<PipelineMessage>,
    closed: bool,
}

impl<B: InstrumentBackend> InstrumentManager<B> {
    /// Build the units described by `config`. Effect parameters that don't
    /// fit the effect's schema are dropped.
    pub fn new(backend: B, config: InstrumentConfig, notifier: Sender<PipelineMessage>) -> Self {
        let mut manager = Self {
            backend,
            config: InstrumentConfig {
                instrument: config.instrument,
                effect: EffectType::None,
                effect_params: EffectParams::new(),
            },
            voice: None,
            effect: None,
            active: ActiveNoteSet::default(),
            scheduler: Scheduler::new(),
            notifier,
            closed: false,
        };
        manager.build_voice(config.instrument);
        manager.switch_effect(config.effect);
        for (name, value) in &config.effect_params {
            manager.update_effect_param(name, value.clone());
        }
        manager
    }

    fn build_voice(&mut self, kind: InstrumentType) {
        let handle = self.backend.create_voice_unit(kind, &kind.default_params());
        let destination = match &self.effect {
            Some(effect) => Destination::Unit(effect.handle),
            None => Destination::Sink,
        };
        self.backend.connect(handle, destination);
        self.voice = Some(VoiceUnit {
            handle,
            capabilities: kind.capabilities(),
        });
        self.config.instrument = kind;
    }

    /// Replace the voice unit. Sounding notes stop abruptly and pending
    /// arpeggio steps for the old unit are cancelled.
    pub fn switch_instrument(&mut self, kind: InstrumentType) {
        if self.closed {
            return;
        }
        if let Some(old) = self.voice.take() {
            let cancelled = self.scheduler.cancel_unit(old.handle);
            if cancelled > 0 {
                log::debug!("Cancelled {} pending arpeggio steps", cancelled);
            }
            self.backend.disconnect(old.handle);
            self.backend.dispose(old.handle);
        }
        self.active.clear();
        self.build_voice(kind);
        log::info!("Switched instrument to {}", kind);
    }

    /// Replace the effect unit, or remove it with [`EffectType::None`].
    /// The new effect starts from its default parameters.
    pub fn switch_effect(&mut self, kind: EffectType) {
        if self.closed {
            return;
        }
        if let Some(voice) = &self.voice {
            self.backend.disconnect(voice.handle);
        }
        if let Some(old) = self.effect.take() {
            self.backend.disconnect(old.handle);
            self.backend.dispose(old.handle);
        }

        let params = kind.default_params();
        if kind != EffectType::None {
            let handle = self.backend.create_effect_unit(kind, &params);
            self.backend.connect(handle, Destination::Sink);
            self.effect = Some(EffectUnit { handle, kind });
        }

        if let Some(voice) = &self.voice {
            let destination = match &self.effect {
                Some(effect) => Destination::Unit(effect.handle),
                None => Destination::Sink,
            };
            self.backend.connect(voice.handle, destination);
        }

        self.config.effect = kind;
        self.config.effect_params = params;
        log::info!("Switched effect to {}", kind);
    }

    /// Write a parameter on the active effect if its schema has it and the
    /// value fits. Returns whether anything was written.
    pub fn update_effect_param(&mut self, name: &str, value: ParamValue) -> bool {
        let Some(effect) = &self.effect else {
            log::debug!("No effect active, ignoring parameter {}", name);
            return false;
        };
        match effect.kind.validate(name, &value) {
            Some(valid) => {
                self.backend.set_param(effect.handle, name, &valid);
                self.config.effect_params.insert(name.to_string(), valid);
                true
            }
            None => {
                log::debug!("{} rejected parameter {} = {}", effect.kind, name, value);
                false
            }
        }
    }

    /// Sound a note: held if the unit supports release, otherwise a short
    /// single shot. Notifies listeners that the note was played.
    pub fn play(&mut self, note: Note, velocity: f32) {
        let Some(voice) = &self.voice else {
            return;
        };
        let velocity = velocity.clamp(0.0, 1.0);
        if voice.capabilities.sustain {
            self.backend.trigger_attack(voice.handle, &[note], velocity);
        } else {
            self.backend.trigger_attack_release(voice.handle, &[note], SINGLE_SHOT, velocity);
        }
        self.notify(note.with_velocity(velocity));
    }

    /// Sound a note for the single-shot duration on any unit, for triggers
    /// that have no matching key-up
    pub fn strike(&mut self, note: Note, velocity: f32) {
        let Some(voice) = &self.voice else {
            return;
        };
        let velocity = velocity.clamp(0.0, 1.0);
        self.backend
            .trigger_attack_release(voice.handle, &[note], SINGLE_SHOT, velocity);
        self.notify(note.with_velocity(velocity));
    }

    /// Release a note where the unit supports it.
    ///
    /// Single-voice units release their one voice whatever pitch it is
    /// playing, which can cut a newer note instead of `note`.
    pub fn release(&mut self, note: Note) {
        let Some(voice) = &self.voice else {
            return;
        };
        match voice.capabilities.release {
            ReleaseMode::PerNote => self.backend.trigger_release(voice.handle, &[note]),
            ReleaseMode::SingleVoice => self.backend.trigger_release(voice.handle, &[]),
            ReleaseMode::None => {}
        }
    }

    /// Handle a note-on from an input, remembering which note it started
    pub fn note_on(&mut self, event: &NoteEvent) {
        if self.voice.is_none() {
            return;
        }
        if let Some(previous) = self.active.insert(event.input.clone(), event.note) {
            self.release(previous);
        }
        self.play(event.note, event.velocity);
    }

    /// Handle a note-off by releasing the note its input turned on
    pub fn note_off(&mut self, event: &NoteEvent) {
        if let Some(note) = self.active.remove(&event.input) {
            self.release(note);
        }
    }

    /// Release every held note whose input matches `pred`, for inputs whose
    /// note-offs can no longer arrive. Returns how many were released.
    pub fn release_inputs(&mut self, pred: impl Fn(&InputId) -> bool) -> usize {
        let stale: Vec<InputId> = self.active.iter().map(|(id, _)| id).filter(|id| pred(id)).cloned().collect();
        for id in &stale {
            if let Some(note) = self.active.remove(id) {
                self.release(note);
            }
        }
        stale.len()
    }

    /// Play several notes: together on chord-capable units, otherwise as an
    /// arpeggio stepping every 50ms, first note immediately.
    pub fn play_chord(&mut self, notes: &[Note], now: Instant) {
        let Some(voice) = &self.voice else {
            return;
        };
        if notes.is_empty() {
            return;
        }
        if voice.capabilities.chord {
            self.backend
                .trigger_attack_release(voice.handle, notes, CHORD_HOLD, DEFAULT_VELOCITY);
            for note in notes {
                self.notify(note.with_velocity(DEFAULT_VELOCITY));
            }
        } else {
            let handle = voice.handle;
            for (i, note) in notes.iter().enumerate() {
                self.scheduler
                    .schedule(now + ARPEGGIO_STEP * i as u32, handle, *note, DEFAULT_VELOCITY);
            }
            self.tick(now);
        }
    }

    /// Fire arpeggio steps that have come due
    pub fn tick(&mut self, now: Instant) {
        for task in self.scheduler.take_due(now) {
            if self.voice_handle() == Some(task.unit) {
                self.play(task.note, task.velocity);
            } else {
                log::debug!("Dropping arpeggio step for retired unit {:?}", task.unit);
            }
        }
    }

    /// Stop everything and dispose both units. Later calls are no-ops.
    pub fn shutdown(&mut self) {
        self.closed = true;
        self.scheduler.clear();
        self.active.clear();
        if let Some(voice) = self.voice.take() {
            self.backend.release_all(voice.handle);
            self.backend.disconnect(voice.handle);
            self.backend.dispose(voice.handle);
        }
        if let Some(effect) = self.effect.take() {
            self.backend.disconnect(effect.handle);
            self.backend.dispose(effect.handle);
        }
    }

    fn notify(&self, note: Note) {
        self.notifier.send(PipelineMessage::NotePlayed(note)).ok();
    }

    pub fn config(&self) -> &InstrumentConfig {
        &self.config
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.voice.as_ref().map(|v| v.capabilities)
    }

    pub fn active_notes(&self) -> &ActiveNoteSet {
        &self.active
    }

    pub fn voice_handle(&self) -> Option<UnitHandle> {
        self.voice.as_ref().map(|v| v.handle)
    }

    pub fn effect_handle(&self) -> Option<UnitHandle> {
        self.effect.as_ref().map(|e| e.handle)
    }

    pub fn pending_steps(&self) -> usize {
        self.scheduler.len()
    }

    pub fn next_step_due(&self) -> Option<Instant> {
        self.scheduler.next_due()
    }

    pub fn is_alive(&self) -> bool {
        self.voice.is_some()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: InstrumentBackend> Drop for InstrumentManager<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::normalizer;
    use crate::core::note::PitchClass;
    use crossbeam_channel::{unbounded, Receiver};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Voice(InstrumentType, UnitHandle),
        Effect(EffectType, UnitHandle),
        Connect(UnitHandle, Destination),
        Disconnect(UnitHandle),
        Dispose(UnitHandle),
        Attack(UnitHandle, Vec<String>),
        AttackRelease(UnitHandle, Vec<String>),
        Release(UnitHandle, Vec<String>),
        ReleaseAll(UnitHandle),
        Param(UnitHandle, String),
    }

    #[derive(Default)]
    struct Recorder {
        next: u64,
        calls: Vec<Call>,
    }

    fn names(notes: &[Note]) -> Vec<String> {
        notes.iter().map(|n| n.to_string()).collect()
    }

    impl InstrumentBackend for Recorder {
        fn create_voice_unit(&mut self, kind: InstrumentType, _: &VoiceParams) -> UnitHandle {
            self.next += 1;
            self.calls.push(Call::Voice(kind, UnitHandle(self.next)));
            UnitHandle(self.next)
        }
        fn create_effect_unit(&mut self, kind: EffectType, _: &EffectParams) -> UnitHandle {
            self.next += 1;
            self.calls.push(Call::Effect(kind, UnitHandle(self.next)));
            UnitHandle(self.next)
        }
        fn connect(&mut self, src: UnitHandle, dst: Destination) {
            self.calls.push(Call::Connect(src, dst));
        }
        fn disconnect(&mut self, unit: UnitHandle) {
            self.calls.push(Call::Disconnect(unit));
        }
        fn dispose(&mut self, unit: UnitHandle) {
            self.calls.push(Call::Dispose(unit));
        }
        fn trigger_attack(&mut self, unit: UnitHandle, notes: &[Note], _: f32) {
            self.calls.push(Call::Attack(unit, names(notes)));
        }
        fn trigger_attack_release(&mut self, unit: UnitHandle, notes: &[Note], _: Duration, _: f32) {
            self.calls.push(Call::AttackRelease(unit, names(notes)));
        }
        fn trigger_release(&mut self, unit: UnitHandle, notes: &[Note]) {
            self.calls.push(Call::Release(unit, names(notes)));
        }
        fn release_all(&mut self, unit: UnitHandle) {
            self.calls.push(Call::ReleaseAll(unit));
        }
        fn set_param(&mut self, unit: UnitHandle, name: &str, _: &ParamValue) {
            self.calls.push(Call::Param(unit, name.to_string()));
        }
    }

    fn manager(instrument: InstrumentType) -> (InstrumentManager<Recorder>, Receiver<PipelineMessage>) {
        let (tx, rx) = unbounded();
        let config = InstrumentConfig {
            instrument,
            ..Default::default()
        };
        (InstrumentManager::new(Recorder::default(), config, tx), rx)
    }

    fn played(rx: &Receiver<PipelineMessage>) -> Vec<String> {
        rx.try_iter()
            .filter_map(|msg| match msg {
                PipelineMessage::NotePlayed(note) => Some(note.to_string()),
                _ => None,
            })
            .collect()
    }

    fn c_major() -> Vec<Note> {
        vec![
            Note::new(PitchClass::C, 4),
            Note::new(PitchClass::E, 4),
            Note::new(PitchClass::G, 4),
        ]
    }

    #[test]
    fn test_new_routes_voice_to_sink() {
        let (m, _rx) = manager(InstrumentType::Synth);
        let voice = m.voice_handle().unwrap();
        assert!(m.backend().calls.contains(&Call::Connect(voice, Destination::Sink)));
        assert!(m.effect_handle().is_none());
    }

    #[test]
    fn test_switch_instrument_keeps_effect_routing() {
        let (mut m, _rx) = manager(InstrumentType::Synth);
        m.switch_effect(EffectType::Reverb);
        let effect = m.effect_handle().unwrap();
        let old_voice = m.voice_handle().unwrap();

        m.switch_instrument(InstrumentType::Fm);
        let voice = m.voice_handle().unwrap();
        assert_ne!(voice, old_voice);
        let calls = &m.backend().calls;
        assert!(calls.contains(&Call::Dispose(old_voice)));
        assert_eq!(calls.last(), Some(&Call::Connect(voice, Destination::Unit(effect))));
        assert_eq!(m.config().instrument, InstrumentType::Fm);
    }

    #[test]
    fn test_switch_effect_to_none_reconnects_to_sink() {
        let (mut m, _rx) = manager(InstrumentType::Poly);
        m.switch_effect(EffectType::Delay);
        let effect = m.effect_handle().unwrap();
        m.switch_effect(EffectType::None);
        let voice = m.voice_handle().unwrap();
        let calls = &m.backend().calls;
        assert!(calls.contains(&Call::Dispose(effect)));
        assert_eq!(calls.last(), Some(&Call::Connect(voice, Destination::Sink)));
        assert!(m.effect_handle().is_none());
        assert!(m.config().effect_params.is_empty());
    }

    #[test]
    fn test_effect_params_follow_schema() {
        let (mut m, _rx) = manager(InstrumentType::Poly);
        assert!(!m.update_effect_param("wet", ParamValue::Number(0.2)));
        m.switch_effect(EffectType::Filter);
        assert!(m.update_effect_param("frequency", ParamValue::Number(440.0)));
        assert!(m.update_effect_param("type", "bandpass".into()));
        assert!(!m.update_effect_param("decay", ParamValue::Number(2.0)));
        assert!(!m.update_effect_param("Q", ParamValue::Number(99.0)));
        assert_eq!(m.config().effect_params["frequency"], ParamValue::Number(440.0));
        assert_eq!(m.config().effect_params["type"], ParamValue::Text("bandpass".to_string()));
    }

    #[test]
    fn test_play_uses_capabilities() {
        let (mut m, rx) = manager(InstrumentType::Pluck);
        let voice = m.voice_handle().unwrap();
        m.play(Note::new(PitchClass::A, 4), 0.8);
        assert_eq!(
            m.backend().calls.last(),
            Some(&Call::AttackRelease(voice, vec!["A4".to_string()]))
        );
        let before = m.backend().calls.len();
        m.release(Note::new(PitchClass::A, 4));
        assert_eq!(m.backend().calls.len(), before);
        assert_eq!(played(&rx), vec!["A4"]);
    }

    #[test]
    fn test_strike_never_holds() {
        let (mut m, rx) = manager(InstrumentType::Poly);
        let voice = m.voice_handle().unwrap();
        m.strike(Note::new(PitchClass::B, 3), 1.0);
        assert_eq!(
            m.backend().calls.last(),
            Some(&Call::AttackRelease(voice, vec!["B3".to_string()]))
        );
        assert_eq!(played(&rx), vec!["B3"]);
    }

    #[test]
    fn test_mono_release_ignores_pitch() {
        let (mut m, _rx) = manager(InstrumentType::Mono);
        let voice = m.voice_handle().unwrap();
        m.play(Note::new(PitchClass::C, 4), 0.8);
        m.play(Note::new(PitchClass::D, 4), 0.8);
        m.release(Note::new(PitchClass::C, 4));
        assert_eq!(m.backend().calls.last(), Some(&Call::Release(voice, vec![])));
    }

    #[test]
    fn test_note_off_matches_input_not_pitch() {
        let (mut m, _rx) = manager(InstrumentType::Poly);
        let voice = m.voice_handle().unwrap();
        let down = normalizer::ui_key_down("k1", Note::new(PitchClass::F, 3), 0.8);
        m.note_on(&down);
        assert_eq!(m.active_notes().len(), 1);

        // The key-up carries a different pitch; the stored one is released
        let up = normalizer::ui_key_up("k1", Note::new(PitchClass::G, 5));
        m.note_off(&up);
        assert!(m.active_notes().is_empty());
        assert_eq!(m.backend().calls.last(), Some(&Call::Release(voice, vec!["F3".to_string()])));
    }

    #[test]
    fn test_release_inputs_only_touches_matching_ids() {
        let (mut m, _rx) = manager(InstrumentType::Poly);
        let voice = m.voice_handle().unwrap();
        m.note_on(&normalizer::from_midi(&[0x90, 60, 100]).unwrap());
        m.note_on(&normalizer::from_midi(&[0x90, 64, 100]).unwrap());
        m.note_on(&normalizer::ui_key_down("k1", Note::new(PitchClass::A, 3), 0.8));

        let released = m.release_inputs(|id| matches!(id, InputId::Midi(_)));
        assert_eq!(released, 2);
        assert_eq!(m.active_notes().len(), 1);
        assert!(m.active_notes().get(&InputId::UiKey("k1".to_string())).is_some());
        let releases: Vec<&Call> = m.backend().calls.iter().filter(|c| matches!(c, Call::Release(..))).collect();
        assert_eq!(releases.len(), 2);
        assert!(releases.contains(&&Call::Release(voice, vec!["C4".to_string()])));
        assert_eq!(m.release_inputs(|id| matches!(id, InputId::Midi(_))), 0);
    }

    #[test]
    fn test_chord_on_poly_is_simultaneous() {
        let (mut m, rx) = manager(InstrumentType::Poly);
        let voice = m.voice_handle().unwrap();
        m.play_chord(&c_major(), Instant::now());
        assert_eq!(
            m.backend().calls.last(),
            Some(&Call::AttackRelease(voice, vec!["C4".into(), "E4".into(), "G4".into()]))
        );
        assert_eq!(played(&rx), vec!["C4", "E4", "G4"]);
        assert_eq!(m.pending_steps(), 0);
    }

    #[test]
    fn test_chord_arpeggiates_elsewhere() {
        let (mut m, rx) = manager(InstrumentType::Synth);
        let start = Instant::now();
        m.play_chord(&c_major(), start);
        assert_eq!(played(&rx), vec!["C4"]);
        assert_eq!(m.pending_steps(), 2);

        m.tick(start + Duration::from_millis(50));
        assert_eq!(played(&rx), vec!["E4"]);
        m.tick(start + Duration::from_millis(200));
        assert_eq!(played(&rx), vec!["G4"]);
        assert_eq!(m.pending_steps(), 0);
    }

    #[test]
    fn test_switching_cancels_pending_arpeggio() {
        let (mut m, rx) = manager(InstrumentType::Synth);
        let start = Instant::now();
        m.play_chord(&c_major(), start);
        m.switch_instrument(InstrumentType::Am);
        m.tick(start + Duration::from_secs(1));
        assert_eq!(played(&rx), vec!["C4"]);
    }

    #[test]
    fn test_shutdown_makes_everything_a_noop() {
        let (mut m, rx) = manager(InstrumentType::Poly);
        m.switch_effect(EffectType::Chorus);
        m.shutdown();
        assert!(!m.is_alive());
        let calls = m.backend().calls.len();
        m.play(Note::new(PitchClass::C, 4), 0.8);
        m.play_chord(&c_major(), Instant::now());
        m.note_on(&normalizer::ui_key_down("k", Note::new(PitchClass::C, 4), 0.8));
        m.switch_instrument(InstrumentType::Fm);
        m.switch_effect(EffectType::Reverb);
        assert_eq!(m.backend().calls.len(), calls);
        assert!(m.voice_handle().is_none());
        assert!(played(&rx).is_empty());
    }
}
