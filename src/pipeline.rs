//! The audio-event pipeline.
//!
//! One thread owns the pipeline and drains the message bus; UI, MIDI and the
//! frame clock only ever post messages. Each message is handled to completion
//! before the next one is taken.

use std::time::Instant;

use crossbeam_channel::Sender;

use crate::core::analyzer::{SampleTap, SpectrumFeed};
use crate::core::instrument::{InstrumentBackend, InstrumentManager};
use crate::core::midi::{MidiPlatform, MidiSession, MidiStatus};
use crate::core::normalizer;
use crate::core::note::{InputId, NoteKind};
use crate::core::theory::{ChordSymbol, InferenceEngine};
use crate::messaging::{MessageBus, PipelineMessage};
use crate::settings::Settings;

/// Octave suggested chords are voiced in when played back
const SUGGESTION_OCTAVE: i8 = 4;

pub struct Pipeline<B: InstrumentBackend, P: MidiPlatform> {
    bus: MessageBus,
    instruments: InstrumentManager<B>,
    engine: InferenceEngine,
    midi: MidiSession<P>,
    spectrum: SpectrumFeed,
    ui_velocity: f32,
    preferred_port: Option<String>,
    running: bool,
}

impl<B: InstrumentBackend, P: MidiPlatform> Pipeline<B, P> {
    pub fn new(backend: B, platform: P, tap: SampleTap, settings: &Settings) -> Self {
        let bus = MessageBus::new();
        let instruments = InstrumentManager::new(backend, settings.instrument_config(), bus.sender());
        let midi = MidiSession::new(platform, bus.sender());
        Self {
            instruments,
            engine: InferenceEngine::with_key(settings.tonic()),
            midi,
            spectrum: SpectrumFeed::new(tap),
            ui_velocity: settings.ui_velocity(),
            preferred_port: settings.preferred_midi_port.clone(),
            running: true,
            bus,
        }
    }

    /// A sender for input sources running on other threads
    pub fn sender(&self) -> Sender<PipelineMessage> {
        self.bus.sender()
    }

    pub fn post(&self, msg: PipelineMessage) {
        self.bus.send(msg).ok();
    }

    /// Request MIDI access and wire the preferred or first device
    pub fn start_midi(&mut self) -> MidiStatus {
        let preferred = self.preferred_port.clone();
        self.midi.start(preferred.as_deref())
    }

    /// Handle up to `max_messages` queued messages, returning how many were
    /// handled. Messages posted while handling are picked up in the same call.
    pub fn process_messages(&mut self, max_messages: usize, now: Instant) -> usize {
        let mut count = 0;
        while count < max_messages {
            let Ok(msg) = self.bus.try_receive() else {
                break;
            };
            count += 1;
            self.handle_message(msg, now);
        }
        count
    }

    pub fn handle_message(&mut self, msg: PipelineMessage, now: Instant) {
        if !self.running {
            log::debug!("Pipeline stopped, dropping {:?}", msg);
            return;
        }
        match msg {
            PipelineMessage::UiKeyDown { key, note } => {
                let event = normalizer::ui_key_down(key, note, self.ui_velocity);
                self.instruments.note_on(&event);
            }
            PipelineMessage::UiKeyUp { key, note } => {
                let event = normalizer::ui_key_up(key, note);
                self.instruments.note_off(&event);
            }
            PipelineMessage::MidiInput { generation, bytes } => {
                if !self.midi.is_current(generation) {
                    log::debug!("Dropping MIDI message from stale connection {}", generation);
                    return;
                }
                if let Some(event) = normalizer::from_midi(&bytes) {
                    match event.kind {
                        NoteKind::On => self.instruments.note_on(&event),
                        NoteKind::Off => self.instruments.note_off(&event),
                    }
                }
            }
            PipelineMessage::MidiDevicesChanged => {
                let generation = self.midi.generation();
                self.midi.on_devices_changed();
                self.release_stale_midi(generation);
            }
            PipelineMessage::SelectMidiDevice(name) => {
                let generation = self.midi.generation();
                self.midi.select(&name);
                self.release_stale_midi(generation);
            }
            PipelineMessage::NotePlayed(note) => {
                self.engine.on_note_played(note);
            }
            PipelineMessage::PlayNote(note) => self.instruments.strike(note, self.ui_velocity),
            PipelineMessage::PlayChord(notes) => self.instruments.play_chord(&notes, now),
            PipelineMessage::AddChord(symbol) => {
                if let Err(err) = self.engine.add_chord(&symbol) {
                    log::warn!("{}", err);
                }
            }
            PipelineMessage::AddSuggestion(index) => {
                self.add_suggestion(index, now);
            }
            PipelineMessage::ClearProgression => self.engine.clear(),
            PipelineMessage::AutoDetectKey => {
                self.engine.auto_detect_key();
            }
            PipelineMessage::SetKey(tonic) => self.engine.set_key(tonic),
            PipelineMessage::SwitchInstrument(kind) => self.instruments.switch_instrument(kind),
            PipelineMessage::SwitchEffect(kind) => self.instruments.switch_effect(kind),
            PipelineMessage::UpdateEffectParam(name, value) => {
                self.instruments.update_effect_param(&name, value);
            }
            PipelineMessage::Shutdown => self.shutdown(),
        }
    }

    /// Once the MIDI wiring has moved on, note-offs for notes held under the
    /// old wiring are dropped, so release those notes here
    fn release_stale_midi(&mut self, previous_generation: u64) {
        if self.midi.generation() == previous_generation {
            return;
        }
        let released = self
            .instruments
            .release_inputs(|id| matches!(id, InputId::Midi(_)));
        if released > 0 {
            log::debug!("Released {} notes held by the previous MIDI connection", released);
        }
    }

    /// Append suggestion `index` to the progression and play it. The played
    /// notes come back through `NotePlayed` like any other input.
    pub fn add_suggestion(&mut self, index: usize, now: Instant) -> Option<ChordSymbol> {
        let chord = self.engine.suggestions().get(index).cloned()?;
        self.engine.push_chord(chord.clone());
        if let Some(notes) = chord.voicing(SUGGESTION_OCTAVE) {
            self.instruments.play_chord(&notes, now);
        }
        Some(chord)
    }

    /// Fire arpeggio steps that are due
    pub fn tick(&mut self, now: Instant) {
        if self.running {
            self.instruments.tick(now);
        }
    }

    /// Per-display-frame refresh of the spectrum snapshot
    pub fn on_frame(&mut self) -> bool {
        self.spectrum.on_frame()
    }

    /// When the next arpeggio step is due, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.instruments.next_step_due()
    }

    /// Stop the spectrum feed, drop the MIDI wiring and dispose the audio
    /// units. Messages still in flight are ignored afterwards.
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        log::info!("Shutting down pipeline");
        self.running = false;
        self.spectrum.stop();
        self.midi.disconnect();
        self.instruments.shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn instruments(&self) -> &InstrumentManager<B> {
        &self.instruments
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn midi(&self) -> &MidiSession<P> {
        &self.midi
    }

    pub fn spectrum(&self) -> &SpectrumFeed {
        &self.spectrum
    }

    pub fn spectrum_mut(&mut self) -> &mut SpectrumFeed {
        &mut self.spectrum
    }
}
