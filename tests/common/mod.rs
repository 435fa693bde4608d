#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use chord_theorem::core::analyzer::{SampleTap, FFT_SIZE};
use chord_theorem::core::instrument::{
    Destination, EffectParams, EffectType, InstrumentBackend, InstrumentType, ParamValue, UnitHandle, VoiceParams,
};
use chord_theorem::core::midi::{MidiDeviceInfo, MidiPlatform};
use chord_theorem::core::note::Note;
use chord_theorem::messaging::PipelineMessage;
use chord_theorem::{Error, Pipeline, Result, Settings};

/// Every backend call, with notes flattened to their names
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateVoice(InstrumentType, UnitHandle),
    CreateEffect(EffectType, UnitHandle),
    Connect(UnitHandle, Destination),
    Disconnect(UnitHandle),
    Dispose(UnitHandle),
    Attack(UnitHandle, Vec<String>, f32),
    AttackRelease(UnitHandle, Vec<String>, Duration),
    Release(UnitHandle, Vec<String>),
    ReleaseAll(UnitHandle),
    SetParam(UnitHandle, String, ParamValue),
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    pub calls: Vec<Call>,
    next: u64,
}

impl RecordingBackend {
    fn allocate(&mut self) -> UnitHandle {
        self.next += 1;
        UnitHandle(self.next)
    }

    pub fn attacks(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Attack(..) | Call::AttackRelease(..)))
            .collect()
    }

    pub fn releases(&self) -> Vec<&Call> {
        self.calls.iter().filter(|c| matches!(c, Call::Release(..))).collect()
    }
}

fn names(notes: &[Note]) -> Vec<String> {
    notes.iter().map(|n| n.to_string()).collect()
}

impl InstrumentBackend for RecordingBackend {
    fn create_voice_unit(&mut self, kind: InstrumentType, _params: &VoiceParams) -> UnitHandle {
        let handle = self.allocate();
        self.calls.push(Call::CreateVoice(kind, handle));
        handle
    }

    fn create_effect_unit(&mut self, kind: EffectType, _params: &EffectParams) -> UnitHandle {
        let handle = self.allocate();
        self.calls.push(Call::CreateEffect(kind, handle));
        handle
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

    fn trigger_attack(&mut self, unit: UnitHandle, notes: &[Note], velocity: f32) {
        self.calls.push(Call::Attack(unit, names(notes), velocity));
    }

    fn trigger_attack_release(&mut self, unit: UnitHandle, notes: &[Note], duration: Duration, _velocity: f32) {
        self.calls.push(Call::AttackRelease(unit, names(notes), duration));
    }

    fn trigger_release(&mut self, unit: UnitHandle, notes: &[Note]) {
        self.calls.push(Call::Release(unit, names(notes)));
    }

    fn release_all(&mut self, unit: UnitHandle) {
        self.calls.push(Call::ReleaseAll(unit));
    }

    fn set_param(&mut self, unit: UnitHandle, name: &str, value: &ParamValue) {
        self.calls.push(Call::SetParam(unit, name.to_string(), value.clone()));
    }
}

/// A MIDI host that records what was opened. The device list is shared so a
/// test can plug and unplug devices after the pipeline owns the platform.
#[derive(Debug, Default)]
pub struct ScriptedMidi {
    pub denied: bool,
    pub names: Arc<Mutex<Vec<String>>>,
    pub opened: Vec<(String, u64)>,
    pub closes: usize,
}

impl ScriptedMidi {
    pub fn with_devices(names: &[&str]) -> Self {
        Self {
            names: Arc::new(Mutex::new(names.iter().map(|n| n.to_string()).collect())),
            ..Self::default()
        }
    }

    pub fn device_list(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.names)
    }
}

impl MidiPlatform for ScriptedMidi {
    fn request_access(&mut self) -> Result<()> {
        if self.denied {
            Err(Error::Midi("access denied".to_string()))
        } else {
            Ok(())
        }
    }

    fn devices(&mut self) -> Vec<MidiDeviceInfo> {
        self.names
            .lock()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(index, name)| MidiDeviceInfo {
                index,
                name: name.clone(),
            })
            .collect()
    }

    fn open(&mut self, device: &MidiDeviceInfo, _sender: Sender<PipelineMessage>, generation: u64) -> Result<()> {
        self.opened.push((device.name.clone(), generation));
        Ok(())
    }

    fn close(&mut self) {
        self.closes += 1;
    }
}

pub type TestPipeline = Pipeline<RecordingBackend, ScriptedMidi>;

pub fn pipeline_with(settings: Settings, midi: ScriptedMidi) -> TestPipeline {
    Pipeline::new(RecordingBackend::default(), midi, SampleTap::new(FFT_SIZE), &settings)
}

pub fn pipeline() -> TestPipeline {
    pipeline_with(Settings::default(), ScriptedMidi::with_devices(&["Keys"]))
}

pub fn note(name: &str) -> Note {
    name.parse().unwrap()
}

/// Post and drain everything, including messages posted while handling
pub fn send(pipeline: &mut TestPipeline, msg: PipelineMessage) {
    pipeline.post(msg);
    pipeline.process_messages(usize::MAX, Instant::now());
}

pub fn press(pipeline: &mut TestPipeline, key: &str, name: &str) {
    send(
        pipeline,
        PipelineMessage::UiKeyDown {
            key: key.to_string(),
            note: note(name),
        },
    );
}
