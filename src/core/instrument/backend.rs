//! The seam between the instrument manager and whatever actually makes sound.

use std::time::Duration;

use crate::core::instrument::effects::{EffectParams, EffectType, ParamValue};
use crate::core::instrument::units::{InstrumentType, VoiceParams};
use crate::core::note::Note;

/// Opaque id of a voice or effect unit living in a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitHandle(pub u64);

/// Where a unit's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Unit(UnitHandle),
    Sink,
}

/// Audio graph operations the instrument manager relies on.
///
/// Implementations never fail observably: unknown handles are ignored.
pub trait InstrumentBackend {
    fn create_voice_unit(&mut self, kind: InstrumentType, params: &VoiceParams) -> UnitHandle;
    fn create_effect_unit(&mut self, kind: EffectType, params: &EffectParams) -> UnitHandle;

    fn connect(&mut self, src: UnitHandle, dst: Destination);
    /// Detach `unit` from wherever its output currently goes
    fn disconnect(&mut self, unit: UnitHandle);
    fn dispose(&mut self, unit: UnitHandle);

    /// Start notes and hold them until released
    fn trigger_attack(&mut self, unit: UnitHandle, notes: &[Note], velocity: f32);
    /// Start notes and release them after `duration`
    fn trigger_attack_release(&mut self, unit: UnitHandle, notes: &[Note], duration: Duration, velocity: f32);
    /// Release specific notes. Single-voice units are called with an empty
    /// slice and release whatever they are playing.
    fn trigger_release(&mut self, unit: UnitHandle, notes: &[Note]);
    fn release_all(&mut self, unit: UnitHandle);

    /// Write an already validated effect parameter
    fn set_param(&mut self, unit: UnitHandle, name: &str, value: &ParamValue);
}
