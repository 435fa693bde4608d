//! MIDI device discovery and selection.
//!
//! The session keeps at most one device wired to the message bus. Each
//! wiring gets a new generation number and every message carries the
//! generation it was produced under, so the pipeline can drop messages
//! from a connection that is no longer the active one.

pub mod input;

pub use input::{port_names, watch_devices, MidirPlatform};

use crossbeam_channel::Sender;

use crate::error::Result;
use crate::messaging::PipelineMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiDeviceInfo {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiStatus {
    Connected,
    Disconnected,
}

/// What the session needs from the host MIDI API
pub trait MidiPlatform {
    /// Fails when access is denied or MIDI isn't supported at all
    fn request_access(&mut self) -> Result<()>;
    fn devices(&mut self) -> Vec<MidiDeviceInfo>;
    /// Detach any previous device and deliver raw messages from `device`
    /// to `sender`, tagged with `generation`
    fn open(&mut self, device: &MidiDeviceInfo, sender: Sender<PipelineMessage>, generation: u64) -> Result<()>;
    fn close(&mut self);
}

pub struct MidiSession<P: MidiPlatform> {
    platform: P,
    sender: Sender<PipelineMessage>,
    status: MidiStatus,
    available: bool,
    devices: Vec<MidiDeviceInfo>,
    selected: Option<String>,
    generation: u64,
}

impl<P: MidiPlatform> MidiSession<P> {
    pub fn new(platform: P, sender: Sender<PipelineMessage>) -> Self {
        Self {
            platform,
            sender,
            status: MidiStatus::Disconnected,
            available: false,
            devices: Vec::new(),
            selected: None,
            generation: 0,
        }
    }

    /// Request access and wire the preferred device, or the first one found.
    /// A denial leaves the session disconnected for good.
    pub fn start(&mut self, preferred: Option<&str>) -> MidiStatus {
        if let Err(err) = self.platform.request_access() {
            log::warn!("MIDI access unavailable, continuing without it: {}", err);
            self.available = false;
            self.status = MidiStatus::Disconnected;
            return self.status;
        }
        self.available = true;
        self.devices = self.platform.devices();

        let choice = preferred
            .and_then(|name| self.devices.iter().find(|d| d.name == name))
            .or_else(|| self.devices.first())
            .map(|d| d.name.clone());
        match choice {
            Some(name) => {
                self.select(&name);
            }
            None => log::info!("No MIDI input devices found"),
        }
        self.status
    }

    /// Re-read the device list after a hot-plug notification. Losing the
    /// active device disconnects the session.
    pub fn on_devices_changed(&mut self) {
        if !self.available {
            return;
        }
        self.devices = self.platform.devices();
        let still_present = self
            .selected
            .as_ref()
            .map(|name| self.devices.iter().any(|d| &d.name == name));
        if still_present == Some(false) {
            log::info!("Active MIDI device {:?} disappeared", self.selected);
            self.disconnect();
        }
    }

    /// Wire `name` as the only active device. Returns false when the device
    /// isn't present or can't be opened.
    pub fn select(&mut self, name: &str) -> bool {
        if !self.available {
            return false;
        }
        let Some(device) = self.devices.iter().find(|d| d.name == name).cloned() else {
            log::warn!("MIDI device '{}' not found", name);
            return false;
        };

        self.generation += 1;
        match self.platform.open(&device, self.sender.clone(), self.generation) {
            Ok(()) => {
                log::info!("MIDI input connected: {}", device.name);
                self.selected = Some(device.name);
                self.status = MidiStatus::Connected;
                true
            }
            Err(err) => {
                log::warn!("Could not open MIDI device '{}': {}", device.name, err);
                self.selected = None;
                self.status = MidiStatus::Disconnected;
                false
            }
        }
    }

    pub fn disconnect(&mut self) {
        self.platform.close();
        self.generation += 1;
        self.selected = None;
        self.status = MidiStatus::Disconnected;
    }

    /// Whether a message tagged `generation` comes from the active wiring
    pub fn is_current(&self, generation: u64) -> bool {
        self.status == MidiStatus::Connected && generation == self.generation
    }

    pub fn status(&self) -> MidiStatus {
        self.status
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn devices(&self) -> &[MidiDeviceInfo] {
        &self.devices
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }
}
