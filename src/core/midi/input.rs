use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection};

use super::{MidiDeviceInfo, MidiPlatform};
use crate::error::{Error, Result};
use crate::messaging::PipelineMessage;

const CLIENT_NAME: &str = "ChordTheorem MIDI Input";

/// [`MidiPlatform`] backed by the system MIDI API through midir
#[derive(Default)]
pub struct MidirPlatform {
    connection: Option<MidiInputConnection<()>>,
}

impl MidirPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Names of the input ports currently present, in port order
pub fn port_names() -> Vec<String> {
    match MidiInput::new(CLIENT_NAME) {
        Ok(midi_in) => midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect(),
        Err(err) => {
            log::debug!("MIDI input unavailable: {}", err);
            Vec::new()
        }
    }
}

/// Poll the port list from a background thread and post
/// `MidiDevicesChanged` whenever it differs from the last poll. The thread
/// ends when the receiving side of `sender` is gone.
pub fn watch_devices(sender: Sender<PipelineMessage>, interval: Duration) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut known = port_names();
        loop {
            thread::sleep(interval);
            let current = port_names();
            if current != known {
                log::info!("MIDI ports changed: {:?}", current);
                known = current;
                if sender.send(PipelineMessage::MidiDevicesChanged).is_err() {
                    break;
                }
            }
        }
    })
}

impl MidiPlatform for MidirPlatform {
    fn request_access(&mut self) -> Result<()> {
        MidiInput::new(CLIENT_NAME)
            .map(|_| ())
            .map_err(|err| Error::Midi(err.to_string()))
    }

    fn devices(&mut self) -> Vec<MidiDeviceInfo> {
        port_names()
            .into_iter()
            .enumerate()
            .map(|(index, name)| MidiDeviceInfo { index, name })
            .collect()
    }

    fn open(&mut self, device: &MidiDeviceInfo, sender: Sender<PipelineMessage>, generation: u64) -> Result<()> {
        self.close();

        let midi_in = MidiInput::new(CLIENT_NAME).map_err(|err| Error::Midi(err.to_string()))?;
        let port = midi_in
            .ports()
            .into_iter()
            .find(|port| midi_in.port_name(port).map(|name| name == device.name).unwrap_or(false))
            .ok_or_else(|| Error::Midi(format!("MIDI port '{}' not found", device.name)))?;

        let connection = midi_in
            .connect(
                &port,
                "chordtheorem-read-input",
                move |_stamp, message, _| {
                    let msg = PipelineMessage::MidiInput {
                        generation,
                        bytes: message.to_vec(),
                    };
                    sender.send(msg).ok();
                },
                (),
            )
            .map_err(|err| Error::Midi(format!("Failed to connect to MIDI port: {}", err)))?;

        self.connection = Some(connection);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}
