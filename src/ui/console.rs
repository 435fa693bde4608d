//! Line-oriented console front end: parses commands into pipeline messages
//! and renders pipeline state as text.

use crate::core::instrument::{InstrumentBackend, ParamValue, EFFECT_TYPES, INSTRUMENT_TYPES};
use crate::core::midi::{MidiPlatform, MidiStatus};
use crate::core::note::{Note, PitchClass};
use crate::core::theory::ChordSymbol;
use crate::error::{Error, Result};
use crate::messaging::PipelineMessage;
use crate::pipeline::Pipeline;

/// Octave a chord symbol is voiced in for `chord <symbol>`
const CHORD_OCTAVE: i8 = 4;

#[derive(Debug, Clone)]
pub enum Command {
    Send(PipelineMessage),
    Status,
    Devices,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  play <note>              strike one note, e.g. play C4
  down <key> <note>        press an on-screen key
  up <key> <note>          release an on-screen key
  chord <note>... | <sym>  play notes together, e.g. chord C4 E4 G4 or chord Am
  add <chord>              append a chord to the progression
  suggest <n>              add and play suggestion n (1-based)
  clear                    clear the progression
  key [tonic]              set the key, or show it
  detect                   detect the key from the progression
  instrument <type>        switch the instrument
  effect <type>            switch the effect
  param <name> <value>     set a parameter on the active effect
  devices                  list MIDI inputs
  midi <name>              select a MIDI input
  status                   show the current state
  quit";

pub fn parse_command(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return Err(Error::InvalidCommand("empty command".to_string()));
    };
    let args: Vec<&str> = words.collect();
    let usage = |text: &str| Error::InvalidCommand(format!("usage: {}", text));

    let msg = match (head.to_ascii_lowercase().as_str(), args.as_slice()) {
        ("play", [note]) => PipelineMessage::PlayNote(note.parse()?),
        ("play", _) => return Err(usage("play <note>")),
        ("down", [key, note]) => PipelineMessage::UiKeyDown {
            key: key.to_string(),
            note: note.parse()?,
        },
        ("up", [key, note]) => PipelineMessage::UiKeyUp {
            key: key.to_string(),
            note: note.parse()?,
        },
        ("down" | "up", _) => return Err(usage("down|up <key> <note>")),
        ("chord", []) => return Err(usage("chord <note>... | chord <symbol>")),
        ("chord", notes) => PipelineMessage::PlayChord(parse_chord_notes(notes)?),
        ("add", [chord]) => PipelineMessage::AddChord(chord.to_string()),
        ("add", _) => return Err(usage("add <chord>")),
        ("suggest", [n]) => match n.parse::<usize>() {
            Ok(n) if n >= 1 => PipelineMessage::AddSuggestion(n - 1),
            _ => return Err(usage("suggest <n>, counting from 1")),
        },
        ("clear", []) => PipelineMessage::ClearProgression,
        ("key", []) => return Ok(Command::Status),
        ("key", [tonic]) => PipelineMessage::SetKey(tonic.parse::<PitchClass>()?),
        ("detect", []) => PipelineMessage::AutoDetectKey,
        ("instrument", [kind]) => PipelineMessage::SwitchInstrument(kind.parse()?),
        ("effect", [kind]) => PipelineMessage::SwitchEffect(kind.parse()?),
        ("param", [name, value]) => {
            let value: ParamValue = match value.parse() {
                Ok(value) => value,
                Err(never) => match never {},
            };
            PipelineMessage::UpdateEffectParam(name.to_string(), value)
        }
        ("param", _) => return Err(usage("param <name> <value>")),
        ("midi", []) => return Err(usage("midi <device name>")),
        ("midi", name) => PipelineMessage::SelectMidiDevice(name.join(" ")),
        ("devices", []) => return Ok(Command::Devices),
        ("status", []) => return Ok(Command::Status),
        ("help" | "?", _) => return Ok(Command::Help),
        ("quit" | "exit", []) => return Ok(Command::Quit),
        _ => return Err(Error::InvalidCommand(format!("unknown command `{}`, try `help`", line.trim()))),
    };
    Ok(Command::Send(msg))
}

/// Either a list of notes or a single chord symbol voiced in octave 4
fn parse_chord_notes(args: &[&str]) -> Result<Vec<Note>> {
    let notes: Result<Vec<Note>> = args.iter().map(|a| a.parse()).collect();
    match (notes, args) {
        (Ok(notes), _) => Ok(notes),
        (Err(err), [symbol]) => {
            let chord: ChordSymbol = symbol.parse().map_err(|_| err)?;
            chord
                .voicing(CHORD_OCTAVE)
                .ok_or_else(|| Error::InvalidChordSymbol(symbol.to_string()))
        }
        (Err(err), _) => Err(err),
    }
}

fn join<T: std::fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "-".to_string();
    }
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" ")
}

pub fn render_status<B: InstrumentBackend, P: MidiPlatform>(pipeline: &Pipeline<B, P>) -> String {
    let config = pipeline.instruments().config();
    let engine = pipeline.engine();

    let params: Vec<String> = config.effect_params.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    let chord = engine.current_chord().map_or("-".to_string(), |c| c.to_string());
    let suggestions: Vec<String> = engine
        .suggestions()
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{}:{}", i + 1, c))
        .collect();
    let diatonic: Vec<String> = engine
        .diatonic_chords()
        .iter()
        .map(|d| format!("{}={}", d.numeral, d.chord))
        .collect();

    let midi = pipeline.midi();
    let midi_line = match (midi.status(), midi.selected()) {
        (MidiStatus::Connected, Some(name)) => format!("connected to {}", name),
        _ if !midi.is_available() => "unavailable".to_string(),
        _ => "disconnected".to_string(),
    };

    let mut lines = vec![
        format!("instrument  {}", config.instrument),
        format!("effect      {} {}", config.effect, params.join(" ")),
        format!("key         {} major", engine.key().name()),
        format!("notes       {}", join(&engine.note_window())),
        format!("chord       {}", chord),
        format!("progression {}", join(&engine.progression())),
        format!("suggestions {}", join(&suggestions)),
        format!("diatonic    {}", diatonic.join(" ")),
        format!("midi        {}", midi_line),
    ];

    let spectrum = pipeline.spectrum().spectrum();
    if let Some((bin, db)) = spectrum
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
    {
        lines.push(format!("spectrum    peak bin {} at {:.1} dB", bin, db));
    }
    lines.join("\n")
}

pub fn render_devices<B: InstrumentBackend, P: MidiPlatform>(pipeline: &Pipeline<B, P>) -> String {
    let midi = pipeline.midi();
    if !midi.is_available() {
        return "MIDI is not available".to_string();
    }
    if midi.devices().is_empty() {
        return "no MIDI inputs".to_string();
    }
    midi.devices()
        .iter()
        .map(|d| {
            let marker = if midi.selected() == Some(d.name.as_str()) { "*" } else { " " };
            format!("{} {}: {}", marker, d.index, d.name)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_help() -> String {
    let instruments: Vec<&str> = INSTRUMENT_TYPES.iter().map(|t| t.name()).collect();
    let effects: Vec<&str> = EFFECT_TYPES.iter().map(|e| e.name()).collect();
    format!(
        "{}\ninstruments: {}\neffects: {}",
        HELP,
        instruments.join(" "),
        effects.join(" ")
    )
}
