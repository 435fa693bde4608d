use std::fs::{self, File};
use std::io::BufRead;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{unbounded, RecvTimeoutError};

use chord_theorem::audio::OutputDevice;
use chord_theorem::core::analyzer::{SampleTap, FFT_SIZE};
use chord_theorem::core::instrument::InstrumentBackend;
use chord_theorem::core::midi::{self, MidiPlatform, MidirPlatform};
use chord_theorem::core::synth::{AudioGraph, SoftwareBackend};
use chord_theorem::messaging::PipelineMessage;
use chord_theorem::ui::{self, Command};
use chord_theorem::{Pipeline, Settings};

/// Display frame interval for the spectrum feed
const FRAME: Duration = Duration::from_millis(33);
const MAX_MESSAGES_PER_FRAME: usize = 256;
const DEVICE_POLL: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    env_logger::init();
    log::info!("Starting ChordTheorem");

    if std::env::args().any(|arg| arg == "--write-default-settings") {
        return write_default_settings();
    }

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(err) => {
            log::warn!("Could not load settings, using defaults: {}", err);
            Settings::default()
        }
    };

    let output = OutputDevice::open_default().context("Failed to open audio output")?;
    let tap = SampleTap::new(FFT_SIZE);
    let mut graph = AudioGraph::new(output.sample_rate());
    graph.set_volume(settings.master_volume);
    graph.set_tap(tap.clone());
    let graph = Arc::new(Mutex::new(graph));
    let _stream = output
        .play(Arc::clone(&graph))
        .context("Failed to start audio stream")?;

    let mut pipeline = Pipeline::new(SoftwareBackend::new(graph), MidirPlatform::new(), tap, &settings);
    pipeline.start_midi();
    let _watcher = midi::watch_devices(pipeline.sender(), DEVICE_POLL);
    pipeline.spectrum_mut().start();

    let (line_tx, line_rx) = unbounded::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("{}", ui::render_help());
    loop {
        let now = Instant::now();
        let wait = pipeline
            .next_deadline()
            .map(|due| due.saturating_duration_since(now).min(FRAME))
            .unwrap_or(FRAME);

        match line_rx.recv_timeout(wait) {
            Ok(line) => run_command(&mut pipeline, &line),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Input closed");
                pipeline.post(PipelineMessage::Shutdown);
            }
        }

        let now = Instant::now();
        pipeline.process_messages(MAX_MESSAGES_PER_FRAME, now);
        pipeline.tick(now);
        pipeline.process_messages(MAX_MESSAGES_PER_FRAME, now);
        pipeline.on_frame();

        if !pipeline.is_running() {
            break;
        }
    }

    pipeline.shutdown();
    Ok(())
}

fn run_command<B: InstrumentBackend, P: MidiPlatform>(pipeline: &mut Pipeline<B, P>, line: &str) {
    if line.trim().is_empty() {
        return;
    }
    match ui::parse_command(line) {
        Ok(Command::Send(msg)) => {
            pipeline.post(msg);
            pipeline.process_messages(MAX_MESSAGES_PER_FRAME, Instant::now());
        }
        Ok(Command::Status) => println!("{}", ui::render_status(pipeline)),
        Ok(Command::Devices) => println!("{}", ui::render_devices(pipeline)),
        Ok(Command::Help) => println!("{}", ui::render_help()),
        Ok(Command::Quit) => pipeline.post(PipelineMessage::Shutdown),
        Err(err) => eprintln!("{}", err),
    }
}

fn write_default_settings() -> Result<()> {
    let path = Settings::default_path()?;
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    }
    let file = File::create(&path)?;
    serde_json::to_writer_pretty(file, &Settings::default())?;
    println!("Wrote {}", path.display());
    Ok(())
}
