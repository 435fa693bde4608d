//! cpal output stream that renders the shared audio graph.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Sample, SampleFormat, Stream};

use crate::core::synth::AudioGraph;
use crate::error::{Error, Result};

/// The default output device and its preferred configuration
pub struct OutputDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: SampleFormat,
}

impl OutputDevice {
    pub fn open_default() -> Result<Self> {
        let host = cpal::default_host();
        log::info!("Using audio host: {}", host.id().name());

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("No output device available".to_string()))?;
        log::info!("Using output device: {:?}", device.name());

        let config = device
            .default_output_config()
            .map_err(|err| Error::Audio(err.to_string()))?;
        log::debug!("Device config: {:?}", config);

        Ok(Self {
            device,
            sample_format: config.sample_format(),
            config: config.into(),
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.config.sample_rate.0 as f32
    }

    /// Start a stream that pulls every block from `graph`
    pub fn play(&self, graph: Arc<Mutex<AudioGraph>>) -> Result<Stream> {
        let stream = match self.sample_format {
            SampleFormat::F32 => create_stream::<f32>(&self.device, &self.config, graph),
            SampleFormat::I16 => create_stream::<i16>(&self.device, &self.config, graph),
            SampleFormat::U16 => create_stream::<u16>(&self.device, &self.config, graph),
            other => Err(Error::Audio(format!("Unsupported sample format {:?}", other))),
        }?;
        stream.play().map_err(|err| Error::Audio(err.to_string()))?;
        log::info!("Audio stream started");
        Ok(stream)
    }
}

fn create_stream<T>(device: &cpal::Device, config: &cpal::StreamConfig, graph: Arc<Mutex<AudioGraph>>) -> Result<Stream>
where
    T: Sample + Send + 'static + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let err_fn = |err| log::error!("an error occurred on the audio stream: {}", err);
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels.max(1);
                mono.resize(frames, 0.0);
                match graph.lock() {
                    Ok(mut graph) => graph.render(&mut mono),
                    Err(_) => mono.iter_mut().for_each(|s| *s = 0.0),
                }

                for (frame, value) in data.chunks_mut(channels.max(1)).zip(&mono) {
                    let value_t = T::from_sample(*value);
                    for sample in frame.iter_mut() {
                        *sample = value_t;
                    }
                }
            },
            err_fn,
            None,
        )
        .map_err(|err| Error::Audio(err.to_string()))
}
