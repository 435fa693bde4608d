use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rustfft::{num_complex::Complex, Fft, FftPlanner};

pub const FFT_SIZE: usize = 2048;
pub const SPECTRUM_BINS: usize = FFT_SIZE / 2;
pub const WAVEFORM_SIZE: usize = 1024;
/// Floor for silent bins, in dB
pub const MIN_DECIBELS: f32 = -140.0;

/// Ring of the most recent output samples, written by the audio callback and
/// read by the spectrum feed
#[derive(Clone)]
pub struct SampleTap {
    samples: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, block: &[f32]) {
        if let Ok(mut samples) = self.samples.lock() {
            for sample in block {
                if samples.len() == self.capacity {
                    samples.pop_front();
                }
                samples.push_back(*sample);
            }
        }
    }

    /// The latest `len` samples, oldest first, zero-padded at the front when
    /// fewer have been captured
    pub fn snapshot(&self, len: usize) -> Vec<f32> {
        let mut out = vec![0.0; len];
        if let Ok(samples) = self.samples.lock() {
            let available = samples.len().min(len);
            let skip = samples.len() - available;
            for (slot, sample) in out[len - available..].iter_mut().zip(samples.iter().skip(skip)) {
                *slot = *sample;
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.samples.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fixed-size spectrum and waveform snapshots of the instrument output,
/// refreshed once per display frame while a consumer is attached.
pub struct SpectrumFeed {
    tap: SampleTap,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    spectrum: Vec<f32>,
    waveform: Vec<f32>,
    running: bool,
}

impl SpectrumFeed {
    pub fn new(tap: SampleTap) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            tap,
            fft: planner.plan_fft_forward(FFT_SIZE),
            window: hann_window(FFT_SIZE),
            buffer: vec![Complex::new(0.0, 0.0); FFT_SIZE],
            spectrum: vec![MIN_DECIBELS; SPECTRUM_BINS],
            waveform: vec![0.0; WAVEFORM_SIZE],
            running: false,
        }
    }

    pub fn tap(&self) -> &SampleTap {
        &self.tap
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Detach the consumer; snapshots keep their last values
    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Refresh both snapshots. Returns false without touching them when no
    /// consumer is attached.
    pub fn on_frame(&mut self) -> bool {
        if !self.running {
            return false;
        }

        let samples = self.tap.snapshot(FFT_SIZE);
        for ((slot, sample), w) in self.buffer.iter_mut().zip(&samples).zip(&self.window) {
            *slot = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.buffer);

        // Hann coherent gain is 0.5, so a full-scale sine peaks near 0 dB
        let scale = 2.0 / (FFT_SIZE as f32 * 0.5);
        for (bin, value) in self.spectrum.iter_mut().zip(&self.buffer[..SPECTRUM_BINS]) {
            let magnitude = value.norm() * scale;
            *bin = if magnitude > 0.0 {
                (20.0 * magnitude.log10()).max(MIN_DECIBELS)
            } else {
                MIN_DECIBELS
            };
        }

        self.waveform.copy_from_slice(&samples[FFT_SIZE - WAVEFORM_SIZE..]);
        true
    }

    /// Magnitudes in dB, `SPECTRUM_BINS` long
    pub fn spectrum(&self) -> &[f32] {
        &self.spectrum
    }

    pub fn waveform(&self) -> &[f32] {
        &self.waveform
    }
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            let angle = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
            0.5 * (1.0 - angle.cos())
        })
        .collect()
}
