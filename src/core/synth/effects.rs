use std::f32::consts::PI;

use crate::core::instrument::{EffectParams, EffectType, ParamValue};

/// Circular delay line with fractional reads
#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
}

impl DelayLine {
    fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples.max(2)],
            write: 0,
        }
    }

    fn read(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay_samples.clamp(1.0, (len - 1) as f32);
        let position = self.write as f32 - delay;
        let position = if position < 0.0 { position + len as f32 } else { position };
        let index = position.floor() as usize % len;
        let next = (index + 1) % len;
        let fraction = position - position.floor();
        self.buffer[index] * (1.0 - fraction) + self.buffer[next] * fraction
    }

    fn push(&mut self, value: f32) {
        self.buffer[self.write] = value;
        self.write = (self.write + 1) % self.buffer.len();
    }
}

struct Reverb {
    decay: f32,
    pre_delay: f32,
    pre: DelayLine,
    combs: Vec<(DelayLine, f32)>,
}

/// Comb lengths in seconds, mutually prime-ish to avoid ringing
const COMB_TIMES: [f32; 4] = [0.0297, 0.0371, 0.0411, 0.0437];

impl Reverb {
    fn new(sample_rate: f32) -> Self {
        let combs = COMB_TIMES
            .iter()
            .map(|t| (DelayLine::new((t * sample_rate) as usize + 2), *t))
            .collect();
        Self {
            decay: 1.5,
            pre_delay: 0.01,
            pre: DelayLine::new(sample_rate as usize + 2),
            combs,
        }
    }

    fn process(&mut self, input: f32, sample_rate: f32) -> f32 {
        self.pre.push(input);
        let delayed = self.pre.read(self.pre_delay * sample_rate);
        let mut sum = 0.0;
        for (line, time) in &mut self.combs {
            // Feedback for a 60dB fall over `decay` seconds
            let gain = 10f32.powf(-3.0 * *time / self.decay.max(0.1));
            let echo = line.read(*time * sample_rate);
            line.push(delayed + echo * gain);
            sum += echo;
        }
        sum / self.combs.len() as f32
    }
}

struct FeedbackDelay {
    delay_time: f32,
    feedback: f32,
    line: DelayLine,
}

impl FeedbackDelay {
    fn process(&mut self, input: f32, sample_rate: f32) -> f32 {
        let echo = self.line.read(self.delay_time * sample_rate);
        self.line.push(input + echo * self.feedback);
        echo
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FilterShape {
    LowPass,
    HighPass,
    BandPass,
    Notch,
}

/// RBJ cookbook biquad
struct Biquad {
    shape: FilterShape,
    frequency: f32,
    q: f32,
    b: [f32; 3],
    a: [f32; 2],
    x: [f32; 2],
    y: [f32; 2],
}

impl Biquad {
    fn new(sample_rate: f32) -> Self {
        let mut filter = Self {
            shape: FilterShape::LowPass,
            frequency: 1000.0,
            q: 1.0,
            b: [1.0, 0.0, 0.0],
            a: [0.0, 0.0],
            x: [0.0; 2],
            y: [0.0; 2],
        };
        filter.update(sample_rate);
        filter
    }

    fn update(&mut self, sample_rate: f32) {
        let frequency = self.frequency.clamp(10.0, sample_rate * 0.49);
        let omega = 2.0 * PI * frequency / sample_rate;
        let (sin, cos) = omega.sin_cos();
        let alpha = sin / (2.0 * self.q.max(0.01));

        let (b0, b1, b2) = match self.shape {
            FilterShape::LowPass => ((1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0),
            FilterShape::HighPass => ((1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0),
            FilterShape::BandPass => (alpha, 0.0, -alpha),
            FilterShape::Notch => (1.0, -2.0 * cos, 1.0),
        };
        let a0 = 1.0 + alpha;
        self.b = [b0 / a0, b1 / a0, b2 / a0];
        self.a = [(-2.0 * cos) / a0, (1.0 - alpha) / a0];
    }

    fn process(&mut self, input: f32) -> f32 {
        let output = self.b[0] * input + self.b[1] * self.x[0] + self.b[2] * self.x[1]
            - self.a[0] * self.y[0]
            - self.a[1] * self.y[1];
        self.x = [input, self.x[0]];
        self.y = [output, self.y[0]];
        output
    }
}

struct Chorus {
    frequency: f32,
    delay_time_ms: f32,
    depth: f32,
    lfo_phase: f32,
    line: DelayLine,
}

impl Chorus {
    fn process(&mut self, input: f32, sample_rate: f32) -> f32 {
        self.lfo_phase = (self.lfo_phase + self.frequency / sample_rate) % 1.0;
        let lfo = 0.5 + 0.5 * (2.0 * PI * self.lfo_phase).sin();
        let delay_ms = self.delay_time_ms * (1.0 + self.depth * lfo);
        self.line.push(input);
        self.line.read(delay_ms / 1000.0 * sample_rate)
    }
}

enum Stage {
    Reverb(Reverb),
    Delay(FeedbackDelay),
    Filter(Biquad),
    Distortion { amount: f32 },
    Chorus(Chorus),
    Bypass,
}

/// An effect unit in the software graph. It owns an input bus that voice
/// units mix into during a render pass.
pub struct EffectUnit {
    kind: EffectType,
    sample_rate: f32,
    wet: f32,
    stage: Stage,
    pub(crate) input: Vec<f32>,
}

impl EffectUnit {
    pub fn new(kind: EffectType, params: &EffectParams, sample_rate: f32) -> Self {
        let stage = match kind {
            EffectType::None => Stage::Bypass,
            EffectType::Reverb => Stage::Reverb(Reverb::new(sample_rate)),
            EffectType::Delay => Stage::Delay(FeedbackDelay {
                delay_time: 0.25,
                feedback: 0.4,
                line: DelayLine::new(sample_rate as usize + 2),
            }),
            EffectType::Filter => Stage::Filter(Biquad::new(sample_rate)),
            EffectType::Distortion => Stage::Distortion { amount: 0.4 },
            EffectType::Chorus => Stage::Chorus(Chorus {
                frequency: 1.5,
                delay_time_ms: 3.5,
                depth: 0.7,
                lfo_phase: 0.0,
                line: DelayLine::new((sample_rate * 0.05) as usize + 2),
            }),
        };
        let mut unit = Self {
            kind,
            sample_rate,
            wet: 1.0,
            stage,
            input: Vec::new(),
        };
        for (name, value) in params {
            unit.set_param(name, value);
        }
        unit
    }

    pub fn kind(&self) -> EffectType {
        self.kind
    }

    /// Apply a parameter; names the stage doesn't know are ignored
    pub fn set_param(&mut self, name: &str, value: &ParamValue) {
        let number = value.as_number().map(|n| n as f32);
        match (&mut self.stage, name, number) {
            (_, "wet", Some(n)) => self.wet = n.clamp(0.0, 1.0),
            (Stage::Reverb(r), "decay", Some(n)) => r.decay = n,
            (Stage::Reverb(r), "preDelay", Some(n)) => r.pre_delay = n,
            (Stage::Delay(d), "delayTime", Some(n)) => d.delay_time = n,
            (Stage::Delay(d), "feedback", Some(n)) => d.feedback = n,
            (Stage::Filter(f), "frequency", Some(n)) => {
                f.frequency = n;
                f.update(self.sample_rate);
            }
            (Stage::Filter(f), "Q", Some(n)) => {
                f.q = n;
                f.update(self.sample_rate);
            }
            (Stage::Filter(f), "type", None) => {
                f.shape = match value.as_text() {
                    Some("highpass") => FilterShape::HighPass,
                    Some("bandpass") => FilterShape::BandPass,
                    Some("notch") => FilterShape::Notch,
                    _ => FilterShape::LowPass,
                };
                f.update(self.sample_rate);
            }
            (Stage::Distortion { amount }, "distortion", Some(n)) => *amount = n,
            (Stage::Chorus(c), "frequency", Some(n)) => c.frequency = n,
            (Stage::Chorus(c), "delayTime", Some(n)) => c.delay_time_ms = n,
            (Stage::Chorus(c), "depth", Some(n)) => c.depth = n,
            _ => log::debug!("{} has no parameter {}", self.kind, name),
        }
    }

    /// Process the accumulated input bus into `out` (added, not overwritten)
    /// and clear the bus for the next pass
    pub fn render(&mut self, out: &mut [f32]) {
        self.input.resize(out.len(), 0.0);
        let sample_rate = self.sample_rate;
        for (dry, sample) in self.input.iter().zip(out.iter_mut()) {
            let processed = match &mut self.stage {
                Stage::Reverb(r) => r.process(*dry, sample_rate),
                Stage::Delay(d) => d.process(*dry, sample_rate),
                Stage::Filter(f) => f.process(*dry),
                Stage::Distortion { amount } => {
                    let drive = 1.0 + *amount * 20.0;
                    (dry * drive).tanh() / drive.tanh()
                }
                Stage::Chorus(c) => c.process(*dry, sample_rate),
                Stage::Bypass => *dry,
            };
            *sample += dry * (1.0 - self.wet) + processed * self.wet;
        }
        self.input.iter_mut().for_each(|s| *s = 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 48000.0;

    fn impulse_response(kind: EffectType, params: &[(&str, ParamValue)], len: usize) -> Vec<f32> {
        let mut map = kind.default_params();
        for (name, value) in params {
            map.insert(name.to_string(), value.clone());
        }
        let mut unit = EffectUnit::new(kind, &map, SR);
        unit.input = vec![0.0; len];
        unit.input[0] = 1.0;
        let mut out = vec![0.0; len];
        unit.render(&mut out);
        out
    }

    #[test]
    fn test_delay_echoes_after_delay_time() {
        let out = impulse_response(
            EffectType::Delay,
            &[("delayTime", ParamValue::Number(0.01)), ("wet", ParamValue::Number(1.0))],
            1000,
        );
        let echo_at = (0.01 * SR) as usize;
        assert!(out[echo_at].abs() > 0.5, "expected echo at {}", echo_at);
        assert!(out[10].abs() < 1e-6);
    }

    #[test]
    fn test_lowpass_attenuates_nyquist() {
        let mut map = EffectType::Filter.default_params();
        map.insert("frequency".into(), ParamValue::Number(200.0));
        let mut unit = EffectUnit::new(EffectType::Filter, &map, SR);
        let len = 4096;
        unit.input = (0..len).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let mut out = vec![0.0; len];
        unit.render(&mut out);
        let tail_peak = out[len / 2..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(tail_peak < 0.01, "peak {}", tail_peak);
    }

    #[test]
    fn test_dry_signal_passes_when_wet_is_zero() {
        let out = impulse_response(EffectType::Reverb, &[("wet", ParamValue::Number(0.0))], 64);
        assert_eq!(out[0], 1.0);
        assert!(out[1..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_input_bus_cleared_after_render() {
        let mut unit = EffectUnit::new(EffectType::Distortion, &EffectType::Distortion.default_params(), SR);
        unit.input = vec![0.5; 16];
        let mut out = vec![0.0; 16];
        unit.render(&mut out);
        assert!(unit.input.iter().all(|s| *s == 0.0));
        assert!(out.iter().all(|s| s.is_finite() && *s > 0.0));
    }
}
