use serde::{Serialize, Deserialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeStage {
    Attack,
    Decay,
    Sustain,
    Release,
    Idle,
}

/// ADSR envelope, times in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Envelope {
    pub const fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self { attack, decay, sustain, release }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(0.005, 0.1, 0.3, 1.0)
    }
}

/// Running envelope of one voice
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeState {
    pub stage: EnvelopeStage,
    pub time_in_stage: f32,
    /// Level when release began, so early releases fade from where they are
    release_from: f32,
    level: f32,
}

impl EnvelopeState {
    pub fn triggered() -> Self {
        Self {
            stage: EnvelopeStage::Attack,
            time_in_stage: 0.0,
            release_from: 0.0,
            level: 0.0,
        }
    }

    pub fn release(&mut self) {
        if !matches!(self.stage, EnvelopeStage::Release | EnvelopeStage::Idle) {
            self.release_from = self.level;
            self.stage = EnvelopeStage::Release;
            self.time_in_stage = 0.0;
        }
    }

    pub fn is_idle(&self) -> bool {
        self.stage == EnvelopeStage::Idle
    }

    pub fn is_releasing(&self) -> bool {
        self.stage == EnvelopeStage::Release
    }

    /// Advance by `dt` seconds and return the new level
    pub fn advance(&mut self, env: &Envelope, dt: f32) -> f32 {
        self.time_in_stage += dt;
        self.level = match self.stage {
            EnvelopeStage::Attack => {
                let value = if env.attack > 0.0 { self.time_in_stage / env.attack } else { 1.0 };
                if value >= 1.0 {
                    self.stage = EnvelopeStage::Decay;
                    self.time_in_stage = 0.0;
                    1.0
                } else {
                    value
                }
            },
            EnvelopeStage::Decay => {
                let value = 1.0 - (1.0 - env.sustain) * (self.time_in_stage / env.decay.max(1e-4));
                if value <= env.sustain {
                    self.stage = EnvelopeStage::Sustain;
                    self.time_in_stage = 0.0;
                    env.sustain
                } else {
                    value
                }
            },
            EnvelopeStage::Sustain => env.sustain,
            EnvelopeStage::Release => {
                let value = self.release_from * (1.0 - self.time_in_stage / env.release.max(1e-4));
                if value <= 0.0 {
                    self.stage = EnvelopeStage::Idle;
                    0.0
                } else {
                    value
                }
            },
            EnvelopeStage::Idle => 0.0,
        };
        self.level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adsr_runs_to_idle() {
        let env = Envelope::new(0.01, 0.01, 0.5, 0.01);
        let mut state = EnvelopeState::triggered();
        let dt = 0.001;
        for _ in 0..30 {
            state.advance(&env, dt);
        }
        assert_eq!(state.stage, EnvelopeStage::Sustain);
        assert!((state.advance(&env, dt) - 0.5).abs() < 1e-6);

        state.release();
        for _ in 0..20 {
            state.advance(&env, dt);
        }
        assert!(state.is_idle());
    }

    #[test]
    fn test_release_during_attack_fades_from_current_level() {
        let env = Envelope::new(1.0, 0.1, 0.8, 0.1);
        let mut state = EnvelopeState::triggered();
        let level = state.advance(&env, 0.25);
        state.release();
        assert!(state.advance(&env, 0.0) <= level);
    }
}
