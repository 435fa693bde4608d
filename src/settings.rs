use std::fs::File;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::instrument::{EffectParams, EffectType, InstrumentConfig, InstrumentType};
use crate::core::note::{PitchClass, DEFAULT_VELOCITY};
use crate::error::{Error, Result};

const APP_DIR: &str = "chordtheorem";
const SETTINGS_FILE: &str = "settings.json";

/// Start-up preferences, read once from the user's config directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub instrument: InstrumentType,
    pub effect: EffectType,
    pub effect_params: EffectParams,
    pub ui_velocity: f32,
    pub preferred_midi_port: Option<String>,
    pub key: String,
    pub master_volume: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            instrument: InstrumentType::Poly,
            effect: EffectType::None,
            effect_params: EffectParams::new(),
            ui_velocity: DEFAULT_VELOCITY,
            preferred_midi_port: None,
            key: "C".to_string(),
            master_volume: 0.5,
        }
    }
}

impl Settings {
    pub fn settings_dir() -> Result<PathBuf> {
        let mut path = dirs::config_dir().ok_or(Error::NoConfigDir)?;
        path.push(APP_DIR);
        Ok(path)
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::settings_dir()?.join(SETTINGS_FILE))
    }

    /// Settings from the default location, or defaults when there is no file
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let file = File::open(path)?;
            Ok(serde_json::from_reader(file)?)
        } else {
            log::debug!("No settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn instrument_config(&self) -> InstrumentConfig {
        InstrumentConfig {
            instrument: self.instrument,
            effect: self.effect,
            effect_params: self.effect_params.clone(),
        }
    }

    /// The configured tonic; an unreadable name falls back to C
    pub fn tonic(&self) -> PitchClass {
        self.key.parse().unwrap_or_else(|err| {
            log::warn!("Ignoring key setting: {}", err);
            PitchClass::C
        })
    }

    pub fn ui_velocity(&self) -> f32 {
        self.ui_velocity.clamp(0.0, 1.0)
    }
}
