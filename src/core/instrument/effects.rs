use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The effect stages that can sit between the voice unit and the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectType {
    None,
    Reverb,
    Delay,
    Filter,
    Distortion,
    Chorus,
}

pub const EFFECT_TYPES: [EffectType; 6] = [
    EffectType::None,
    EffectType::Reverb,
    EffectType::Delay,
    EffectType::Filter,
    EffectType::Distortion,
    EffectType::Chorus,
];

/// A parameter value as written by the user or stored in settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(t) => Some(t),
            ParamValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(t) => f.write_str(t),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl FromStr for ParamValue {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim().parse::<f64>() {
            Ok(n) => ParamValue::Number(n),
            Err(_) => ParamValue::Text(s.trim().to_string()),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    /// Inclusive numeric range
    Numeric { min: f64, max: f64, default: f64 },
    Choice { options: &'static [&'static str], default: &'static str },
}

/// One named, writable parameter of an effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

const fn numeric(name: &'static str, min: f64, max: f64, default: f64) -> ParamSpec {
    ParamSpec {
        name,
        kind: ParamKind::Numeric { min, max, default },
    }
}

pub const FILTER_TYPES: &[&str] = &["lowpass", "highpass", "bandpass", "notch"];

const REVERB_PARAMS: &[ParamSpec] = &[
    numeric("decay", 0.1, 10.0, 1.5),
    numeric("preDelay", 0.0, 1.0, 0.01),
    numeric("wet", 0.0, 1.0, 0.5),
];

const DELAY_PARAMS: &[ParamSpec] = &[
    numeric("delayTime", 0.0, 1.0, 0.25),
    numeric("feedback", 0.0, 0.95, 0.4),
    numeric("wet", 0.0, 1.0, 0.5),
];

const FILTER_PARAMS: &[ParamSpec] = &[
    numeric("frequency", 20.0, 20000.0, 1000.0),
    numeric("Q", 0.1, 20.0, 1.0),
    ParamSpec {
        name: "type",
        kind: ParamKind::Choice {
            options: FILTER_TYPES,
            default: "lowpass",
        },
    },
];

const DISTORTION_PARAMS: &[ParamSpec] = &[
    numeric("distortion", 0.0, 1.0, 0.4),
    numeric("wet", 0.0, 1.0, 1.0),
];

const CHORUS_PARAMS: &[ParamSpec] = &[
    numeric("frequency", 0.1, 10.0, 1.5),
    numeric("delayTime", 2.0, 20.0, 3.5),
    numeric("depth", 0.0, 1.0, 0.7),
    numeric("wet", 0.0, 1.0, 0.5),
];

pub type EffectParams = BTreeMap<String, ParamValue>;

impl EffectType {
    pub fn name(self) -> &'static str {
        match self {
            EffectType::None => "none",
            EffectType::Reverb => "reverb",
            EffectType::Delay => "delay",
            EffectType::Filter => "filter",
            EffectType::Distortion => "distortion",
            EffectType::Chorus => "chorus",
        }
    }

    /// Every parameter this effect exposes
    pub fn schema(self) -> &'static [ParamSpec] {
        match self {
            EffectType::None => &[],
            EffectType::Reverb => REVERB_PARAMS,
            EffectType::Delay => DELAY_PARAMS,
            EffectType::Filter => FILTER_PARAMS,
            EffectType::Distortion => DISTORTION_PARAMS,
            EffectType::Chorus => CHORUS_PARAMS,
        }
    }

    pub fn param(self, name: &str) -> Option<&'static ParamSpec> {
        self.schema().iter().find(|spec| spec.name == name)
    }

    pub fn default_params(self) -> EffectParams {
        self.schema()
            .iter()
            .map(|spec| {
                let value = match spec.kind {
                    ParamKind::Numeric { default, .. } => ParamValue::Number(default),
                    ParamKind::Choice { default, .. } => ParamValue::Text(default.to_string()),
                };
                (spec.name.to_string(), value)
            })
            .collect()
    }

    /// Check a write against the schema. Returns the value to store, or
    /// `None` if the effect has no such parameter or the value doesn't fit.
    pub fn validate(self, name: &str, value: &ParamValue) -> Option<ParamValue> {
        let spec = self.param(name)?;
        match (spec.kind, value) {
            (ParamKind::Numeric { min, max, .. }, ParamValue::Number(n)) if n.is_finite() && (min..=max).contains(n) => {
                Some(ParamValue::Number(*n))
            }
            (ParamKind::Choice { options, .. }, ParamValue::Text(t)) => {
                let lowered = t.to_ascii_lowercase();
                options
                    .iter()
                    .find(|o| **o == lowered)
                    .map(|o| ParamValue::Text(o.to_string()))
            }
            _ => None,
        }
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EffectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        EFFECT_TYPES
            .iter()
            .copied()
            .find(|t| t.name() == wanted)
            .ok_or_else(|| Error::UnknownEffect(s.to_string()))
    }
}
