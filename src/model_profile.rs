use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::channel_config::{ChannelConfig, Coupling, VoltageRange};
use crate::driver::ChannelId;
use crate::trigger_config::{SimpleTrigger, ThresholdDirection};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed profile table: {0}")]
    Json(#[from] serde_json::Error),
}

/// Acquisition defaults for one instrument model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    /// Analogue inputs fitted, counted from channel A.
    #[serde(default = "default_channel_count")]
    pub channel_count: usize,
    pub range: VoltageRange,
    pub coupling: Coupling,
    pub threshold_mv: f64,
    #[serde(default)]
    pub direction: ThresholdDirection,
    pub timebase_index: u32,
    #[serde(default = "default_auto_trigger_ms")]
    pub auto_trigger_ms: u32,
}

fn default_channel_count() -> usize {
    2
}

fn default_auto_trigger_ms() -> u32 {
    SimpleTrigger::DEFAULT_AUTO_TRIGGER_MS
}

impl Default for ModelProfile {
    fn default() -> Self {
        Self {
            channel_count: default_channel_count(),
            range: VoltageRange::V2,
            coupling: Coupling::Dc1M,
            threshold_mv: 500.0,
            direction: ThresholdDirection::Rising,
            timebase_index: 2,
            auto_trigger_ms: SimpleTrigger::DEFAULT_AUTO_TRIGGER_MS,
        }
    }
}

impl ModelProfile {
    pub fn has_channel(&self, channel: ChannelId) -> bool {
        channel.index() < self.channel_count
    }

    pub fn channel_config(&self, channel: ChannelId) -> ChannelConfig {
        ChannelConfig::new(channel)
            .coupling(self.coupling)
            .range(self.range)
    }

    pub fn trigger(&self, channel: ChannelId) -> SimpleTrigger {
        SimpleTrigger {
            source: channel,
            threshold_mv: self.threshold_mv,
            direction: self.direction,
            delay_samples: 0,
            auto_trigger_ms: self.auto_trigger_ms,
        }
    }
}

/// Model identifier to [`ModelProfile`] lookup with a fallback entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfileTable {
    #[serde(default)]
    pub default: ModelProfile,
    #[serde(default)]
    pub models: BTreeMap<String, ModelProfile>,
}

impl Default for ModelProfileTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelProfileTable {
    /// Defaults for the PicoScope 5000D and 6000 families.
    pub fn builtin() -> Self {
        let two_channel = ModelProfile::default();
        let four_channel = ModelProfile {
            channel_count: 4,
            range: VoltageRange::V1,
            threshold_mv: 250.0,
            ..ModelProfile::default()
        };
        let mso = ModelProfile {
            range: VoltageRange::V5,
            threshold_mv: 1_000.0,
            timebase_index: 3,
            ..ModelProfile::default()
        };
        let four_channel_mso = ModelProfile {
            channel_count: 4,
            ..mso
        };
        let high_speed = ModelProfile {
            channel_count: 4,
            range: VoltageRange::Mv500,
            threshold_mv: 100.0,
            timebase_index: 1,
            ..ModelProfile::default()
        };

        let mut models = BTreeMap::new();
        for model in ["5242D", "5243D", "5244D"] {
            models.insert(model.to_string(), two_channel);
        }
        for model in ["5442D", "5443D", "5444D"] {
            models.insert(model.to_string(), four_channel);
        }
        for model in ["5242D MSO", "5243D MSO", "5244D MSO"] {
            models.insert(model.to_string(), mso);
        }
        for model in ["5442D MSO", "5443D MSO", "5444D MSO"] {
            models.insert(model.to_string(), four_channel_mso);
        }
        for model in ["6402C", "6403C", "6404C", "6402D", "6403D", "6404D"] {
            models.insert(model.to_string(), high_speed);
        }

        Self {
            default: ModelProfile::default(),
            models,
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ProfileError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn to_json_string(&self) -> Result<String, ProfileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Exact match first, then the longest key the model starts with, then the default.
    pub fn lookup(&self, model: &str) -> &ModelProfile {
        let model = model.trim();
        if let Some(profile) = self.models.get(model) {
            return profile;
        }

        self.models
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map_or(&self.default, |(key, profile)| {
                log::debug!("No profile for model {}, using {}", model, key);
                profile
            })
    }
}
