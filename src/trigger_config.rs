use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::driver::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdDirection {
    Above,
    Below,
    #[default]
    Rising,
    Falling,
    RisingOrFalling,
}

impl ThresholdDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Above => "above",
            Self::Below => "below",
            Self::Rising => "rising",
            Self::Falling => "falling",
            Self::RisingOrFalling => "rising or falling",
        }
    }
}

#[derive(Debug)]
pub struct SimpleTriggerBuilder {
    source: ChannelId,
    threshold_mv: f64,
    delay_samples: u32,
    auto_trigger_ms: u32,
}

impl SimpleTriggerBuilder {
    /// Fires by itself when no trigger event arrived within `timeout`.
    /// A zero timeout waits indefinitely.
    pub fn auto_trigger_after(mut self, timeout: Duration) -> Self {
        self.auto_trigger_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);
        self
    }

    pub fn wait_indefinitely(mut self) -> Self {
        self.auto_trigger_ms = 0;
        self
    }

    /// Sample delay between the trigger event and the trigger point.
    pub fn delay(mut self, samples: u32) -> Self {
        self.delay_samples = samples;
        self
    }

    pub fn rising_edge(self) -> SimpleTrigger {
        self.into_trigger(ThresholdDirection::Rising)
    }

    pub fn falling_edge(self) -> SimpleTrigger {
        self.into_trigger(ThresholdDirection::Falling)
    }

    pub fn either_edge(self) -> SimpleTrigger {
        self.into_trigger(ThresholdDirection::RisingOrFalling)
    }

    pub fn above(self) -> SimpleTrigger {
        self.into_trigger(ThresholdDirection::Above)
    }

    pub fn below(self) -> SimpleTrigger {
        self.into_trigger(ThresholdDirection::Below)
    }

    pub fn into_trigger(self, direction: ThresholdDirection) -> SimpleTrigger {
        SimpleTrigger {
            source: self.source,
            threshold_mv: self.threshold_mv,
            direction,
            delay_samples: self.delay_samples,
            auto_trigger_ms: self.auto_trigger_ms,
        }
    }
}

/// Edge or level trigger on exactly one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleTrigger {
    pub source: ChannelId,
    pub threshold_mv: f64,
    pub direction: ThresholdDirection,
    pub delay_samples: u32,
    /// 0 waits for a trigger event indefinitely.
    pub auto_trigger_ms: u32,
}

impl SimpleTrigger {
    pub const DEFAULT_AUTO_TRIGGER_MS: u32 = 1000;

    pub fn start_capturing_when(source: ChannelId, threshold_mv: f64) -> SimpleTriggerBuilder {
        SimpleTriggerBuilder {
            source,
            threshold_mv,
            delay_samples: 0,
            auto_trigger_ms: Self::DEFAULT_AUTO_TRIGGER_MS,
        }
    }

    pub fn waits_indefinitely(&self) -> bool {
        self.auto_trigger_ms == 0
    }

    pub fn auto_trigger_timeout(&self) -> Option<Duration> {
        (!self.waits_indefinitely()).then(|| Duration::from_millis(u64::from(self.auto_trigger_ms)))
    }
}
