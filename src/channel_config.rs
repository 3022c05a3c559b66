use serde::{Deserialize, Serialize};

use crate::driver::ChannelId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Coupling {
    /// DC coupled, 1 MΩ input impedance.
    #[default]
    Dc1M,
    /// DC coupled, 50 Ω input impedance.
    Dc50R,
    Ac,
}

impl Coupling {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dc1M => "DC 1M",
            Self::Dc50R => "DC 50R",
            Self::Ac => "AC",
        }
    }
}

/// Full-scale input range, symmetric around the analogue offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VoltageRange {
    Mv10,
    Mv20,
    Mv50,
    Mv100,
    Mv200,
    Mv500,
    V1,
    #[default]
    V2,
    V5,
    V10,
    V20,
    V50,
}

impl VoltageRange {
    pub fn millivolts(self) -> f64 {
        match self {
            Self::Mv10 => 10.0,
            Self::Mv20 => 20.0,
            Self::Mv50 => 50.0,
            Self::Mv100 => 100.0,
            Self::Mv200 => 200.0,
            Self::Mv500 => 500.0,
            Self::V1 => 1_000.0,
            Self::V2 => 2_000.0,
            Self::V5 => 5_000.0,
            Self::V10 => 10_000.0,
            Self::V20 => 20_000.0,
            Self::V50 => 50_000.0,
        }
    }

    pub fn adc_to_millivolts(self, raw: i16, max_adc: i16) -> f64 {
        f64::from(raw) * self.millivolts() / f64::from(max_adc)
    }

    /// Converts to ADC counts, saturating at the range limits.
    pub fn millivolts_to_adc(self, millivolts: f64, max_adc: i16) -> i16 {
        let max = f64::from(max_adc);
        (millivolts / self.millivolts() * max)
            .round()
            .clamp(-max, max) as i16
    }

    pub fn contains(self, millivolts: f64) -> bool {
        millivolts.abs() <= self.millivolts()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BandwidthLimit {
    #[default]
    Full,
    MHz20,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelConfig {
    pub channel: ChannelId,
    pub enabled: bool,
    pub coupling: Coupling,
    pub range: VoltageRange,
    pub analogue_offset_v: f64,
    pub bandwidth: BandwidthLimit,
}

impl ChannelConfig {
    /// Enabled channel with default coupling, range and bandwidth.
    pub fn new(channel: ChannelId) -> Self {
        Self {
            channel,
            enabled: true,
            coupling: Coupling::default(),
            range: VoltageRange::default(),
            analogue_offset_v: 0.0,
            bandwidth: BandwidthLimit::default(),
        }
    }

    pub fn disabled(channel: ChannelId) -> Self {
        Self {
            enabled: false,
            ..Self::new(channel)
        }
    }

    pub fn coupling(mut self, coupling: Coupling) -> Self {
        self.coupling = coupling;
        self
    }

    pub fn range(mut self, range: VoltageRange) -> Self {
        self.range = range;
        self
    }

    pub fn analogue_offset(mut self, volts: f64) -> Self {
        self.analogue_offset_v = volts;
        self
    }

    pub fn bandwidth(mut self, bandwidth: BandwidthLimit) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    /// Lowest and highest input voltage the channel can measure. The analogue
    /// offset is added before the ADC, so it shifts the window the other way.
    pub fn input_window_mv(&self) -> (f64, f64) {
        let range = self.range.millivolts();
        let offset = self.analogue_offset_v * 1_000.0;
        (-range - offset, range - offset)
    }

    pub fn measures(&self, millivolts: f64) -> bool {
        let (low, high) = self.input_window_mv();
        (low..=high).contains(&millivolts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ChannelConfig::new(ChannelId::B)
            .coupling(Coupling::Ac)
            .range(VoltageRange::Mv500)
            .analogue_offset(0.1)
            .bandwidth(BandwidthLimit::MHz20);

        assert!(config.enabled);
        assert_eq!(config.channel, ChannelId::B);
        assert_eq!(config.coupling, Coupling::Ac);
        assert_eq!(config.range, VoltageRange::Mv500);
        assert_eq!(config.bandwidth, BandwidthLimit::MHz20);
        assert!(!ChannelConfig::disabled(ChannelId::C).enabled);
    }

    #[test]
    fn test_adc_conversion() {
        let range = VoltageRange::V2;
        assert_eq!(range.adc_to_millivolts(32512, 32512), 2_000.0);
        assert_eq!(range.adc_to_millivolts(-16256, 32512), -1_000.0);
        assert_eq!(range.millivolts_to_adc(1_000.0, 32512), 16256);
        assert_eq!(range.millivolts_to_adc(5_000.0, 32512), 32512);
        assert_eq!(range.millivolts_to_adc(-5_000.0, 32512), -32512);
    }

    #[test]
    fn test_offset_shifts_input_window() {
        let centred = ChannelConfig::new(ChannelId::A).range(VoltageRange::V1);
        assert_eq!(centred.input_window_mv(), (-1_000.0, 1_000.0));

        let shifted = centred.analogue_offset(-0.5);
        assert_eq!(shifted.input_window_mv(), (-500.0, 1_500.0));
        assert!(shifted.measures(1_200.0));
        assert!(!shifted.measures(-800.0));
        assert!(!centred.measures(1_200.0));
    }

    #[test]
    fn test_range_contains() {
        assert!(VoltageRange::Mv500.contains(-500.0));
        assert!(!VoltageRange::Mv500.contains(500.5));
    }
}
