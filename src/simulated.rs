//! In-process digitizer that follows the PicoScope 5000 series 8-bit
//! timebase rules and samples a synthetic sine per channel.

use std::f64::consts::PI;

use crate::block_capture::BlockRequest;
use crate::channel_config::{ChannelConfig, Coupling};
use crate::driver::{
    ChannelId, DataRequest, DownsamplingMode, DriverFault, OverflowFlags, RawBlock, ScopeDriver,
    TimebaseInfo,
};
use crate::model_profile::{ModelProfile, ModelProfileTable};
use crate::trigger_config::{SimpleTrigger, ThresholdDirection};

/// Status codes reported by the simulator.
pub mod status {
    pub const INVALID_CHANNEL: u32 = 0x0c;
    pub const INVALID_PARAMETER: u32 = 0x0d;
    pub const TOO_MANY_SAMPLES: u32 = 0x0e;
    pub const NOT_RUNNING: u32 = 0x1f;
    pub const NOT_READY: u32 = 0x24;
    pub const SEGMENT_OUT_OF_RANGE: u32 = 0x4b;
}

/// Test signal fed into one input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalSource {
    pub frequency_hz: f64,
    pub amplitude_mv: f64,
    pub offset_mv: f64,
}

impl SignalSource {
    pub fn sine(frequency_hz: f64, amplitude_mv: f64) -> Self {
        Self {
            frequency_hz,
            amplitude_mv,
            offset_mv: 0.0,
        }
    }

    pub fn offset(mut self, offset_mv: f64) -> Self {
        self.offset_mv = offset_mv;
        self
    }

    fn sample(&self, phase: f64, seconds: f64, coupling: Coupling) -> f64 {
        let dc = if coupling == Coupling::Ac {
            0.0
        } else {
            self.offset_mv
        };
        dc + self.amplitude_mv * (2.0 * PI * self.frequency_hz * seconds + phase).sin()
    }

    /// Phase that puts a matching threshold crossing at t = 0, or `None` when
    /// the signal never reaches the threshold and the auto trigger fires.
    fn trigger_phase(&self, trigger: &SimpleTrigger, coupling: Coupling) -> Option<f64> {
        let dc = if coupling == Coupling::Ac {
            0.0
        } else {
            self.offset_mv
        };
        if self.amplitude_mv <= 0.0 {
            return None;
        }
        let ratio = (trigger.threshold_mv - dc) / self.amplitude_mv;
        if !(-1.0..=1.0).contains(&ratio) {
            return None;
        }
        let rising = ratio.asin();
        Some(match trigger.direction {
            ThresholdDirection::Falling | ThresholdDirection::Below => PI - rising,
            _ => rising,
        })
    }
}

impl Default for SignalSource {
    fn default() -> Self {
        Self::sine(1_000_000.0, 1_000.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SimState {
    Idle,
    Running {
        request: BlockRequest,
        interval_ns: f64,
        polls_left: u32,
    },
    Ready {
        request: BlockRequest,
        interval_ns: f64,
    },
}

#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    model: String,
    channel_count: usize,
    memory_samples: u32,
    segments: u32,
    polls_until_ready: u32,
    signals: [SignalSource; 4],
    channels: [Option<ChannelConfig>; 4],
    trigger: Option<SimpleTrigger>,
    auto_triggered: bool,
    state: SimState,
}

impl SimulatedDriver {
    pub const MAX_ADC: i16 = 32512;
    pub const DEFAULT_MEMORY_SAMPLES: u32 = 1_000_000;

    /// Takes the number of inputs from the built-in profile of `model`.
    pub fn new(model: &str) -> Self {
        Self::with_profile(model, ModelProfileTable::builtin().lookup(model))
    }

    pub fn with_profile(model: &str, profile: &ModelProfile) -> Self {
        Self {
            model: model.to_string(),
            channel_count: profile.channel_count.clamp(1, ChannelId::ALL.len()),
            memory_samples: Self::DEFAULT_MEMORY_SAMPLES,
            segments: 1,
            polls_until_ready: 0,
            signals: [SignalSource::default(); 4],
            channels: [None; 4],
            trigger: None,
            auto_triggered: false,
            state: SimState::Idle,
        }
    }

    pub fn memory_samples(mut self, samples: u32) -> Self {
        self.memory_samples = samples;
        self
    }

    pub fn segments(mut self, segments: u32) -> Self {
        self.segments = segments.max(1);
        self
    }

    pub fn ready_after_polls(mut self, polls: u32) -> Self {
        self.polls_until_ready = polls;
        self
    }

    pub fn signal(mut self, channel: ChannelId, source: SignalSource) -> Self {
        self.signals[channel.index()] = source;
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn trigger(&self) -> Option<&SimpleTrigger> {
        self.trigger.as_ref()
    }

    /// Whether the last block started without a matching threshold crossing.
    pub fn auto_triggered(&self) -> bool {
        self.auto_triggered
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.state, SimState::Idle)
    }

    /// Sample interval of a timebase index in 8-bit mode.
    pub fn timebase_interval_ns(index: u32) -> f64 {
        if index < 3 {
            f64::from(1u32 << index)
        } else {
            f64::from(index - 2) * 8.0
        }
    }

    fn enabled_channels(&self) -> usize {
        self.channels
            .iter()
            .flatten()
            .filter(|config| config.enabled)
            .count()
    }

    /// Fastest timebase the ADC supports with the enabled channel count.
    fn min_timebase(&self) -> u32 {
        match self.enabled_channels() {
            0 | 1 => 0,
            2 => 1,
            _ => 2,
        }
    }

    fn check_channel(&self, channel: ChannelId) -> Result<(), DriverFault> {
        if channel.index() >= self.channel_count {
            return Err(DriverFault::Failure(status::INVALID_CHANNEL));
        }
        Ok(())
    }

    fn check_timebase(&self, index: u32, segment_index: u32) -> Result<TimebaseInfo, DriverFault> {
        if segment_index >= self.segments {
            return Err(DriverFault::Failure(status::SEGMENT_OUT_OF_RANGE));
        }
        if index < self.min_timebase() {
            return Err(DriverFault::InvalidTimebase);
        }
        Ok(TimebaseInfo {
            interval_ns: Self::timebase_interval_ns(index),
            max_samples: self.memory_samples / self.segments,
        })
    }
}

impl ScopeDriver for SimulatedDriver {
    fn instrument_model(&self) -> &str {
        &self.model
    }

    fn max_timebase_index(&self) -> u32 {
        u32::MAX
    }

    fn max_adc_value(&self) -> i16 {
        Self::MAX_ADC
    }

    fn set_channel(&mut self, config: &ChannelConfig) -> Result<(), DriverFault> {
        self.check_channel(config.channel)?;
        if config.analogue_offset_v.abs() * 1_000.0 > config.range.millivolts() {
            return Err(DriverFault::Failure(status::INVALID_PARAMETER));
        }
        self.channels[config.channel.index()] = Some(*config);
        Ok(())
    }

    fn get_timebase(
        &mut self,
        index: u32,
        segment_index: u32,
    ) -> Result<TimebaseInfo, DriverFault> {
        self.check_timebase(index, segment_index)
    }

    fn set_simple_trigger(&mut self, trigger: &SimpleTrigger) -> Result<(), DriverFault> {
        self.check_channel(trigger.source)?;
        self.trigger = Some(*trigger);
        Ok(())
    }

    fn run_block(
        &mut self,
        request: &BlockRequest,
        timebase_index: u32,
    ) -> Result<(), DriverFault> {
        let info = self.check_timebase(timebase_index, request.segment_index)?;
        if request.total_samples() > u64::from(info.max_samples) {
            return Err(DriverFault::Failure(status::TOO_MANY_SAMPLES));
        }
        if self.enabled_channels() == 0 {
            return Err(DriverFault::Failure(status::INVALID_CHANNEL));
        }

        self.auto_triggered = match self.trigger {
            Some(trigger) => match self.channels[trigger.source.index()] {
                Some(config) => self.signals[trigger.source.index()]
                    .trigger_phase(&trigger, config.coupling)
                    .is_none(),
                None => true,
            },
            None => false,
        };
        if self.auto_triggered {
            log::debug!("Simulated trigger never fires, auto trigger releases the block");
        }

        log::debug!(
            "Simulated block: {} + {} samples at {} ns",
            request.pre_trigger_samples,
            request.post_trigger_samples,
            info.interval_ns
        );
        self.state = SimState::Running {
            request: *request,
            interval_ns: info.interval_ns,
            polls_left: self.polls_until_ready,
        };
        Ok(())
    }

    fn is_ready(&mut self) -> Result<bool, DriverFault> {
        match self.state {
            SimState::Idle => Err(DriverFault::Failure(status::NOT_RUNNING)),
            SimState::Running {
                request,
                interval_ns,
                polls_left,
            } => {
                if polls_left == 0 {
                    self.state = SimState::Ready {
                        request,
                        interval_ns,
                    };
                    Ok(true)
                } else {
                    self.state = SimState::Running {
                        request,
                        interval_ns,
                        polls_left: polls_left - 1,
                    };
                    Ok(false)
                }
            }
            SimState::Ready { .. } => Ok(true),
        }
    }

    fn wait_until_ready(&mut self) -> Result<(), DriverFault> {
        match self.state {
            SimState::Idle => Err(DriverFault::Failure(status::NOT_RUNNING)),
            SimState::Running {
                request,
                interval_ns,
                ..
            } => {
                self.state = SimState::Ready {
                    request,
                    interval_ns,
                };
                Ok(())
            }
            SimState::Ready { .. } => Ok(()),
        }
    }

    fn get_block_data(&mut self, request: &DataRequest) -> Result<RawBlock, DriverFault> {
        let SimState::Ready {
            request: block,
            interval_ns,
        } = self.state
        else {
            return Err(DriverFault::Failure(status::NOT_READY));
        };
        if request.downsampling_ratio != 1 || request.downsampling_mode != DownsamplingMode::None {
            return Err(DriverFault::Failure(status::INVALID_PARAMETER));
        }
        if request.segment_index != block.segment_index {
            return Err(DriverFault::Failure(status::SEGMENT_OUT_OF_RANGE));
        }

        let captured = block.total_samples() as u32;
        let start = request.start_index.min(captured);
        let num_samples = request.num_samples.min(captured - start);
        let pre = f64::from(block.pre_trigger_samples);

        let mut overflow = OverflowFlags::empty();
        let mut buffers = Vec::with_capacity(request.channels.len());
        for &channel in &request.channels {
            self.check_channel(channel)?;
            let config = self.channels[channel.index()]
                .filter(|config| config.enabled)
                .ok_or(DriverFault::Failure(status::INVALID_CHANNEL))?;
            let source = self.signals[channel.index()];
            let phase = self
                .trigger
                .filter(|trigger| trigger.source == channel)
                .and_then(|trigger| source.trigger_phase(&trigger, config.coupling))
                .unwrap_or(0.0);
            let offset_mv = config.analogue_offset_v * 1_000.0;
            let range_mv = config.range.millivolts();

            let samples: Vec<i16> = (start..start + num_samples)
                .map(|n| {
                    let seconds = (f64::from(n) - pre) * interval_ns * 1e-9;
                    let mv = source.sample(phase, seconds, config.coupling) + offset_mv;
                    if mv.abs() > range_mv {
                        overflow.insert(channel);
                    }
                    config.range.millivolts_to_adc(mv, Self::MAX_ADC)
                })
                .collect();
            buffers.push((channel, samples));
        }

        Ok(RawBlock {
            num_samples,
            overflow,
            buffers,
        })
    }

    fn stop(&mut self) -> Result<(), DriverFault> {
        if self.is_running() {
            log::trace!("Simulated device stopped");
        }
        self.state = SimState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_config::VoltageRange;

    fn data_request(num_samples: u32, channels: Vec<ChannelId>) -> DataRequest {
        DataRequest {
            start_index: 0,
            num_samples,
            segment_index: 0,
            downsampling_ratio: 1,
            downsampling_mode: DownsamplingMode::None,
            channels,
        }
    }

    #[test]
    fn test_timebase_intervals() {
        assert_eq!(SimulatedDriver::timebase_interval_ns(0), 1.0);
        assert_eq!(SimulatedDriver::timebase_interval_ns(2), 4.0);
        assert_eq!(SimulatedDriver::timebase_interval_ns(3), 8.0);
        assert_eq!(SimulatedDriver::timebase_interval_ns(10), 64.0);
    }

    #[test]
    fn test_fast_timebases_need_fewer_channels() {
        let mut driver = SimulatedDriver::new("5444D");
        for channel in ChannelId::ALL {
            driver.set_channel(&ChannelConfig::new(channel)).unwrap();
        }
        assert_eq!(driver.get_timebase(1, 0), Err(DriverFault::InvalidTimebase));
        assert!(driver.get_timebase(2, 0).is_ok());

        driver.set_channel(&ChannelConfig::disabled(ChannelId::C)).unwrap();
        driver.set_channel(&ChannelConfig::disabled(ChannelId::D)).unwrap();
        assert!(driver.get_timebase(1, 0).is_ok());
    }

    #[test]
    fn test_two_channel_model_rejects_channel_c() {
        let mut driver = SimulatedDriver::new("5242D");
        assert_eq!(driver.channel_count(), 2);
        assert_eq!(
            driver.set_channel(&ChannelConfig::new(ChannelId::C)),
            Err(DriverFault::Failure(status::INVALID_CHANNEL))
        );
    }

    #[test]
    fn test_channel_count_follows_profile() {
        assert_eq!(SimulatedDriver::new("6404D").channel_count(), 4);
        assert_eq!(SimulatedDriver::new("5444D").channel_count(), 4);
        assert_eq!(SimulatedDriver::new("5243D MSO").channel_count(), 2);
        assert_eq!(SimulatedDriver::new("unknown").channel_count(), 2);

        let profile = ModelProfile {
            channel_count: 4,
            ..ModelProfile::default()
        };
        let mut driver = SimulatedDriver::with_profile("custom", &profile);
        assert!(driver.set_channel(&ChannelConfig::new(ChannelId::D)).is_ok());
    }

    #[test]
    fn test_segments_split_memory() {
        let mut driver = SimulatedDriver::new("5242D")
            .memory_samples(1_000)
            .segments(4);
        assert_eq!(driver.get_timebase(0, 3).unwrap().max_samples, 250);
        assert_eq!(
            driver.get_timebase(0, 4),
            Err(DriverFault::Failure(status::SEGMENT_OUT_OF_RANGE))
        );
    }

    #[test]
    fn test_is_ready_requires_running_block() {
        let mut driver = SimulatedDriver::new("5242D");
        assert_eq!(
            driver.is_ready(),
            Err(DriverFault::Failure(status::NOT_RUNNING))
        );
        assert!(driver.stop().is_ok());
        assert!(!driver.is_running());
    }

    #[test]
    fn test_block_data_and_overflow() {
        let mut driver = SimulatedDriver::new("5242D")
            .signal(ChannelId::A, SignalSource::sine(1e6, 500.0))
            .signal(ChannelId::B, SignalSource::sine(1e6, 3_000.0))
            .ready_after_polls(1);
        driver
            .set_channel(&ChannelConfig::new(ChannelId::A).range(VoltageRange::V1))
            .unwrap();
        driver
            .set_channel(&ChannelConfig::new(ChannelId::B).range(VoltageRange::V2))
            .unwrap();
        driver
            .set_simple_trigger(
                &SimpleTrigger::start_capturing_when(ChannelId::A, 0.0).rising_edge(),
            )
            .unwrap();
        driver.run_block(&BlockRequest::new(100, 100), 2).unwrap();

        assert_eq!(
            driver.get_block_data(&data_request(200, vec![ChannelId::A])),
            Err(DriverFault::Failure(status::NOT_READY))
        );
        assert!(!driver.is_ready().unwrap());
        assert!(driver.is_ready().unwrap());

        let block = driver
            .get_block_data(&data_request(500, vec![ChannelId::A, ChannelId::B]))
            .unwrap();
        assert_eq!(block.num_samples, 200);
        assert_eq!(block.buffers[0].1.len(), 200);
        assert!(!block.overflow.contains(ChannelId::A));
        assert!(block.overflow.contains(ChannelId::B));

        // rising zero crossing sits on the trigger point
        let a = &block.buffers[0].1;
        assert!(a[100].abs() <= 1);
        assert!(a[101] > 0);
        let peak = a.iter().copied().max().unwrap();
        assert!((i32::from(peak) - 16256).abs() <= 4);
    }

    #[test]
    fn test_trigger_phase() {
        let source = SignalSource::sine(1e3, 1_000.0).offset(200.0);
        let rising = SimpleTrigger::start_capturing_when(ChannelId::A, 700.0).rising_edge();
        let phase = source.trigger_phase(&rising, Coupling::Dc1M).unwrap();
        assert!((source.sample(phase, 0.0, Coupling::Dc1M) - 700.0).abs() < 1e-9);

        let falling = SimpleTrigger::start_capturing_when(ChannelId::A, 700.0).falling_edge();
        let phase = source.trigger_phase(&falling, Coupling::Dc1M).unwrap();
        assert!((source.sample(phase, 0.0, Coupling::Dc1M) - 700.0).abs() < 1e-9);
        assert!(source.sample(phase, 1e-6, Coupling::Dc1M) < 700.0);

        let unreachable = SimpleTrigger::start_capturing_when(ChannelId::A, 1_500.0).rising_edge();
        assert_eq!(source.trigger_phase(&unreachable, Coupling::Dc1M), None);
    }
}
