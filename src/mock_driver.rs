//! Scripted driver used by the unit tests. Records every call.

use crate::block_capture::BlockRequest;
use crate::channel_config::ChannelConfig;
use crate::driver::{
    ChannelId, DataRequest, DriverCall, DriverFault, OverflowFlags, RawBlock, ScopeDriver,
    TimebaseInfo,
};
use crate::trigger_config::SimpleTrigger;

#[derive(Debug)]
pub struct MockDriver {
    model: String,
    max_index: u32,
    valid_from: Option<u32>,
    timebase_failures: Vec<(u32, DriverFault)>,
    zero_capacity_below: u32,
    max_samples: u32,
    failing_calls: Vec<(DriverCall, DriverFault)>,
    polls_until_ready: u32,
    polls: u32,
    overflow: OverflowFlags,
    truncate_to: Option<u32>,
    omitted_channel: Option<ChannelId>,
    calls: Vec<DriverCall>,
    pub applied_channels: Vec<ChannelConfig>,
    pub applied_trigger: Option<SimpleTrigger>,
    pub armed: Option<(BlockRequest, u32)>,
    pub last_data_request: Option<DataRequest>,
}

impl MockDriver {
    pub const DEFAULT_MAX_SAMPLES: u32 = 1_000_000;
    pub const MAX_ADC: i16 = 32512;

    pub fn new() -> Self {
        Self {
            model: "MOCK".to_string(),
            max_index: 1_000,
            valid_from: Some(0),
            timebase_failures: Vec::new(),
            zero_capacity_below: 0,
            max_samples: Self::DEFAULT_MAX_SAMPLES,
            failing_calls: Vec::new(),
            polls_until_ready: 0,
            polls: 0,
            overflow: OverflowFlags::empty(),
            truncate_to: None,
            omitted_channel: None,
            calls: Vec::new(),
            applied_channels: Vec::new(),
            applied_trigger: None,
            armed: None,
            last_data_request: None,
        }
    }

    pub fn interval_for(index: u32) -> f64 {
        f64::from(index + 1) * 2.0
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn valid_timebases_from(mut self, index: u32) -> Self {
        self.valid_from = Some(index);
        self
    }

    pub fn reject_all_timebases(mut self) -> Self {
        self.valid_from = None;
        self
    }

    pub fn max_timebase_index(mut self, index: u32) -> Self {
        self.max_index = index;
        self
    }

    pub fn fail_timebase_at(mut self, index: u32, fault: DriverFault) -> Self {
        self.timebase_failures.push((index, fault));
        self
    }

    pub fn zero_capacity_below(mut self, index: u32) -> Self {
        self.zero_capacity_below = index;
        self
    }

    pub fn fail_on(mut self, call: DriverCall, fault: DriverFault) -> Self {
        self.failing_calls.push((call, fault));
        self
    }

    pub fn ready_after_polls(mut self, polls: u32) -> Self {
        self.polls_until_ready = polls;
        self
    }

    pub fn overflow_on(mut self, channel: ChannelId) -> Self {
        self.overflow.insert(channel);
        self
    }

    pub fn truncate_to(mut self, samples: u32) -> Self {
        self.truncate_to = Some(samples);
        self
    }

    pub fn omit_channel(mut self, channel: ChannelId) -> Self {
        self.omitted_channel = Some(channel);
        self
    }

    pub fn calls(&self) -> &[DriverCall] {
        &self.calls
    }

    pub fn calls_to(&self, call: DriverCall) -> usize {
        self.calls.iter().filter(|c| **c == call).count()
    }

    fn record(&mut self, call: DriverCall) -> Result<(), DriverFault> {
        self.calls.push(call);
        match self.failing_calls.iter().find(|(c, _)| *c == call) {
            Some((_, fault)) => Err(*fault),
            None => Ok(()),
        }
    }
}

impl ScopeDriver for MockDriver {
    fn instrument_model(&self) -> &str {
        &self.model
    }

    fn max_timebase_index(&self) -> u32 {
        self.max_index
    }

    fn max_adc_value(&self) -> i16 {
        Self::MAX_ADC
    }

    fn set_channel(&mut self, config: &ChannelConfig) -> Result<(), DriverFault> {
        self.record(DriverCall::SetChannel)?;
        self.applied_channels.push(*config);
        Ok(())
    }

    fn get_timebase(
        &mut self,
        index: u32,
        _segment_index: u32,
    ) -> Result<TimebaseInfo, DriverFault> {
        self.record(DriverCall::GetTimebase)?;
        if let Some((_, fault)) = self.timebase_failures.iter().find(|(i, _)| *i == index) {
            return Err(*fault);
        }
        match self.valid_from {
            Some(first) if index >= first => Ok(TimebaseInfo {
                interval_ns: Self::interval_for(index),
                max_samples: if index < self.zero_capacity_below {
                    0
                } else {
                    self.max_samples
                },
            }),
            _ => Err(DriverFault::InvalidTimebase),
        }
    }

    fn set_simple_trigger(&mut self, trigger: &SimpleTrigger) -> Result<(), DriverFault> {
        self.record(DriverCall::SetSimpleTrigger)?;
        self.applied_trigger = Some(*trigger);
        Ok(())
    }

    fn run_block(
        &mut self,
        request: &BlockRequest,
        timebase_index: u32,
    ) -> Result<(), DriverFault> {
        self.record(DriverCall::RunBlock)?;
        self.armed = Some((*request, timebase_index));
        self.polls = 0;
        Ok(())
    }

    fn is_ready(&mut self) -> Result<bool, DriverFault> {
        self.record(DriverCall::IsReady)?;
        self.polls += 1;
        Ok(self.polls > self.polls_until_ready)
    }

    fn wait_until_ready(&mut self) -> Result<(), DriverFault> {
        self.record(DriverCall::WaitUntilReady)?;
        self.polls = self.polls_until_ready + 1;
        Ok(())
    }

    fn get_block_data(&mut self, request: &DataRequest) -> Result<RawBlock, DriverFault> {
        self.record(DriverCall::GetBlockData)?;
        self.last_data_request = Some(request.clone());

        let num_samples = self
            .truncate_to
            .map_or(request.num_samples, |limit| limit.min(request.num_samples));
        let buffers = request
            .channels
            .iter()
            .filter(|channel| Some(**channel) != self.omitted_channel)
            .map(|channel| {
                let samples = (0..num_samples)
                    .map(|i| (i % 1000) as i16 + channel.index() as i16)
                    .collect();
                (*channel, samples)
            })
            .collect();

        Ok(RawBlock {
            num_samples,
            overflow: self.overflow,
            buffers,
        })
    }

    fn stop(&mut self) -> Result<(), DriverFault> {
        self.record(DriverCall::Stop)?;
        self.armed = None;
        Ok(())
    }
}
