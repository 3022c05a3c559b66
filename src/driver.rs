use std::fmt;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::block_capture::BlockRequest;
use crate::channel_config::ChannelConfig;
use crate::trigger_config::SimpleTrigger;

/// Analogue input channel of the digitizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ChannelId {
    A,
    B,
    C,
    D,
}

impl ChannelId {
    pub const ALL: [Self; 4] = [Self::A, Self::B, Self::C, Self::D];

    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::D => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "channel {}", self.as_str())
    }
}

/// Set of channels whose input range was exceeded during a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverflowFlags(u8);

impl OverflowFlags {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x0f)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn insert(&mut self, channel: ChannelId) {
        self.0 |= 1 << channel.index();
    }

    pub fn contains(self, channel: ChannelId) -> bool {
        self.0 & (1 << channel.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn channels(self) -> impl Iterator<Item = ChannelId> {
        ChannelId::ALL
            .into_iter()
            .filter(move |channel| self.contains(*channel))
    }
}

/// Non-OK status reported by the vendor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DriverFault {
    #[error("invalid timebase")]
    InvalidTimebase,

    #[error("driver status {0:#06x}")]
    Failure(u32),
}

/// Driver operation, used to tell which call produced a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverCall {
    SetChannel,
    GetTimebase,
    SetSimpleTrigger,
    RunBlock,
    IsReady,
    WaitUntilReady,
    GetBlockData,
    Stop,
}

impl DriverCall {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SetChannel => "set_channel",
            Self::GetTimebase => "get_timebase",
            Self::SetSimpleTrigger => "set_simple_trigger",
            Self::RunBlock => "run_block",
            Self::IsReady => "is_ready",
            Self::WaitUntilReady => "wait_until_ready",
            Self::GetBlockData => "get_block_data",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for DriverCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{call} failed: {fault}")]
pub struct DeviceCommunicationError {
    pub call: DriverCall,
    #[source]
    pub fault: DriverFault,
}

impl DeviceCommunicationError {
    pub fn new(call: DriverCall, fault: DriverFault) -> Self {
        Self { call, fault }
    }
}

/// Tags a driver result with the call that produced it.
pub(crate) trait WithCall<T> {
    fn during(self, call: DriverCall) -> Result<T, DeviceCommunicationError>;
}

impl<T> WithCall<T> for Result<T, DriverFault> {
    fn during(self, call: DriverCall) -> Result<T, DeviceCommunicationError> {
        self.map_err(|fault| DeviceCommunicationError::new(call, fault))
    }
}

/// Answer to a timebase query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimebaseInfo {
    pub interval_ns: f64,
    pub max_samples: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownsamplingMode {
    #[default]
    None,
    Aggregate,
    Decimate,
    Average,
}

/// Parameters of a `get_block_data` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRequest {
    pub start_index: u32,
    pub num_samples: u32,
    pub segment_index: u32,
    pub downsampling_ratio: u32,
    pub downsampling_mode: DownsamplingMode,
    pub channels: Vec<ChannelId>,
}

/// Raw buffers handed back by the driver.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawBlock {
    pub num_samples: u32,
    pub overflow: OverflowFlags,
    pub buffers: Vec<(ChannelId, Vec<i16>)>,
}

/// Capabilities the acquisition core needs from a vendor driver binding.
///
/// Every call maps onto one vendor SDK function. Implementations report any
/// non-OK status as a [`DriverFault`]; they never retry on their own.
pub trait ScopeDriver {
    /// Model identifier as reported by the instrument, e.g. `"5242D"`.
    fn instrument_model(&self) -> &str;

    /// Highest timebase index the driver accepts at all.
    fn max_timebase_index(&self) -> u32;

    /// ADC count corresponding to the full-scale value of the selected range.
    fn max_adc_value(&self) -> i16;

    fn set_channel(&mut self, config: &ChannelConfig) -> Result<(), DriverFault>;

    fn get_timebase(&mut self, index: u32, segment_index: u32)
        -> Result<TimebaseInfo, DriverFault>;

    /// Configures the single trigger source together with its auto-trigger timeout.
    fn set_simple_trigger(&mut self, trigger: &SimpleTrigger) -> Result<(), DriverFault>;

    fn run_block(&mut self, request: &BlockRequest, timebase_index: u32)
        -> Result<(), DriverFault>;

    fn is_ready(&mut self) -> Result<bool, DriverFault>;

    /// Blocks until the running capture completes.
    ///
    /// Bindings with a native blocking call should override this; the default
    /// falls back to polling [`ScopeDriver::is_ready`].
    fn wait_until_ready(&mut self) -> Result<(), DriverFault> {
        while !self.is_ready()? {
            thread::sleep(Duration::from_millis(1));
        }
        Ok(())
    }

    fn get_block_data(&mut self, request: &DataRequest) -> Result<RawBlock, DriverFault>;

    /// Returns the hardware to idle. Must be a no-op when nothing is running.
    fn stop(&mut self) -> Result<(), DriverFault>;
}
