use std::thread;
use std::time::Duration;

use polars::prelude::*;

use crate::channel_config::{ChannelConfig, VoltageRange};
use crate::driver::{
    ChannelId, DataRequest, DeviceCommunicationError, DownsamplingMode, DriverCall,
    OverflowFlags, ScopeDriver, WithCall,
};
use crate::timebase::ResolvedTimebase;
use crate::trigger_config::SimpleTrigger;

pub const TIME_COLUMN_NAME: &str = "time_ns";

/// Samples to capture either side of the trigger point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    pub pre_trigger_samples: u32,
    pub post_trigger_samples: u32,
    pub segment_index: u32,
}

impl BlockRequest {
    pub fn new(pre_trigger_samples: u32, post_trigger_samples: u32) -> Self {
        Self {
            pre_trigger_samples,
            post_trigger_samples,
            segment_index: 0,
        }
    }

    /// Splits `total` samples evenly around the trigger point.
    pub fn centred(total: u32) -> Self {
        let pre = total / 2;
        Self::new(pre, total - pre)
    }

    pub fn segment(mut self, segment_index: u32) -> Self {
        self.segment_index = segment_index;
        self
    }

    pub fn total_samples(&self) -> u64 {
        u64::from(self.pre_trigger_samples) + u64::from(self.post_trigger_samples)
    }
}

/// How the session waits for the device to finish a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionMode {
    /// Hand the wait to the driver's blocking call.
    #[default]
    Blocking,
    /// Poll the ready flag, sleeping `interval` between polls.
    Polling { interval: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureConfigError {
    #[error("No samples requested")]
    NoSamplesRequested,

    #[error("Requested {requested} samples but the timebase allows at most {max}")]
    SampleBudgetExceeded { requested: u64, max: u32 },

    #[error("No channel enabled")]
    NoChannelEnabled,

    #[error("{0} is configured more than once")]
    DuplicateChannel(ChannelId),

    #[error("Trigger source {0} is not an enabled channel")]
    TriggerSourceDisabled(ChannelId),

    #[error("Trigger threshold {threshold_mv} mV is outside the {low_mv} mV to {high_mv} mV input window of {channel}")]
    ThresholdOutOfRange {
        channel: ChannelId,
        threshold_mv: f64,
        low_mv: f64,
        high_mv: f64,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("Invalid capture configuration: {0}")]
    Config(#[from] CaptureConfigError),

    #[error("Device communication failed: {0}")]
    Device(#[from] DeviceCommunicationError),

    #[error("Driver returned no data for {channel}")]
    MissingChannelData { channel: ChannelId },
}

/// Raw ADC samples of one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSamples {
    pub channel: ChannelId,
    pub range: VoltageRange,
    pub samples: Vec<i16>,
}

impl ChannelSamples {
    pub fn millivolts(&self, max_adc: i16) -> Vec<f64> {
        self.samples
            .iter()
            .map(|&raw| self.range.adc_to_millivolts(raw, max_adc))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureResult {
    pub channels: Vec<ChannelSamples>,
    pub num_samples_returned: usize,
    pub overflow: OverflowFlags,
    pub interval_ns: f64,
    pub pre_trigger_samples: u32,
    pub max_adc_value: i16,
}

impl CaptureResult {
    pub fn channel(&self, channel: ChannelId) -> Option<&ChannelSamples> {
        self.channels.iter().find(|c| c.channel == channel)
    }

    pub fn millivolts(&self, channel: ChannelId) -> Option<Vec<f64>> {
        self.channel(channel)
            .map(|samples| samples.millivolts(self.max_adc_value))
    }

    pub fn overflowed(&self, channel: ChannelId) -> bool {
        self.overflow.contains(channel)
    }

    /// Time relative to the trigger point plus raw and millivolt columns per channel.
    pub fn to_lazy_frame(&self) -> Result<LazyFrame, PolarsError> {
        let mut columns: Vec<Column> = Vec::with_capacity(self.channels.len() * 2);
        let mut selection = vec![col(TIME_COLUMN_NAME)];

        for samples in &self.channels {
            let raw_name = format!("raw_{}", samples.channel.as_str());
            let mv_name = format!("mv_{}", samples.channel.as_str());

            let raw: Vec<i32> = samples.samples.iter().map(|&s| i32::from(s)).collect();
            columns.push(Column::new(raw_name.as_str().into(), raw));
            columns.push(Column::new(
                mv_name.as_str().into(),
                samples.millivolts(self.max_adc_value),
            ));
            selection.push(col(raw_name.as_str()));
            selection.push(col(mv_name.as_str()));
        }

        let df = DataFrame::new(columns)?
            .lazy()
            .with_row_index("row_index", Some(0))
            .with_columns([((col("row_index").cast(DataType::Float64)
                - lit(f64::from(self.pre_trigger_samples)))
                * lit(self.interval_ns))
            .alias(TIME_COLUMN_NAME)])
            .select(selection);

        Ok(df)
    }
}

/// Checks a capture request against the resolved timebase before anything
/// is sent to the device.
pub fn validate_request(
    channels: &[ChannelConfig],
    trigger: &SimpleTrigger,
    request: &BlockRequest,
    timebase: &ResolvedTimebase,
) -> Result<(), CaptureConfigError> {
    let requested = request.total_samples();
    if requested == 0 {
        return Err(CaptureConfigError::NoSamplesRequested);
    }
    if requested > u64::from(timebase.max_samples) {
        return Err(CaptureConfigError::SampleBudgetExceeded {
            requested,
            max: timebase.max_samples,
        });
    }

    for (i, config) in channels.iter().enumerate() {
        if channels[..i].iter().any(|c| c.channel == config.channel) {
            return Err(CaptureConfigError::DuplicateChannel(config.channel));
        }
    }
    if !channels.iter().any(|c| c.enabled) {
        return Err(CaptureConfigError::NoChannelEnabled);
    }

    let source = channels
        .iter()
        .find(|c| c.enabled && c.channel == trigger.source)
        .ok_or(CaptureConfigError::TriggerSourceDisabled(trigger.source))?;
    if !source.measures(trigger.threshold_mv) {
        let (low_mv, high_mv) = source.input_window_mv();
        return Err(CaptureConfigError::ThresholdOutOfRange {
            channel: source.channel,
            threshold_mv: trigger.threshold_mv,
            low_mv,
            high_mv,
        });
    }

    Ok(())
}

fn stop_after_failure<D: ScopeDriver + ?Sized>(driver: &mut D) {
    if let Err(fault) = driver.stop() {
        log::warn!("Failed to stop device after aborted capture: {}", fault);
    }
}

#[derive(Debug, Clone)]
struct RetrievalPlan {
    request: BlockRequest,
    channels: Vec<(ChannelId, VoltageRange)>,
    interval_ns: f64,
    max_adc_value: i16,
}

/// One block capture against an exclusively borrowed driver.
pub struct BlockCaptureSession<'d, D: ScopeDriver + ?Sized> {
    driver: &'d mut D,
    timebase: ResolvedTimebase,
    mode: AcquisitionMode,
}

impl<'d, D: ScopeDriver + ?Sized> BlockCaptureSession<'d, D> {
    pub fn new(driver: &'d mut D, timebase: ResolvedTimebase) -> Self {
        Self {
            driver,
            timebase,
            mode: AcquisitionMode::default(),
        }
    }

    pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn timebase(&self) -> &ResolvedTimebase {
        &self.timebase
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// Returns the device to idle. Safe to call when nothing is running.
    pub fn stop(&mut self) -> Result<(), DeviceCommunicationError> {
        self.driver.stop().during(DriverCall::Stop)
    }

    /// Configures, runs and retrieves one block, waiting according to the
    /// session's [`AcquisitionMode`]. The device is stopped exactly once on
    /// every path out of this call.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(
            timebase = self.timebase.index,
            pre = request.pre_trigger_samples,
            post = request.post_trigger_samples,
        )
    )]
    pub fn capture(
        &mut self,
        channels: &[ChannelConfig],
        trigger: &SimpleTrigger,
        request: &BlockRequest,
    ) -> Result<CaptureResult, CaptureError> {
        let mode = self.mode;
        let mut running = self.start(channels, trigger, request)?;
        // dropping `running` stops the device
        running.wait(mode)?;
        running.collect()
    }

    /// Configures the device and starts the capture without waiting for it.
    pub fn start(
        &mut self,
        channels: &[ChannelConfig],
        trigger: &SimpleTrigger,
        request: &BlockRequest,
    ) -> Result<RunningBlock<'_, D>, CaptureError> {
        match self.arm(channels, trigger, request) {
            Ok(plan) => Ok(RunningBlock {
                driver: &mut *self.driver,
                plan,
                finished: false,
            }),
            Err(err) => {
                stop_after_failure(&mut *self.driver);
                Err(err)
            }
        }
    }

    fn arm(
        &mut self,
        channels: &[ChannelConfig],
        trigger: &SimpleTrigger,
        request: &BlockRequest,
    ) -> Result<RetrievalPlan, CaptureError> {
        validate_request(channels, trigger, request, &self.timebase)?;

        for config in channels {
            log::debug!(
                "Configuring {}: enabled={}, {}, {:?}, offset {} V",
                config.channel,
                config.enabled,
                config.coupling.as_str(),
                config.range,
                config.analogue_offset_v
            );
            self.driver
                .set_channel(config)
                .during(DriverCall::SetChannel)?;
        }

        log::debug!(
            "Trigger on {} at {} mV ({}), auto trigger {} ms",
            trigger.source,
            trigger.threshold_mv,
            trigger.direction.as_str(),
            trigger.auto_trigger_ms
        );
        self.driver
            .set_simple_trigger(trigger)
            .during(DriverCall::SetSimpleTrigger)?;

        self.driver
            .run_block(request, self.timebase.index)
            .during(DriverCall::RunBlock)?;

        Ok(RetrievalPlan {
            request: *request,
            channels: channels
                .iter()
                .filter(|c| c.enabled)
                .map(|c| (c.channel, c.range))
                .collect(),
            interval_ns: self.timebase.interval_ns,
            max_adc_value: self.driver.max_adc_value(),
        })
    }
}

/// A started capture. Dropping it before [`RunningBlock::collect`] or
/// [`RunningBlock::cancel`] stops the device.
pub struct RunningBlock<'a, D: ScopeDriver + ?Sized> {
    driver: &'a mut D,
    plan: RetrievalPlan,
    finished: bool,
}

impl<D: ScopeDriver + ?Sized> RunningBlock<'_, D> {
    pub fn is_ready(&mut self) -> Result<bool, CaptureError> {
        Ok(self.driver.is_ready().during(DriverCall::IsReady)?)
    }

    pub fn wait(&mut self, mode: AcquisitionMode) -> Result<(), CaptureError> {
        match mode {
            AcquisitionMode::Blocking => {
                self.driver
                    .wait_until_ready()
                    .during(DriverCall::WaitUntilReady)?;
            }
            AcquisitionMode::Polling { interval } => {
                while !self.is_ready()? {
                    thread::sleep(interval);
                }
            }
        }
        Ok(())
    }

    /// Retrieves the captured buffers and stops the device.
    pub fn collect(mut self) -> Result<CaptureResult, CaptureError> {
        let retrieved = self.retrieve();
        let stopped = self.finish();

        match (retrieved, stopped) {
            (Ok(result), Ok(())) => Ok(result),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(stop_err)) => {
                log::warn!("Failed to stop device after failed retrieval: {}", stop_err);
                Err(err)
            }
        }
    }

    /// Abandons the capture.
    pub fn cancel(mut self) -> Result<(), CaptureError> {
        Ok(self.finish()?)
    }

    fn finish(&mut self) -> Result<(), DeviceCommunicationError> {
        self.finished = true;
        self.driver.stop().during(DriverCall::Stop)
    }

    fn retrieve(&mut self) -> Result<CaptureResult, CaptureError> {
        let plan = &self.plan;
        let requested = plan.request.total_samples() as u32;
        let data_request = DataRequest {
            start_index: 0,
            num_samples: requested,
            segment_index: plan.request.segment_index,
            downsampling_ratio: 1,
            downsampling_mode: DownsamplingMode::None,
            channels: plan.channels.iter().map(|(channel, _)| *channel).collect(),
        };

        let mut raw = self
            .driver
            .get_block_data(&data_request)
            .during(DriverCall::GetBlockData)?;

        let mut channels = Vec::with_capacity(plan.channels.len());
        for &(channel, range) in &plan.channels {
            let position = raw
                .buffers
                .iter()
                .position(|(id, _)| *id == channel)
                .ok_or(CaptureError::MissingChannelData { channel })?;
            let (_, samples) = raw.buffers.swap_remove(position);
            channels.push(ChannelSamples {
                channel,
                range,
                samples,
            });
        }

        let num_samples_returned = channels
            .iter()
            .map(|c| c.samples.len())
            .fold(raw.num_samples.min(requested) as usize, usize::min);
        for samples in &mut channels {
            samples.samples.truncate(num_samples_returned);
        }
        if num_samples_returned < requested as usize {
            log::warn!(
                "Device returned {} of {} requested samples",
                num_samples_returned,
                requested
            );
        }

        let mut overflow = OverflowFlags::empty();
        for &(channel, _) in &plan.channels {
            if raw.overflow.contains(channel) {
                log::warn!("Input range exceeded on {}", channel);
                overflow.insert(channel);
            }
        }

        log::debug!(
            "Retrieved {} samples from {} channel(s)",
            num_samples_returned,
            channels.len()
        );

        Ok(CaptureResult {
            channels,
            num_samples_returned,
            overflow,
            interval_ns: plan.interval_ns,
            pre_trigger_samples: plan.request.pre_trigger_samples,
            max_adc_value: plan.max_adc_value,
        })
    }
}

impl<D: ScopeDriver + ?Sized> Drop for RunningBlock<'_, D> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.finish() {
                log::warn!("Failed to stop device: {}", err);
            }
        }
    }
}
