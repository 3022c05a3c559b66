use crate::block_capture::{
    AcquisitionMode, BlockCaptureSession, BlockRequest, CaptureError, CaptureResult,
};
use crate::channel_config::ChannelConfig;
use crate::driver::{ChannelId, DeviceCommunicationError, DriverCall, ScopeDriver, WithCall};
use crate::model_profile::{ModelProfile, ModelProfileTable};
use crate::spectrum::{compute_spectrum, SpectrumError, SpectrumResult};
use crate::timebase::{ResolvedTimebase, TimebaseError, TimebaseResolver};

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Timebase resolution failed: {0}")]
    Timebase(#[from] TimebaseError),

    #[error("Block capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("Spectrum computation failed: {0}")]
    Spectrum(#[from] SpectrumError),

    #[error("Device communication failed: {0}")]
    Device(#[from] DeviceCommunicationError),

    #[error("Capture holds no samples for {0}")]
    NoSamples(ChannelId),

    #[error("{channel} is not fitted on a {channel_count}-channel model")]
    ChannelNotFitted {
        channel: ChannelId,
        channel_count: usize,
    },
}

/// Everything one acquire-process cycle produces.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub timebase: ResolvedTimebase,
    pub capture: CaptureResult,
    /// Spectrum of the analysed channel in millivolts.
    pub spectrum: SpectrumResult,
}

/// Owns a driver and runs resolve, capture and spectrum in sequence using the
/// defaults of the connected model.
pub struct BlockScope<D: ScopeDriver> {
    driver: D,
    profile: ModelProfile,
    resolver: TimebaseResolver,
    mode: AcquisitionMode,
}

impl<D: ScopeDriver> BlockScope<D> {
    pub fn new(driver: D, profiles: &ModelProfileTable) -> Self {
        let profile = *profiles.lookup(driver.instrument_model());
        log::debug!(
            "Connected to {}: {:?}, {:?}, trigger at {} mV",
            driver.instrument_model(),
            profile.range,
            profile.coupling,
            profile.threshold_mv
        );

        Self {
            driver,
            profile,
            resolver: TimebaseResolver::default(),
            mode: AcquisitionMode::default(),
        }
    }

    pub fn with_resolver(mut self, resolver: TimebaseResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_mode(mut self, mode: AcquisitionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_profile(mut self, profile: ModelProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn profile(&self) -> &ModelProfile {
        &self.profile
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Captures `channel` alone with the profile's defaults and analyses it.
    /// Every other fitted channel is switched off.
    pub fn acquire(
        &mut self,
        channel: ChannelId,
        request: &BlockRequest,
    ) -> Result<Acquisition, AcquisitionError> {
        if !self.profile.has_channel(channel) {
            return Err(AcquisitionError::ChannelNotFitted {
                channel,
                channel_count: self.profile.channel_count,
            });
        }

        let channels: Vec<ChannelConfig> = ChannelId::ALL
            .into_iter()
            .filter(|id| self.profile.has_channel(*id))
            .map(|id| {
                if id == channel {
                    self.profile.channel_config(id)
                } else {
                    ChannelConfig::disabled(id)
                }
            })
            .collect();

        self.acquire_with(&channels, channel, request)
    }

    /// Captures with explicit channel settings and analyses `analysed`.
    pub fn acquire_with(
        &mut self,
        channels: &[ChannelConfig],
        analysed: ChannelId,
        request: &BlockRequest,
    ) -> Result<Acquisition, AcquisitionError> {
        // the valid timebase range depends on which channels are enabled
        for config in channels {
            self.driver
                .set_channel(config)
                .during(DriverCall::SetChannel)?;
        }

        let timebase = self.resolver.resolve(
            &mut self.driver,
            self.profile.timebase_index,
            request.segment_index,
        )?;
        log::debug!(
            "Using timebase {}: {} ns, up to {} samples",
            timebase.index,
            timebase.interval_ns,
            timebase.max_samples
        );

        let trigger = self.profile.trigger(analysed);
        let capture = BlockCaptureSession::new(&mut self.driver, timebase)
            .with_mode(self.mode)
            .capture(channels, &trigger, request)?;

        let millivolts = capture
            .millivolts(analysed)
            .ok_or(AcquisitionError::NoSamples(analysed))?;
        if millivolts.is_empty() {
            return Err(AcquisitionError::NoSamples(analysed));
        }
        let spectrum = compute_spectrum(&millivolts, timebase.interval_ns)?;

        Ok(Acquisition {
            timebase,
            capture,
            spectrum,
        })
    }

    /// Returns the device to idle.
    pub fn stop(&mut self) -> Result<(), DeviceCommunicationError> {
        self.driver.stop().during(DriverCall::Stop)
    }

    pub fn into_driver(self) -> D {
        self.driver
    }
}
