//! # BlockScope RS
//!
//! A Rust library for capturing a block of samples from a PicoScope-style
//! digitizer and turning it into an amplitude spectrum.
//!
//! The library talks to hardware through the narrow [`ScopeDriver`] trait, so a
//! binding to the vendor SDK, a simulator or a test double can sit behind the
//! same acquisition code.
//!
//! ## Features
//!
//! - **Timebase negotiation**: probes timebase indices until the driver accepts one, with an explicit upper bound
//! - **Block capture**: pre/post-trigger partitioning checked against the device's sample capacity
//! - **Blocking or polled waits**: selectable per session, plus a non-blocking start/poll/collect API
//! - **Scoped acquisition**: the device is stopped on every exit path of a capture
//! - **Spectrum analysis**: single-sided amplitude spectrum via `rustfft`
//! - **Model profiles**: per-model channel and trigger defaults, loadable from JSON
//! - **DataFrame output**: captures and spectra export to `polars`
//!
//! ## Examples
//!
//! ### Resolve, capture, analyse
//!
//! ```rust
//! use blockscope::{
//!     compute_spectrum, BlockCaptureSession, BlockRequest, ChannelConfig, ChannelId,
//!     SimpleTrigger, SimulatedDriver, TimebaseResolver, VoltageRange,
//! };
//!
//! let mut driver = SimulatedDriver::new("5242D");
//!
//! let timebase = TimebaseResolver::default().resolve(&mut driver, 2, 0)?;
//! assert_eq!(timebase.interval_ns, 4.0);
//!
//! let channels = [ChannelConfig::new(ChannelId::A).range(VoltageRange::V2)];
//! let trigger = SimpleTrigger::start_capturing_when(ChannelId::A, 500.0).rising_edge();
//!
//! let capture = BlockCaptureSession::new(&mut driver, timebase)
//!     .capture(&channels, &trigger, &BlockRequest::centred(2_000))?;
//! println!("Captured {} samples", capture.num_samples_returned);
//!
//! let millivolts = capture.millivolts(ChannelId::A).unwrap_or_default();
//! let spectrum = compute_spectrum(&millivolts, timebase.interval_ns)?;
//! println!("Peak at {:?}", spectrum.peak());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Using the model profile table
//!
//! ```rust
//! use blockscope::{BlockRequest, BlockScope, ChannelId, ModelProfileTable, SimulatedDriver};
//!
//! let mut scope = BlockScope::new(SimulatedDriver::new("5444D"), &ModelProfileTable::builtin());
//! let acquisition = scope.acquire(ChannelId::A, &BlockRequest::new(500, 1_500))?;
//!
//! println!(
//!     "{} samples at {} MS/s, {} bins",
//!     acquisition.capture.num_samples_returned,
//!     acquisition.timebase.sample_rate_hz() / 1e6,
//!     acquisition.spectrum.frequencies_hz.len()
//! );
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Polling at your own cadence
//!
//! ```rust
//! use blockscope::{
//!     BlockCaptureSession, BlockRequest, ChannelConfig, ChannelId, SimpleTrigger,
//!     SimulatedDriver, TimebaseResolver,
//! };
//! use std::time::Duration;
//!
//! let mut driver = SimulatedDriver::new("5242D").ready_after_polls(3);
//! let timebase = TimebaseResolver::default().resolve(&mut driver, 3, 0)?;
//! let mut session = BlockCaptureSession::new(&mut driver, timebase);
//!
//! let trigger = SimpleTrigger::start_capturing_when(ChannelId::A, 0.0)
//!     .auto_trigger_after(Duration::from_millis(100))
//!     .falling_edge();
//! let mut running = session.start(
//!     &[ChannelConfig::new(ChannelId::A)],
//!     &trigger,
//!     &BlockRequest::centred(1_000),
//! )?;
//! while !running.is_ready()? {
//!     // do other work
//! }
//! let capture = running.collect()?;
//! assert_eq!(capture.num_samples_returned, 1_000);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod block_capture;
pub mod block_scope;
pub mod channel_config;
pub mod driver;
pub mod model_profile;
pub mod simulated;
pub mod spectrum;
pub mod timebase;
pub mod trigger_config;

#[cfg(test)]
mod mock_driver;

// Re-export the main types for convenience
pub use block_capture::{
    AcquisitionMode, BlockCaptureSession, BlockRequest, CaptureConfigError, CaptureError,
    CaptureResult, ChannelSamples, RunningBlock,
};

pub use block_scope::{Acquisition, AcquisitionError, BlockScope};

pub use channel_config::{BandwidthLimit, ChannelConfig, Coupling, VoltageRange};

pub use driver::{
    ChannelId, DeviceCommunicationError, DriverCall, DriverFault, OverflowFlags, ScopeDriver,
};

pub use model_profile::{ModelProfile, ModelProfileTable, ProfileError};

pub use simulated::{SignalSource, SimulatedDriver};

pub use spectrum::{compute_spectrum, SpectrumError, SpectrumResult};

pub use timebase::{ResolvedTimebase, TimebaseError, TimebaseResolver};

pub use trigger_config::{SimpleTrigger, SimpleTriggerBuilder, ThresholdDirection};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_million_sample_block_end_to_end() {
        let mut driver = SimulatedDriver::new("5242D")
            .memory_samples(1_000_000)
            .signal(ChannelId::A, SignalSource::sine(5e6, 1_000.0));

        let timebase = TimebaseResolver::default()
            .resolve(&mut driver, 2, 0)
            .unwrap();
        assert_eq!(timebase.index, 2);
        assert_eq!(timebase.interval_ns, 4.0);
        assert_eq!(timebase.max_samples, 1_000_000);
        assert_eq!(timebase.sample_rate_hz(), 250e6);

        let channels = [
            ChannelConfig::new(ChannelId::A)
                .coupling(Coupling::Dc1M)
                .range(VoltageRange::V2),
            ChannelConfig::disabled(ChannelId::B),
        ];
        let trigger = SimpleTrigger::start_capturing_when(ChannelId::A, 500.0).rising_edge();
        let request = BlockRequest::new(500_000, 500_000);

        let capture = BlockCaptureSession::new(&mut driver, timebase)
            .capture(&channels, &trigger, &request)
            .unwrap();
        assert_eq!(capture.num_samples_returned, 1_000_000);
        assert!(capture.overflow.is_empty());
        assert!(!driver.is_running());

        let millivolts = capture.millivolts(ChannelId::A).unwrap();
        let spectrum = compute_spectrum(&millivolts, timebase.interval_ns).unwrap();
        assert_eq!(spectrum.fft_len, 1 << 20);
        assert_eq!(spectrum.frequencies_hz[0], 0.0);
        assert_eq!(*spectrum.frequencies_hz.last().unwrap(), 125e6);

        let (peak_hz, _) = spectrum.peak().unwrap();
        assert!((peak_hz - 5e6).abs() <= spectrum.bin_width_hz());
    }
}
