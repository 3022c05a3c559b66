use crate::driver::{DeviceCommunicationError, DriverCall, DriverFault, ScopeDriver, TimebaseInfo};

/// Timebase accepted by the driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTimebase {
    pub index: u32,
    pub interval_ns: f64,
    pub max_samples: u32,
}

impl ResolvedTimebase {
    pub fn sample_rate_hz(&self) -> f64 {
        1e9 / self.interval_ns
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimebaseError {
    #[error("no valid timebase between index {first} and {last}")]
    InvalidTimebase { first: u32, last: u32 },

    #[error("timebase index {index} is beyond the driver's maximum {max}")]
    IndexOutOfRange { index: u32, max: u32 },

    #[error("timebase query failed: {0}")]
    Device(#[from] DeviceCommunicationError),
}

/// Finds the first timebase index at or after a starting point that the
/// driver accepts for a segment.
#[derive(Debug, Clone, Copy)]
pub struct TimebaseResolver {
    probe_limit: u32,
}

impl Default for TimebaseResolver {
    fn default() -> Self {
        Self {
            probe_limit: Self::DEFAULT_PROBE_LIMIT,
        }
    }
}

impl TimebaseResolver {
    pub const DEFAULT_PROBE_LIMIT: u32 = 64;

    /// Caps the number of indices probed per resolution. Clamped to at least one.
    pub fn with_probe_limit(probe_limit: u32) -> Self {
        Self {
            probe_limit: probe_limit.max(1),
        }
    }

    pub fn probe_limit(&self) -> u32 {
        self.probe_limit
    }

    #[tracing::instrument(level = "debug", skip(self, driver))]
    pub fn resolve<D: ScopeDriver + ?Sized>(
        &self,
        driver: &mut D,
        initial_index: u32,
        segment_index: u32,
    ) -> Result<ResolvedTimebase, TimebaseError> {
        let max_index = driver.max_timebase_index();
        if initial_index > max_index {
            return Err(TimebaseError::IndexOutOfRange {
                index: initial_index,
                max: max_index,
            });
        }
        let last = initial_index
            .saturating_add(self.probe_limit - 1)
            .min(max_index);

        for index in initial_index..=last {
            match driver.get_timebase(index, segment_index) {
                Ok(TimebaseInfo {
                    interval_ns,
                    max_samples,
                }) if interval_ns > 0.0 && max_samples > 0 => {
                    log::debug!(
                        "Timebase {} accepted: {} ns, {} samples",
                        index,
                        interval_ns,
                        max_samples
                    );
                    return Ok(ResolvedTimebase {
                        index,
                        interval_ns,
                        max_samples,
                    });
                }
                Ok(info) => {
                    log::warn!("Timebase {} reported as valid but unusable: {:?}", index, info);
                }
                Err(DriverFault::InvalidTimebase) => {
                    log::trace!("Timebase {} rejected, trying next", index);
                }
                Err(fault) => {
                    return Err(DeviceCommunicationError::new(DriverCall::GetTimebase, fault).into());
                }
            }
        }

        Err(TimebaseError::InvalidTimebase {
            first: initial_index,
            last,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_driver::MockDriver;

    #[test]
    fn test_first_valid_index_wins() {
        let mut driver = MockDriver::new().valid_timebases_from(3);

        let resolved = TimebaseResolver::default()
            .resolve(&mut driver, 0, 0)
            .unwrap();
        assert_eq!(resolved.index, 3);
        assert_eq!(resolved.interval_ns, MockDriver::interval_for(3));
        assert_eq!(resolved.max_samples, MockDriver::DEFAULT_MAX_SAMPLES);
        assert_eq!(driver.calls_to(DriverCall::GetTimebase), 4);
    }

    #[test]
    fn test_initial_index_already_valid() {
        for initial in [3, 4, 9] {
            let mut driver = MockDriver::new().valid_timebases_from(3);
            let resolved = TimebaseResolver::default()
                .resolve(&mut driver, initial, 0)
                .unwrap();
            assert_eq!(resolved.index, initial);
            assert_eq!(driver.calls_to(DriverCall::GetTimebase), 1);
        }
    }

    #[test]
    fn test_exhausted_probe_limit() {
        let mut driver = MockDriver::new().reject_all_timebases();

        let result = TimebaseResolver::with_probe_limit(5).resolve(&mut driver, 2, 0);
        assert!(matches!(
            result,
            Err(TimebaseError::InvalidTimebase { first: 2, last: 6 })
        ));
        assert_eq!(driver.calls_to(DriverCall::GetTimebase), 5);
    }

    #[test]
    fn test_bounded_by_driver_range() {
        let mut driver = MockDriver::new()
            .reject_all_timebases()
            .max_timebase_index(4);

        let result = TimebaseResolver::default().resolve(&mut driver, 1, 0);
        assert!(matches!(
            result,
            Err(TimebaseError::InvalidTimebase { first: 1, last: 4 })
        ));
        assert_eq!(driver.calls_to(DriverCall::GetTimebase), 4);

        let result = TimebaseResolver::default().resolve(&mut driver, 5, 0);
        assert!(matches!(
            result,
            Err(TimebaseError::IndexOutOfRange { index: 5, max: 4 })
        ));
    }

    #[test]
    fn test_other_fault_aborts() {
        let mut driver = MockDriver::new()
            .valid_timebases_from(10)
            .fail_timebase_at(2, DriverFault::Failure(0x3));

        let result = TimebaseResolver::default().resolve(&mut driver, 0, 0);
        match result {
            Err(TimebaseError::Device(err)) => {
                assert_eq!(err.call, DriverCall::GetTimebase);
                assert_eq!(err.fault, DriverFault::Failure(0x3));
            }
            other => unreachable!("unexpected result: {:?}", other),
        }
        assert_eq!(driver.calls_to(DriverCall::GetTimebase), 3);
    }

    #[test]
    fn test_zero_capacity_keeps_probing() {
        let mut driver = MockDriver::new()
            .valid_timebases_from(0)
            .zero_capacity_below(2);

        let resolved = TimebaseResolver::default()
            .resolve(&mut driver, 0, 0)
            .unwrap();
        assert_eq!(resolved.index, 2);
        assert!(resolved.max_samples > 0);
    }

    #[test]
    fn test_sample_rate() {
        let resolved = ResolvedTimebase {
            index: 2,
            interval_ns: 4.0,
            max_samples: 1_000_000,
        };
        assert_eq!(resolved.sample_rate_hz(), 250e6);
    }
}
