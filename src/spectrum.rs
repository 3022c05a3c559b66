use polars::prelude::*;
use rustfft::{num_complex::Complex64, FftPlanner};

pub const FREQUENCY_COLUMN_NAME: &str = "frequency_hz";
pub const MAGNITUDE_COLUMN_NAME: &str = "magnitude";

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SpectrumError {
    #[error("Cannot compute the spectrum of an empty trace")]
    EmptyInput,

    #[error("Sample interval must be a positive number of nanoseconds, got {0}")]
    InvalidInterval(f64),
}

/// Single-sided amplitude spectrum of a real trace.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumResult {
    pub frequencies_hz: Vec<f64>,
    pub magnitudes: Vec<f64>,
    /// Transform length after zero-padding.
    pub fft_len: usize,
    pub sample_rate_hz: f64,
}

impl SpectrumResult {
    pub fn bin_width_hz(&self) -> f64 {
        self.sample_rate_hz / self.fft_len as f64
    }

    /// Largest non-DC bin as `(frequency, magnitude)`.
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequencies_hz
            .iter()
            .zip(&self.magnitudes)
            .skip(1)
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(f, m)| (*f, *m))
    }

    pub fn to_data_frame(&self) -> Result<DataFrame, PolarsError> {
        DataFrame::new(vec![
            Column::new(FREQUENCY_COLUMN_NAME.into(), self.frequencies_hz.as_slice()),
            Column::new(MAGNITUDE_COLUMN_NAME.into(), self.magnitudes.as_slice()),
        ])
    }
}

/// Computes the single-sided amplitude spectrum of `samples` taken every
/// `interval_ns` nanoseconds.
///
/// The trace is zero-padded to the next power of two N, transformed and scaled
/// by 1/L where L is the unpadded length. Bins run from 0 Hz to Fs/2 in steps of
/// Fs/N. Every bin is doubled to fold in the negative frequencies, except 0 Hz
/// and Fs/2 which have no mirror image.
pub fn compute_spectrum(samples: &[f64], interval_ns: f64) -> Result<SpectrumResult, SpectrumError> {
    if samples.is_empty() {
        return Err(SpectrumError::EmptyInput);
    }
    if !(interval_ns.is_finite() && interval_ns > 0.0) {
        return Err(SpectrumError::InvalidInterval(interval_ns));
    }

    let len = samples.len();
    let fft_len = len.next_power_of_two();
    let sample_rate_hz = 1e9 / interval_ns;

    let mut buffer: Vec<Complex64> = samples
        .iter()
        .map(|&v| Complex64::new(v, 0.0))
        .collect();
    buffer.resize(fft_len, Complex64::new(0.0, 0.0));

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(fft_len).process(&mut buffer);

    let nyquist = fft_len / 2;
    let scale = 1.0 / len as f64;
    let (frequencies_hz, magnitudes): (Vec<f64>, Vec<f64>) = buffer
        .iter()
        .take(nyquist + 1)
        .enumerate()
        .map(|(k, coefficient)| {
            let amplitude = coefficient.norm() * scale;
            let folded = if k == 0 || k == nyquist {
                amplitude
            } else {
                2.0 * amplitude
            };
            (k as f64 * sample_rate_hz / fft_len as f64, folded)
        })
        .unzip();

    log::trace!(
        "Spectrum of {} samples: NFFT={}, Fs={} Hz",
        len,
        fft_len,
        sample_rate_hz
    );

    Ok(SpectrumResult {
        frequencies_hz,
        magnitudes,
        fft_len,
        sample_rate_hz,
    })
}
