// Block capture with spectrum export
//
// This example resolves a timebase, captures one block on a single channel of
// the simulated digitizer and writes the trace and its spectrum as CSV.

use blockscope::{
    AcquisitionMode, BlockRequest, BlockScope, ChannelId, ModelProfileTable, SignalSource,
    SimulatedDriver, TimebaseResolver,
};
use clap::Parser;
use polars::prelude::*;
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "block_fft")]
#[command(version = "1.0")]
#[command(about = "Capture one block and compute its spectrum")]
#[command(long_about = "Resolve a valid timebase, capture a block of samples around a trigger event on one channel and compute the single-sided amplitude spectrum of the trace. Trace and spectrum are written as CSV.")]
struct Args {
    /// Instrument model to simulate
    #[arg(short, long, default_value = "5242D")]
    model: String,

    /// Channel to capture
    #[arg(short, long, default_value = "a", value_parser = ["a", "b", "c", "d"])]
    channel: String,

    /// Samples before the trigger point
    #[arg(long, default_value_t = 500_000)]
    pre: u32,

    /// Samples after the trigger point
    #[arg(long, default_value_t = 500_000)]
    post: u32,

    /// Frequency of the simulated input signal in Hz
    #[arg(long, default_value_t = 10e6)]
    signal_hz: f64,

    /// Amplitude of the simulated input signal in mV
    #[arg(long, default_value_t = 800.0)]
    signal_mv: f64,

    /// JSON file with per-model defaults, replaces the built-in table
    #[arg(long)]
    profiles: Option<PathBuf>,

    /// Poll for completion every N microseconds instead of blocking
    #[arg(long)]
    poll_us: Option<u64>,

    /// Maximum number of timebase indices to probe
    #[arg(long, default_value_t = TimebaseResolver::DEFAULT_PROBE_LIMIT)]
    probe_limit: u32,

    /// Directory for trace.csv and spectrum.csv
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, help = "Show debug information and detailed logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    let channel = match args.channel.as_str() {
        "b" => ChannelId::B,
        "c" => ChannelId::C,
        "d" => ChannelId::D,
        _ => ChannelId::A,
    };

    let profiles = match &args.profiles {
        Some(path) => ModelProfileTable::from_json_file(path)?,
        None => ModelProfileTable::builtin(),
    };

    let mode = args.poll_us.map_or(AcquisitionMode::Blocking, |us| {
        AcquisitionMode::Polling {
            interval: Duration::from_micros(us),
        }
    });

    let driver = SimulatedDriver::with_profile(&args.model, profiles.lookup(&args.model))
        .signal(channel, SignalSource::sine(args.signal_hz, args.signal_mv));
    let mut scope = BlockScope::new(driver, &profiles)
        .with_mode(mode)
        .with_resolver(TimebaseResolver::with_probe_limit(args.probe_limit));

    println!("BlockScope Block FFT");
    println!("====================");
    println!("Model: {}", args.model);
    println!("Channel: {} of {}", channel.as_str(), scope.profile().channel_count);
    println!("Range: {:?}, coupling {}", scope.profile().range, scope.profile().coupling.as_str());
    println!("Samples: {} pre + {} post\n", args.pre, args.post);

    let acquisition = scope.acquire(channel, &BlockRequest::new(args.pre, args.post))?;

    println!(
        "✓ Timebase {}: {} ns ({:.1} MS/s), capacity {} samples",
        acquisition.timebase.index,
        acquisition.timebase.interval_ns,
        acquisition.timebase.sample_rate_hz() / 1e6,
        acquisition.timebase.max_samples
    );
    println!(
        "✓ Captured {} samples",
        acquisition.capture.num_samples_returned
    );
    if acquisition.capture.overflowed(channel) {
        println!("⚠ Input range exceeded on {}", channel);
    }

    let spectrum = &acquisition.spectrum;
    println!(
        "✓ Spectrum: NFFT={}, {} bins from 0 to {:.3} MHz",
        spectrum.fft_len,
        spectrum.frequencies_hz.len(),
        spectrum.frequencies_hz.last().copied().unwrap_or_default() / 1e6
    );
    if let Some((peak_hz, peak_mv)) = spectrum.peak() {
        println!("  Peak: {:.3} MHz at {:.1} mV", peak_hz / 1e6, peak_mv);
    }

    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir)?;

        let mut trace = acquisition.capture.to_lazy_frame()?.collect()?;
        let mut file = File::create(dir.join("trace.csv"))?;
        CsvWriter::new(&mut file).finish(&mut trace)?;

        let mut bins = spectrum.to_data_frame()?;
        let mut file = File::create(dir.join("spectrum.csv"))?;
        CsvWriter::new(&mut file).finish(&mut bins)?;

        println!("\nWrote trace.csv and spectrum.csv to {}", dir.display());
    }

    scope.stop()?;
    Ok(())
}
