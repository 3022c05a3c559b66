// Non-blocking block capture
//
// This example starts a capture, polls the ready flag at its own cadence while
// doing other work, and cancels the capture if it takes too long.

use blockscope::{
    BlockCaptureSession, BlockRequest, ChannelConfig, ChannelId, SimpleTrigger, SimulatedDriver,
    TimebaseResolver, VoltageRange,
};
use std::time::{Duration, Instant};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("BlockScope Polled Capture Example");
    println!("=================================\n");

    let mut driver = SimulatedDriver::new("5442D").ready_after_polls(25);
    let channels = [
        ChannelConfig::new(ChannelId::A).range(VoltageRange::V1),
        ChannelConfig::new(ChannelId::B).range(VoltageRange::V1),
        ChannelConfig::disabled(ChannelId::C),
        ChannelConfig::disabled(ChannelId::D),
    ];

    // Two enabled channels rule out timebase 0
    for config in &channels {
        blockscope::ScopeDriver::set_channel(&mut driver, config)
            .map_err(|fault| format!("set_channel failed: {fault}"))?;
    }
    let timebase = TimebaseResolver::default().resolve(&mut driver, 0, 0)?;
    println!(
        "Resolved timebase {} ({} ns)",
        timebase.index, timebase.interval_ns
    );

    let trigger = SimpleTrigger::start_capturing_when(ChannelId::A, 250.0)
        .auto_trigger_after(Duration::from_millis(50))
        .rising_edge();

    let mut session = BlockCaptureSession::new(&mut driver, timebase);
    let mut running = session.start(&channels, &trigger, &BlockRequest::new(2_000, 8_000))?;

    let deadline = Instant::now() + Duration::from_secs(1);
    let mut polls = 0u32;
    while !running.is_ready()? {
        polls += 1;
        if Instant::now() > deadline {
            println!("Capture took too long, cancelling");
            running.cancel()?;
            return Ok(());
        }
        std::thread::sleep(Duration::from_micros(200));
    }

    let capture = running.collect()?;
    println!("Ready after {} polls", polls);
    for samples in &capture.channels {
        let mv = samples.millivolts(capture.max_adc_value);
        let min = mv.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = mv.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        println!(
            "   {}: {} samples, {:.1} mV to {:.1} mV{}",
            samples.channel,
            samples.samples.len(),
            min,
            max,
            if capture.overflowed(samples.channel) { " (overflow)" } else { "" }
        );
    }

    Ok(())
}
