//! Runs the frame-pipelining scheduler against the dummy backend.
//!
//! ```text
//! cargo run --bin pipeline_demo -- --variant aggressive --frames 600 --latency-ms 2
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use redlilium_pipelining::{
    Diagnostics, DispatchMode, DummyBackend, DummyDeviceConfig, DummyDrawList, Extent2d, Scheduler,
    SchedulerConfig, SlotId, Stage, TickStatus,
};

/// Pipeline preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum Variant {
    /// Two slots on one queue.
    #[default]
    Conservative,
    /// Four slots on four queues.
    Aggressive,
}

/// Per-tick dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum Dispatch {
    /// Scoped worker threads.
    #[default]
    Parallel,
    /// Calling thread only.
    Sequential,
}

#[derive(Parser, Debug)]
#[command(
    name = "pipeline_demo",
    about = "Drive the RedLilium frame pipeline on a simulated device"
)]
struct Args {
    /// Pipeline preset.
    #[arg(long, default_value = "conservative", value_enum)]
    variant: Variant,

    /// How operations within a tick are executed.
    #[arg(long, default_value = "parallel", value_enum)]
    dispatch: Dispatch,

    /// Number of ticks to run.
    #[arg(long, default_value = "300")]
    frames: u64,

    /// Simulated device time per submission, in milliseconds.
    #[arg(long, default_value = "1")]
    latency_ms: u64,

    /// Number of presentable images.
    #[arg(long, default_value = "4")]
    images: usize,

    /// Draws recorded per frame.
    #[arg(long, default_value = "64")]
    draws: u32,

    /// Simulate a window resize every N ticks.
    #[arg(long)]
    resize_every: Option<u64>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    redlilium_pipelining::init();

    let args = Args::parse();

    let config = match args.variant {
        Variant::Conservative => SchedulerConfig::conservative(),
        Variant::Aggressive => SchedulerConfig::aggressive(),
    }
    .with_dispatch(match args.dispatch {
        Dispatch::Parallel => DispatchMode::Parallel,
        Dispatch::Sequential => DispatchMode::Sequential,
    });

    let backend = Arc::new(DummyBackend::with_config(
        DummyDeviceConfig::default()
            .with_latency(Duration::from_millis(args.latency_ms))
            .with_image_count(args.images),
    ));
    let control = backend.control();
    let surface = backend.create_surface()?;
    let diagnostics = Arc::new(Diagnostics::new("demo"));
    let mut scheduler = Scheduler::new(backend, surface, config, diagnostics.clone())?;

    let draws = args.draws;
    let started = Instant::now();
    let mut skipped = 0u64;
    let mut rebuilt = 0u64;

    for frame in 1..=args.frames {
        if let Some(every) = args.resize_every.filter(|&every| every > 0) {
            if frame % every == 0 {
                let width = 640 + (frame / every % 4) as u32 * 160;
                control.set_desired_extent(Extent2d::new(width, width * 9 / 16));
            }
        }

        match scheduler.tick(|_slot: SlotId| DummyDrawList::new(draws))? {
            TickStatus::Completed => {}
            TickStatus::Skipped(reason) => {
                log::debug!("Frame {} skipped: {:?}", frame, reason);
                skipped += 1;
            }
            TickStatus::Rebuilt => rebuilt += 1,
        }
    }

    let elapsed = started.elapsed();
    let stage_times = diagnostics.stage_times();
    scheduler.shutdown()?;

    let stats = control.stats();
    log::info!(
        "{} ticks in {:.2?} ({} skipped, {} rebuilds), {} submissions, {} presents",
        args.frames,
        elapsed,
        skipped,
        rebuilt,
        stats.submissions,
        stats.presents
    );
    for stage in Stage::ALL {
        log::info!("  {:<8} {:>10.2?}", stage.name(), stage_times[stage]);
    }
    if let Some(rate) = diagnostics.frame_rate() {
        log::info!("Last measured rate: {:.1} fps", rate.fps);
    }

    Ok(())
}
