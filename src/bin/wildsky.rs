//! wildsky - drone wildlife detection stream demo
//!
//! This binary:
//! 1. Validates the target frame rate from the command line (1-30)
//! 2. Resolves configuration from `WILDSKY_CONFIG` and the environment
//! 3. Connects to the drone (or the synthetic source for stub:// addresses)
//! 4. Relays frames through the rate-gated detection pipeline
//! 5. Displays the annotated stream until Ctrl-C

use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use clap::Parser;

use wildsky::config::{parse_target_fps, StreamSettings};
use wildsky::render::RenderConfig;
use wildsky::stream::{StreamController, StreamOptions};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Stream drone video through MegaDetector and display the annotated feed"
)]
struct Args {
    /// Target display frame rate, 1-30 inclusive.
    #[arg(value_parser = parse_target_fps)]
    fps: u32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = StreamSettings::load(args.fps).context("load configuration")?;
    log::info!(
        "drone={} detector={:?} target_fps={}",
        settings.drone.ip,
        settings.detector.kind,
        settings.target_fps
    );

    let drone = wildsky::source::build_drone(&settings.drone)?;
    let detector = wildsky::detect::build_detector(&settings.detector)?;
    let display = wildsky::display::build_display(&settings.window_name);

    let mut options = StreamOptions::new(settings.target_fps);
    options.source_fps = settings.drone.source_fps;

    let mut controller =
        StreamController::new(drone, detector, display, RenderConfig::default(), options);

    let stop = controller.stop_flag();
    ctrlc::set_handler(move || {
        log::info!("stop requested");
        stop.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    controller.start()?;
    let stats = controller.run()?;
    controller.stop()?;

    log::info!(
        "done: {} frames relayed, {} processed, {} skipped by the rate gate, {} failed",
        stats.relayed,
        stats.processed,
        stats.gated_out,
        stats.failed
    );
    Ok(())
}
