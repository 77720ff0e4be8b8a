//! detectd - lesion detection stream daemon
//!
//! This daemon:
//! 1. Loads configuration, the class label table and persisted thresholds
//! 2. Pulls frames at a fixed rate and runs them through the accelerator
//! 3. Post-processes each tensor against one threshold snapshot per frame
//! 4. Smooths the result with the display hold window
//! 5. Logs what a renderer would draw, rescaled to camera resolution
//!
//! Without an NPU attached, `--replay` feeds recorded tensors instead of live inference.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dermavision::{
    config::DetectorConfig, Accelerator, ClassLabels, DetectionPipeline, Frame, JsonFileStore,
    ReplayAccelerator, StreamSession, ThresholdStore,
};

#[derive(Parser, Debug)]
#[command(name = "detectd", about = "Run the lesion detection stream loop")]
struct Args {
    /// JSON file with one recorded tensor or an array of them
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,

    /// Target frames per second
    #[arg(long, default_value_t = 10)]
    fps: u32,

    /// Camera width used for rescaling boxes
    #[arg(long, default_value_t = 640)]
    width: u32,

    /// Camera height used for rescaling boxes
    #[arg(long, default_value_t = 480)]
    height: u32,

    /// Stop after this many frames
    #[arg(long)]
    frames: Option<u64>,

    /// Start with predictions switched off; frames pass through without inference
    #[arg(long)]
    predictions_off: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("--fps must be greater than zero"));
    }
    let cfg = DetectorConfig::load()?;
    let labels = Arc::new(ClassLabels::from_file(&cfg.labels_path)?);
    let store = Arc::new(ThresholdStore::load(JsonFileStore::new(&cfg.thresholds_path)));

    log::info!(
        "detectd {} img_size={} classes={} activation={:?} top_k={} hold_ms={}",
        env!("CARGO_PKG_VERSION"),
        cfg.img_size,
        labels.len(),
        cfg.activation,
        cfg.nms_top_k,
        cfg.hold_ms
    );
    log::info!("thresholds file: {}", cfg.thresholds_path.display());

    let accelerator = open_accelerator(&args, &cfg)?;
    let pipeline = DetectionPipeline::new(store, labels, cfg.pipeline_settings());
    let mut session = StreamSession::new(accelerator, pipeline, cfg.img_size, cfg.hold_ms);
    session.warm_up()?;
    session.set_predictions_enabled(!args.predictions_off);
    log::info!(
        "accelerator '{}' ready, predictions enabled: {}",
        session.accelerator_name(),
        session.predictions_enabled()
    );

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let frame_interval = Duration::from_millis(1000 / args.fps as u64);
    let started = Instant::now();
    let mut last_health_log = Instant::now();
    let mut last_version = 0;
    let frame = Frame::blank(args.width, args.height)?;

    while running.load(Ordering::SeqCst) {
        if args.frames.is_some_and(|limit| session.stats().frames >= limit) {
            break;
        }
        let tick = Instant::now();
        let now_ms = started.elapsed().as_millis() as u64;
        let shown = session.next(&frame, now_ms);

        let version = session.pipeline().store().get().version;
        if version != last_version {
            log::info!("frame loop now on thresholds v{}", version);
            last_version = version;
        }

        for det in &shown {
            let bbox = det.bbox.rescale(cfg.img_size, frame.width, frame.height);
            log::info!(
                "{} {:.2} [{:.0}, {:.0}, {:.0}, {:.0}] ({})",
                det.display_label(),
                det.display_confidence(),
                bbox.x1,
                bbox.y1,
                bbox.x2,
                bbox.y2,
                det.class_name
            );
        }

        if last_health_log.elapsed() >= Duration::from_secs(5) {
            let stats = session.stats();
            log::info!(
                "frames={} detected={} held={} failures={}",
                stats.frames,
                stats.frames_detected,
                stats.frames_held,
                stats.inference_failures
            );
            last_health_log = Instant::now();
        }

        if let Some(rest) = frame_interval.checked_sub(tick.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    session.stop();
    Ok(())
}

fn open_accelerator(args: &Args, cfg: &DetectorConfig) -> Result<Box<dyn Accelerator>> {
    if let Some(path) = &args.replay {
        let replay = ReplayAccelerator::from_file(path)?;
        log::info!("replaying {} tensors from {}", replay.len(), path.display());
        return Ok(Box::new(replay));
    }

    #[cfg(feature = "backend-tract")]
    {
        if let Some(model) = &cfg.model_path {
            let tract = dermavision::TractAccelerator::new(model, cfg.img_size)?;
            log::info!("loaded ONNX model {}", model.display());
            return Ok(Box::new(tract));
        }
    }

    Err(anyhow!(
        "no accelerator available for model {:?}: pass --replay or build with backend-tract",
        cfg.model_path
    ))
}
