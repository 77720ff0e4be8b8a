//! thresholds - control-plane CLI for the persisted detection thresholds
//!
//! Reads and writes the same threshold file the stream daemon loads at startup.
//! Versions printed here are local to this invocation.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dermavision::{config::DetectorConfig, JsonFileStore, ThresholdStore, ThresholdUpdate};

#[derive(Parser, Debug)]
#[command(name = "thresholds", about = "Inspect or change detection thresholds")]
struct Args {
    /// Threshold file (defaults to the configured path)
    #[arg(long, env = "DERMAVISION_THRESHOLDS", value_name = "PATH")]
    file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print current thresholds
    Get,

    /// Change one or more thresholds; any out-of-range value rejects the whole change
    Set {
        /// Confidence cutoff in [0, 1]
        #[arg(long)]
        conf: Option<f32>,
        /// NMS IoU threshold in [0, 1]
        #[arg(long)]
        iou: Option<f32>,
        /// Minimum box area as a fraction of img_size^2, in (0, 0.5]
        #[arg(long)]
        min_box_frac: Option<f32>,
    },

    /// Restore defaults
    Reset,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    let path = match args.file {
        Some(path) => path,
        None => DetectorConfig::load()?.thresholds_path,
    };
    let store = ThresholdStore::load(JsonFileStore::new(path));

    let snapshot = match args.command {
        Command::Get => store.get(),
        Command::Set {
            conf,
            iou,
            min_box_frac,
        } => store.update(&ThresholdUpdate {
            conf_th: conf,
            iou_th: iou,
            min_box_frac,
        })?,
        Command::Reset => store.reset(),
    };

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
