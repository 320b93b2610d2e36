use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, LevelFilter};

use battle_cut::api::{joint_drill_merge, raid_merge, CutoffDetector, MergeRequest, Settings};

#[derive(Parser, Debug)]
#[command(name = "battle-cut")]
#[command(about = "Cuts and merges Blue Archive battle recordings")]
#[command(version)]
struct Cli {
    /// Directory of marker templates (*.png)
    #[arg(long, global = true, default_value = "assets/detection")]
    markers: PathBuf,

    /// JSON file with `scan`, `tuning` and `resolver` sections
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Pre-computed event logs (`{file: log}`), skips video scanning
    #[arg(long, global = true)]
    event_logs: Option<PathBuf>,

    /// Debug logging and all scan diagnostics
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prints resolved segments of the given videos as JSON
    CutoffDetect {
        #[arg(required = true)]
        files: Vec<String>,
    },
    /// Renders Total Assault videos into one
    RaidMerge(RenderArgs),
    /// Renders Joint Firing Drill videos into one
    JointDrillMerge {
        #[command(flatten)]
        render: RenderArgs,

        /// Y position of the first crop window on the overlay sheet
        #[arg(long, default_value_t = 270)]
        crop_top: i64,

        /// Y distance between crop windows
        #[arg(long, default_value_t = 137)]
        crop_interval: i64,
    },
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[arg(required = true)]
    files: Vec<String>,

    /// Team overlay images, one in total or one per video
    #[arg(short = 't', long = "team-overlay", num_args = 1..)]
    team_overlays: Vec<String>,

    /// Clip prepended to the merged video
    #[arg(long)]
    intro: Option<String>,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,
}

impl RenderArgs {
    fn request(&self) -> MergeRequest {
        MergeRequest::new(self.files.clone(), self.output.clone())
            .with_overlays(self.team_overlays.clone())
            .with_intro(self.intro.clone())
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load(path).with_context(|| format!("Failed to load config {}", path.display()))?,
        None => Settings::default(),
    };
    if cli.verbose {
        let scan = &mut settings.scan;
        scan.show_skipped_frames = true;
        scan.show_state_changes = true;
        scan.show_marker_detection = true;
        scan.show_scanned_splits = true;
    }
    Ok(settings)
}

fn build_detector(cli: &Cli, settings: Settings) -> Result<CutoffDetector> {
    match &cli.event_logs {
        Some(path) => {
            info!("Event logs from {}, videos will not be scanned", path.display());
            let logs = CutoffDetector::load_event_logs(path)
                .with_context(|| format!("Failed to read event logs {}", path.display()))?;
            Ok(CutoffDetector::from_event_logs(settings, logs))
        }
        None => CutoffDetector::create(settings, &cli.markers)
            .with_context(|| format!("Failed to load markers from {}", cli.markers.display())),
    }
}

fn describe(output: &Path) -> String {
    format!("Failed to render {}", output.display())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    battle_cut::init_logging(if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    let settings = load_settings(&cli)?;
    let detector = build_detector(&cli, settings)?;

    match &cli.command {
        Command::CutoffDetect { files } => {
            let report = detector.detect_json(files).context("Cutoff detection failed")?;
            println!("{}", report);
        }
        Command::RaidMerge(render) => {
            raid_merge(&detector, &render.request()).with_context(|| describe(&render.output))?;
        }
        Command::JointDrillMerge {
            render,
            crop_top,
            crop_interval,
        } => {
            joint_drill_merge(&detector, &render.request(), *crop_top, *crop_interval)
                .with_context(|| describe(&render.output))?;
        }
    }
    Ok(())
}
