use std::path::{Path, PathBuf};

use anyhow::{Context as AnyhowContext, Result};
use clap::{Parser, Subcommand};

use indicatif::ProgressStyle;
use tracing::info_span;
use tracing_indicatif::span_ext::IndicatifSpanExt;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::filter::LevelFilter;

use circle_tracker::config::*;
use circle_tracker::descriptor::DescriptorProvider;
use circle_tracker::pipeline::Pipeline;
use circle_tracker::report::*;
use circle_tracker::source::*;
use circle_tracker::synthetic::*;
use circle_tracker::tracker::FrameOutcome;

#[derive(Parser)]
#[clap(name = "circle-tracker", about = "Track circles across video frames and count the persistent ones")]
pub struct Args {
    /// Log every association decision
    #[clap(short, long)]
    pub verbose: bool,
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Track circles over a stream of frames
    Track(TrackArgs),
    /// Count the circles in a single image
    #[cfg(feature = "opencv")]
    CountImage(CountImageArgs),
}

#[derive(clap::Args)]
pub struct TrackArgs {
    /// Replay file (.jsonl) or, with OpenCV support, a video. Synthetic scene when omitted.
    #[clap(short, long)]
    pub input: Option<PathBuf>,
    #[clap(long, default_value = "circle_count_per_frame.csv")]
    pub output_csv: PathBuf,
    /// Write the run summary as JSON
    #[clap(long)]
    pub summary: Option<PathBuf>,
    /// Annotated output video
    #[cfg(feature = "opencv")]
    #[clap(long)]
    pub output_video: Option<PathBuf>,
    /// Also stream annotated frames to this rerun recording
    #[cfg(feature = "rerun")]
    #[clap(long)]
    pub rerun: Option<PathBuf>,
    #[clap(long)]
    pub max_frames: Option<u64>,
    #[clap(long, default_value = "300")]
    pub synthetic_frames: u64,
    #[clap(long, default_value = "5")]
    pub synthetic_objects: usize,
    /// Load thresholds from a JSON file instead of the flags below
    #[clap(long)]
    pub config_file: Option<PathBuf>,
    #[clap(flatten)]
    pub config: Config,
}

#[cfg(feature = "opencv")]
#[derive(clap::Args)]
pub struct CountImageArgs {
    pub image: PathBuf,
    #[clap(long, default_value = "circle_data.csv")]
    pub output_csv: PathBuf,
    #[clap(long, default_value = "10")]
    pub min_radius: i32,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // setup logging
    let level = if args.verbose { LevelFilter::DEBUG } else { LevelFilter::INFO };
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(level)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stdout_writer()))
        .with(indicatif_layer)
        .init();

    match args.command {
        Command::Track(track_args) => track(track_args),
        #[cfg(feature = "opencv")]
        Command::CountImage(count_args) => count_image(count_args),
    }
}

fn track(args: TrackArgs) -> Result<()> {
    let config = match &args.config_file {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => args.config.clone(),
    };
    let pipeline = Pipeline::new(config.clone())?.with_max_frames(args.max_frames);

    let summary = match &args.input {
        Some(path) if is_replay(path) => {
            let mut source = JsonlSource::open(path)?;
            run(pipeline, &mut source, &mut ReplayDescriptors, &args, |_, _| Ok(()))?
        }
        #[cfg(feature = "opencv")]
        Some(path) => track_video(pipeline, path, &config, &args)?,
        #[cfg(not(feature = "opencv"))]
        Some(path) => anyhow::bail!(
            "{} is not a .jsonl replay file, video input needs the `opencv` feature",
            path.display()
        ),
        None => {
            let mut source = SyntheticSource::new(SyntheticScene {
                seed: config.seed,
                frames: args.synthetic_frames,
                objects: args.synthetic_objects,
                ..Default::default()
            });
            run(pipeline, &mut source, &mut ReplayDescriptors, &args, |_, _| Ok(()))?
        }
    };

    if let Some(path) = &args.summary {
        summary
            .write_json(path)
            .with_context(|| format!("failed to write summary {}", path.display()))?;
    }
    println!(" Refined Tracking Complete");
    println!(" Total Persistent Circles: {}", summary.persistent_count());
    println!(" CSV saved: {}", args.output_csv.display());
    Ok(())
}

fn is_replay(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "jsonl" || ext == "json")
}

fn run<S, P, F>(
    mut pipeline: Pipeline,
    source: &mut S,
    provider: &mut P,
    args: &TrackArgs,
    on_frame: F,
) -> Result<RunSummary>
where
    S: DetectionSource,
    P: DescriptorProvider<Frame = S::Frame>,
    F: FnMut(&S::Frame, &FrameOutcome) -> circle_tracker::Result<()>,
{
    let mut report = CsvReport::create(&args.output_csv)
        .with_context(|| format!("failed to create {}", args.output_csv.display()))?;

    let header_span = info_span!("header");
    header_span.pb_set_style(&ProgressStyle::default_bar());
    if let Some(length) = source.length() {
        header_span.pb_set_length(length);
    }
    let header_span_enter = header_span.enter();

    let summary = pipeline.run(source, provider, &mut report, on_frame)?;

    std::mem::drop(header_span_enter);
    std::mem::drop(header_span);
    Ok(summary)
}

#[cfg(feature = "opencv")]
fn track_video(
    pipeline: Pipeline,
    path: &Path,
    config: &Config,
    args: &TrackArgs,
) -> Result<RunSummary> {
    use circle_tracker::vision::*;
    use circle_tracker::visualization::OverlayWriter;

    let mut source = HoughCircleSource::open(path, HoughParams::video(config.min_radius.round() as i32))?;
    let mut provider = OrbDescriptorProvider::new(1000)?;

    let overlay = match &args.output_video {
        Some(out) => Some(OverlayWriter::create(out, source.fps, source.width, source.height)?),
        None => None,
    };
    #[cfg(feature = "rerun")]
    let overlay = match (overlay, &args.rerun) {
        (Some(writer), Some(recording)) => Some(writer.with_recording(recording)?),
        (overlay, _) => overlay,
    };
    let mut overlay = overlay;

    run(pipeline, &mut source, &mut provider, args, |frame, outcome| {
        match overlay.as_mut() {
            Some(writer) => writer.write(frame, outcome),
            None => Ok(()),
        }
    })
}

#[cfg(feature = "opencv")]
fn count_image(args: CountImageArgs) -> Result<()> {
    use circle_tracker::vision::*;

    let circles = detect_circles_in_image(&args.image, &HoughParams::image(args.min_radius))?;
    if circles.is_empty() {
        println!(" No circles were detected.");
        return Ok(());
    }
    let file = std::fs::File::create(&args.output_csv)
        .with_context(|| format!("failed to create {}", args.output_csv.display()))?;
    write_circle_table(file, &circles)?;
    println!(
        "{} circle(s) detected. Data saved to {}.",
        circles.len(),
        args.output_csv.display()
    );
    Ok(())
}
