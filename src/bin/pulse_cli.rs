use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pulse_canvas::analysis::{SpectrumAnalyser, ANALYSER_FFT_SIZE};
use pulse_canvas::engine::{Engine, Frame, ManualTimeSource};
use pulse_canvas::gallery::{FileImageLoader, MemoryImageLoader};
use pulse_canvas::playback::{CpalOutput, PlaybackPhase, SimulatedOutput};
use pulse_canvas::testing::SyntheticSpectrum;
use pulse_canvas::{init_logging, EngineConfig, TrackManifest};
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pulse_cli",
    about = "Inspect track manifests and drive the audio-reactive engine"
)]
struct Cli {
    /// Log level for engine diagnostics on stderr
    #[arg(long, default_value = "warn")]
    log_level: LevelFilter,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print pool order, pool to segment mapping and image counts
    Inspect {
        #[arg(long)]
        manifest: PathBuf,
    },
    /// Run the engine on a simulated clock and backend, printing events as JSON lines
    Simulate {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value_t = 60.0)]
        seconds: f64,
        #[arg(long, default_value_t = 120.0)]
        bpm: f32,
        /// Duration given to every simulated segment source
        #[arg(long, default_value_t = 30.0)]
        segment_seconds: f64,
    },
    /// Play WAV segments through the default output device until Ctrl-C
    Play {
        #[arg(long)]
        manifest: PathBuf,
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// One JSON line on stdout
#[derive(Serialize)]
struct EventLine<'a, T: Serialize> {
    t: f64,
    channel: &'a str,
    event: &'a T,
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.log_level);

    match cli.command {
        Commands::Inspect { manifest } => run_inspect(&manifest),
        Commands::Simulate {
            manifest,
            config,
            seconds,
            bpm,
            segment_seconds,
        } => runtime()?.block_on(run_simulate(&manifest, config, seconds, bpm, segment_seconds)),
        Commands::Play { manifest, config } => runtime()?.block_on(run_play(&manifest, config)),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")
}

fn load_manifest(path: &Path) -> Result<TrackManifest> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading manifest {}", path.display()))?;
    let manifest =
        TrackManifest::from_json(&json).with_context(|| format!("parsing manifest {}", path.display()))?;
    if manifest.segments.is_empty() {
        bail!("manifest {} lists no segments", path.display());
    }
    Ok(manifest)
}

fn load_config(path: Option<PathBuf>) -> EngineConfig {
    path.map(EngineConfig::load_from_file).unwrap_or_default()
}

fn run_inspect(path: &Path) -> Result<ExitCode> {
    let manifest = load_manifest(path)?;
    let layout = manifest.layout();

    println!("segments: {}", manifest.segments.len());
    for segment in &manifest.segments {
        println!(
            "  [{}] {} pools={:?}",
            segment.audio_index, segment.source_url, segment.subgroups
        );
    }
    println!("pools (in order):");
    for pool in layout.order() {
        let count = manifest.images_by_pool.get(pool).map(Vec::len).unwrap_or(0);
        let owner = layout
            .segment_for_pool(pool)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if layout.is_final_pool(pool) { " (final)" } else { "" };
        println!(
            "  {} -> owner {} shown by {:?} images={}{}",
            pool,
            owner,
            layout.segments_showing(pool),
            count,
            marker
        );
    }
    println!("seek hints: {}", manifest.seek_time_hints.len());
    Ok(ExitCode::from(0))
}

async fn run_simulate(
    path: &Path,
    config: Option<PathBuf>,
    seconds: f64,
    bpm: f32,
    segment_seconds: f64,
) -> Result<ExitCode> {
    let manifest = load_manifest(path)?;
    let config = load_config(config);
    let frame_interval = Duration::from_millis(config.frame.frame_interval_ms.max(1));

    let output = manifest
        .segments
        .iter()
        .fold(SimulatedOutput::new(), |output, segment| {
            output.with_source(&segment.source_url, segment_seconds)
        });
    let spectrum = SyntheticSpectrum::new(frame_interval)
        .with_bpm(bpm)
        .with_sharp_beats()
        .with_voice(60)
        .with_noise(42, 12);
    let clock = ManualTimeSource::new();

    let mut engine = Engine::new(
        config,
        manifest,
        Box::new(output),
        Arc::new(MemoryImageLoader::permissive()),
    )
    .with_clock(Box::new(clock.clone()))
    .with_spectrum(Box::new(spectrum));

    engine.start().context("loading playlist")?;
    engine.settle_gallery().await;
    print_frame(&engine.tick())?;
    engine.play().context("starting playback")?;

    let frames = (seconds / frame_interval.as_secs_f64()).ceil() as u64;
    for _ in 0..frames {
        clock.advance(frame_interval);
        let frame = engine.tick();
        print_frame(&frame)?;
        engine.settle_gallery().await;
        if frame.phase == PlaybackPhase::Ended {
            break;
        }
    }
    Ok(ExitCode::from(0))
}

async fn run_play(path: &Path, config: Option<PathBuf>) -> Result<ExitCode> {
    let mut manifest = load_manifest(path)?;
    let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
    for segment in &mut manifest.segments {
        segment.source_url = root.join(&segment.source_url).to_string_lossy().into_owned();
    }
    let config = load_config(config);

    let mut output = CpalOutput::open().context("opening audio output")?;
    let tap = output.take_tap().context("output tap already taken")?;
    let spectrum = SpectrumAnalyser::with_tap(ANALYSER_FFT_SIZE, tap);

    let mut engine = Engine::new(
        config,
        manifest,
        Box::new(output),
        Arc::new(FileImageLoader::new(root)),
    )
    .with_spectrum(Box::new(spectrum));
    engine.start().context("loading playlist")?;

    while engine.playback().phase() == PlaybackPhase::Loading {
        print_frame(&engine.tick())?;
        tokio::time::sleep(Duration::from_millis(16)).await;
    }
    if engine.playback().phase() != PlaybackPhase::Ready {
        bail!("no segment could be loaded");
    }
    engine.play().context("starting playback")?;

    engine
        .run(
            |frame| {
                if let Err(err) = print_frame(frame) {
                    eprintln!("Error: {err:?}");
                }
            },
            async {
                let _ = tokio::signal::ctrl_c().await;
            },
        )
        .await;
    Ok(ExitCode::from(0))
}

fn print_frame(frame: &Frame) -> Result<()> {
    let t = frame.at.as_secs_f64();
    for event in &frame.playback_events {
        emit(t, "playback", event)?;
    }
    for event in &frame.audio_events {
        emit(t, "audio", event)?;
    }
    for signal in &frame.gallery_signals {
        emit(t, "gallery", signal)?;
    }
    Ok(())
}

fn emit<T: Serialize>(t: f64, channel: &str, event: &T) -> Result<()> {
    let line = EventLine { t, channel, event };
    println!("{}", serde_json::to_string(&line)?);
    Ok(())
}
