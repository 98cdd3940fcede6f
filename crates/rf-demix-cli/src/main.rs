//! rf-demix - separate tracks into drums, bass, other and vocals
//!
//! Usage:
//!   rf-demix song.wav                      - 10 random shifts, whole track at once
//!   rf-demix --split --shifts 2 a.wav b.wav - 8 second windows, 2 shifts each
//!   rf-demix -n tasnet --geometry exact --split song.wav
//!
//! Stems land in `<out>/<name>/<track>/{drums,bass,other,vocals}.wav`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::Parser;

use rf_demix::audio::{read_wav, track_folder, write_stems};
use rf_demix::format::{format_bytes, format_duration};
use rf_demix::models::{DEFAULT_MODEL, model_path, verify_model};
use rf_demix::separation::{SeparationConfig, Separator};
use rf_demix::{OnnxPredictor, Predictor, ValidLength};

#[derive(Parser, Debug)]
#[command(name = "rf-demix", about = "Separate the sources for the given tracks")]
struct Cli {
    /// Path to tracks (44.1kHz WAV)
    #[arg(required = true)]
    tracks: Vec<PathBuf>,

    /// Model name, loaded from `<models>/<name>.onnx`
    #[arg(short, long, default_value = DEFAULT_MODEL)]
    name: String,

    /// Folder where to put extracted tracks. A subfolder with the model name will be created.
    #[arg(short, long, default_value = "separated")]
    out: PathBuf,

    /// Path to trained models
    #[arg(long, default_value = "models")]
    models: PathBuf,

    /// Number of random shifts for equivariant stabilization [default: 10]
    #[arg(long)]
    shifts: Option<usize>,

    /// Split the input in chunks of 8 seconds. Required for memory hungry models
    #[arg(long, conflicts_with = "no_split")]
    split: bool,

    /// Process the whole track at once, even if the config file enables split
    #[arg(long)]
    no_split: bool,

    /// Process chunks and shifts on all cores
    #[arg(long, conflicts_with = "no_parallel")]
    parallel: bool,

    /// Stay single-threaded, even if the config file enables parallel
    #[arg(long)]
    no_parallel: bool,

    /// Seed for the random shifts
    #[arg(long)]
    seed: Option<u64>,

    /// Expected SHA-256 of the model file
    #[arg(long)]
    sha256: Option<String>,

    /// Model input length rule: exact, demucs or multiple:<n> [default: demucs]
    #[arg(long, value_parser = parse_geometry)]
    geometry: Option<ValidLength>,

    /// JSON separation config; command-line flags take precedence
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    run(&cli)
}

fn run(cli: &Cli) -> Result<()> {
    let config = build_config(cli)?;

    let path = model_path(&cli.models, &cli.name);
    if !path.is_file() {
        bail!(
            "Could not find model {}, export it to ONNX and place it there",
            path.display()
        );
    }
    if let Some(expected) = &cli.sha256 {
        verify_model(&path, expected)
            .with_context(|| format!("Verifying model {}", path.display()))?;
    }

    let size = std::fs::metadata(&path)?.len();
    log::info!("Model {} ({})", path.display(), format_bytes(size));

    let predictor = OnnxPredictor::new(&path, config.geometry)
        .with_context(|| format!("Loading model {}", path.display()))?;
    let mut separator = Separator::new(predictor, config, cli.name.clone())?;

    for (i, track) in cli.tracks.iter().enumerate() {
        log::info!("[{}/{}] {}", i + 1, cli.tracks.len(), track.display());
        separate_track(&mut separator, track, &cli.out)?;
    }

    Ok(())
}

/// Config file (or defaults) overridden by explicit flags
fn build_config(cli: &Cli) -> Result<SeparationConfig> {
    let mut config = match &cli.config {
        Some(path) => SeparationConfig::from_json_file(path)
            .with_context(|| format!("Reading config {}", path.display()))?,
        None => SeparationConfig::default(),
    };

    if let Some(shifts) = cli.shifts {
        config.shifts = shifts;
    }
    if let Some(seed) = cli.seed {
        config.seed = Some(seed);
    }
    if let Some(geometry) = cli.geometry {
        config.geometry = geometry;
    }
    if let Some(split) = switch(cli.split, cli.no_split) {
        config.split = split;
    }
    if let Some(parallel) = switch(cli.parallel, cli.no_parallel) {
        config.parallel = parallel;
    }

    config.validate()?;
    Ok(config)
}

/// `--x` / `--no-x` pair; `None` leaves the config value alone
fn switch(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}

fn separate_track<P: Predictor>(separator: &mut Separator<P>, track: &Path, out: &Path) -> Result<()> {
    let start = Instant::now();
    let sample_rate = separator.config().sample_rate;

    let mix = read_wav(track, sample_rate).with_context(|| format!("Reading {}", track.display()))?;
    let stems = separator
        .separate(mix.view())
        .with_context(|| format!("Separating {}", track.display()))?;

    let folder = track_folder(out, separator.model_name(), track);
    let written = write_stems(&stems, &folder)
        .with_context(|| format!("Writing stems to {}", folder.display()))?;

    for stem in stems.iter() {
        log::debug!(
            "{:>6}: peak {:.3}, rms {:.4}",
            stem.stem_type.display_name(),
            stem.peak(),
            stem.rms()
        );
    }
    log::info!(
        "Wrote {} stems to {} in {}",
        written.len(),
        folder.display(),
        format_duration(start.elapsed().as_secs_f64())
    );
    Ok(())
}

fn parse_geometry(value: &str) -> Result<ValidLength, String> {
    match value {
        "exact" => Ok(ValidLength::Exact),
        "demucs" => Ok(ValidLength::demucs()),
        other => match other.strip_prefix("multiple:") {
            Some(n) => match n.parse::<usize>() {
                Ok(of) if of > 0 => Ok(ValidLength::Multiple { of }),
                _ => Err(format!("invalid multiple '{}'", n)),
            },
            None => Err(format!(
                "unknown geometry '{}' (expected exact, demucs or multiple:<n>)",
                other
            )),
        },
    }
}
