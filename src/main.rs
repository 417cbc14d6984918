use clap::error::ErrorKind;
use clap::Parser;
use snafu::{Report, ResultExt, Snafu, Whatever};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

use volume_merge::blend::BlendPolicy;
use volume_merge::bounds::Boundary;
use volume_merge::diagnostics::{DiagnosticsMode, DiagnosticsSink, FileDiagnostics, NoDiagnostics};
use volume_merge::distance::EuclideanDistanceTransform;
use volume_merge::io::FileVolumeIo;
use volume_merge::merge::{MergeConfig, MergeDriver, MergeError, MergeSummary};
use volume_merge::progress::BarProgress;
use volume_merge::registration::{
    GeometryRegistration, RegistrationConfig, DEFAULT_EXPECTED_OFFSET, DEFAULT_EXPECTED_ROTATION,
    DEFAULT_ITERATIONS, DEFAULT_SAMPLING_RATIO,
};

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Invalid input path: {}", path.display()))]
    InvalidInputPath { path: PathBuf },

    #[snafu(display("Failed to create directory: {}", path.display()))]
    CreateDir {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("Merge failed"))]
    Merge {
        #[snafu(source(from(MergeError, Box::new)))]
        source: Box<MergeError>,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum, Default, PartialEq, Eq)]
enum CliDiagnosticsMode {
    #[default]
    Overwrite,
    PerIteration,
    Off,
}

impl fmt::Display for CliDiagnosticsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode_str = match self {
            CliDiagnosticsMode::Overwrite => "overwrite",
            CliDiagnosticsMode::PerIteration => "per-iteration",
            CliDiagnosticsMode::Off => "off",
        };
        write!(f, "{}", mode_str)
    }
}

fn parse_boundary(s: &str) -> Result<Boundary, clap::Error> {
    s.split(',')
        .map(|part| {
            part.trim().parse::<u64>().map_err(|_| {
                clap::Error::raw(ErrorKind::InvalidValue, "Boundary must be a list like x,y,z")
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Boundary::new)
}

#[derive(Parser, Debug)]
#[command(author = "Scott Chase Waggener", version = env!("CARGO_PKG_VERSION"), about = "Merge overlapping volumes into a single volume", long_about = None)]
struct Args {
    #[arg(help = "Base volume. Its voxel frame is kept for the output")]
    base: PathBuf,

    #[arg(help = "Output volume (.tif or .tiff)")]
    output: PathBuf,

    #[arg(
        help = "Secondary volumes to merge into the base, in order. Repeat the flag or pass a comma separated list",
        long = "input",
        short = 'i',
        value_delimiter = ','
    )]
    inputs: Vec<PathBuf>,

    #[arg(
        help = "Padding in voxels added on each side of every volume (x,y,z). Ignored if the number of entries does not match the volume",
        long = "boundary",
        short = 'b',
        value_parser = clap::builder::ValueParser::new(parse_boundary),
    )]
    boundary: Option<Boundary>,

    #[arg(
        help = "Value for output voxels that no volume covers",
        long = "background",
        default_value_t = 0.0
    )]
    background: f64,

    #[arg(
        help = "Average overlapping voxels",
        long = "average",
        short = 'a',
        default_value_t = false
    )]
    average: bool,

    #[arg(
        help = "Blend overlapping voxels weighted by the distance to the edge of each volume. Takes precedence over --average",
        long = "weighted",
        short = 'w',
        default_value_t = false
    )]
    weighted: bool,

    #[arg(
        help = "Fraction of voxels sampled by the registration metric",
        long = "sampling-ratio",
        default_value_t = DEFAULT_SAMPLING_RATIO
    )]
    sampling_ratio: f64,

    #[arg(
        help = "Maximum number of registration iterations",
        long = "iterations",
        default_value_t = DEFAULT_ITERATIONS
    )]
    iterations: u32,

    #[arg(
        help = "Expected offset between volumes, in voxels",
        long = "expected-offset",
        default_value_t = DEFAULT_EXPECTED_OFFSET
    )]
    expected_offset: f64,

    #[arg(
        help = "Expected rotation between volumes, in radians",
        long = "expected-rotation",
        default_value_t = DEFAULT_EXPECTED_ROTATION
    )]
    expected_rotation: f64,

    #[arg(
        help = "Write the last registration transform to this path",
        long = "save-transform"
    )]
    save_transform: Option<PathBuf>,

    #[arg(
        help = "Also write the coverage map to this path",
        long = "coverage"
    )]
    coverage: Option<PathBuf>,

    #[arg(
        help = "Directory for intermediate volumes",
        long = "diagnostics",
        default_value = "."
    )]
    diagnostics: PathBuf,

    #[arg(
        help = "How intermediate volumes are named",
        long = "diagnostics-mode",
        value_parser = clap::value_parser!(CliDiagnosticsMode),
        default_value_t = CliDiagnosticsMode::default(),
    )]
    diagnostics_mode: CliDiagnosticsMode,

    #[arg(
        help = "Enable verbose logging",
        long = "verbose",
        short = 'v',
        default_value = "false"
    )]
    verbose: bool,
}

impl Args {
    fn merge_config(&self) -> MergeConfig {
        MergeConfig {
            boundary: self.boundary.clone().unwrap_or_default(),
            background: self.background,
            policy: BlendPolicy::from_flags(self.average, self.weighted),
            registration: RegistrationConfig {
                sampling_ratio: self.sampling_ratio,
                iterations: self.iterations,
                expected_offset: self.expected_offset,
                expected_rotation: self.expected_rotation,
                sample_from_overlap: true,
                save_transform: self.save_transform.clone(),
            },
        }
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::ERROR
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(level)
            .with_span_events(FmtSpan::CLOSE)
            .finish(),
    )
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    run(args).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-1);
    });
}

fn validate_paths(args: &Args) -> Result<(), Error> {
    for path in std::iter::once(&args.base).chain(&args.inputs) {
        if !path.is_file() {
            return Err(Error::InvalidInputPath { path: path.clone() });
        }
    }
    if args.diagnostics_mode != CliDiagnosticsMode::Off && !args.diagnostics.exists() {
        std::fs::create_dir_all(&args.diagnostics).context(CreateDirSnafu {
            path: args.diagnostics.clone(),
        })?;
    }
    Ok(())
}

fn run(args: Args) -> Result<MergeSummary, Error> {
    validate_paths(&args)?;
    let config = args.merge_config();
    info!(
        "Merging {} secondaries into {} with policy {}",
        args.inputs.len(),
        args.base.display(),
        config.policy
    );

    let diagnostics: Box<dyn DiagnosticsSink> = match args.diagnostics_mode {
        CliDiagnosticsMode::Overwrite => Box::new(FileDiagnostics::new(
            &args.diagnostics,
            DiagnosticsMode::Overwrite,
            FileVolumeIo,
        )),
        CliDiagnosticsMode::PerIteration => Box::new(FileDiagnostics::new(
            &args.diagnostics,
            DiagnosticsMode::PerIteration,
            FileVolumeIo,
        )),
        CliDiagnosticsMode::Off => Box::new(NoDiagnostics),
    };
    let progress = BarProgress::new("Merging volumes");

    let summary = MergeDriver::new(FileVolumeIo, GeometryRegistration, EuclideanDistanceTransform, config)
        .with_progress(&progress)
        .with_diagnostics(diagnostics.as_ref())
        .run(
            &args.base,
            &args.inputs,
            &args.output,
            &FileVolumeIo,
            args.coverage.as_deref(),
        )
        .context(MergeSnafu)?;

    info!(
        "Wrote {} with region {} ({} voxels covered)",
        args.output.display(),
        summary.region,
        summary.covered_voxels
    );
    Ok(summary)
}
