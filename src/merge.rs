//! Merging a base volume with any number of secondary volumes.
//!
//! The output grid shares the base frame (spacing, origin, direction) and is
//! widened so every secondary fits. Secondaries are registered against the
//! running output one at a time and blended in; the coverage map records which
//! output voxels have received data so far.

use ndarray::{AxisDescription, Slice};
use snafu::{ResultExt, Snafu};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, info_span};

use crate::blend::{blend_volume, update_coverage, BlendPolicy};
use crate::bounds::{Boundary, BoundsAccumulator};
use crate::diagnostics::{DiagnosticKind, DiagnosticsSink, NoDiagnostics};
use crate::distance::{distance_max, DistanceTransformService};
use crate::errors::VolumeIoError;
use crate::io::{VolumeReader, VolumeWriter};
use crate::progress::{NoProgress, Progress, ProgressReporter};
use crate::registration::{RegistrationAdapter, RegistrationConfig, RegistrationError, RegistrationService};
use crate::volume::{Geometry, Region, RegionError, Volume};

const BASE_LOADED: f64 = 0.1;
const BOUNDS_SHARE: f64 = 0.4;
const SEEDED: f64 = 0.1;
const MASKS_SHARE: f64 = 0.2;
const BLEND_SHARE: f64 = 0.19;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MergeError {
    #[snafu(display("could not load volume {}", path.display()))]
    Load {
        path: PathBuf,
        #[snafu(source(from(VolumeIoError, Box::new)))]
        source: Box<VolumeIoError>,
    },

    #[snafu(display(
        "volume {} has {} axes but the base volume has {}",
        path.display(),
        actual,
        expected
    ))]
    DimensionMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[snafu(display("invalid output region: {}", source))]
    OutputRegion { source: RegionError },

    #[snafu(display("could not register {}", path.display()))]
    Registration {
        path: PathBuf,
        #[snafu(source(from(RegistrationError, Box::new)))]
        source: Box<RegistrationError>,
    },

    #[snafu(display("could not write diagnostic volume {}", kind))]
    Diagnostics {
        kind: DiagnosticKind,
        #[snafu(source(from(VolumeIoError, Box::new)))]
        source: Box<VolumeIoError>,
    },

    #[snafu(display("could not write volume {}", path.display()))]
    Write {
        path: PathBuf,
        #[snafu(source(from(VolumeIoError, Box::new)))]
        source: Box<VolumeIoError>,
    },
}

/// Phases of a merge run, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeStage {
    AccumulateBounds,
    AllocateOutput,
    SeedFromBase,
    Load,
    Register,
    ResampleAndComputeMasks,
    ComputeDistanceFields,
    Blend,
    WriteOutput,
    Done,
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stage_str = match self {
            MergeStage::AccumulateBounds => "accumulate bounds",
            MergeStage::AllocateOutput => "allocate output",
            MergeStage::SeedFromBase => "seed from base",
            MergeStage::Load => "load",
            MergeStage::Register => "register",
            MergeStage::ResampleAndComputeMasks => "resample and compute masks",
            MergeStage::ComputeDistanceFields => "compute distance fields",
            MergeStage::Blend => "blend",
            MergeStage::WriteOutput => "write output",
            MergeStage::Done => "done",
        };
        write!(f, "{}", stage_str)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MergeConfig {
    pub boundary: Boundary,
    pub background: f64,
    pub policy: BlendPolicy,
    pub registration: RegistrationConfig,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            boundary: Boundary::none(),
            background: 0.0,
            policy: BlendPolicy::default(),
            registration: RegistrationConfig::default(),
        }
    }
}

/// The output volume and its coverage map, on the same grid.
#[derive(Clone, Debug, PartialEq)]
pub struct MergeAccumulator {
    output: Volume,
    coverage: Volume,
}

impl MergeAccumulator {
    /// Output filled with `background` and nothing covered.
    pub fn new(geometry: Geometry, background: f32) -> Self {
        let output = Volume::filled(geometry, background);
        let coverage = output.same_grid_filled(0.0);
        Self { output, coverage }
    }

    pub fn output(&self) -> &Volume {
        &self.output
    }

    pub fn coverage(&self) -> &Volume {
        &self.coverage
    }

    /// Copy `base` into the output at the same absolute indices and mark it
    /// covered. Returns the number of voxels copied, zero when the base does
    /// not lie inside the output region.
    pub fn seed_from(&mut self, base: &Volume) -> usize {
        let region = self.output.region();
        let offset = match region.offset_of(base.region().index()) {
            Some(offset) if region.contains_region(base.region()) => offset,
            _ => return 0,
        };
        let size = base.region().size();
        let block = |ax: AxisDescription| {
            let axis = ax.axis.index();
            Slice::from(offset[axis]..offset[axis] + size[axis])
        };
        self.output
            .data_mut()
            .slice_each_axis_mut(block)
            .assign(base.data());
        self.coverage.data_mut().slice_each_axis_mut(block).fill(1.0);
        base.region().num_voxels()
    }

    /// Mark every voxel covered by `mask` and return the coverage as it was
    /// before.
    pub fn absorb_coverage(&mut self, mask: &Volume) -> Volume {
        let prior = self.coverage.clone();
        let newly_covered = update_coverage(self.coverage.data_mut(), mask.data());
        debug!("{} voxels newly covered", newly_covered);
        prior
    }

    pub fn covered_voxels(&self) -> usize {
        self.coverage.data().iter().filter(|&&v| v != 0.0).count()
    }

    pub fn into_parts(self) -> (Volume, Volume) {
        (self.output, self.coverage)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MergeSummary {
    pub region: Region,
    pub secondaries: usize,
    pub covered_voxels: usize,
}

pub struct MergeDriver<'a, R, G, D> {
    reader: R,
    registration: G,
    distance: D,
    config: MergeConfig,
    progress: &'a dyn ProgressReporter,
    diagnostics: &'a dyn DiagnosticsSink,
}

impl<'a, R, G, D> MergeDriver<'a, R, G, D>
where
    R: VolumeReader,
    G: RegistrationService,
    D: DistanceTransformService,
{
    pub fn new(reader: R, registration: G, distance: D, config: MergeConfig) -> Self {
        Self {
            reader,
            registration,
            distance,
            config,
            progress: &NoProgress,
            diagnostics: &NoDiagnostics,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: &'a dyn DiagnosticsSink) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    fn load(&self, path: &Path, ndim: Option<usize>) -> Result<Volume, MergeError> {
        let _span = info_span!("load", path = %path.display()).entered();
        let volume = self.reader.read(path).context(LoadSnafu { path })?;
        if let Some(expected) = ndim {
            if volume.ndim() != expected {
                return DimensionMismatchSnafu {
                    path,
                    expected,
                    actual: volume.ndim(),
                }
                .fail();
            }
        }
        debug!("Loaded {} with region {}", path.display(), volume.region());
        Ok(volume)
    }

    fn record(&self, iteration: usize, kind: DiagnosticKind, volume: &Volume) -> Result<(), MergeError> {
        self.diagnostics
            .record(iteration, kind, volume)
            .context(DiagnosticsSnafu { kind })
    }

    /// Merge the secondaries into the base and return the output volume with
    /// its coverage map.
    pub fn merge(&self, base: &Path, secondaries: &[PathBuf]) -> Result<MergeAccumulator, MergeError> {
        let mut progress = Progress::new(self.progress);
        self.merge_with(base, secondaries, &mut progress)
    }

    fn merge_with(
        &self,
        base: &Path,
        secondaries: &[PathBuf],
        progress: &mut Progress,
    ) -> Result<MergeAccumulator, MergeError> {
        let background = self.config.background;
        let share = 1.0 / secondaries.len().max(1) as f64;

        let base_volume = self.load(base, None)?;
        let ndim = base_volume.ndim();
        progress.set(BASE_LOADED);

        debug!("Stage: {}", MergeStage::AccumulateBounds);
        let mut bounds = BoundsAccumulator::new(base_volume.geometry(), &self.config.boundary);
        for path in secondaries {
            let secondary = self.load(path, Some(ndim))?;
            bounds.include(secondary.geometry());
            progress.advance(BOUNDS_SHARE * share);
        }

        debug!("Stage: {}", MergeStage::AllocateOutput);
        let region = bounds.region().context(OutputRegionSnafu)?;
        info!(
            "Output region index {:?} size {:?}",
            region.index(),
            region.size()
        );
        let mut accumulator =
            MergeAccumulator::new(base_volume.geometry().with_region(region), background as f32);

        debug!("Stage: {}", MergeStage::SeedFromBase);
        let seeded = accumulator.seed_from(&base_volume);
        debug!("Seeded {} voxels from {}", seeded, base.display());
        drop(base_volume);
        progress.advance(SEEDED);

        for (iteration, path) in secondaries.iter().enumerate() {
            info!(
                "Merging {} ({}/{})",
                path.display(),
                iteration + 1,
                secondaries.len()
            );
            let secondary = self.load(path, Some(ndim))?;

            let registered = {
                let _span = info_span!("register", path = %path.display()).entered();
                RegistrationAdapter::new(&self.registration, &self.config.registration)
                    .align(accumulator.output(), &secondary, background)
                    .context(RegistrationSnafu { path })?
            };
            self.record(iteration, DiagnosticKind::RegisteredSecondary, &registered.resampled)?;

            debug!("Stage: {}", MergeStage::ResampleAndComputeMasks);
            let secondary_mask = registered.coverage_mask(secondary.geometry());
            let prior_coverage = accumulator.absorb_coverage(&secondary_mask);
            progress.advance(MASKS_SHARE * share);

            let _span = info_span!("blend", path = %path.display()).entered();
            debug!("Stage: {}", MergeStage::ComputeDistanceFields);
            let output_distance = self.distance.distance_field(&prior_coverage);
            let secondary_distance = self.distance.distance_field(&secondary_mask);
            let dist_max = distance_max(&secondary_distance);
            debug!("Secondary distance maximum {}", dist_max);
            self.record(iteration, DiagnosticKind::OutputDistance, &output_distance)?;
            self.record(iteration, DiagnosticKind::SecondaryDistance, &secondary_distance)?;

            debug!("Stage: {} ({})", MergeStage::Blend, self.config.policy);
            blend_volume(
                self.config.policy,
                accumulator.output.data_mut(),
                output_distance.data(),
                registered.resampled.data(),
                secondary_distance.data(),
                dist_max,
            );
            progress.advance(BLEND_SHARE * share);
        }

        Ok(accumulator)
    }

    /// Merge and write the output volume, and the coverage map when a path is
    /// given. Nothing is written if any step fails.
    pub fn run<W: VolumeWriter>(
        &self,
        base: &Path,
        secondaries: &[PathBuf],
        output: &Path,
        writer: &W,
        coverage: Option<&Path>,
    ) -> Result<MergeSummary, MergeError> {
        let mut progress = Progress::new(self.progress);
        let accumulator = self.merge_with(base, secondaries, &mut progress)?;
        let covered_voxels = accumulator.covered_voxels();
        let (volume, coverage_map) = accumulator.into_parts();

        {
            let _span = info_span!("save", path = %output.display()).entered();
            debug!("Stage: {}", MergeStage::WriteOutput);
            writer.write(&volume, output).context(WriteSnafu { path: output })?;
            if let Some(path) = coverage {
                writer.write(&coverage_map, path).context(WriteSnafu { path })?;
            }
        }
        progress.complete();
        debug!("Stage: {}", MergeStage::Done);

        Ok(MergeSummary {
            region: volume.region().clone(),
            secondaries: secondaries.len(),
            covered_voxels,
        })
    }
}
