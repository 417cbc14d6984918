use std::fmt;
use std::path::PathBuf;
use tracing::debug;

use crate::errors::VolumeIoError;
use crate::io::VolumeWriter;
use crate::volume::Volume;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Secondary volume after registration, on the output grid
    RegisteredSecondary,
    /// Distance field of the output coverage before the secondary was added
    OutputDistance,
    /// Distance field of the registered secondary coverage
    SecondaryDistance,
}

impl DiagnosticKind {
    pub fn stem(&self) -> &'static str {
        match self {
            DiagnosticKind::RegisteredSecondary => "registered_secondary",
            DiagnosticKind::OutputDistance => "output_distance",
            DiagnosticKind::SecondaryDistance => "secondary_distance",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.stem())
    }
}

pub trait DiagnosticsSink {
    /// Record a volume produced while merging the secondary at `iteration`.
    fn record(
        &self,
        iteration: usize,
        kind: DiagnosticKind,
        volume: &Volume,
    ) -> Result<(), VolumeIoError>;
}

impl<T: DiagnosticsSink + ?Sized> DiagnosticsSink for &T {
    fn record(
        &self,
        iteration: usize,
        kind: DiagnosticKind,
        volume: &Volume,
    ) -> Result<(), VolumeIoError> {
        (**self).record(iteration, kind, volume)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoDiagnostics;

impl DiagnosticsSink for NoDiagnostics {
    fn record(&self, _: usize, _: DiagnosticKind, _: &Volume) -> Result<(), VolumeIoError> {
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiagnosticsMode {
    /// One file per kind, replaced on every iteration
    #[default]
    Overwrite,
    /// One file per kind and iteration
    PerIteration,
}

/// Writes diagnostic volumes as TIFFs into a directory.
pub struct FileDiagnostics<W> {
    dir: PathBuf,
    mode: DiagnosticsMode,
    writer: W,
}

impl<W: VolumeWriter> FileDiagnostics<W> {
    pub fn new(dir: impl Into<PathBuf>, mode: DiagnosticsMode, writer: W) -> Self {
        Self {
            dir: dir.into(),
            mode,
            writer,
        }
    }

    pub fn path_for(&self, iteration: usize, kind: DiagnosticKind) -> PathBuf {
        let name = match self.mode {
            DiagnosticsMode::Overwrite => format!("{}.tiff", kind.stem()),
            DiagnosticsMode::PerIteration => format!("{}_{:03}.tiff", kind.stem(), iteration),
        };
        self.dir.join(name)
    }
}

impl<W: VolumeWriter> DiagnosticsSink for FileDiagnostics<W> {
    fn record(
        &self,
        iteration: usize,
        kind: DiagnosticKind,
        volume: &Volume,
    ) -> Result<(), VolumeIoError> {
        let path = self.path_for(iteration, kind);
        debug!("Writing {} for secondary {} to {}", kind, iteration, path.display());
        self.writer.write(volume, &path)
    }
}
