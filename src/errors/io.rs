use snafu::Snafu;
use std::path::PathBuf;
use tiff::ColorType;
use tiff::TiffError as BaseTiffError;

use crate::errors::DicomError;
use crate::volume::{GeometryError, RegionError, ShapeError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum VolumeIoError {
    #[snafu(display("could not open volume file {}", path.display()))]
    Open {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("could not create volume file {}", path.display()))]
    Create {
        path: PathBuf,
        #[snafu(source(from(std::io::Error, Box::new)))]
        source: Box<std::io::Error>,
    },

    #[snafu(display("error reading TIFF file {}", path.display()))]
    ReadTiff {
        path: PathBuf,
        #[snafu(source(from(BaseTiffError, Box::new)))]
        source: Box<BaseTiffError>,
    },

    #[snafu(display("error writing TIFF file {}", path.display()))]
    WriteTiff {
        path: PathBuf,
        #[snafu(source(from(BaseTiffError, Box::new)))]
        source: Box<BaseTiffError>,
    },

    #[snafu(display("unsupported volume format: {}", path.display()))]
    UnsupportedFormat { path: PathBuf },

    #[snafu(display("unsupported color type {:?} in {}", color_type, path.display()))]
    UnsupportedColorType { path: PathBuf, color_type: ColorType },

    #[snafu(display(
        "page {} of {} is {}x{}, expected {}x{}",
        page,
        path.display(),
        width,
        height,
        expected_width,
        expected_height
    ))]
    InconsistentPages {
        path: PathBuf,
        page: usize,
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },

    #[snafu(display("invalid geometry in {}: {}", path.display(), reason))]
    InvalidGeometry { path: PathBuf, reason: String },

    #[snafu(display("volumes with {} axes cannot be stored in {}", ndim, path.display()))]
    UnsupportedDimension { path: PathBuf, ndim: usize },

    #[snafu(display("DICOM error on {}: {}", path.display(), source))]
    Dicom {
        path: PathBuf,
        #[snafu(source(from(DicomError, Box::new)))]
        source: Box<DicomError>,
    },
}

impl VolumeIoError {
    pub fn geometry(path: impl Into<PathBuf>, error: GeometryError) -> Self {
        Self::InvalidGeometry {
            path: path.into(),
            reason: error.to_string(),
        }
    }

    pub fn region(path: impl Into<PathBuf>, error: RegionError) -> Self {
        Self::InvalidGeometry {
            path: path.into(),
            reason: error.to_string(),
        }
    }

    pub fn shape(path: impl Into<PathBuf>, error: ShapeError) -> Self {
        Self::InvalidGeometry {
            path: path.into(),
            reason: error.to_string(),
        }
    }
}
