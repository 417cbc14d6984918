pub mod dicom;
pub mod tiff;

use std::ffi::OsStr;
use std::path::Path;

use crate::errors::VolumeIoError;
use crate::volume::Volume;

pub trait VolumeReader {
    fn read(&self, path: &Path) -> Result<Volume, VolumeIoError>;
}

pub trait VolumeWriter {
    fn write(&self, volume: &Volume, path: &Path) -> Result<(), VolumeIoError>;
}

impl<T: VolumeReader + ?Sized> VolumeReader for &T {
    fn read(&self, path: &Path) -> Result<Volume, VolumeIoError> {
        (**self).read(path)
    }
}

impl<T: VolumeWriter + ?Sized> VolumeWriter for &T {
    fn write(&self, volume: &Volume, path: &Path) -> Result<(), VolumeIoError> {
        (**self).write(volume, path)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeFormat {
    Tiff,
    Dicom,
}

impl VolumeFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension().and_then(OsStr::to_str)?;
        match extension.to_lowercase().as_str() {
            "tif" | "tiff" => Some(VolumeFormat::Tiff),
            "dcm" | "dicom" => Some(VolumeFormat::Dicom),
            _ => None,
        }
    }
}

/// Volumes on disk. TIFF can be read and written, DICOM can only be read.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileVolumeIo;

impl VolumeReader for FileVolumeIo {
    fn read(&self, path: &Path) -> Result<Volume, VolumeIoError> {
        match VolumeFormat::from_path(path) {
            Some(VolumeFormat::Tiff) => tiff::read_tiff(path),
            Some(VolumeFormat::Dicom) => dicom::read_dicom(path),
            None => Err(VolumeIoError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}

impl VolumeWriter for FileVolumeIo {
    fn write(&self, volume: &Volume, path: &Path) -> Result<(), VolumeIoError> {
        match VolumeFormat::from_path(path) {
            Some(VolumeFormat::Tiff) => tiff::write_tiff(volume, path),
            _ => Err(VolumeIoError::UnsupportedFormat {
                path: path.to_path_buf(),
            }),
        }
    }
}
