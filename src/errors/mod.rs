pub mod dicom;
pub mod io;

pub use dicom::DicomError;
pub use io::VolumeIoError;
