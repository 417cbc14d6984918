use dicom::core::value::ConvertValueError;
use dicom::object::ReadError;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
/// Errors that can occur when reading a volume from a DICOM file
pub enum DicomError {
    #[snafu(display("error reading DICOM file: {:?}", source))]
    ReadError {
        #[snafu(source(from(ReadError, Box::new)))]
        source: Box<ReadError>,
    },
    #[snafu(display("unable to convert DICOM property value '{}': {:?}", name, source))]
    ConvertValueError {
        name: &'static str,
        #[snafu(source(from(ConvertValueError, Box::new)))]
        source: Box<ConvertValueError>,
    },
    #[snafu(display("invalid DICOM property value '{}': {}", name, value))]
    InvalidValueError {
        name: &'static str,
        value: String,
    },
    #[snafu(display("error processing DICOM pixel data: {:?}", source))]
    PixelDataError {
        #[snafu(source(from(dicom::pixeldata::Error, Box::new)))]
        source: Box<dicom::pixeldata::Error>,
    },
    #[snafu(display("unsupported samples per pixel: {}", samples))]
    UnsupportedSamplesPerPixel { samples: usize },
}
