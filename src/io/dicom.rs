use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, FileDicomObject, InMemDicomObject};
use dicom::pixeldata::PixelDecoder;
use ndarray::{ArrayD, IxDyn};
use snafu::ResultExt;
use std::path::Path;

use crate::errors::dicom::{
    ConvertValueSnafu, InvalidValueSnafu, PixelDataSnafu, ReadSnafu,
    UnsupportedSamplesPerPixelSnafu,
};
use crate::errors::io::DicomSnafu;
use crate::errors::{DicomError, VolumeIoError};
use crate::volume::{Direction, Geometry, Region, Volume};

fn float_values(
    file: &FileDicomObject<InMemDicomObject>,
    tag: Tag,
    name: &'static str,
) -> Result<Option<Vec<f64>>, DicomError> {
    file.get(tag)
        .map(|element| {
            element
                .value()
                .to_multi_float64()
                .context(ConvertValueSnafu { name })
        })
        .transpose()
}

fn expect_len(values: Vec<f64>, len: usize, name: &'static str) -> Result<Vec<f64>, DicomError> {
    if values.len() < len {
        return InvalidValueSnafu {
            name,
            value: format!("{:?}", values),
        }
        .fail();
    }
    Ok(values)
}

/// Voxel spacing in (x, y, z) order. Pixel Spacing lists the row spacing first.
fn spacing(file: &FileDicomObject<InMemDicomObject>) -> Result<Vec<f64>, DicomError> {
    let (x, y) = match float_values(file, tags::PIXEL_SPACING, "Pixel Spacing")? {
        Some(values) => {
            let values = expect_len(values, 2, "Pixel Spacing")?;
            (values[1], values[0])
        }
        None => (1.0, 1.0),
    };
    let z = float_values(file, tags::SPACING_BETWEEN_SLICES, "Spacing Between Slices")?
        .or(float_values(file, tags::SLICE_THICKNESS, "Slice Thickness")?)
        .and_then(|values| values.first().copied())
        .map(f64::abs)
        .filter(|&z| z > 0.0)
        .unwrap_or(1.0);
    Ok(vec![x, y, z])
}

fn origin(file: &FileDicomObject<InMemDicomObject>) -> Result<Vec<f64>, DicomError> {
    match float_values(file, tags::IMAGE_POSITION_PATIENT, "Image Position (Patient)")? {
        Some(values) => {
            let mut values = expect_len(values, 3, "Image Position (Patient)")?;
            values.truncate(3);
            Ok(values)
        }
        None => Ok(vec![0.0; 3]),
    }
}

/// Direction with the row cosine, column cosine and slice normal as columns.
fn direction(file: &FileDicomObject<InMemDicomObject>) -> Result<Direction, DicomError> {
    let name = "Image Orientation (Patient)";
    let values = match float_values(file, tags::IMAGE_ORIENTATION_PATIENT, name)? {
        Some(values) => expect_len(values, 6, name)?,
        None => return Ok(Direction::identity(3)),
    };
    let (r, c) = (&values[0..3], &values[3..6]);
    let n = [
        r[1] * c[2] - r[2] * c[1],
        r[2] * c[0] - r[0] * c[2],
        r[0] * c[1] - r[1] * c[0],
    ];
    let row_major = [r[0], c[0], n[0], r[1], c[1], n[1], r[2], c[2], n[2]];
    Direction::from_row_major(3, &row_major).map_err(|e| DicomError::InvalidValueError {
        name,
        value: e.to_string(),
    })
}

fn read_volume(file: &FileDicomObject<InMemDicomObject>, path: &Path) -> Result<Volume, VolumeIoError> {
    let pixels = file
        .decode_pixel_data()
        .context(PixelDataSnafu)
        .context(DicomSnafu { path })?;
    let samples = pixels.samples_per_pixel() as usize;
    if samples != 1 {
        return UnsupportedSamplesPerPixelSnafu { samples }
            .fail()
            .context(DicomSnafu { path });
    }
    let frames = pixels
        .to_ndarray::<f32>()
        .context(PixelDataSnafu)
        .context(DicomSnafu { path })?;

    // Decoded frames are (frame, row, column, sample)
    let shape = frames.shape().to_vec();
    let size = vec![shape[2], shape[1], shape[0]];
    let data = ArrayD::from_shape_fn(IxDyn(&size), |i| frames[[i[2], i[1], i[0], 0]]);

    let region = Region::from_size(size).map_err(|e| VolumeIoError::region(path, e))?;
    let spacing = spacing(file).context(DicomSnafu { path })?;
    let origin = origin(file).context(DicomSnafu { path })?;
    let direction = direction(file).context(DicomSnafu { path })?;
    let geometry = Geometry::new(region, spacing, origin, direction)
        .map_err(|e| VolumeIoError::geometry(path, e))?;
    Volume::new(geometry, data).map_err(|e| VolumeIoError::shape(path, e))
}

/// Read a single or multi-frame grayscale DICOM file as a 3D volume.
pub fn read_dicom(path: &Path) -> Result<Volume, VolumeIoError> {
    let file = open_file(path)
        .context(ReadSnafu)
        .context(DicomSnafu { path })?;
    read_volume(&file, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR};
    use ndarray::{array, Array2};
    use rstest::rstest;

    #[test]
    fn test_read_ct_small() {
        let path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let volume = read_dicom(&path).unwrap();
        assert_eq!(volume.region().size(), &[128, 128, 1]);
        assert_eq!(volume.region().index(), &[0, 0, 0]);
        let spacing = volume.geometry().spacing();
        assert!((spacing[0] - 0.661468).abs() < 1e-6);
        assert!((spacing[1] - 0.661468).abs() < 1e-6);
        assert!((spacing[2] - 5.0).abs() < 1e-6);

        let expected_origin = [-158.135803, -179.035797, -75.699997];
        for (actual, expected) in volume.geometry().origin().iter().zip(expected_origin) {
            assert!((actual - expected).abs() < 1e-4);
        }
        assert_eq!(volume.geometry().direction().matrix(), &Array2::<f64>::eye(3));
    }

    fn put_decimals(file: &mut FileDicomObject<InMemDicomObject>, tag: Tag, values: &[&str]) {
        let values = values.iter().map(|v| v.to_string()).collect();
        file.put_element(DataElement::new(tag, VR::DS, PrimitiveValue::Strs(values)));
    }

    #[test]
    fn test_direction_from_orientation() {
        let path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let mut file = open_file(&path).unwrap();
        // Rows run along y, columns along z, so the slice normal is x
        put_decimals(&mut file, tags::IMAGE_ORIENTATION_PATIENT, &["0", "1", "0", "0", "0", "1"]);
        let direction = direction(&file).unwrap();
        assert_eq!(
            direction.matrix(),
            &array![[0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
        );
    }

    #[rstest]
    #[case(Some("2.5"), 2.5)]
    #[case(None, 5.0)]
    fn test_slice_spacing_precedence(#[case] between: Option<&str>, #[case] expected: f64) {
        let path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let mut file = open_file(&path).unwrap();
        if let Some(between) = between {
            put_decimals(&mut file, tags::SPACING_BETWEEN_SLICES, &[between]);
        }
        assert_eq!(spacing(&file).unwrap()[2], expected);
    }

    #[test]
    fn test_slice_spacing_default() {
        let path = dicom_test_files::path("pydicom/CT_small.dcm").unwrap();
        let mut file = open_file(&path).unwrap();
        file.remove_element(tags::SLICE_THICKNESS);
        file.remove_element(tags::SPACING_BETWEEN_SLICES);
        assert_eq!(spacing(&file).unwrap()[2], 1.0);
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_dicom(Path::new("does/not/exist.dcm"));
        assert!(matches!(result, Err(VolumeIoError::Dicom { .. })));
    }
}
