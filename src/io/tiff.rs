//! Volumes as multi-page grayscale TIFFs.
//!
//! Each page holds one z slice. The physical placement of the volume is kept in
//! private DOUBLE tags on the first page, so a merged volume can be read back
//! with its region and frame intact. Files without these tags are read as 3D
//! volumes with unit spacing, zero origin and identity direction.

use ndarray::{ArrayD, IxDyn};
use num::ToPrimitive;
use rayon::prelude::*;
use snafu::ResultExt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::{ColorType, Gray32Float};
use tiff::encoder::compression::{Compression, Deflate};
use tiff::encoder::{ImageEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tiff::TiffError;

use crate::errors::io::{CreateSnafu, OpenSnafu, ReadTiffSnafu, WriteTiffSnafu};
use crate::errors::VolumeIoError;
use crate::volume::{Direction, Geometry, Region, Volume};

pub const VOLUME_SPACING: u16 = 65000;
pub const VOLUME_ORIGIN: u16 = 65001;
pub const VOLUME_DIRECTION: u16 = 65002;
pub const VOLUME_INDEX: u16 = 65003;

const VERSION: &str = concat!("volume-merge==", env!("CARGO_PKG_VERSION"));

pub trait WriteTags {
    /// Write tags describing the volume to a TIFF encoder.
    fn write_tags<W, C, K, D>(&self, tiff: &mut ImageEncoder<W, C, K, D>) -> Result<(), TiffError>
    where
        W: Write + Seek,
        C: ColorType,
        K: TiffKind,
        D: Compression;
}

impl WriteTags for Geometry {
    fn write_tags<W, C, K, D>(&self, tiff: &mut ImageEncoder<W, C, K, D>) -> Result<(), TiffError>
    where
        W: Write + Seek,
        C: ColorType,
        K: TiffKind,
        D: Compression,
    {
        let index: Vec<f64> = self.region().index().iter().map(|&i| i as f64).collect();
        let direction = self.direction().to_row_major();
        let encoder = tiff.encoder();
        encoder.write_tag(Tag::Unknown(VOLUME_SPACING), self.spacing())?;
        encoder.write_tag(Tag::Unknown(VOLUME_ORIGIN), self.origin())?;
        encoder.write_tag(Tag::Unknown(VOLUME_DIRECTION), direction.as_slice())?;
        encoder.write_tag(Tag::Unknown(VOLUME_INDEX), index.as_slice())?;
        Ok(())
    }
}

#[derive(Debug, PartialEq)]
pub struct Version(String);

impl Default for Version {
    fn default() -> Self {
        Self(VERSION.to_string())
    }
}

impl WriteTags for Version {
    fn write_tags<W, C, K, D>(&self, tiff: &mut ImageEncoder<W, C, K, D>) -> Result<(), TiffError>
    where
        W: Write + Seek,
        C: ColorType,
        K: TiffKind,
        D: Compression,
    {
        tiff.encoder().write_tag(Tag::Software, self.0.as_str())?;
        Ok(())
    }
}

/// Geometry tags as stored, before validation against the pixel data.
#[derive(Debug, Default, PartialEq)]
struct StoredGeometry {
    spacing: Option<Vec<f64>>,
    origin: Option<Vec<f64>>,
    direction: Option<Vec<f64>>,
    index: Option<Vec<f64>>,
}

impl StoredGeometry {
    fn read<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Self, TiffError> {
        let mut find = |tag: u16| -> Result<Option<Vec<f64>>, TiffError> {
            decoder
                .find_tag(Tag::Unknown(tag))?
                .map(|value| value.into_f64_vec())
                .transpose()
        };
        Ok(Self {
            spacing: find(VOLUME_SPACING)?,
            origin: find(VOLUME_ORIGIN)?,
            direction: find(VOLUME_DIRECTION)?,
            index: find(VOLUME_INDEX)?,
        })
    }

    fn ndim(&self) -> usize {
        self.spacing.as_ref().map(Vec::len).unwrap_or(3)
    }

    fn into_geometry(self, size: Vec<usize>, path: &Path) -> Result<Geometry, VolumeIoError> {
        let ndim = size.len();
        let index = match self.index {
            Some(index) => index.iter().map(|&i| i.round() as i64).collect(),
            None => vec![0; ndim],
        };
        let region = Region::new(index, size).map_err(|e| VolumeIoError::region(path, e))?;
        let direction = match self.direction {
            Some(values) => Direction::from_row_major(ndim, &values)
                .map_err(|e| VolumeIoError::geometry(path, e))?,
            None => Direction::identity(ndim),
        };
        Geometry::new(
            region,
            self.spacing.unwrap_or_else(|| vec![1.0; ndim]),
            self.origin.unwrap_or_else(|| vec![0.0; ndim]),
            direction,
        )
        .map_err(|e| VolumeIoError::geometry(path, e))
    }
}

fn to_f32<T: ToPrimitive>(values: Vec<T>) -> Vec<f32> {
    values
        .into_iter()
        .map(|v| v.to_f32().unwrap_or(f32::NAN))
        .collect()
}

fn decode_page(result: DecodingResult) -> Vec<f32> {
    match result {
        DecodingResult::U8(data) => to_f32(data),
        DecodingResult::U16(data) => to_f32(data),
        DecodingResult::U32(data) => to_f32(data),
        DecodingResult::U64(data) => to_f32(data),
        DecodingResult::F32(data) => data,
        DecodingResult::F64(data) => to_f32(data),
        DecodingResult::I8(data) => to_f32(data),
        DecodingResult::I16(data) => to_f32(data),
        DecodingResult::I32(data) => to_f32(data),
        DecodingResult::I64(data) => to_f32(data),
    }
}

/// Read a TIFF volume from `path`.
pub fn read_tiff(path: &Path) -> Result<Volume, VolumeIoError> {
    let file = File::open(path).context(OpenSnafu { path })?;
    let mut decoder = Decoder::new(BufReader::new(file)).context(ReadTiffSnafu { path })?;
    let stored = StoredGeometry::read(&mut decoder).context(ReadTiffSnafu { path })?;
    let (width, height) = decoder.dimensions().context(ReadTiffSnafu { path })?;

    let mut pages: Vec<Vec<f32>> = Vec::new();
    loop {
        let page = pages.len();
        let color_type = decoder.colortype().context(ReadTiffSnafu { path })?;
        if !matches!(color_type, tiff::ColorType::Gray(_)) {
            return Err(VolumeIoError::UnsupportedColorType {
                path: path.to_path_buf(),
                color_type,
            });
        }
        let (w, h) = decoder.dimensions().context(ReadTiffSnafu { path })?;
        if (w, h) != (width, height) {
            return Err(VolumeIoError::InconsistentPages {
                path: path.to_path_buf(),
                page,
                width: w,
                height: h,
                expected_width: width,
                expected_height: height,
            });
        }
        let data = decoder.read_image().context(ReadTiffSnafu { path })?;
        pages.push(decode_page(data));

        if !decoder.more_images() {
            break;
        }
        decoder.next_image().context(ReadTiffSnafu { path })?;
    }

    let (width, height, depth) = (width as usize, height as usize, pages.len());
    let size = match stored.ndim() {
        2 if depth == 1 => vec![width, height],
        3 => vec![width, height, depth],
        ndim => {
            return Err(VolumeIoError::InvalidGeometry {
                path: path.to_path_buf(),
                reason: format!("{} axes stored with {} pages", ndim, depth),
            })
        }
    };
    let geometry = stored.into_geometry(size.clone(), path)?;
    let data = ArrayD::from_shape_fn(IxDyn(&size), |i| {
        let z = if size.len() == 3 { i[2] } else { 0 };
        pages[z][i[1] * width + i[0]]
    });
    Volume::new(geometry, data).map_err(|e| VolumeIoError::shape(path, e))
}

/// Write a 2D or 3D volume to `path` as Deflate-compressed float pages.
pub fn write_tiff(volume: &Volume, path: &Path) -> Result<(), VolumeIoError> {
    let size = volume.region().size();
    let (width, height, depth) = match *size {
        [w, h] => (w, h, 1),
        [w, h, d] => (w, h, d),
        _ => {
            return Err(VolumeIoError::UnsupportedDimension {
                path: path.to_path_buf(),
                ndim: size.len(),
            })
        }
    };

    let file = File::create(path).context(CreateSnafu { path })?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).context(WriteTiffSnafu { path })?;
    let data = volume.data();
    let ndim = size.len();
    let pages: Vec<Vec<f32>> = (0..depth)
        .into_par_iter()
        .map(|z| {
            let mut page = Vec::with_capacity(width * height);
            for y in 0..height {
                for x in 0..width {
                    let value = match ndim {
                        2 => data[IxDyn(&[x, y])],
                        _ => data[IxDyn(&[x, y, z])],
                    };
                    page.push(value);
                }
            }
            page
        })
        .collect();

    for (z, page) in pages.iter().enumerate() {
        let mut image = encoder
            .new_image_with_compression::<Gray32Float, _>(
                width as u32,
                height as u32,
                Deflate::default(),
            )
            .context(WriteTiffSnafu { path })?;
        if z == 0 {
            volume
                .geometry()
                .write_tags(&mut image)
                .context(WriteTiffSnafu { path })?;
            Version::default()
                .write_tags(&mut image)
                .context(WriteTiffSnafu { path })?;
        }
        image
            .write_data(page.as_slice())
            .context(WriteTiffSnafu { path })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;
    use tiff::encoder::colortype::Gray16;

    #[test]
    fn test_write_read() {
        let region = Region::new(vec![-2, 1, 3], vec![3, 2, 4]).unwrap();
        let direction =
            Direction::new(array![[0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]).unwrap();
        let geometry =
            Geometry::new(region, vec![0.5, 0.75, 2.0], vec![10.0, -4.0, 3.5], direction).unwrap();
        let volume = Volume::from_fn(geometry, |i| (i[0] * 100 + i[1] * 10 + i[2]) as f32 + 0.25);

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("volume.tiff");
        write_tiff(&volume, &path).unwrap();
        let actual = read_tiff(&path).unwrap();

        assert_eq!(actual, volume);
    }

    #[test]
    fn test_write_read_2d() {
        let geometry = Geometry::unit(Region::new(vec![0, 5], vec![4, 3]).unwrap());
        let volume = Volume::from_fn(geometry, |i| (i[0] - i[1]) as f32);

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("image.tif");
        write_tiff(&volume, &path).unwrap();
        let actual = read_tiff(&path).unwrap();

        assert_eq!(actual.ndim(), 2);
        assert_eq!(actual, volume);
    }

    #[test]
    fn test_read_untagged() {
        // A plain 16-bit stack with two pages
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("plain.tiff");
        {
            let mut tiff = TiffEncoder::new(File::create(&path).unwrap()).unwrap();
            for z in 0..2_u16 {
                let data: Vec<u16> = (0..6).map(|v| v + 10 * z).collect();
                tiff.write_image::<Gray16>(3, 2, &data).unwrap();
            }
        }

        let volume = read_tiff(&path).unwrap();
        assert_eq!(volume.region().size(), &[3, 2, 2]);
        assert_eq!(volume.region().index(), &[0, 0, 0]);
        assert_eq!(volume.geometry().spacing(), &[1.0, 1.0, 1.0]);
        assert_eq!(volume.get(&[2, 1, 0]), Some(5.0));
        assert_eq!(volume.get(&[0, 1, 1]), Some(13.0));
    }

    #[test]
    fn test_write_unsupported_dimension() {
        let geometry = Geometry::unit(Region::from_size(vec![2, 2, 2, 2]).unwrap());
        let volume = Volume::filled(geometry, 0.0);
        let temp_dir = tempdir().unwrap();
        let result = write_tiff(&volume, &temp_dir.path().join("4d.tiff"));
        assert!(matches!(
            result,
            Err(VolumeIoError::UnsupportedDimension { ndim: 4, .. })
        ));
    }
}
