//! Single elevation tile in a projected CRS.

use crate::{DemError, Result};
use a3d_spatial::{Bounds, Point};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// GeoTIFF ModelPixelScaleTag.
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;

/// GeoTIFF ModelTiepointTag.
const TAG_MODEL_TIEPOINT: u16 = 33922;

/// GDAL no-data tag, stored as an ASCII string.
const TAG_GDAL_NODATA: u16 = 42113;

/// Decoder buffer limit. swissALTI3D 0.5 m tiles are 2000 x 2000 f32 pixels.
const DECODE_LIMIT_BYTES: usize = 512 * 1024 * 1024;

/// An elevation raster loaded from a GeoTIFF.
///
/// Pixels are stored row-major from the north-west corner. The tile is
/// georeferenced by its north-west corner and pixel size (PixelIsArea), as
/// written by swisstopo and GDAL.
#[derive(Debug, Clone)]
pub struct DemTile {
    /// Elevation data in row-major order (north to south, west to east).
    data: Vec<f32>,
    width: u32,
    height: u32,
    /// Projected x of the west edge.
    origin_x: f64,
    /// Projected y of the north edge.
    origin_y: f64,
    /// Pixel size (x, y) in CRS units; both positive.
    pixel_size: (f64, f64),
    /// No-data value (elevations equal to this are treated as missing).
    no_data_value: Option<f32>,
}

impl DemTile {
    /// Build a tile from raw parts.
    ///
    /// `origin` is the north-west corner of the raster.
    pub fn from_parts(
        data: Vec<f32>,
        width: u32,
        height: u32,
        origin: Point,
        pixel_size: (f64, f64),
        no_data_value: Option<f32>,
    ) -> Result<Self> {
        if data.len() != width as usize * height as usize || width == 0 || height == 0 {
            return Err(DemError::InvalidGeoTiff(format!(
                "{} samples for a {}x{} raster",
                data.len(),
                width,
                height
            )));
        }
        if !(pixel_size.0 > 0.0 && pixel_size.1 > 0.0) {
            return Err(DemError::InvalidGeoTiff(format!("invalid pixel size {pixel_size:?}")));
        }
        Ok(Self {
            data,
            width,
            height,
            origin_x: origin.x,
            origin_y: origin.y,
            pixel_size,
            no_data_value,
        })
    }

    /// Load a tile from a GeoTIFF file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::decode(std::io::BufReader::new(file))
    }

    /// Load a tile from GeoTIFF bytes (an HTTP response body).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::decode(Cursor::new(bytes))
    }

    /// Read only the georeferencing of a GeoTIFF file.
    pub fn read_bounds<P: AsRef<Path>>(path: P) -> Result<Bounds> {
        let file = std::fs::File::open(path.as_ref())?;
        let mut decoder = Decoder::new(std::io::BufReader::new(file))?;
        let (width, height) = decoder.dimensions()?;
        let (origin, scale) = read_georeference(&mut decoder)?;
        Ok(bounds_of(origin, scale, width, height))
    }

    fn decode<R: Read + Seek>(reader: R) -> Result<Self> {
        let mut limits = Limits::default();
        limits.decoding_buffer_size = DECODE_LIMIT_BYTES;
        limits.intermediate_buffer_size = DECODE_LIMIT_BYTES;
        let mut decoder = Decoder::new(reader)?.with_limits(limits);

        let (width, height) = decoder.dimensions()?;
        let (origin, pixel_size) = read_georeference(&mut decoder)?;
        let no_data_value = read_nodata_value(&mut decoder);
        let data = decode_elevation_data(&mut decoder)?;

        Self::from_parts(data, width, height, origin, pixel_size, no_data_value)
    }

    /// Encode as a single-band float GeoTIFF with georeferencing tags.
    pub fn to_geotiff_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut buf)?;
            let mut image = encoder.new_image::<colortype::Gray32Float>(self.width, self.height)?;
            image.encoder().write_tag(
                Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE),
                &[self.pixel_size.0, self.pixel_size.1, 0.0][..],
            )?;
            image.encoder().write_tag(
                Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT),
                &[0.0, 0.0, 0.0, self.origin_x, self.origin_y, 0.0][..],
            )?;
            if let Some(nodata) = self.no_data_value {
                image
                    .encoder()
                    .write_tag(Tag::from_u16_exhaustive(TAG_GDAL_NODATA), nodata.to_string().as_str())?;
            }
            image.write_data(&self.data)?;
        }
        Ok(buf.into_inner())
    }

    /// Write the tile as a GeoTIFF file.
    pub fn write_geotiff<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_geotiff_bytes()?;
        let mut file = std::fs::File::create(path.as_ref())?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Projected extent of the tile.
    pub fn bounds(&self) -> Bounds {
        bounds_of(
            Point::new(self.origin_x, self.origin_y),
            self.pixel_size,
            self.width,
            self.height,
        )
    }

    /// Get the dimensions of this tile in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_size(&self) -> (f64, f64) {
        self.pixel_size
    }

    /// Elevation at a projected point, interpolated bilinearly between pixel
    /// centres.
    ///
    /// Within the outer half pixel the edge pixels are used. Returns `None`
    /// outside the tile or when a contributing pixel is no-data.
    pub fn sample_bilinear(&self, p: Point) -> Option<f64> {
        if !self.bounds().contains(p) {
            return None;
        }
        let max_x = (self.width - 1) as f64;
        let max_y = (self.height - 1) as f64;
        let x = ((p.x - self.origin_x) / self.pixel_size.0 - 0.5).clamp(0.0, max_x);
        let y = ((self.origin_y - p.y) / self.pixel_size.1 - 0.5).clamp(0.0, max_y);

        let x0 = x.floor() as u32;
        let y0 = y.floor() as u32;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f64;
        let fy = y - y0 as f64;

        let v00 = self.get_pixel(x0, y0)?;
        let v10 = self.get_pixel(x1, y0)?;
        let v01 = self.get_pixel(x0, y1)?;
        let v11 = self.get_pixel(x1, y1)?;

        Some(
            v00 * (1.0 - fx) * (1.0 - fy)
                + v10 * fx * (1.0 - fy)
                + v01 * (1.0 - fx) * fy
                + v11 * fx * fy,
        )
    }

    /// Value of the pixel containing `p`.
    pub fn sample_nearest(&self, p: Point) -> Option<f64> {
        if !self.bounds().contains(p) {
            return None;
        }
        let x = ((p.x - self.origin_x) / self.pixel_size.0).floor() as u32;
        let y = ((self.origin_y - p.y) / self.pixel_size.1).floor() as u32;
        self.get_pixel(x.min(self.width - 1), y.min(self.height - 1))
    }

    fn get_pixel(&self, x: u32, y: u32) -> Option<f64> {
        let value = *self.data.get((y * self.width + x) as usize)?;
        if value.is_nan() {
            return None;
        }
        if let Some(nodata) = self.no_data_value {
            if (value - nodata).abs() < 0.001 {
                return None;
            }
        }
        Some(value as f64)
    }
}

fn bounds_of(origin: Point, scale: (f64, f64), width: u32, height: u32) -> Bounds {
    Bounds::new(
        origin.x,
        origin.y - height as f64 * scale.1,
        origin.x + width as f64 * scale.0,
        origin.y,
    )
}

/// North-west corner and pixel size from ModelTiepoint / ModelPixelScale.
fn read_georeference<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<(Point, (f64, f64))> {
    let tiepoint = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_TIEPOINT));
    let pixel_scale = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(TAG_MODEL_PIXEL_SCALE));

    match (tiepoint, pixel_scale) {
        (Ok(tie), Ok(scale)) if tie.len() >= 6 && scale.len() >= 2 => {
            // Tiepoint format: [i, j, k, x, y, z]; (i, j) is usually (0, 0)
            let origin = Point::new(tie[3] - tie[0] * scale[0], tie[4] + tie[1] * scale[1]);
            Ok((origin, (scale[0], scale[1])))
        }
        _ => Err(DemError::InvalidGeoTiff(
            "missing ModelTiepoint/ModelPixelScale tags".to_string(),
        )),
    }
}

/// Try to read the no-data value from the GDAL_NODATA tag.
fn read_nodata_value<R: Read + Seek>(decoder: &mut Decoder<R>) -> Option<f32> {
    decoder
        .get_tag_ascii_string(Tag::from_u16_exhaustive(TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok())
}

fn decode_elevation_data<R: Read + Seek>(decoder: &mut Decoder<R>) -> Result<Vec<f32>> {
    match decoder.read_image()? {
        DecodingResult::F32(data) => Ok(data),
        DecodingResult::F64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        other => Err(DemError::UnsupportedDataType(format!("{:?}", std::mem::discriminant(&other)))),
    }
}
