//! Raster input: decoding, the 8-bit normalization boundary, and GeoTIFF
//! georeferencing metadata.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use georeg_core::Image;
use georeg_register::GeoTransform;
use image::DynamicImage;
use tiff::decoder::Decoder;
use tiff::tags::Tag;

/// Target coordinate reference system when the layout carries no usable
/// geokey (UTM zone 37N). Input rasters are assumed to already be in the
/// target CRS; no reprojection is performed.
pub const DEFAULT_EPSG: u16 = 32637;

#[derive(Debug)]
pub enum LoadError {
    Io(std::io::Error),
    Decode(image::ImageError),
    GeoTags(tiff::TiffError),
    MissingGeoTransform(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "i/o error: {}", e),
            LoadError::Decode(e) => write!(f, "image decode error: {}", e),
            LoadError::GeoTags(e) => write!(f, "GeoTIFF tag error: {}", e),
            LoadError::MissingGeoTransform(path) => {
                write!(f, "no geo-transform tags (pixel scale + tiepoint) in {}", path)
            }
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Io(e) => Some(e),
            LoadError::Decode(e) => Some(e),
            LoadError::GeoTags(e) => Some(e),
            LoadError::MissingGeoTransform(_) => None,
        }
    }
}

impl From<std::io::Error> for LoadError {
    fn from(e: std::io::Error) -> Self {
        LoadError::Io(e)
    }
}

impl From<image::ImageError> for LoadError {
    fn from(e: image::ImageError) -> Self {
        LoadError::Decode(e)
    }
}

impl From<tiff::TiffError> for LoadError {
    fn from(e: tiff::TiffError) -> Self {
        LoadError::GeoTags(e)
    }
}

pub type LoadResult<T> = Result<T, LoadError>;

/// A decoded raster, already pushed through the normalization boundary:
/// 8-bit samples, at most 3 channels.
pub struct Raster {
    pub image: DynamicImage,
    pub name: String,
}

impl Raster {
    pub fn open(path: &Path) -> LoadResult<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let decoded = image::open(path)?;
        Ok(Self { image: normalize(decoded), name })
    }

    pub fn from_image(image: DynamicImage, name: &str) -> Self {
        Self { image: normalize(image), name: name.to_string() }
    }

    pub fn width(&self) -> usize {
        self.image.width() as usize
    }

    pub fn height(&self) -> usize {
        self.image.height() as usize
    }

    /// Luma view for feature work; the detector operates on intensity,
    /// not full color.
    pub fn to_gray(&self) -> Image {
        self.image.to_luma8().into_raw()
    }
}

/// Normalization boundary (applied once, before any feature work):
/// alpha channels are dropped, >8-bit samples are rescaled linearly by
/// the observed maximum.
fn normalize(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img,
        DynamicImage::ImageLumaA8(buf) => {
            DynamicImage::ImageLuma8(DynamicImage::ImageLumaA8(buf).to_luma8())
        }
        DynamicImage::ImageRgba8(buf) => {
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(buf).to_rgb8())
        }
        DynamicImage::ImageLuma16(buf) => rescale_luma16(&buf),
        DynamicImage::ImageLumaA16(buf) => rescale_luma16(&DynamicImage::ImageLumaA16(buf).to_luma16()),
        DynamicImage::ImageRgb16(buf) => rescale_rgb16(&buf),
        DynamicImage::ImageRgba16(buf) => rescale_rgb16(&DynamicImage::ImageRgba16(buf).to_rgb16()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

fn observed_max(samples: &[u16]) -> f32 {
    samples.iter().copied().max().unwrap_or(0).max(1) as f32
}

fn rescale_luma16(buf: &image::ImageBuffer<image::Luma<u16>, Vec<u16>>) -> DynamicImage {
    let max = observed_max(buf.as_raw());
    let (w, h) = buf.dimensions();
    DynamicImage::ImageLuma8(image::GrayImage::from_fn(w, h, |x, y| {
        image::Luma([(buf.get_pixel(x, y)[0] as f32 / max * 255.0) as u8])
    }))
}

fn rescale_rgb16(buf: &image::ImageBuffer<image::Rgb<u16>, Vec<u16>>) -> DynamicImage {
    let max = observed_max(buf.as_raw());
    let (w, h) = buf.dimensions();
    DynamicImage::ImageRgb8(image::RgbImage::from_fn(w, h, |x, y| {
        let p = buf.get_pixel(x, y);
        image::Rgb([
            (p[0] as f32 / max * 255.0) as u8,
            (p[1] as f32 / max * 255.0) as u8,
            (p[2] as f32 / max * 255.0) as u8,
        ])
    }))
}

/// Read the layout's pixel-to-geographic affine transform and EPSG code
/// from its GeoTIFF tags. Accepts either a full model transformation
/// matrix or the pixel-scale + tiepoint pair; the EPSG code falls back to
/// [`DEFAULT_EPSG`] when the geokey directory is absent.
pub fn read_geo_metadata(path: &Path) -> LoadResult<(GeoTransform, u16)> {
    let file = File::open(path)?;
    let mut dec = Decoder::new(BufReader::new(file))?;

    let gt = match dec.get_tag_f64_vec(Tag::ModelTransformationTag).ok() {
        Some(m) if m.len() >= 8 => {
            // row-major 4x4: x = m0*col + m1*row + m3, y = m4*col + m5*row + m7
            GeoTransform::new(m[0], m[1], m[3], m[4], m[5], m[7])
        }
        _ => {
            let scale = dec.get_tag_f64_vec(Tag::ModelPixelScaleTag).ok();
            let tie = dec.get_tag_f64_vec(Tag::ModelTiepointTag).ok();
            match (scale, tie) {
                (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 5 => {
                    // tiepoint (i, j, k, x, y, z): raster (i, j) sits at (x, y)
                    GeoTransform::new(
                        s[0],
                        0.0,
                        t[3] - t[0] * s[0],
                        0.0,
                        -s[1],
                        t[4] + t[1] * s[1],
                    )
                }
                _ => return Err(LoadError::MissingGeoTransform(path.display().to_string())),
            }
        }
    };

    let epsg = dec
        .get_tag_u16_vec(Tag::GeoKeyDirectoryTag)
        .ok()
        .and_then(|dir| projected_epsg(&dir))
        .unwrap_or(DEFAULT_EPSG);

    Ok((gt, epsg))
}

/// ProjectedCSTypeGeoKey (3072) stored inline in the geokey directory
fn projected_epsg(dir: &[u16]) -> Option<u16> {
    dir.chunks_exact(4)
        .skip(1) // directory header
        .find(|entry| entry[0] == 3072 && entry[1] == 0)
        .map(|entry| entry[3])
}
