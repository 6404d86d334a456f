//! Output artifacts: the footprint polygon (GeoJSON) and the
//! georeferenced copy of the crop (GeoTIFF).

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;

use georeg_register::GeoTransform;
use image::DynamicImage;
use tiff::encoder::{colortype, DirectoryEncoder, TiffEncoder, TiffKind};
use tiff::tags::Tag;
use tiff::TiffError;

use crate::raster::Raster;
use crate::RegistrationResult;

#[derive(Debug)]
pub enum WriteError {
    Io(std::io::Error),
    Tiff(TiffError),
    Json(serde_json::Error),
}

impl std::fmt::Display for WriteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteError::Io(e) => write!(f, "i/o error: {}", e),
            WriteError::Tiff(e) => write!(f, "GeoTIFF encode error: {}", e),
            WriteError::Json(e) => write!(f, "GeoJSON encode error: {}", e),
        }
    }
}

impl std::error::Error for WriteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WriteError::Io(e) => Some(e),
            WriteError::Tiff(e) => Some(e),
            WriteError::Json(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for WriteError {
    fn from(e: std::io::Error) -> Self {
        WriteError::Io(e)
    }
}

impl From<TiffError> for WriteError {
    fn from(e: TiffError) -> Self {
        WriteError::Tiff(e)
    }
}

impl From<serde_json::Error> for WriteError {
    fn from(e: serde_json::Error) -> Self {
        WriteError::Json(e)
    }
}

pub type WriteResult<T> = Result<T, WriteError>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Write the crop footprint as a single GeoJSON polygon feature. The ring
/// is closed by repeating the first corner; properties carry the source
/// identifiers and the processing interval.
pub fn write_geojson(path: &Path, result: &RegistrationResult, epsg: u16) -> WriteResult<()> {
    let mut ring: Vec<[f64; 2]> = result
        .corner_coords
        .iter()
        .map(|&(x, y)| [x, y])
        .collect();
    ring.push(ring[0]);

    let doc = serde_json::json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {
                "layout_name": result.layout_name,
                "crop_name": result.crop_name,
                "crs": format!("EPSG:{}", epsg),
                "start": result.started.format(TIMESTAMP_FORMAT).to_string(),
                "end": result.finished.format(TIMESTAMP_FORMAT).to_string(),
            },
            "geometry": {
                "type": "Polygon",
                "coordinates": [ring],
            },
        }],
    });

    let file = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(file, &doc)?;
    Ok(())
}

/// Write the normalized crop pixels as a GeoTIFF carrying the layout's
/// affine transform and CRS.
pub fn write_geotiff(path: &Path, raster: &Raster, gt: &GeoTransform, epsg: u16) -> WriteResult<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut enc = TiffEncoder::new(file)?;
    let (w, h) = (raster.width() as u32, raster.height() as u32);

    match &raster.image {
        DynamicImage::ImageLuma8(buf) => {
            let mut img = enc.new_image::<colortype::Gray8>(w, h)?;
            write_geo_tags(img.encoder(), gt, epsg)?;
            img.write_data(buf.as_raw())?;
        }
        other => {
            let rgb = other.to_rgb8();
            let mut img = enc.new_image::<colortype::RGB8>(w, h)?;
            write_geo_tags(img.encoder(), gt, epsg)?;
            img.write_data(rgb.as_raw())?;
        }
    }
    Ok(())
}

/// Write a 16-bit RGB raster, optionally georeferenced (used by the
/// pixel-defect utility, which must preserve sample depth).
pub fn write_rgb16_geotiff(
    path: &Path,
    buf: &image::ImageBuffer<image::Rgb<u16>, Vec<u16>>,
    geo: Option<(&GeoTransform, u16)>,
) -> WriteResult<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut enc = TiffEncoder::new(file)?;
    let (w, h) = buf.dimensions();

    let mut img = enc.new_image::<colortype::RGB16>(w, h)?;
    if let Some((gt, epsg)) = geo {
        write_geo_tags(img.encoder(), gt, epsg)?;
    }
    img.write_data(buf.as_raw())?;
    Ok(())
}

/// North-up transforms use the compact pixel-scale + tiepoint encoding;
/// rotated ones need the full model transformation matrix.
fn write_geo_tags<W: Write + Seek, K: TiffKind>(
    dir: &mut DirectoryEncoder<'_, W, K>,
    gt: &GeoTransform,
    epsg: u16,
) -> Result<(), TiffError> {
    if gt.has_rotation() {
        let m = [
            gt.a, gt.b, 0.0, gt.c,
            gt.d, gt.e, 0.0, gt.f,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        dir.write_tag(Tag::ModelTransformationTag, &m[..])?;
    } else {
        let scale = [gt.a, -gt.e, 0.0];
        let tiepoint = [0.0, 0.0, 0.0, gt.c, gt.f, 0.0];
        dir.write_tag(Tag::ModelPixelScaleTag, &scale[..])?;
        dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    }

    // minimal geokey directory: projected model, pixel-is-area, CRS code
    let keys: [u16; 16] = [
        1, 1, 0, 3,
        1024, 0, 1, 1,
        1025, 0, 1, 1,
        3072, 0, 1, epsg,
    ];
    dir.write_tag(Tag::GeoKeyDirectoryTag, &keys[..])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::read_geo_metadata;
    use chrono::Local;
    use nalgebra::Matrix3;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("georeg-writers-{}-{}", std::process::id(), name))
    }

    fn sample_result() -> RegistrationResult {
        let now = Local::now();
        RegistrationResult {
            corner_coords: [
                (400_005.0, 5_999_995.0),
                (400_005.0, 5_999_005.0),
                (400_995.0, 5_999_005.0),
                (400_995.0, 5_999_995.0),
            ],
            homography: Matrix3::identity(),
            inliers: 42,
            crop_name: "crop_0.tif".into(),
            layout_name: "layout.tif".into(),
            started: now,
            finished: now,
        }
    }

    #[test]
    fn geojson_ring_is_closed_and_tagged() {
        let path = temp_path("footprint.geojson");
        write_geojson(&path, &sample_result(), 32637).unwrap();

        let doc: serde_json::Value =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        let feature = &doc["features"][0];
        assert_eq!(feature["properties"]["crop_name"], "crop_0.tif");
        assert_eq!(feature["properties"]["layout_name"], "layout.tif");
        assert_eq!(feature["properties"]["crs"], "EPSG:32637");

        let ring = feature["geometry"]["coordinates"][0].as_array().unwrap();
        assert_eq!(ring.len(), 5);
        assert_eq!(ring[0], ring[4]);
    }

    #[test]
    fn geotiff_tags_roundtrip() {
        let path = temp_path("aligned.tif");
        let raster = Raster::from_image(
            image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
                8,
                6,
                image::Rgb([1, 2, 3]),
            )),
            "crop.tif",
        );
        let gt = GeoTransform::from_origin(399_960.0, 6_100_020.0, 10.0, 10.0);

        write_geotiff(&path, &raster, &gt, 32637).unwrap();
        let (read_gt, epsg) = read_geo_metadata(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(read_gt, gt);
        assert_eq!(epsg, 32637);
    }

    #[test]
    fn rgb16_depth_is_preserved() {
        let path = temp_path("fixed.tif");
        let buf = image::ImageBuffer::from_pixel(4, 4, image::Rgb([1000u16, 2000, 3000]));
        write_rgb16_geotiff(&path, &buf, None).unwrap();

        let reopened = image::open(&path).unwrap();
        std::fs::remove_file(&path).ok();
        match reopened {
            image::DynamicImage::ImageRgb16(b) => {
                assert_eq!(*b.get_pixel(0, 0), image::Rgb([1000u16, 2000, 3000]));
            }
            other => panic!("expected 16-bit RGB, got {:?}", other.color()),
        }
    }
}
