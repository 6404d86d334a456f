//! Pixel-to-geographic coordinate mapping for the layout raster.

use crate::homography::project;
use nalgebra::Matrix3;

/// Six-parameter affine mapping from layout pixel indices to geographic
/// coordinates, coefficient order as in rasterio/GDAL:
///
/// ```text
/// x = c + a * col + b * row
/// y = f + d * col + e * row
/// ```
///
/// where (col, row) is measured from the top-left raster corner. The `c`
/// and `f` coefficients locate the outer corner of pixel (0, 0).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl GeoTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform from the top-left corner coordinate and pixel
    /// sizes (both positive; `e` becomes negative because rows grow
    /// southward).
    pub fn from_origin(west: f64, north: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(pixel_width, 0.0, west, 0.0, -pixel_height, north)
    }

    /// Geographic coordinates of a pixel, cell-center convention: the
    /// half-cell offset is applied here, exactly once. Matches
    /// `rasterio.transform.xy(..., offset="center")`.
    pub fn xy(&self, col: f64, row: f64) -> (f64, f64) {
        let cc = col + 0.5;
        let rr = row + 0.5;
        (
            self.c + self.a * cc + self.b * rr,
            self.f + self.d * cc + self.e * rr,
        )
    }

    /// True when the transform carries rotation/shear terms
    pub fn has_rotation(&self) -> bool {
        self.b != 0.0 || self.d != 0.0
    }
}

/// Geographic footprint of a `width` x `height` crop image under the
/// crop-to-layout homography `h`.
///
/// Corner order is fixed: top-left, bottom-left, bottom-right, top-right,
/// i.e. pixels (0,0), (0,h-1), (w-1,h-1), (w-1,0). This winding yields a
/// non-self-intersecting polygon and must not be reordered.
pub fn map_corners(
    h: &Matrix3<f64>,
    width: usize,
    height: usize,
    gt: &GeoTransform,
) -> [(f64, f64); 4] {
    let w = (width - 1) as f64;
    let hh = (height - 1) as f64;
    let corners = [[0.0, 0.0], [0.0, hh], [w, hh], [w, 0.0]];

    corners.map(|c| {
        let [col, row] = project(h, c);
        gt.xy(col, row)
    })
}
