//! Registration orchestrator: drives a crop raster and a georeferenced
//! layout raster through feature extraction, descriptor matching, RANSAC
//! homography estimation, and corner geo-mapping, producing the crop's
//! geographic footprint.

pub mod defect;
pub mod raster;
pub mod writers;

use chrono::{DateTime, Local};
use georeg_core::{ExtractorConfig, Keypoint};
use georeg_features::{ExtractError, FeatureExtractor};
use georeg_register::{
    estimate_homography, map_corners, match_descriptors, similarity_rotation, similarity_scale,
    EstimateError, GeoTransform, RansacConfig,
};
use nalgebra::Matrix3;

use crate::raster::{LoadError, Raster};

/// Pipeline stage reached when a run ended, successfully or not. Reported
/// alongside errors so operators can tell a bad input from a bad match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Loaded,
    FeaturesExtracted,
    Matched,
    TransformEstimated,
    Georeferenced,
    Complete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Loaded => "loading",
            Stage::FeaturesExtracted => "feature extraction",
            Stage::Matched => "matching",
            Stage::TransformEstimated => "transform estimation",
            Stage::Georeferenced => "georeferencing",
            Stage::Complete => "complete",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub enum RegistrationError {
    Load(LoadError),
    Extraction(ExtractError),
    /// Too few cross-checked matches to attempt a homography. Expected
    /// for low-texture or non-overlapping inputs.
    InsufficientMatches { got: usize },
    /// Matching produced pairs but no transform explained them.
    DegenerateTransform { detail: String },
}

impl RegistrationError {
    /// The stage at which the pipeline stopped.
    pub fn stage(&self) -> Stage {
        match self {
            RegistrationError::Load(_) => Stage::Loaded,
            RegistrationError::Extraction(_) => Stage::FeaturesExtracted,
            RegistrationError::InsufficientMatches { .. }
            | RegistrationError::DegenerateTransform { .. } => Stage::TransformEstimated,
        }
    }
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationError::Load(e) => write!(f, "raster load failed: {}", e),
            RegistrationError::Extraction(e) => write!(f, "feature extraction failed: {}", e),
            RegistrationError::InsufficientMatches { got } => {
                write!(f, "insufficient matches: need 4, got {}", got)
            }
            RegistrationError::DegenerateTransform { detail } => {
                write!(f, "no usable transform: {}", detail)
            }
        }
    }
}

impl std::error::Error for RegistrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistrationError::Load(e) => Some(e),
            RegistrationError::Extraction(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LoadError> for RegistrationError {
    fn from(e: LoadError) -> Self {
        RegistrationError::Load(e)
    }
}

impl From<ExtractError> for RegistrationError {
    fn from(e: ExtractError) -> Self {
        RegistrationError::Extraction(e)
    }
}

/// Full pipeline configuration. Defaults reproduce the standard
/// crop-to-layout run.
#[derive(Debug, Clone)]
pub struct RegistrationConfig {
    pub extractor: ExtractorConfig,
    /// Matches are sorted best-first and truncated to this many pairs
    /// before estimation.
    pub match_top_k: usize,
    pub ransac: RansacConfig,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            match_top_k: 80,
            ransac: RansacConfig::default(),
        }
    }
}

/// Outcome of a successful registration run.
#[derive(Debug, Clone)]
pub struct RegistrationResult {
    /// Geographic crop corners, winding TL, BL, BR, TR.
    pub corner_coords: [(f64, f64); 4],
    /// Crop-pixel to layout-pixel homography.
    pub homography: Matrix3<f64>,
    pub inliers: usize,
    pub crop_name: String,
    pub layout_name: String,
    pub started: DateTime<Local>,
    pub finished: DateTime<Local>,
}

pub struct Registrar {
    cfg: RegistrationConfig,
}

impl Registrar {
    pub fn new(cfg: RegistrationConfig) -> Self {
        Self { cfg }
    }

    /// Align `crop` onto `layout` and express the crop footprint in the
    /// layout's geographic frame.
    pub fn register(
        &self,
        crop: &Raster,
        layout: &Raster,
        gt: &GeoTransform,
    ) -> Result<RegistrationResult, RegistrationError> {
        let started = Local::now();

        let (crop_kps, crop_desc) = self.extract(crop)?;
        let (layout_kps, layout_desc) = self.extract(layout)?;
        log::info!(
            "features: {} in {}, {} in {}",
            crop_kps.len(),
            crop.name,
            layout_kps.len(),
            layout.name
        );

        let mut matches = match_descriptors(&crop_desc, &layout_desc);
        matches.truncate(self.cfg.match_top_k);
        log::info!("matching: {} cross-checked pairs retained", matches.len());
        if matches.len() < 4 {
            return Err(RegistrationError::InsufficientMatches { got: matches.len() });
        }

        let src: Vec<[f64; 2]> = matches
            .iter()
            .map(|m| point(&crop_kps[m.query]))
            .collect();
        let dst: Vec<[f64; 2]> = matches
            .iter()
            .map(|m| point(&layout_kps[m.train]))
            .collect();

        let estimate = estimate_homography(&src, &dst, &self.cfg.ransac).map_err(|e| match e {
            EstimateError::InsufficientMatches { got } => {
                RegistrationError::InsufficientMatches { got }
            }
            other => RegistrationError::DegenerateTransform { detail: other.to_string() },
        })?;
        log::info!(
            "transform: {} inliers, scale {:.3}, rotation {:.2} deg",
            estimate.n_inliers,
            similarity_scale(&estimate.homography),
            similarity_rotation(&estimate.homography).to_degrees()
        );

        let corner_coords = map_corners(&estimate.homography, crop.width(), crop.height(), gt);

        Ok(RegistrationResult {
            corner_coords,
            homography: estimate.homography,
            inliers: estimate.n_inliers,
            crop_name: crop.name.clone(),
            layout_name: layout.name.clone(),
            started,
            finished: Local::now(),
        })
    }

    fn extract(
        &self,
        raster: &Raster,
    ) -> Result<(Vec<Keypoint>, Vec<georeg_core::Descriptor>), RegistrationError> {
        let ex = FeatureExtractor::new(self.cfg.extractor, raster.width(), raster.height())?;
        Ok(ex.extract(&raster.to_gray())?)
    }
}

fn point(kp: &Keypoint) -> [f64; 2] {
    [kp.x as f64, kp.y as f64]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::DynamicImage;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn noise_raster(w: u32, h: u32, seed: u64, name: &str) -> Raster {
        let mut rng = StdRng::seed_from_u64(seed);
        let buf = image::GrayImage::from_fn(w, h, |_, _| image::Luma([rng.gen::<u8>()]));
        Raster::from_image(DynamicImage::ImageLuma8(buf), name)
    }

    #[test]
    fn identical_rasters_register_as_identity() {
        let crop = noise_raster(160, 120, 7, "crop.tif");
        let layout = noise_raster(160, 120, 7, "layout.tif");
        let gt = GeoTransform::from_origin(399_960.0, 6_100_020.0, 10.0, 10.0);

        let result = Registrar::new(RegistrationConfig::default())
            .register(&crop, &layout, &gt)
            .unwrap();

        let h = &result.homography;
        assert_relative_eq!(h[(0, 0)], 1.0, epsilon = 1e-3);
        assert_relative_eq!(h[(1, 1)], 1.0, epsilon = 1e-3);
        assert_relative_eq!(h[(0, 2)], 0.0, epsilon = 1e-2);
        assert_relative_eq!(h[(1, 2)], 0.0, epsilon = 1e-2);

        let expected = [
            gt.xy(0.0, 0.0),
            gt.xy(0.0, 119.0),
            gt.xy(159.0, 119.0),
            gt.xy(159.0, 0.0),
        ];
        for (got, want) in result.corner_coords.iter().zip(&expected) {
            assert_relative_eq!(got.0, want.0, epsilon = 0.5);
            assert_relative_eq!(got.1, want.1, epsilon = 0.5);
        }
        assert!(result.inliers >= 4);
        assert_eq!(result.crop_name, "crop.tif");
        assert_eq!(result.layout_name, "layout.tif");
        assert!(result.finished >= result.started);
    }

    #[test]
    fn featureless_pair_reports_insufficient_matches() {
        let flat = image::GrayImage::from_pixel(64, 64, image::Luma([128]));
        let crop = Raster::from_image(DynamicImage::ImageLuma8(flat.clone()), "crop.tif");
        let layout = Raster::from_image(DynamicImage::ImageLuma8(flat), "layout.tif");
        let gt = GeoTransform::from_origin(0.0, 0.0, 1.0, 1.0);

        let err = Registrar::new(RegistrationConfig::default())
            .register(&crop, &layout, &gt)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InsufficientMatches { got: 0 }));
        assert_eq!(err.stage(), Stage::TransformEstimated);
    }

    #[test]
    fn tiny_raster_fails_at_extraction() {
        let tiny = image::GrayImage::from_pixel(3, 3, image::Luma([10]));
        let crop = Raster::from_image(DynamicImage::ImageLuma8(tiny), "crop.tif");
        let layout = noise_raster(64, 64, 1, "layout.tif");
        let gt = GeoTransform::from_origin(0.0, 0.0, 1.0, 1.0);

        let err = Registrar::new(RegistrationConfig::default())
            .register(&crop, &layout, &gt)
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Extraction(_)));
        assert_eq!(err.stage(), Stage::FeaturesExtracted);
    }

    #[test]
    fn top_k_caps_the_correspondence_set() {
        let crop = noise_raster(128, 128, 3, "crop.tif");
        let layout = noise_raster(128, 128, 3, "layout.tif");
        let gt = GeoTransform::from_origin(0.0, 0.0, 1.0, 1.0);

        let cfg = RegistrationConfig { match_top_k: 10, ..Default::default() };
        let result = Registrar::new(cfg).register(&crop, &layout, &gt).unwrap();
        assert!(result.inliers <= 10);
    }
}
