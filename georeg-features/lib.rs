//! Feature extraction for crop-to-layout registration: FAST corners with
//! orientation and subpixel refinement, described by rotated 256-bit BRIEF
//! descriptors. The extractor is deterministic for a fixed image and
//! configuration.

mod descriptor;
mod detector;
mod error;

pub use descriptor::BriefDescriptor;
pub use detector::{non_maximum_suppression, CornerDetector, ScoredKeypoint};
pub use error::{ExtractError, ExtractResult};

use georeg_core::{Descriptor, ExtractorConfig, Image, Keypoint};

/// Detector + descriptor pair for one image geometry.
pub struct FeatureExtractor {
    detector: CornerDetector,
    brief: BriefDescriptor,
}

impl FeatureExtractor {
    pub fn new(cfg: ExtractorConfig, width: usize, height: usize) -> ExtractResult<Self> {
        let detector = CornerDetector::new(cfg, width, height)?;
        let brief = BriefDescriptor::new(width, height, cfg.patch_size);
        Ok(Self { detector, brief })
    }

    /// Detect keypoints and compute their descriptors. A featureless image
    /// yields empty vectors; malformed input is an error.
    pub fn extract(&self, img: &Image) -> ExtractResult<(Vec<Keypoint>, Vec<Descriptor>)> {
        let kps = self.detector.detect(img)?;
        let desc = self.brief.describe(img, &kps);
        Ok((kps, desc))
    }

    pub fn config(&self) -> &ExtractorConfig {
        self.detector.config()
    }

    pub fn dimensions(&self) -> (usize, usize) {
        self.detector.dimensions()
    }
}
