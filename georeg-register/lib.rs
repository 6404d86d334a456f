//! Registration math for crop-to-layout alignment: brute-force Hamming
//! matching with a mutual cross check, RANSAC homography estimation on
//! the matched pairs, and composition with the layout's affine
//! geo-transform to express the crop footprint in geographic coordinates.

pub mod geo;
pub mod homography;
pub mod matcher;
pub mod ransac;

pub use geo::{map_corners, GeoTransform};
pub use homography::{
    fit_homography, project, reprojection_error, similarity_rotation, similarity_scale,
    EstimateError, EstimateResult,
};
pub use matcher::{hamming, match_descriptors};
pub use ransac::{estimate_homography, RansacConfig, RansacEstimate};
