use crate::error::{ExtractError, ExtractResult};
use georeg_core::{ExtractorConfig, Image, Keypoint};
use rayon::prelude::*;

/// Bresenham circle of radius 3 used by the FAST segment test
const RING: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1),
    (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1),
    (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

/// Ring pixels that must agree for a corner
const RING_ARC: u32 = 12;

/// Minimum distance kept between keypoints after suppression
const NMS_DISTANCE: f32 = 3.0;

/// Keypoint with corner response score, used for suppression and capping
#[derive(Debug, Clone, Copy)]
pub struct ScoredKeypoint {
    pub keypoint: Keypoint,
    pub response: f32,
}

/// Single-scale FAST corner detector with orientation assignment and
/// subpixel refinement.
pub struct CornerDetector {
    cfg: ExtractorConfig,
    w: usize,
    h: usize,
}

impl CornerDetector {
    pub fn new(cfg: ExtractorConfig, width: usize, height: usize) -> ExtractResult<Self> {
        if width == 0 || height == 0 {
            return Err(ExtractError::InvalidImageSize { width, height });
        }

        // The segment test needs a 3-pixel border on every side
        const MIN_SIZE: usize = 7;
        if width < MIN_SIZE || height < MIN_SIZE {
            return Err(ExtractError::ImageTooSmall { width, height, min_size: MIN_SIZE });
        }

        if cfg.threshold == 0 || cfg.threshold > 127 {
            return Err(ExtractError::InvalidThreshold(cfg.threshold));
        }

        let min_dim = width.min(height);
        if cfg.patch_size % 2 == 0 || cfg.patch_size >= min_dim {
            return Err(ExtractError::InvalidPatchSize {
                patch_size: cfg.patch_size,
                min_image_dim: min_dim,
            });
        }

        Ok(Self { cfg, w: width, h: height })
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.cfg
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.w, self.h)
    }

    fn validate_image(&self, img: &Image) -> ExtractResult<()> {
        let expected_len = self.w * self.h;
        if img.len() != expected_len {
            return Err(ExtractError::InvalidImageData {
                expected_len,
                actual_len: img.len(),
            });
        }
        Ok(())
    }

    /// Detect keypoints: FAST segment test, non-maximum suppression,
    /// best-response cap, subpixel refinement. A featureless image yields
    /// an empty set, not an error.
    pub fn detect(&self, img: &Image) -> ExtractResult<Vec<Keypoint>> {
        self.validate_image(img)?;

        let scored = self.scan(img);
        let mut kept = non_maximum_suppression(scored, NMS_DISTANCE);

        // `kept` is response-sorted by the suppression pass
        kept.truncate(self.cfg.max_features);

        Ok(kept
            .into_iter()
            .map(|sk| self.refine_subpixel(img, sk.keypoint))
            .collect())
    }

    /// Row-parallel FAST scan producing scored, oriented candidates
    fn scan(&self, img: &Image) -> Vec<ScoredKeypoint> {
        let (w, h) = (self.w, self.h);
        let t = self.cfg.threshold;

        (3..h - 3)
            .into_par_iter()
            .flat_map_iter(|y| {
                let mut row = Vec::new();
                for x in 3..w - 3 {
                    let center = img[y * w + x];
                    let mut brighter = 0u32;
                    let mut darker = 0u32;
                    let mut contrast = 0i32;

                    for &(dx, dy) in &RING {
                        let q = img[(y as i32 + dy) as usize * w + (x as i32 + dx) as usize];
                        if q >= center.saturating_add(t) {
                            brighter += 1;
                            contrast += q as i32 - center as i32;
                        } else if q.saturating_add(t) <= center {
                            darker += 1;
                            contrast += center as i32 - q as i32;
                        }
                    }

                    if brighter >= RING_ARC || darker >= RING_ARC {
                        let hits = brighter.max(darker);
                        row.push(ScoredKeypoint {
                            keypoint: Keypoint {
                                x: x as f32,
                                y: y as f32,
                                angle: self.orientation(img, x, y),
                            },
                            response: contrast as f32 / hits as f32,
                        });
                    }
                }
                row
            })
            .collect()
    }

    /// Dominant orientation via the intensity centroid of the patch
    fn orientation(&self, img: &Image, x: usize, y: usize) -> f32 {
        let half = (self.cfg.patch_size / 2) as i32;
        let (cx, cy) = (x as i32, y as i32);

        if cx - half < 0 || cy - half < 0 || cx + half >= self.w as i32 || cy + half >= self.h as i32 {
            return 0.0;
        }

        let mut m10 = 0i64;
        let mut m01 = 0i64;
        for dy in -half..=half {
            let yy = (cy + dy) as usize;
            for dx in -half..=half {
                let val = img[yy * self.w + (cx + dx) as usize] as i64;
                m10 += dx as i64 * val;
                m01 += dy as i64 * val;
            }
        }

        if m10 == 0 && m01 == 0 {
            0.0
        } else {
            (m01 as f32).atan2(m10 as f32)
        }
    }

    /// Quadratic peak interpolation on the 3x3 intensity neighborhood.
    /// Falls back to the integer location when the surface is degenerate.
    fn refine_subpixel(&self, img: &Image, kp: Keypoint) -> Keypoint {
        let x = kp.x as usize;
        let y = kp.y as usize;
        if x < 1 || y < 1 || x >= self.w - 1 || y >= self.h - 1 {
            return kp;
        }

        let s = |xx: usize, yy: usize| img[yy * self.w + xx] as f32;

        let dx = (s(x + 1, y) - s(x - 1, y)) / 2.0;
        let dy = (s(x, y + 1) - s(x, y - 1)) / 2.0;
        let dxx = s(x + 1, y) - 2.0 * s(x, y) + s(x - 1, y);
        let dyy = s(x, y + 1) - 2.0 * s(x, y) + s(x, y - 1);
        let dxy = (s(x + 1, y + 1) - s(x - 1, y + 1) - s(x + 1, y - 1) + s(x - 1, y - 1)) / 4.0;

        let det = dxx * dyy - dxy * dxy;
        if det.abs() < 1e-6 {
            return kp;
        }

        let off_x = (-(dyy * dx - dxy * dy) / det).clamp(-0.5, 0.5);
        let off_y = (-(dxx * dy - dxy * dx) / det).clamp(-0.5, 0.5);

        Keypoint {
            x: kp.x + off_x,
            y: kp.y + off_y,
            angle: kp.angle,
        }
    }
}

/// Greedy non-maximum suppression; returns survivors in descending
/// response order.
pub fn non_maximum_suppression(mut candidates: Vec<ScoredKeypoint>, min_distance: f32) -> Vec<ScoredKeypoint> {
    if candidates.is_empty() {
        return candidates;
    }

    candidates.sort_by(|a, b| {
        b.response
            .partial_cmp(&a.response)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let min_sq = min_distance * min_distance;
    let mut kept: Vec<ScoredKeypoint> = Vec::new();

    'cand: for c in candidates {
        for k in &kept {
            let dx = c.keypoint.x - k.keypoint.x;
            let dy = c.keypoint.y - k.keypoint.y;
            if dx * dx + dy * dy < min_sq {
                continue 'cand;
            }
        }
        kept.push(c);
    }

    kept
}
