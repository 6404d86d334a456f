use georeg_core::{Descriptor, Image, Keypoint, DESCRIPTOR_BITS};
use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

const DESCRIPTOR_SIZE: usize = 32;

/// Fixed seed for the sampling pattern so descriptors are reproducible
/// across runs and machines.
const PATTERN_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Rotated BRIEF descriptor generator.
///
/// The 256 sampling pairs are drawn once, uniformly inside the patch,
/// from a fixed-seed generator; each pair is rotated into the keypoint's
/// dominant orientation before comparison, which gives the descriptor its
/// rotation invariance.
pub struct BriefDescriptor {
    w: usize,
    h: usize,
    pattern: Vec<(f32, f32, f32, f32)>,
}

impl BriefDescriptor {
    pub fn new(width: usize, height: usize, patch_size: usize) -> Self {
        let radius = (patch_size / 2).max(1) as f32;
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let pattern = (0..DESCRIPTOR_BITS)
            .map(|_| {
                (
                    rng.gen_range(-radius..=radius),
                    rng.gen_range(-radius..=radius),
                    rng.gen_range(-radius..=radius),
                    rng.gen_range(-radius..=radius),
                )
            })
            .collect();

        Self { w: width, h: height, pattern }
    }

    pub fn describe(&self, img: &Image, kps: &[Keypoint]) -> Vec<Descriptor> {
        kps.par_iter()
            .map(|kp| {
                let (s, c) = kp.angle.sin_cos();
                let mut d = [0u8; DESCRIPTOR_SIZE];

                for (i, &(x1, y1, x2, y2)) in self.pattern.iter().enumerate() {
                    let p = self.sample(img, kp.x + c * x1 - s * y1, kp.y + s * x1 + c * y1);
                    let q = self.sample(img, kp.x + c * x2 - s * y2, kp.y + s * x2 + c * y2);
                    d[i / 8] |= ((p < q) as u8) << (i % 8);
                }
                d
            })
            .collect()
    }

    /// Bilinear sample with clamping at the image border
    fn sample(&self, img: &Image, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();

        if x0 < 0.0 || y0 < 0.0 || x0 + 1.0 >= self.w as f32 || y0 + 1.0 >= self.h as f32 {
            let cx = x.round().clamp(0.0, (self.w - 1) as f32) as usize;
            let cy = y.round().clamp(0.0, (self.h - 1) as f32) as usize;
            return img[cy * self.w + cx] as f32;
        }

        let fx = x - x0;
        let fy = y - y0;
        let (xi, yi) = (x0 as usize, y0 as usize);

        let p00 = img[yi * self.w + xi] as f32;
        let p10 = img[yi * self.w + xi + 1] as f32;
        let p01 = img[(yi + 1) * self.w + xi] as f32;
        let p11 = img[(yi + 1) * self.w + xi + 1] as f32;

        let top = p00 * (1.0 - fx) + p10 * fx;
        let bottom = p01 * (1.0 - fx) + p11 * fx;
        top * (1.0 - fy) + bottom * fy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_image(width: usize, height: usize) -> Image {
        let mut img = vec![0u8; width * height];
        for y in 0..height {
            for x in 0..width {
                img[y * width + x] = ((x * 7 + y * 13) % 251) as u8;
            }
        }
        img
    }

    #[test]
    fn pattern_is_reproducible() {
        let a = BriefDescriptor::new(64, 64, 15);
        let b = BriefDescriptor::new(64, 64, 15);
        assert_eq!(a.pattern, b.pattern);
        assert_eq!(a.pattern.len(), DESCRIPTOR_BITS);
    }

    #[test]
    fn describes_every_keypoint() {
        let gen = BriefDescriptor::new(64, 64, 15);
        let img = gradient_image(64, 64);
        let kps = vec![
            Keypoint { x: 20.0, y: 20.0, angle: 0.0 },
            Keypoint { x: 40.5, y: 31.25, angle: 1.1 },
        ];
        let desc = gen.describe(&img, &kps);
        assert_eq!(desc.len(), 2);
        assert_ne!(desc[0], desc[1]);
    }

    #[test]
    fn border_keypoints_do_not_panic() {
        let gen = BriefDescriptor::new(32, 32, 15);
        let img = gradient_image(32, 32);
        let kps = vec![
            Keypoint { x: 0.0, y: 0.0, angle: 0.7 },
            Keypoint { x: 31.0, y: 31.0, angle: -2.3 },
        ];
        let desc = gen.describe(&img, &kps);
        assert_eq!(desc.len(), 2);
    }

    #[test]
    fn description_is_deterministic() {
        let gen = BriefDescriptor::new(48, 48, 15);
        let img = gradient_image(48, 48);
        let kps = vec![Keypoint { x: 24.0, y: 24.0, angle: 0.3 }];
        assert_eq!(gen.describe(&img, &kps), gen.describe(&img, &kps));
    }
}
