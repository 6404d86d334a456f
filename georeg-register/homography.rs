//! Projective transform estimation via the normalized direct linear
//! transform. A homography maps crop-image pixel coordinates onto
//! layout-image pixel coordinates; it is only defined for >= 4
//! non-degenerate correspondences.

use nalgebra::{DMatrix, Matrix3, Vector3};

#[derive(Debug, Clone, PartialEq)]
pub enum EstimateError {
    /// Fewer than 4 correspondences were supplied. An expected outcome
    /// for poor-overlap or low-texture input, not a system fault.
    InsufficientMatches { got: usize },
    /// No candidate transform explained enough correspondences.
    NoConsensus { best_inliers: usize, needed: usize },
    /// The linear system could not be solved.
    Numerical(String),
}

impl std::fmt::Display for EstimateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimateError::InsufficientMatches { got } => {
                write!(f, "insufficient matches: need 4, got {}", got)
            }
            EstimateError::NoConsensus { best_inliers, needed } => {
                write!(f, "no consensus: best candidate had {} inliers, need {}", best_inliers, needed)
            }
            EstimateError::Numerical(msg) => write!(f, "numerical failure: {}", msg),
        }
    }
}

impl std::error::Error for EstimateError {}

pub type EstimateResult<T> = Result<T, EstimateError>;

/// Apply H to a pixel coordinate: H * [x, y, 1]^T, dehomogenized.
pub fn project(h: &Matrix3<f64>, p: [f64; 2]) -> [f64; 2] {
    let q = h * Vector3::new(p[0], p[1], 1.0);
    if q[2].abs() < 1e-15 {
        return [f64::NAN, f64::NAN];
    }
    [q[0] / q[2], q[1] / q[2]]
}

/// Euclidean distance between the projected source point and its matched
/// destination point.
pub fn reprojection_error(h: &Matrix3<f64>, src: [f64; 2], dst: [f64; 2]) -> f64 {
    let p = project(h, src);
    ((p[0] - dst[0]).powi(2) + (p[1] - dst[1]).powi(2)).sqrt()
}

/// Scale factor of the transform's similarity part, read from the
/// upper-left 2x2 block.
pub fn similarity_scale(h: &Matrix3<f64>) -> f64 {
    (h[(0, 0)] * h[(1, 1)] - h[(0, 1)] * h[(1, 0)]).abs().sqrt()
}

/// Rotation angle (radians) of the transform's similarity part.
pub fn similarity_rotation(h: &Matrix3<f64>) -> f64 {
    h[(1, 0)].atan2(h[(0, 0)])
}

/// Hartley normalization: centroid to the origin, mean distance sqrt(2).
fn normalizing_transform(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let mapped = pts.iter().map(|p| [s * (p[0] - cx), s * (p[1] - cy)]).collect();
    (t, mapped)
}

/// Fit a homography to >= 4 correspondences by the normalized DLT:
/// stack the 2n x 9 constraint system and take the eigenvector of
/// A^T A with the smallest eigenvalue, then undo the normalization and
/// scale so h33 = 1.
pub fn fit_homography(src: &[[f64; 2]], dst: &[[f64; 2]]) -> EstimateResult<Matrix3<f64>> {
    let n = src.len();
    if n < 4 || dst.len() < 4 {
        return Err(EstimateError::InsufficientMatches { got: n.min(dst.len()) });
    }
    if src.len() != dst.len() {
        return Err(EstimateError::Numerical(format!(
            "correspondence arrays differ in length: {} vs {}",
            src.len(),
            dst.len()
        )));
    }

    let (t_src, sn) = normalizing_transform(src);
    let (t_dst, dn) = normalizing_transform(dst);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let [sx, sy] = sn[i];
        let [dx, dy] = dn[i];
        a.row_mut(2 * i)
            .copy_from_slice(&[0.0, 0.0, 0.0, -sx, -sy, -1.0, dy * sx, dy * sy, dy]);
        a.row_mut(2 * i + 1)
            .copy_from_slice(&[sx, sy, 1.0, 0.0, 0.0, 0.0, -dx * sx, -dx * sy, -dx]);
    }

    // Null vector of A ~ eigenvector of A^T A with the smallest eigenvalue
    let eig = nalgebra::SymmetricEigen::new(a.transpose() * &a);
    let mut min_idx = 0;
    for i in 1..9 {
        if eig.eigenvalues[i].abs() < eig.eigenvalues[min_idx].abs() {
            min_idx = i;
        }
    }
    let v = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| EstimateError::Numerical("destination normalization not invertible".into()))?;
    let h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Err(EstimateError::Numerical("homography is singular at h33".into()))
    } else {
        Ok(h / scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn reference_homography() -> Matrix3<f64> {
        // scale + translation + mild perspective
        Matrix3::new(
            2.1, 0.05, 310.0,
            -0.02, 1.9, 150.0,
            0.00008, -0.00004, 1.0,
        )
    }

    #[test]
    fn exact_fit_from_four_points() {
        let h_true = reference_homography();
        let src = [[0.0, 0.0], [0.0, 90.0], [120.0, 90.0], [120.0, 0.0]];
        let dst: Vec<[f64; 2]> = src.iter().map(|&p| project(&h_true, p)).collect();

        let h = fit_homography(&src, &dst).unwrap();
        for (&s, &d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&h, s, d) < 1e-6);
        }
    }

    #[test]
    fn overdetermined_fit_is_consistent() {
        let h_true = reference_homography();
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for i in 0..6 {
            for j in 0..6 {
                let p = [i as f64 * 25.0, j as f64 * 25.0];
                src.push(p);
                dst.push(project(&h_true, p));
            }
        }

        let h = fit_homography(&src, &dst).unwrap();
        for (&s, &d) in src.iter().zip(&dst) {
            assert!(reprojection_error(&h, s, d) < 1e-6);
        }
    }

    #[test]
    fn fewer_than_four_points_is_insufficient() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];
        assert!(matches!(
            fit_homography(&pts, &pts),
            Err(EstimateError::InsufficientMatches { got: 3 })
        ));
    }

    #[test]
    fn corner_roundtrip_through_inverse() {
        let h = reference_homography();
        let h_inv = h.try_inverse().unwrap();
        let corners = [[0.0, 0.0], [0.0, 99.0], [149.0, 99.0], [149.0, 0.0]];
        for &c in &corners {
            let back = project(&h_inv, project(&h, c));
            assert_relative_eq!(c[0], back[0], epsilon = 1e-8);
            assert_relative_eq!(c[1], back[1], epsilon = 1e-8);
        }
    }

    #[test]
    fn similarity_parts_are_recovered() {
        let angle = 0.5f64;
        let scale = 1.4f64;
        let h = Matrix3::new(
            scale * angle.cos(), -scale * angle.sin(), 12.0,
            scale * angle.sin(), scale * angle.cos(), -5.0,
            0.0, 0.0, 1.0,
        );
        assert_relative_eq!(similarity_scale(&h), scale, epsilon = 1e-12);
        assert_relative_eq!(similarity_rotation(&h), angle, epsilon = 1e-12);
    }
}
