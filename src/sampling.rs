use crate::math::{Color, Vec3};
use std::f32::consts::PI;
use std::ops::Index;

// ─── Halton Low-Discrepancy Sequence ────────────────────────────────────────

/// A precomputed Halton sequence for one base. The renderer keeps one per
/// sampling dimension (bases 2 and 3 for sub-pixel jitter, 5 and 7 for the
/// lens disk) and applies a per-pixel Cranley–Patterson rotation on top, so
/// the same table serves every pixel without visible correlation.
#[derive(Debug, Clone)]
pub struct HaltonSeq {
    values: Vec<f32>,
}

impl HaltonSeq {
    pub fn new(base: u32, count: usize) -> Self {
        Self {
            values: (0..count).map(|i| radical_inverse(i as u32, base)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Index<usize> for HaltonSeq {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        &self.values[i]
    }
}

/// The radical inverse of `index` in the given base: digits mirrored around
/// the radix point. Base 2 yields 0, 1/2, 1/4, 3/4, 1/8, …
pub fn radical_inverse(mut index: u32, base: u32) -> f32 {
    let inv_base = 1.0 / base as f64;
    let mut factor = inv_base;
    let mut result = 0.0f64;
    while index > 0 {
        result += (index % base) as f64 * factor;
        index /= base;
        factor *= inv_base;
    }
    result as f32
}

/// Shifts a low-discrepancy value by a per-pixel random offset, wrapping
/// into [0, 1) (Cranley–Patterson rotation).
#[inline(always)]
pub fn rotate(value: f32, offset: f32) -> f32 {
    (value + offset).fract()
}

// ─── Direction Sampling ─────────────────────────────────────────────────────

/// Cosine-weighted hemisphere sample around the unit normal `n`. The solid
/// angle density is cosθ/π, the optimal importance distribution for a
/// Lambertian lobe.
pub fn cosine_hemisphere(n: Vec3, r1: f32, r2: f32) -> Vec3 {
    let r = r1.sqrt();
    let theta = 2.0 * PI * r2;
    let x = r * theta.cos();
    let y = r * theta.sin();
    let z = (1.0 - x * x - y * y).max(0.0).sqrt();
    let (u, v) = n.orthonormals();
    u * x + v * y + n * z
}

/// Samples a Blinn half-vector around `n` with density ∝ cosθ^g:
/// cosθ = (1−r)^(1/(g+1)). Sharpens toward the normal as glossiness grows.
pub fn glossy_half_vector(n: Vec3, glossiness: f32, r1: f32, r2: f32) -> Vec3 {
    let phi = 2.0 * PI * r1;
    let cos_theta = (1.0 - r2).powf(1.0 / (glossiness + 1.0));
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let (u, v) = n.orthonormals();
    u * (sin_theta * phi.cos()) + v * (sin_theta * phi.sin()) + n * cos_theta
}

/// Uniform sample over the spherical cap of half-angle θ_max around `axis`:
/// cosθ = 1 − r₁ + r₁·cosθ_max. Used for solid-angle sampling of a
/// spherical light.
pub fn uniform_cone(axis: Vec3, cos_theta_max: f32, r1: f32, r2: f32) -> Vec3 {
    let cos_theta = 1.0 - r1 + r1 * cos_theta_max;
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let phi = 2.0 * PI * r2;
    let (u, v) = axis.orthonormals();
    u * (sin_theta * phi.cos()) + v * (sin_theta * phi.sin()) + axis * cos_theta
}

/// Concentric-free polar mapping of two uniform numbers to the unit disk:
/// (θ, r) = (2π·r₁, √r₂).
#[inline]
pub fn unit_disk(r1: f32, r2: f32) -> (f32, f32) {
    (2.0 * PI * r1, r2.sqrt())
}

// ─── Adaptive Pixel Estimator ───────────────────────────────────────────────

/// Running per-pixel accumulator for adaptive sampling. Tracks Σc and Σc⊙c
/// so the per-channel sample variance is available in closed form; after
/// `n_min` samples the estimate stops once the confidence half-width
/// `k·σ/√n` drops below `delta_max` on every channel.
#[derive(Debug, Clone, Copy)]
pub struct PixelEstimator {
    sum: Color,
    sum_sq: Color,
    count: u32,
}

/// Confidence scale for the half-width test; 3 approximates the two-sided
/// 99.7% normal interval and upper-bounds t_{n−1,0.975} for n ≥ 16.
const CONFIDENCE_K: f32 = 3.0;

impl PixelEstimator {
    pub fn new() -> Self {
        Self {
            sum: Color::zero(),
            sum_sq: Color::zero(),
            count: 0,
        }
    }

    /// Folds one sample in. Non-finite samples are dropped so a single NaN
    /// cannot poison the pixel; returns whether the sample was accepted.
    pub fn add(&mut self, c: Color) -> bool {
        if !c.is_finite() {
            log::warn!("dropping non-finite radiance sample {c:?}");
            return false;
        }
        self.sum += c;
        self.sum_sq += c.hadamard(c);
        self.count += 1;
        true
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// The reported pixel value, exactly Σc / n.
    pub fn mean(&self) -> Color {
        if self.count == 0 {
            return Color::zero();
        }
        self.sum / self.count as f32
    }

    /// Whether the per-channel confidence half-width has fallen below
    /// `delta_max`. Meaningless below two samples; callers gate on `n_min`.
    pub fn converged(&self, delta_max: f32) -> bool {
        if self.count < 2 {
            return false;
        }
        let n = self.count as f32;
        let var = (self.sum_sq - self.sum.hadamard(self.sum) / n) / (n - 1.0);
        let sigma = Color::new(
            var.x.max(0.0).sqrt(),
            var.y.max(0.0).sqrt(),
            var.z.max(0.0).sqrt(),
        );
        let delta = sigma * (CONFIDENCE_K / n.sqrt());
        delta.x < delta_max && delta.y < delta_max && delta.z < delta_max
    }
}

impl Default for PixelEstimator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radical_inverse_base_2() {
        let expect = [0.0, 0.5, 0.25, 0.75, 0.125, 0.625, 0.375, 0.875];
        for (i, &e) in expect.iter().enumerate() {
            assert_eq!(radical_inverse(i as u32, 2), e);
        }
    }

    #[test]
    fn radical_inverse_base_3() {
        assert!((radical_inverse(1, 3) - 1.0 / 3.0).abs() < 1e-6);
        assert!((radical_inverse(2, 3) - 2.0 / 3.0).abs() < 1e-6);
        assert!((radical_inverse(3, 3) - 1.0 / 9.0).abs() < 1e-6);
    }

    #[test]
    fn halton_values_stay_in_unit_interval() {
        for base in [2, 3, 5, 7] {
            let seq = HaltonSeq::new(base, 64);
            assert_eq!(seq.len(), 64);
            for i in 0..seq.len() {
                assert!((0.0..1.0).contains(&seq[i]));
            }
        }
    }

    #[test]
    fn cosine_hemisphere_stays_above_surface() {
        let n = Vec3::new(0.3, 0.9, -0.3).normalized();
        for i in 0..32 {
            let r1 = radical_inverse(i, 2);
            let r2 = radical_inverse(i, 3);
            let d = cosine_hemisphere(n, r1, r2);
            assert!(d.dot(n) >= -1e-6);
            assert!((d.length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn cone_sample_within_half_angle() {
        let axis = Vec3::new(0.0, 0.0, 1.0);
        let cos_max = 0.8;
        for i in 1..64 {
            let d = uniform_cone(axis, cos_max, radical_inverse(i, 2), radical_inverse(i, 3));
            assert!(d.dot(axis) >= cos_max - 1e-4);
        }
    }

    #[test]
    fn estimator_mean_is_exact_sum_over_n() {
        let mut est = PixelEstimator::new();
        est.add(Color::new(1.0, 0.0, 0.5));
        est.add(Color::new(0.0, 1.0, 0.5));
        assert_eq!(est.count(), 2);
        assert_eq!(est.mean(), Color::new(0.5, 0.5, 0.5));
    }

    #[test]
    fn estimator_converges_on_constant_signal() {
        let mut est = PixelEstimator::new();
        for _ in 0..16 {
            est.add(Color::splat(0.25));
        }
        assert!(est.converged(0.01));
    }

    #[test]
    fn estimator_keeps_sampling_noisy_signal() {
        let mut est = PixelEstimator::new();
        for i in 0..16 {
            est.add(Color::splat(if i % 2 == 0 { 0.0 } else { 1.0 }));
        }
        assert!(!est.converged(0.01));
    }

    #[test]
    fn estimator_drops_nan_sample() {
        let mut est = PixelEstimator::new();
        assert!(est.add(Color::splat(0.5)));
        assert!(!est.add(Color::new(f32::NAN, 0.0, 0.0)));
        assert_eq!(est.count(), 1);
        assert_eq!(est.mean(), Color::splat(0.5));
    }
}
