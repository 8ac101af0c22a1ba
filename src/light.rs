use crate::geometry::LocalHit;
use crate::math::{Color, Point3, Ray, Vec3};
use crate::sampling::{radical_inverse, rotate, uniform_cone, unit_disk};
use crate::scene::Scene;
use rand::rngs::SmallRng;
use rand::Rng;
use std::f32::consts::PI;

/// Offset applied along a shadow-ray direction before tracing, matching the
/// secondary-ray bias used by the shading core.
const SHADOW_BIAS: f32 = 2e-4;

/// An emission sample toward a light: the direction to shoot, its solid
/// angle PDF, the radiance multiplier, and the distance to the emitter
/// (infinite for directional lights, zero when no visibility test applies).
#[derive(Debug, Clone, Copy)]
pub struct LightSample {
    pub dir: Vec3,
    pub pdf: f32,
    pub mult: Color,
    pub dist: f32,
}

// ─── Light Variants ─────────────────────────────────────────────────────────

/// Scene lights. The spherical variant doubles as renderable geometry so
/// camera and reflection rays see a bright disk where the light sits.
pub enum Light {
    Ambient {
        intensity: Color,
    },
    Directional {
        intensity: Color,
        direction: Vec3,
    },
    /// A point light with physical extent: a sphere of radius `size`
    /// centered at `position`. With `size` zero it degenerates to a hard
    /// point light.
    Point {
        intensity: Color,
        position: Point3,
        size: f32,
    },
}

impl Light {
    pub fn intensity(&self) -> Color {
        match self {
            Light::Ambient { intensity }
            | Light::Directional { intensity, .. }
            | Light::Point { intensity, .. } => *intensity,
        }
    }

    pub fn is_ambient(&self) -> bool {
        matches!(self, Light::Ambient { .. })
    }

    /// Whether the light has a surface a ray can strike.
    pub fn is_renderable(&self) -> bool {
        matches!(self, Light::Point { size, .. } if *size > 0.0)
    }

    pub fn is_photon_source(&self) -> bool {
        matches!(self, Light::Point { .. })
    }

    /// Outgoing radiance of the emitting surface, intensity / (π·size²).
    pub fn radiance(&self) -> Color {
        match self {
            Light::Point { intensity, size, .. } if *size > 0.0 => {
                *intensity / (PI * size * size)
            }
            _ => self.intensity(),
        }
    }

    // ─── Emission sampling (path tracer NEE) ────────────────────────────

    /// Draws a direction toward the light from the surface point `p` with
    /// normal `n`. Spherical lights use uniform cone sampling over their
    /// visible cap; the returned distance is the sphere entry along the
    /// sampled direction.
    pub fn generate_sample(&self, p: Point3, n: Vec3, rng: &mut SmallRng) -> Option<LightSample> {
        match self {
            Light::Ambient { intensity } => Some(LightSample {
                dir: n,
                pdf: 1.0,
                mult: *intensity,
                dist: 0.0,
            }),
            Light::Directional {
                intensity,
                direction,
            } => Some(LightSample {
                dir: -*direction,
                pdf: 1.0,
                mult: *intensity,
                dist: f32::INFINITY,
            }),
            Light::Point {
                position, size, ..
            } => {
                let to_center = *position - p;
                let dist_to_center = to_center.length();
                if dist_to_center <= *size {
                    // Shading point inside the emitter; no cone exists.
                    return None;
                }
                let axis = to_center / dist_to_center;
                let sin_max = size / dist_to_center;
                let cos_max = (1.0 - sin_max * sin_max).max(0.0).sqrt();

                let dir = uniform_cone(axis, cos_max, rng.gen(), rng.gen());

                // Distance to the sphere surface along `dir`: drop a
                // perpendicular from the center onto the ray and back off
                // by the chord half-length.
                let cos_theta = dir.dot(axis).min(1.0);
                let adjacent = dist_to_center * cos_theta;
                let opposite_sq = dist_to_center * dist_to_center - adjacent * adjacent;
                let inside_sq = size * size - opposite_sq;
                let dist = adjacent - inside_sq.max(0.0).sqrt();

                // 1 − cosθmax evaluated as sin²/(1+cos) to survive small
                // cone angles in 32-bit float.
                let one_minus_cos_max = (sin_max * sin_max) / (1.0 + cos_max);
                Some(LightSample {
                    dir,
                    pdf: 1.0 / (2.0 * PI * one_minus_cos_max),
                    mult: self.radiance(),
                    dist,
                })
            }
        }
    }

    // ─── Analytic illumination (whitted shading) ────────────────────────

    /// Returns the incident intensity at `p` and the direction toward the
    /// light. Spherical lights estimate a soft visibility ratio from 16
    /// Halton-distributed shadow rays over the visible disk, bailing out
    /// after 4 unanimous samples; intensity falls off with 1/dist².
    pub fn illuminate(
        &self,
        scene: &Scene,
        p: Point3,
        n: Vec3,
        rng: &mut SmallRng,
    ) -> (Color, Vec3) {
        match self {
            Light::Ambient { intensity } => (*intensity, n),
            Light::Directional {
                intensity,
                direction,
            } => {
                let dir = -*direction;
                let shadow = Ray::new(p + dir * SHADOW_BIAS, dir);
                if scene.occluded(&shadow, f32::INFINITY) {
                    (Color::zero(), dir)
                } else {
                    (*intensity, dir)
                }
            }
            Light::Point {
                intensity,
                position,
                size,
            } => {
                let to_center = *position - p;
                let dist = to_center.length();
                let dir = to_center / dist;
                let falloff = 1.0 / (dist * dist);

                if *size <= 0.0 {
                    let shadow = Ray::new(p + dir * SHADOW_BIAS, dir);
                    let visible = !scene.occluded(&shadow, dist - SHADOW_BIAS);
                    return (
                        *intensity * if visible { falloff } else { 0.0 },
                        dir,
                    );
                }

                const SAMPLES: u32 = 16;
                const EARLY_OUT: u32 = 4;
                let (u, v) = dir.orthonormals();
                let rot_theta: f32 = rng.gen();
                let rot_radius: f32 = rng.gen();

                let mut hits = 0u32;
                let mut taken = 0u32;
                for k in 0..SAMPLES {
                    let (theta, radius) = unit_disk(
                        rotate(radical_inverse(k, 2), rot_theta),
                        rotate(radical_inverse(k, 3), rot_radius),
                    );
                    let target = *position
                        + (u * theta.cos() + v * theta.sin()) * (radius * size);
                    let to_target = target - p;
                    let target_dist = to_target.length();
                    let sample_dir = to_target / target_dist;
                    let shadow = Ray::new(p + sample_dir * SHADOW_BIAS, sample_dir);
                    taken += 1;
                    if !scene.occluded(&shadow, target_dist - SHADOW_BIAS) {
                        hits += 1;
                    }
                    // Fully lit or fully shadowed after the first few rays.
                    if taken == EARLY_OUT && (hits == 0 || hits == EARLY_OUT) {
                        break;
                    }
                }
                let visibility = hits as f32 / taken as f32;
                (*intensity * (visibility * falloff), dir)
            }
        }
    }

    // ─── Renderable surface ─────────────────────────────────────────────

    /// Front-side intersection with the emitting sphere, in world space.
    /// Uniform scaling of both origin and direction preserves t, so the
    /// returned parameter compares directly with scene-graph hits.
    pub fn intersect(&self, ray: &Ray) -> Option<LocalHit> {
        let Light::Point {
            position, size, ..
        } = self
        else {
            return None;
        };
        if *size <= 0.0 {
            return None;
        }
        let local = Ray::new((ray.origin - *position) / *size, ray.direction / *size);
        let a = local.direction.dot(local.direction);
        let b = 2.0 * local.direction.dot(local.origin);
        let c = local.origin.dot(local.origin) - 1.0;
        let discriminant = b * b - 4.0 * a * c;
        if discriminant <= 0.0 {
            return None;
        }
        let t1 = (-b - discriminant.sqrt()) / (2.0 * a);
        if t1 <= 0.0 {
            return None;
        }
        let point = ray.at(t1);
        Some(LocalHit {
            t: t1,
            point,
            normal: (point - *position) / *size,
            uvw: Vec3::new(0.0, 0.0, 1.0),
            front: true,
        })
    }

    // ─── Photon emission ────────────────────────────────────────────────

    /// Emits a photon from the surface of the light: a uniform point on the
    /// sphere, a cosine-ish lobe around its outward normal, and a flux of
    /// intensity · 8π·size²·cosθ.
    pub fn random_photon(&self, rng: &mut SmallRng) -> Option<(Ray, Color)> {
        let Light::Point {
            intensity,
            position,
            size,
        } = self
        else {
            return None;
        };

        // Uniform point on the sphere via the cylindrical-projection map.
        let theta = 2.0 * PI * rng.gen::<f32>();
        let z = size * (1.0 - 2.0 * rng.gen::<f32>());
        let r_proj = (size * size - z * z).max(0.0).sqrt();
        let origin = *position + Vec3::new(r_proj * theta.cos(), r_proj * theta.sin(), z);

        let phi = 2.0 * PI * rng.gen::<f32>();
        let cos_theta = rng.gen::<f32>();
        let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
        let normal = if *size > 0.0 {
            (origin - *position).normalized()
        } else {
            Vec3::unit_z()
        };
        let (u, v) = normal.orthonormals();
        let dir = u * (sin_theta * phi.cos()) + v * (sin_theta * phi.sin()) + normal * cos_theta;

        let power = *intensity * (8.0 * PI * size * size * cos_theta);
        Some((Ray::new(origin, dir), power))
    }
}
