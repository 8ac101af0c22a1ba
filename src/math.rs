use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, Mul, MulAssign, Neg, Sub};

/// A 3-component vector used for positions, directions, and colors.
///
/// This type implements all standard arithmetic operations with operator
/// overloading, and provides the geometric utilities (dot product, cross
/// product, tangent frames) needed for light transport simulation. All
/// scalar math is 32-bit float.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

pub type Point3 = Vec3;
pub type Color = Vec3;

impl Vec3 {
    #[inline(always)]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline(always)]
    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    #[inline(always)]
    pub const fn ones() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }

    #[inline(always)]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    #[inline(always)]
    pub const fn unit_x() -> Self {
        Self::new(1.0, 0.0, 0.0)
    }

    #[inline(always)]
    pub const fn unit_y() -> Self {
        Self::new(0.0, 1.0, 0.0)
    }

    #[inline(always)]
    pub const fn unit_z() -> Self {
        Self::new(0.0, 0.0, 1.0)
    }

    /// Squared Euclidean length — avoids the sqrt for performance-critical
    /// paths such as BVH traversal and intersection culling.
    #[inline(always)]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline(always)]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Returns the unit vector. Panics on zero-length vectors in debug mode.
    #[inline(always)]
    pub fn normalized(self) -> Self {
        let len = self.length();
        debug_assert!(len > 1e-12, "Attempted to normalize a zero-length vector");
        self / len
    }

    #[inline(always)]
    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    #[inline(always)]
    pub fn cross(self, rhs: Self) -> Self {
        Self::new(
            self.y * rhs.z - self.z * rhs.y,
            self.z * rhs.x - self.x * rhs.z,
            self.x * rhs.y - self.y * rhs.x,
        )
    }

    /// Component-wise (Hadamard) product — used for color modulation where
    /// each channel is attenuated independently.
    #[inline(always)]
    pub fn hadamard(self, rhs: Self) -> Self {
        Self::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }

    /// Component-wise linear interpolation: self·(1-t) + other·t
    #[inline(always)]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self * (1.0 - t) + other * t
    }

    /// Clamps each component to [0, 1] before quantizing radiance to 8-bit.
    #[inline(always)]
    pub fn saturate(self) -> Self {
        Self::new(
            self.x.clamp(0.0, 1.0),
            self.y.clamp(0.0, 1.0),
            self.z.clamp(0.0, 1.0),
        )
    }

    /// Component-wise e^x — Beer–Lambert attenuation over a path segment.
    #[inline(always)]
    pub fn exp(self) -> Self {
        Self::new(self.x.exp(), self.y.exp(), self.z.exp())
    }

    /// The largest channel, used as the Russian-roulette survival probability.
    #[inline(always)]
    pub fn max_channel(self) -> f32 {
        self.x.max(self.y).max(self.z)
    }

    /// Arithmetic mean of the channels — the scalar lobe probability of a
    /// reflectance color.
    #[inline(always)]
    pub fn gray(self) -> f32 {
        (self.x + self.y + self.z) / 3.0
    }

    #[inline(always)]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Builds two unit vectors orthogonal to `self` (assumed unit length),
    /// forming a right-handed tangent frame for hemisphere sampling.
    pub fn orthonormals(self) -> (Self, Self) {
        let u = if self.x.abs() > 0.9 {
            Self::unit_y().cross(self)
        } else {
            Self::unit_x().cross(self)
        }
        .normalized();
        let v = self.cross(u);
        (u, v)
    }

    /// The sRGB transfer curve, applied per channel to linear radiance.
    pub fn linear_to_srgb(self) -> Self {
        fn channel(x: f32) -> f32 {
            if x <= 0.0031308 {
                12.92 * x
            } else {
                1.055 * x.powf(1.0 / 2.4) - 0.055
            }
        }
        Self::new(channel(self.x), channel(self.y), channel(self.z))
    }

    /// Converts a [0,1] color to an 8-bit RGB triple.
    pub fn to_rgb8(self) -> [u8; 3] {
        let c = self.saturate();
        [
            (c.x * 255.999) as u8,
            (c.y * 255.999) as u8,
            (c.z * 255.999) as u8,
        ]
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Add for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
        self.z += rhs.z;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn mul(self, t: f32) -> Self {
        Self::new(self.x * t, self.y * t, self.z * t)
    }
}

impl Mul<Vec3> for f32 {
    type Output = Vec3;
    #[inline(always)]
    fn mul(self, v: Vec3) -> Vec3 {
        v * self
    }
}

impl MulAssign<f32> for Vec3 {
    #[inline(always)]
    fn mul_assign(&mut self, t: f32) {
        self.x *= t;
        self.y *= t;
        self.z *= t;
    }
}

impl Div<f32> for Vec3 {
    type Output = Self;
    #[inline(always)]
    fn div(self, t: f32) -> Self {
        let inv = 1.0 / t;
        Self::new(self.x * inv, self.y * inv, self.z * inv)
    }
}

impl DivAssign<f32> for Vec3 {
    #[inline(always)]
    fn div_assign(&mut self, t: f32) {
        let inv = 1.0 / t;
        self.x *= inv;
        self.y *= inv;
        self.z *= inv;
    }
}

impl Index<usize> for Vec3 {
    type Output = f32;
    fn index(&self, i: usize) -> &f32 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            _ => panic!("Vec3 index out of bounds: {i}"),
        }
    }
}

// ─── Ray ────────────────────────────────────────────────────────────────────

/// A parametric ray R(t) = origin + t · direction.
///
/// Primary rays are normalized at creation so their `t` measures world
/// distance. Rays transformed into a node's local frame keep their direction
/// magnitude; `t` then stays directly comparable across frames even when the
/// affine map includes scale.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Point3,
    pub direction: Vec3,
}

impl Ray {
    #[inline(always)]
    pub const fn new(origin: Point3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Evaluates the ray at parameter t.
    #[inline(always)]
    pub fn at(self, t: f32) -> Point3 {
        self.origin + self.direction * t
    }
}

// ─── Axis-Aligned Bounding Box ──────────────────────────────────────────────

/// An axis-aligned bounding box used as the bounding volume in the BVH and
/// for whole-shape pruning. Intersection uses the slab method and reports
/// the entry distance so traversal can visit the nearer child first.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Point3,
    pub max: Point3,
}

impl Aabb {
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// An inverted box that unions with anything to yield the other operand.
    pub const fn empty() -> Self {
        Self::new(
            Point3::splat(f32::INFINITY),
            Point3::splat(f32::NEG_INFINITY),
        )
    }

    /// Slab-method ray-box test over the parameter interval [0, t_max].
    /// Returns the entry distance on a hit; the near/far swap per axis
    /// handles negative direction components.
    pub fn hit(&self, ray: &Ray, t_max: f32) -> Option<f32> {
        let mut t_near = 0.0f32;
        let mut t_far = t_max;
        for axis in 0..3 {
            let inv_d = 1.0 / ray.direction[axis];
            let mut t0 = (self.min[axis] - ray.origin[axis]) * inv_d;
            let mut t1 = (self.max[axis] - ray.origin[axis]) * inv_d;
            if inv_d < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_near = t0.max(t_near);
            t_far = t1.min(t_far);
            if t_near > t_far {
                return None;
            }
        }
        (t_near < t_far).then_some(t_near)
    }

    /// The union of two boxes — used when merging child volumes during
    /// BVH construction.
    pub fn surrounding(a: &Aabb, b: &Aabb) -> Aabb {
        let min = Point3::new(
            a.min.x.min(b.min.x),
            a.min.y.min(b.min.y),
            a.min.z.min(b.min.z),
        );
        let max = Point3::new(
            a.max.x.max(b.max.x),
            a.max.y.max(b.max.y),
            a.max.z.max(b.max.z),
        );
        Aabb::new(min, max)
    }

    pub fn grow(&mut self, p: Point3) {
        self.min = Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z));
        self.max = Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z));
    }

    #[inline]
    pub fn centroid(&self) -> Point3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    #[allow(dead_code)]
    pub fn contains(&self, p: Point3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    /// Index of the longest axis (0=x, 1=y, 2=z) — the split dimension for
    /// top-down BVH construction with the midpoint heuristic.
    pub fn longest_axis(&self) -> usize {
        let dx = self.max.x - self.min.x;
        let dy = self.max.y - self.min.y;
        let dz = self.max.z - self.min.z;
        if dx > dy && dx > dz {
            0
        } else if dy > dz {
            1
        } else {
            2
        }
    }
}

// ─── 3×3 Matrix ─────────────────────────────────────────────────────────────

/// A column-major 3×3 matrix. Columns are the images of the basis vectors,
/// so `Mat3::from_cols(x, y, z) * Vec3::unit_x() == x` — the natural form
/// for a world-from-camera basis and for node transforms.
#[derive(Debug, Clone, Copy)]
pub struct Mat3 {
    pub cols: [Vec3; 3],
}

impl Mat3 {
    pub const fn from_cols(x: Vec3, y: Vec3, z: Vec3) -> Self {
        Self { cols: [x, y, z] }
    }

    pub const fn identity() -> Self {
        Self::from_cols(Vec3::unit_x(), Vec3::unit_y(), Vec3::unit_z())
    }

    pub fn scale(s: Vec3) -> Self {
        Self::from_cols(
            Vec3::new(s.x, 0.0, 0.0),
            Vec3::new(0.0, s.y, 0.0),
            Vec3::new(0.0, 0.0, s.z),
        )
    }

    pub fn uniform_scale(s: f32) -> Self {
        Self::scale(Vec3::splat(s))
    }

    pub fn rotation_x(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self::from_cols(Vec3::unit_x(), Vec3::new(0.0, c, s), Vec3::new(0.0, -s, c))
    }

    pub fn rotation_y(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self::from_cols(Vec3::new(c, 0.0, -s), Vec3::unit_y(), Vec3::new(s, 0.0, c))
    }

    #[allow(dead_code)]
    pub fn rotation_z(radians: f32) -> Self {
        let (s, c) = radians.sin_cos();
        Self::from_cols(Vec3::new(c, s, 0.0), Vec3::new(-s, c, 0.0), Vec3::unit_z())
    }

    pub fn transpose(&self) -> Self {
        Self::from_cols(
            Vec3::new(self.cols[0].x, self.cols[1].x, self.cols[2].x),
            Vec3::new(self.cols[0].y, self.cols[1].y, self.cols[2].y),
            Vec3::new(self.cols[0].z, self.cols[1].z, self.cols[2].z),
        )
    }

    pub fn determinant(&self) -> f32 {
        self.cols[0].dot(self.cols[1].cross(self.cols[2]))
    }

    /// General inverse via the adjugate. A singular matrix yields
    /// non-finite entries; node transforms are validated at build time.
    pub fn inverse(&self) -> Self {
        let [a, b, c] = self.cols;
        // Rows of the inverse are the cross products of the column pairs,
        // scaled by 1/det.
        let r0 = b.cross(c);
        let r1 = c.cross(a);
        let r2 = a.cross(b);
        let inv_det = 1.0 / self.determinant();
        Self::from_cols(
            Vec3::new(r0.x, r1.x, r2.x) * inv_det,
            Vec3::new(r0.y, r1.y, r2.y) * inv_det,
            Vec3::new(r0.z, r1.z, r2.z) * inv_det,
        )
    }
}

impl Mul<Vec3> for Mat3 {
    type Output = Vec3;
    #[inline(always)]
    fn mul(self, v: Vec3) -> Vec3 {
        self.cols[0] * v.x + self.cols[1] * v.y + self.cols[2] * v.z
    }
}

impl Mul<Mat3> for Mat3 {
    type Output = Mat3;
    fn mul(self, rhs: Mat3) -> Mat3 {
        Mat3::from_cols(self * rhs.cols[0], self * rhs.cols[1], self * rhs.cols[2])
    }
}

// ─── Affine Node Transform ──────────────────────────────────────────────────

/// The affine transform carried by a scene-graph node: a 3×3 linear part
/// plus translation, with the inverse and the normal-transform matrix
/// cached at construction. Inside the render core transforms are never
/// edited, so the caches stay consistent by construction.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    linear: Mat3,
    inverse: Mat3,
    normal: Mat3,
    translation: Vec3,
}

impl Transform {
    pub fn new(linear: Mat3, translation: Vec3) -> Self {
        let inverse = linear.inverse();
        Self {
            linear,
            inverse,
            // Normals transform by the inverse transpose of the linear part.
            normal: inverse.transpose(),
            translation,
        }
    }

    pub fn identity() -> Self {
        Self::new(Mat3::identity(), Vec3::zero())
    }

    pub fn translation(t: Vec3) -> Self {
        Self::new(Mat3::identity(), t)
    }

    /// Transforms a parent-frame ray into this node's local frame. The
    /// direction is deliberately not renormalized: keeping |d| means a
    /// child's hit `t` stays directly comparable to the parent's.
    #[inline]
    pub fn ray_to_local(&self, ray: &Ray) -> Ray {
        Ray::new(
            self.inverse * (ray.origin - self.translation),
            self.inverse * ray.direction,
        )
    }

    #[inline]
    #[allow(dead_code)]
    pub fn point_to_local(&self, p: Point3) -> Point3 {
        self.inverse * (p - self.translation)
    }

    #[inline]
    pub fn point_from_local(&self, p: Point3) -> Point3 {
        self.linear * p + self.translation
    }

    #[inline]
    #[allow(dead_code)]
    pub fn vector_from_local(&self, v: Vec3) -> Vec3 {
        self.linear * v
    }

    /// Maps a local surface normal to the parent frame. Not normalized
    /// here; consumers renormalize once at the world level.
    #[inline]
    pub fn normal_from_local(&self, n: Vec3) -> Vec3 {
        self.normal * n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-4;

    fn assert_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() <= EPS, "{a} != {b}");
    }

    #[test]
    fn transform_round_trip() {
        let t = Transform::new(
            Mat3::rotation_y(0.7) * Mat3::scale(Vec3::new(2.0, 0.5, 3.0)),
            Vec3::new(1.0, -2.0, 4.0),
        );
        let p = Point3::new(0.3, -1.2, 2.5);
        assert_close(t.point_from_local(t.point_to_local(p)), p);
        assert_close(t.point_to_local(t.point_from_local(p)), p);
    }

    #[test]
    fn normal_transform_preserves_tangency() {
        // A normal must stay perpendicular to transformed tangents even
        // under non-uniform scale.
        let t = Transform::new(Mat3::scale(Vec3::new(2.0, 1.0, 0.25)), Vec3::zero());
        let n = Vec3::new(0.0, 0.0, 1.0);
        let tangent = Vec3::new(1.0, 1.0, 0.0);
        let n_w = t.normal_from_local(n);
        let tan_w = t.vector_from_local(tangent);
        assert!(n_w.dot(tan_w).abs() < EPS);
    }

    #[test]
    fn aabb_hit_reports_entry_distance() {
        let bbox = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Point3::new(-3.0, 0.0, 0.0), Vec3::unit_x());
        let t = bbox.hit(&ray, f32::INFINITY).unwrap();
        assert!((t - 2.0).abs() < EPS);
    }

    #[test]
    fn aabb_respects_t_range_and_direction() {
        let bbox = Aabb::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
        let ray = Ray::new(Point3::new(-3.0, 0.0, 0.0), Vec3::unit_x());
        assert!(bbox.hit(&ray, 1.5).is_none());
        let away = Ray::new(Point3::new(-3.0, 0.0, 0.0), -Vec3::unit_x());
        assert!(bbox.hit(&away, f32::INFINITY).is_none());
    }

    #[test]
    fn mat3_inverse() {
        let m = Mat3::rotation_z(1.1) * Mat3::scale(Vec3::new(2.0, 3.0, 0.5));
        let inv = m.inverse();
        let v = Vec3::new(0.4, -0.9, 1.7);
        assert_close(inv * (m * v), v);
    }

    #[test]
    fn orthonormals_are_a_frame() {
        for n in [Vec3::unit_x(), Vec3::unit_z(), Vec3::new(0.6, -0.48, 0.64)] {
            let n = n.normalized();
            let (u, v) = n.orthonormals();
            assert!(u.dot(n).abs() < EPS);
            assert!(v.dot(n).abs() < EPS);
            assert!(u.dot(v).abs() < EPS);
            assert!((u.length() - 1.0).abs() < EPS);
            assert_close(u.cross(v), n);
        }
    }
}
