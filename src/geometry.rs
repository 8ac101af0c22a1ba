use crate::bvh::{Bvh, BvhNodeKind};
use crate::math::{Aabb, Point3, Ray, Vec3};
use std::f32::consts::PI;

/// Which side of a surface an intersection query accepts. Primary rays use
/// `FrontAndBack` so glass interiors are found; shadow queries ignore sides
/// entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitSide {
    Front,
    Back,
    FrontAndBack,
}

/// An intersection in the frame the query ray was expressed in. `t` is in
/// that frame's units; the normal is unit length in the same frame.
#[derive(Debug, Clone, Copy)]
pub struct LocalHit {
    pub t: f32,
    pub point: Point3,
    pub normal: Vec3,
    pub uvw: Vec3,
    pub front: bool,
}

/// Self-intersection guard shared by the ray-math: accepted hits must have
/// t strictly above this.
pub const T_EPSILON: f32 = 1e-6;

// ─── Shape Variants ─────────────────────────────────────────────────────────

/// The geometry attached to a scene-graph node, each in its own canonical
/// local frame: a radius-1 origin-centered sphere, the z = 0 unit square
/// (|x|,|y| ≤ 1), or an indexed triangle mesh with a BVH.
pub enum Shape {
    Sphere,
    Plane,
    Mesh(Mesh),
}

impl Shape {
    pub fn intersect(&self, ray: &Ray, side: HitSide) -> Option<LocalHit> {
        match self {
            Shape::Sphere => sphere_intersect(ray, side),
            Shape::Plane => plane_intersect(ray),
            Shape::Mesh(mesh) => mesh.intersect(ray, side),
        }
    }

    /// True when any accepted intersection lies in (ε, t_max). A hit at
    /// exactly t_max does not occlude. Side filtering is ignored.
    pub fn occludes(&self, ray: &Ray, t_max: f32) -> bool {
        match self {
            Shape::Sphere => sphere_occludes(ray, t_max),
            Shape::Plane => plane_occludes(ray, t_max),
            Shape::Mesh(mesh) => mesh.occludes(ray, t_max),
        }
    }

    pub fn bounds(&self) -> Aabb {
        match self {
            Shape::Sphere => Aabb::new(Point3::splat(-1.0), Point3::splat(1.0)),
            // Padded in z so the flat square keeps a nonzero slab.
            Shape::Plane => Aabb::new(
                Point3::new(-1.0, -1.0, -1e-4),
                Point3::new(1.0, 1.0, 1e-4),
            ),
            Shape::Mesh(mesh) => mesh.bvh.node(mesh.bvh.root()).bounds,
        }
    }
}

// ─── Unit Sphere ────────────────────────────────────────────────────────────

/// Solves |p + t·d|² = 1. Side semantics: `Front` takes the first strictly
/// positive root, `Back` only applies when the origin is inside (t₁ ≤ 0 <
/// t₂), and `FrontAndBack` takes the smaller positive root, flagging which
/// side was struck. A tangent graze (zero discriminant) is a miss.
fn sphere_intersect(ray: &Ray, side: HitSide) -> Option<LocalHit> {
    let a = ray.direction.dot(ray.direction);
    let b = 2.0 * ray.direction.dot(ray.origin);
    let c = ray.origin.dot(ray.origin) - 1.0;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant <= 0.0 {
        return None;
    }

    let sqrt_d = discriminant.sqrt();
    let inv_2a = 1.0 / (2.0 * a);
    let t1 = (-b - sqrt_d) * inv_2a;
    let t2 = (-b + sqrt_d) * inv_2a;

    let (t, front) = match side {
        HitSide::Front => {
            if t1 <= 0.0 {
                return None;
            }
            (t1, true)
        }
        HitSide::Back => {
            if t1 > 0.0 || t2 < 0.0 {
                return None;
            }
            (t2, false)
        }
        HitSide::FrontAndBack => {
            if t1 < 0.0 && t2 < 0.0 {
                return None;
            }
            if t1 > 0.0 {
                (t1, true)
            } else {
                (t2, false)
            }
        }
    };

    let point = ray.at(t);
    Some(LocalHit {
        t,
        point,
        // The hit point of a unit sphere is its own outward normal.
        normal: point,
        uvw: sphere_uvw(point),
        front,
    })
}

fn sphere_uvw(p: Point3) -> Vec3 {
    let u = p.y.atan2(p.x) / (2.0 * PI) + 0.5;
    let v = p.z.clamp(-1.0, 1.0).asin() / PI + 0.5;
    Vec3::new(u, v, 1.0)
}

fn sphere_occludes(ray: &Ray, t_max: f32) -> bool {
    let a = ray.direction.dot(ray.direction);
    let b = 2.0 * ray.direction.dot(ray.origin);
    let c = ray.origin.dot(ray.origin) - 1.0;

    let discriminant = b * b - 4.0 * a * c;
    if discriminant <= 0.0 {
        return false;
    }

    let sqrt_d = discriminant.sqrt();
    let inv_2a = 1.0 / (2.0 * a);
    let t1 = (-b - sqrt_d) * inv_2a;
    if t1 > T_EPSILON {
        return t1 < t_max;
    }
    let t2 = (-b + sqrt_d) * inv_2a;
    t2 > T_EPSILON && t2 < t_max
}

// ─── Unit Square Plane ──────────────────────────────────────────────────────

/// The z = 0 square with |x|,|y| ≤ 1 and normal +z. Rays near-parallel to
/// the plane are misses, as are hits behind the origin or outside the
/// square.
fn plane_intersect(ray: &Ray) -> Option<LocalHit> {
    if ray.direction.z.abs() < 1e-6 {
        return None;
    }
    let t = -ray.origin.z / ray.direction.z;
    if t <= 0.0 {
        return None;
    }
    let point = ray.at(t);
    if point.x.abs() > 1.0 || point.y.abs() > 1.0 {
        return None;
    }
    Some(LocalHit {
        t,
        point,
        normal: Vec3::unit_z(),
        uvw: Vec3::new((point.x + 1.0) * 0.5, (point.y + 1.0) * 0.5, 1.0),
        front: ray.direction.z < 0.0,
    })
}

fn plane_occludes(ray: &Ray, t_max: f32) -> bool {
    if ray.direction.z.abs() < 1e-6 {
        return false;
    }
    let t = -ray.origin.z / ray.direction.z;
    if t <= T_EPSILON || t >= t_max {
        return false;
    }
    let p = ray.at(t);
    p.x.abs() <= 1.0 && p.y.abs() <= 1.0
}

// ─── Triangle Mesh ──────────────────────────────────────────────────────────

/// An indexed triangle mesh: vertex positions, per-face index triples for
/// positions, normals, and UVs, and a BVH over the faces. The shading
/// normal is the barycentric interpolation of the vertex normals,
/// renormalized; UVW interpolates the vertex UVs the same way.
pub struct Mesh {
    vertices: Vec<Point3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec3>,
    faces: Vec<[u32; 3]>,
    normal_faces: Vec<[u32; 3]>,
    uv_faces: Vec<[u32; 3]>,
    bvh: Bvh,
}

impl Mesh {
    /// Builds a mesh with smooth vertex normals (area-weighted face-normal
    /// accumulation) and degenerate UVs. Positions index all attributes.
    pub fn new(vertices: Vec<Point3>, faces: Vec<[u32; 3]>) -> Self {
        let mut normals = vec![Vec3::zero(); vertices.len()];
        for f in &faces {
            let e1 = vertices[f[1] as usize] - vertices[f[0] as usize];
            let e2 = vertices[f[2] as usize] - vertices[f[0] as usize];
            // Unnormalized cross weights by twice the face area.
            let fn_ = e1.cross(e2);
            for &vi in f {
                normals[vi as usize] += fn_;
            }
        }
        let normals = normals
            .into_iter()
            .map(|n| {
                if n.length_squared() > 1e-12 {
                    n.normalized()
                } else {
                    Vec3::unit_z()
                }
            })
            .collect();
        let uvs = vec![Vec3::new(0.0, 0.0, 1.0); vertices.len()];
        let normal_faces = faces.clone();
        let uv_faces = faces.clone();
        Self::with_attributes(vertices, faces, normals, normal_faces, uvs, uv_faces)
    }

    pub fn with_attributes(
        vertices: Vec<Point3>,
        faces: Vec<[u32; 3]>,
        normals: Vec<Vec3>,
        normal_faces: Vec<[u32; 3]>,
        uvs: Vec<Vec3>,
        uv_faces: Vec<[u32; 3]>,
    ) -> Self {
        debug_assert_eq!(faces.len(), normal_faces.len());
        debug_assert_eq!(faces.len(), uv_faces.len());
        let face_bounds: Vec<Aabb> = faces
            .iter()
            .map(|f| {
                let mut b = Aabb::empty();
                for &vi in f {
                    b.grow(vertices[vi as usize]);
                }
                // Pad so axis-aligned (flat) triangles keep a nonzero slab.
                b.min = b.min - Point3::splat(1e-4);
                b.max += Point3::splat(1e-4);
                b
            })
            .collect();
        let bvh = Bvh::build(&face_bounds);
        Self {
            vertices,
            normals,
            uvs,
            faces,
            normal_faces,
            uv_faces,
            bvh,
        }
    }

    #[allow(dead_code)]
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Möller–Trumbore against one face. Returns (t, u, v, det) for an
    /// accepted hit closer than `t_best`.
    fn intersect_face(
        &self,
        ray: &Ray,
        face_id: u32,
        side: HitSide,
        t_best: f32,
    ) -> Option<(f32, f32, f32, f32)> {
        let f = &self.faces[face_id as usize];
        let v0 = self.vertices[f[0] as usize];
        let v1 = self.vertices[f[1] as usize];
        let v2 = self.vertices[f[2] as usize];

        let e1 = v1 - v0;
        let e2 = v2 - v0;
        let p = ray.direction.cross(e2);
        let det = e1.dot(p);
        if det.abs() < T_EPSILON {
            return None;
        }
        match side {
            HitSide::Front if det < 0.0 => return None,
            HitSide::Back if det > 0.0 => return None,
            _ => {}
        }

        let inv_det = 1.0 / det;
        let s = ray.origin - v0;
        let u = inv_det * s.dot(p);
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = inv_det * ray.direction.dot(q);
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = inv_det * e2.dot(q);
        if t <= T_EPSILON || t > t_best {
            return None;
        }
        Some((t, u, v, det))
    }

    /// Stack-based BVH descent keyed on box entry distance. Entries whose
    /// recorded entry t is no longer below the best hit are stale and
    /// skipped; the nearer child is pushed last so it is visited first.
    fn intersect(&self, ray: &Ray, side: HitSide) -> Option<LocalHit> {
        let mut t_best = f32::INFINITY;
        let mut stack: Vec<(u32, f32)> = Vec::with_capacity(32);
        {
            let root = self.bvh.root();
            let entry = self.bvh.node(root).bounds.hit(ray, t_best)?;
            stack.push((root, entry));
        }

        let mut best: Option<(f32, f32, f32, f32, u32)> = None;
        while let Some((id, entry_t)) = stack.pop() {
            if entry_t >= t_best {
                continue;
            }
            match self.bvh.node(id).kind {
                BvhNodeKind::Leaf { start, count } => {
                    for &face_id in self.bvh.leaf_faces(start, count) {
                        if let Some((t, u, v, det)) =
                            self.intersect_face(ray, face_id, side, t_best)
                        {
                            t_best = t;
                            best = Some((t, u, v, det, face_id));
                        }
                    }
                }
                BvhNodeKind::Interior { left, right } => {
                    let hit_l = self.bvh.node(left).bounds.hit(ray, t_best);
                    let hit_r = self.bvh.node(right).bounds.hit(ray, t_best);
                    match (hit_l, hit_r) {
                        (Some(tl), Some(tr)) => {
                            if tl < tr {
                                stack.push((right, tr));
                                stack.push((left, tl));
                            } else {
                                stack.push((left, tl));
                                stack.push((right, tr));
                            }
                        }
                        (Some(tl), None) => stack.push((left, tl)),
                        (None, Some(tr)) => stack.push((right, tr)),
                        (None, None) => {}
                    }
                }
            }
        }

        let (t, u, v, det, face_id) = best?;
        let nf = &self.normal_faces[face_id as usize];
        let tf = &self.uv_faces[face_id as usize];
        let w = 1.0 - u - v;
        let normal = (self.normals[nf[0] as usize] * w
            + self.normals[nf[1] as usize] * u
            + self.normals[nf[2] as usize] * v)
            .normalized();
        let uvw = self.uvs[tf[0] as usize] * w
            + self.uvs[tf[1] as usize] * u
            + self.uvs[tf[2] as usize] * v;
        Some(LocalHit {
            t,
            point: ray.at(t),
            normal,
            uvw,
            front: det > 0.0,
        })
    }

    /// Occlusion descent: no best-t tightening, first accepted triangle
    /// wins.
    fn occludes(&self, ray: &Ray, t_max: f32) -> bool {
        let mut stack: Vec<u32> = Vec::with_capacity(32);
        if self.bvh.node(self.bvh.root()).bounds.hit(ray, t_max).is_none() {
            return false;
        }
        stack.push(self.bvh.root());

        while let Some(id) = stack.pop() {
            match self.bvh.node(id).kind {
                BvhNodeKind::Leaf { start, count } => {
                    for &face_id in self.bvh.leaf_faces(start, count) {
                        if let Some((t, ..)) =
                            self.intersect_face(ray, face_id, HitSide::FrontAndBack, f32::INFINITY)
                        {
                            if t < t_max {
                                return true;
                            }
                        }
                    }
                }
                BvhNodeKind::Interior { left, right } => {
                    if self.bvh.node(left).bounds.hit(ray, t_max).is_some() {
                        stack.push(left);
                    }
                    if self.bvh.node(right).bounds.hit(ray, t_max).is_some() {
                        stack.push(right);
                    }
                }
            }
        }
        false
    }
}
