use crate::camera::Camera;
use crate::geometry::{HitSide, Shape};
use crate::light::Light;
use crate::material::Material;
use crate::math::{Color, Point3, Ray, Transform, Vec3};

/// Index of a material in the scene's flat material array. Materials and
/// textures are shared immutable resources; nodes and hit records address
/// them by handle rather than by reference.
pub type MaterialHandle = usize;
pub type TextureHandle = usize;

// ─── Hit Record ─────────────────────────────────────────────────────────────

/// A world-frame intersection as returned by the scene intersector. `t` is
/// the parameter along the query ray (world distance for unit-length
/// primary directions); `light` is set when the surface belongs to a
/// renderable light rather than scene geometry.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f32,
    pub point: Point3,
    pub normal: Vec3,
    pub uvw: Vec3,
    pub front: bool,
    pub material: MaterialHandle,
    pub light: Option<usize>,
}

// ─── Scene Graph ────────────────────────────────────────────────────────────

/// A scene-graph node: an affine transform, an optional shape with its
/// material, and exclusively owned children. Transforms compose
/// multiplicatively root→leaf and are never edited during a render.
pub struct Node {
    pub transform: Transform,
    pub shape: Option<Shape>,
    pub material: Option<MaterialHandle>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(transform: Transform) -> Self {
        Self {
            transform,
            shape: None,
            material: None,
            children: Vec::new(),
        }
    }

    pub fn with_shape(mut self, shape: Shape, material: MaterialHandle) -> Self {
        self.shape = Some(shape);
        self.material = Some(material);
        self
    }

    pub fn add_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }
}

// ─── Textures & Environment ─────────────────────────────────────────────────

/// Texture variants evaluated from the hit record's UVW triple
/// (components in [0,1] for 2D lookups, w = 1).
pub enum Texture {
    Constant(Color),
    Checker { a: Color, b: Color, scale: f32 },
}

impl Texture {
    pub fn eval(&self, uvw: Vec3) -> Color {
        match self {
            Texture::Constant(c) => *c,
            Texture::Checker { a, b, scale } => {
                let iu = (uvw.x * scale).floor() as i64;
                let iv = (uvw.y * scale).floor() as i64;
                if (iu + iv) % 2 == 0 {
                    *a
                } else {
                    *b
                }
            }
        }
    }
}

/// The background seen by rays that escape the scene.
pub enum Environment {
    Solid(Color),
    /// Vertical gradient blended on the direction's y component.
    Gradient { horizon: Color, zenith: Color },
}

impl Environment {
    pub fn eval(&self, dir: Vec3) -> Color {
        match self {
            Environment::Solid(c) => *c,
            Environment::Gradient { horizon, zenith } => {
                let t = 0.5 * (dir.normalized().y + 1.0);
                horizon.lerp(*zenith, t)
            }
        }
    }
}

// ─── Scene ──────────────────────────────────────────────────────────────────

/// Everything a render reads: the node tree, lights, background, camera,
/// and the shared material/texture pools. Immutable for the duration of a
/// render; workers take it by shared reference.
pub struct Scene {
    pub root: Node,
    pub lights: Vec<Light>,
    pub environment: Environment,
    pub camera: Camera,
    pub materials: Vec<Material>,
    pub textures: Vec<Texture>,
}

impl Scene {
    /// Casts a ray through the scene graph and the renderable lights,
    /// returning the closest hit. Both surface sides are accepted so the
    /// interiors of glass objects are found.
    pub fn trace(&self, ray: &Ray) -> Option<Hit> {
        let mut best = self.trace_node(&self.root, ray, HitSide::FrontAndBack);

        // Light sweep: renderable emitters are visible to camera and
        // secondary rays as bright disks.
        for (i, light) in self.lights.iter().enumerate() {
            if !light.is_renderable() {
                continue;
            }
            if let Some(lh) = light.intersect(ray) {
                if best.as_ref().map_or(true, |b| lh.t < b.t) {
                    best = Some(Hit {
                        t: lh.t,
                        point: lh.point,
                        normal: lh.normal,
                        uvw: lh.uvw,
                        front: lh.front,
                        material: 0,
                        light: Some(i),
                    });
                }
            }
        }
        best
    }

    /// Recursive descent: the ray is re-expressed in each node's local
    /// frame (direction magnitude preserved, so `t` stays comparable
    /// across frames), the node's own shape and every child compete on
    /// `t`, and the winning point/normal are lifted back one frame per
    /// return.
    fn trace_node(&self, node: &Node, ray: &Ray, side: HitSide) -> Option<Hit> {
        let local = node.transform.ray_to_local(ray);

        let mut best: Option<Hit> = None;
        if let Some(shape) = &node.shape {
            // Slab reject against the shape's local box before the exact
            // test; meshes additionally prune through their BVH.
            let pruned = shape.bounds().hit(&local, f32::INFINITY).is_none();
            if !pruned {
                if let Some(h) = shape.intersect(&local, side) {
                    best = Some(Hit {
                        t: h.t,
                        point: node.transform.point_from_local(h.point),
                        normal: node.transform.normal_from_local(h.normal),
                        uvw: h.uvw,
                        front: h.front,
                        material: node.material.unwrap_or(0),
                        light: None,
                    });
                }
            }
        }

        for child in &node.children {
            if let Some(ch) = self.trace_node(child, &local, side) {
                if best.as_ref().map_or(true, |b| ch.t < b.t) {
                    best = Some(Hit {
                        point: node.transform.point_from_local(ch.point),
                        normal: node.transform.normal_from_local(ch.normal),
                        ..ch
                    });
                }
            }
        }
        best
    }

    /// Shadow query: true when any surface lies strictly inside
    /// (ε, t_max) along the ray. Lights do not occlude.
    pub fn occluded(&self, ray: &Ray, t_max: f32) -> bool {
        self.occluded_node(&self.root, ray, t_max)
    }

    fn occluded_node(&self, node: &Node, ray: &Ray, t_max: f32) -> bool {
        let local = node.transform.ray_to_local(ray);
        if let Some(shape) = &node.shape {
            if shape.bounds().hit(&local, t_max).is_some() && shape.occludes(&local, t_max) {
                return true;
            }
        }
        node.children
            .iter()
            .any(|child| self.occluded_node(child, &local, t_max))
    }

    pub fn material(&self, handle: MaterialHandle) -> &Material {
        &self.materials[handle]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::math::Mat3;

    const EPS: f32 = 1e-4;

    fn test_camera() -> Camera {
        Camera {
            position: Point3::new(5.0, 0.0, 0.0),
            direction: Vec3::new(-1.0, 0.0, 0.0),
            up: Vec3::unit_y(),
            fov_degrees: 40.0,
            focal_dist: 5.0,
            dof: 0.0,
            width: 8,
            height: 8,
        }
    }

    /// Parent scales uniformly by 2; its child holds a unit sphere
    /// translated by (1,0,0). World-space result: center (2,0,0), radius 2.
    fn nested_scene() -> Scene {
        let child = Node::new(Transform::translation(Vec3::new(1.0, 0.0, 0.0)))
            .with_shape(Shape::Sphere, 0);
        let parent = Node::new(Transform::new(Mat3::uniform_scale(2.0), Vec3::zero()))
            .add_child(child);
        let root = Node::new(Transform::identity()).add_child(parent);
        Scene {
            root,
            lights: Vec::new(),
            environment: Environment::Solid(Color::zero()),
            camera: test_camera(),
            materials: vec![Material::default()],
            textures: Vec::new(),
        }
    }

    #[test]
    fn nested_transforms_compose_root_to_leaf() {
        let scene = nested_scene();
        let ray = Ray::new(Point3::new(5.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        let hit = scene.trace(&ray).unwrap();

        assert!(hit.front);
        // World sphere: center (2,0,0), radius 2 — entry surface at x = 4.
        assert!((hit.point - Point3::new(4.0, 0.0, 0.0)).length() <= EPS);
        let center_dist = (hit.point - Point3::new(2.0, 0.0, 0.0)).length();
        assert!((center_dist - 2.0).abs() <= EPS);
        // For a unit-length primary direction, t is the world distance.
        assert!((hit.t - (hit.point - ray.origin).length()).abs() <= EPS);
        let n = hit.normal.normalized();
        assert!(n.dot(ray.direction) <= 0.0);
    }

    #[test]
    fn off_axis_ray_hit_stays_on_scaled_sphere() {
        let scene = nested_scene();
        let dir = (Point3::new(2.0, 1.2, 0.9) - Point3::new(5.0, 0.0, 0.0)).normalized();
        let ray = Ray::new(Point3::new(5.0, 0.0, 0.0), dir);
        let hit = scene.trace(&ray).unwrap();
        let center_dist = (hit.point - Point3::new(2.0, 0.0, 0.0)).length();
        assert!((center_dist - 2.0).abs() <= 1e-3);
        assert!((hit.t - (hit.point - ray.origin).length()).abs() <= 1e-3);
    }

    #[test]
    fn closest_of_two_siblings_wins() {
        let near = Node::new(Transform::translation(Vec3::new(0.0, 0.0, 2.0)))
            .with_shape(Shape::Sphere, 0);
        let far = Node::new(Transform::translation(Vec3::new(0.0, 0.0, -4.0)))
            .with_shape(Shape::Sphere, 1);
        let root = Node::new(Transform::identity()).add_child(far).add_child(near);
        let scene = Scene {
            root,
            lights: Vec::new(),
            environment: Environment::Solid(Color::zero()),
            camera: test_camera(),
            materials: vec![Material::default(), Material::default()],
            textures: Vec::new(),
        };
        let ray = Ray::new(Point3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = scene.trace(&ray).unwrap();
        assert_eq!(hit.material, 0);
        assert!((hit.t - 7.0).abs() <= EPS);
    }

    #[test]
    fn shadow_query_respects_transforms() {
        let scene = nested_scene();
        let ray = Ray::new(Point3::new(5.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        assert!(scene.occluded(&ray, 10.0));
        // The sphere entry sits at t = 1; anything closer is unoccluded.
        assert!(!scene.occluded(&ray, 0.5));
    }

    #[test]
    fn renderable_light_wins_when_closer() {
        let geometry = Node::new(Transform::translation(Vec3::new(0.0, 0.0, -8.0)))
            .with_shape(Shape::Sphere, 0);
        let root = Node::new(Transform::identity()).add_child(geometry);
        let scene = Scene {
            root,
            lights: vec![Light::Point {
                intensity: Color::splat(5.0),
                position: Point3::new(0.0, 0.0, -3.0),
                size: 0.5,
            }],
            environment: Environment::Solid(Color::zero()),
            camera: test_camera(),
            materials: vec![Material::default()],
            textures: Vec::new(),
        };
        let ray = Ray::new(Point3::zero(), Vec3::new(0.0, 0.0, -1.0));
        let hit = scene.trace(&ray).unwrap();
        assert_eq!(hit.light, Some(0));
        assert!((hit.t - 2.5).abs() <= EPS);
    }

    #[test]
    fn checker_texture_alternates() {
        let tex = Texture::Checker {
            a: Color::ones(),
            b: Color::zero(),
            scale: 4.0,
        };
        let a = tex.eval(Vec3::new(0.1, 0.1, 1.0));
        let b = tex.eval(Vec3::new(0.35, 0.1, 1.0));
        assert_ne!(a, b);
    }
}
