use crate::camera::Camera;
use crate::geometry::{Mesh, Shape};
use crate::light::Light;
use crate::material::{Material, TexturedColor};
use crate::math::{Color, Mat3, Point3, Transform, Vec3};
use crate::scene::{Environment, Node, Scene, Texture};
use std::f32::consts::FRAC_PI_2;

/// Built-in scenes standing in for an external scene loader. Each builds a
/// complete immutable `Scene` in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenePreset {
    /// Three spheres (diffuse, mirror, glass) over a checkered floor.
    Showcase,
    /// An enclosed diffuse box with a spherical light overhead.
    Cornell,
    /// A glass sphere in front of a white wall, lit from above.
    Glass,
    /// Nested transforms: a scaled parent with a translated sphere child.
    Nested,
    /// Two triangles sharing an edge, lit head-on.
    Triangles,
}

impl ScenePreset {
    pub fn name(&self) -> &'static str {
        match self {
            ScenePreset::Showcase => "showcase",
            ScenePreset::Cornell => "cornell",
            ScenePreset::Glass => "glass",
            ScenePreset::Nested => "nested",
            ScenePreset::Triangles => "triangles",
        }
    }

    pub fn build(&self) -> Scene {
        match self {
            ScenePreset::Showcase => showcase(),
            ScenePreset::Cornell => cornell(),
            ScenePreset::Glass => glass(),
            ScenePreset::Nested => nested(),
            ScenePreset::Triangles => triangles(),
        }
    }
}

/// A floor from the unit square: rotated to face +y, scaled out.
fn floor_node(size: f32, material: usize) -> Node {
    Node::new(Transform::new(
        Mat3::rotation_x(-FRAC_PI_2) * Mat3::uniform_scale(size),
        Vec3::zero(),
    ))
    .with_shape(Shape::Plane, material)
}

fn diffuse(color: Color) -> Material {
    Material {
        diffuse: TexturedColor::constant(color),
        specular: Color::zero(),
        reflection: Color::zero(),
        refraction: Color::zero(),
        ..Material::default()
    }
}

fn showcase() -> Scene {
    let materials = vec![
        // 0: checkered floor
        Material {
            diffuse: TexturedColor::textured(Color::splat(0.9), 0),
            specular: Color::splat(0.1),
            glossiness: 50.0,
            reflection: Color::zero(),
            refraction: Color::zero(),
            ..Material::default()
        },
        // 1: matte red
        diffuse(Color::new(0.75, 0.15, 0.12)),
        // 2: glossy mirror
        Material {
            diffuse: TexturedColor::constant(Color::splat(0.05)),
            specular: Color::splat(0.8),
            glossiness: 600.0,
            reflection: Color::splat(0.85),
            refraction: Color::zero(),
            ..Material::default()
        },
        // 3: glass with a green tint inside
        Material {
            diffuse: TexturedColor::constant(Color::zero()),
            specular: Color::splat(0.1),
            glossiness: 400.0,
            reflection: Color::zero(),
            refraction: Color::ones(),
            absorption: Color::new(0.12, 0.02, 0.12),
            ior: 1.5,
            ..Material::default()
        },
    ];
    let textures = vec![Texture::Checker {
        a: Color::splat(0.85),
        b: Color::splat(0.25),
        scale: 20.0,
    }];

    let root = Node::new(Transform::identity())
        .add_child(floor_node(12.0, 0))
        .add_child(
            Node::new(Transform::translation(Vec3::new(-2.4, 1.0, 0.0)))
                .with_shape(Shape::Sphere, 1),
        )
        .add_child(
            Node::new(Transform::translation(Vec3::new(0.0, 1.0, -0.6)))
                .with_shape(Shape::Sphere, 2),
        )
        .add_child(
            Node::new(Transform::translation(Vec3::new(2.4, 1.0, 0.6)))
                .with_shape(Shape::Sphere, 3),
        );

    Scene {
        root,
        lights: vec![
            Light::Point {
                intensity: Color::splat(80.0),
                position: Point3::new(2.0, 7.0, 4.0),
                size: 0.5,
            },
            Light::Ambient {
                intensity: Color::splat(0.03),
            },
        ],
        environment: Environment::Gradient {
            horizon: Color::new(0.55, 0.65, 0.8),
            zenith: Color::new(0.12, 0.2, 0.45),
        },
        camera: Camera {
            position: Point3::new(0.0, 2.4, 9.0),
            direction: Vec3::new(0.0, -0.16, -1.0),
            up: Vec3::unit_y(),
            fov_degrees: 40.0,
            focal_dist: 9.0,
            dof: 0.06,
            width: 640,
            height: 480,
        },
        materials,
        textures,
    }
}

fn cornell() -> Scene {
    let materials = vec![
        diffuse(Color::splat(0.75)),           // 0: white
        diffuse(Color::new(0.65, 0.08, 0.08)), // 1: red
        diffuse(Color::new(0.1, 0.55, 0.12)),  // 2: green
    ];

    let half = 3.0;
    // The unit square faces +z; orient each wall so its normal points
    // into the box interior.
    let floor = floor_node(half, 0);
    let ceiling = Node::new(Transform::new(
        Mat3::rotation_x(FRAC_PI_2) * Mat3::uniform_scale(half),
        Vec3::new(0.0, 2.0 * half, 0.0),
    ))
    .with_shape(Shape::Plane, 0);
    let back = Node::new(Transform::new(
        Mat3::uniform_scale(half),
        Vec3::new(0.0, half, -half),
    ))
    .with_shape(Shape::Plane, 0);
    let left = Node::new(Transform::new(
        Mat3::rotation_y(FRAC_PI_2) * Mat3::uniform_scale(half),
        Vec3::new(-half, half, 0.0),
    ))
    .with_shape(Shape::Plane, 1);
    let right = Node::new(Transform::new(
        Mat3::rotation_y(-FRAC_PI_2) * Mat3::uniform_scale(half),
        Vec3::new(half, half, 0.0),
    ))
    .with_shape(Shape::Plane, 2);

    let ball_a = Node::new(Transform::translation(Vec3::new(-1.1, 1.0, -0.8)))
        .with_shape(Shape::Sphere, 0);
    let ball_b = Node::new(Transform::new(
        Mat3::uniform_scale(0.7),
        Vec3::new(1.2, 0.7, 0.6),
    ))
    .with_shape(Shape::Sphere, 0);

    Scene {
        root: Node::new(Transform::identity())
            .add_child(floor)
            .add_child(ceiling)
            .add_child(back)
            .add_child(left)
            .add_child(right)
            .add_child(ball_a)
            .add_child(ball_b),
        lights: vec![Light::Point {
            intensity: Color::splat(40.0),
            position: Point3::new(0.0, 5.4, 0.0),
            size: 0.6,
        }],
        environment: Environment::Solid(Color::zero()),
        camera: Camera {
            position: Point3::new(0.0, 3.0, 10.5),
            direction: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::unit_y(),
            fov_degrees: 38.0,
            focal_dist: 10.5,
            dof: 0.0,
            width: 512,
            height: 512,
        },
        materials,
        textures: Vec::new(),
    }
}

fn glass() -> Scene {
    let materials = vec![
        Material {
            diffuse: TexturedColor::constant(Color::zero()),
            specular: Color::zero(),
            reflection: Color::zero(),
            refraction: Color::ones(),
            ior: 1.5,
            ..Material::default()
        },
        diffuse(Color::splat(0.8)),
    ];

    let sphere = Node::new(Transform::identity()).with_shape(Shape::Sphere, 0);
    let wall = Node::new(Transform::new(
        Mat3::uniform_scale(6.0),
        Vec3::new(0.0, 0.0, -3.0),
    ))
    .with_shape(Shape::Plane, 1);

    Scene {
        root: Node::new(Transform::identity()).add_child(sphere).add_child(wall),
        lights: vec![Light::Point {
            intensity: Color::splat(30.0),
            position: Point3::new(0.0, 2.0, 0.0),
            size: 0.0,
        }],
        environment: Environment::Solid(Color::splat(0.02)),
        camera: Camera {
            position: Point3::new(0.0, 0.0, 5.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::unit_y(),
            fov_degrees: 45.0,
            focal_dist: 5.0,
            dof: 0.0,
            width: 512,
            height: 512,
        },
        materials,
        textures: Vec::new(),
    }
}

fn nested() -> Scene {
    let child = Node::new(Transform::translation(Vec3::new(1.0, 0.0, 0.0)))
        .with_shape(Shape::Sphere, 0);
    let parent =
        Node::new(Transform::new(Mat3::uniform_scale(2.0), Vec3::zero())).add_child(child);

    Scene {
        root: Node::new(Transform::identity()).add_child(parent),
        lights: vec![Light::Directional {
            intensity: Color::splat(0.9),
            direction: Vec3::new(-1.0, -0.3, 0.0).normalized(),
        }],
        environment: Environment::Solid(Color::splat(0.05)),
        camera: Camera {
            position: Point3::new(5.0, 0.0, 0.0),
            direction: Vec3::new(-1.0, 0.0, 0.0),
            up: Vec3::unit_y(),
            fov_degrees: 60.0,
            focal_dist: 5.0,
            dof: 0.0,
            width: 400,
            height: 300,
        },
        materials: vec![diffuse(Color::new(0.2, 0.4, 0.8))],
        textures: Vec::new(),
    }
}

fn triangles() -> Scene {
    let mesh = Mesh::new(
        vec![
            Point3::new(-1.0, -1.0, 0.0),
            Point3::new(1.0, -1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(-1.0, 1.0, 0.0),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    );
    let quad = Node::new(Transform::identity()).with_shape(Shape::Mesh(mesh), 0);

    Scene {
        root: Node::new(Transform::identity()).add_child(quad),
        lights: vec![Light::Directional {
            intensity: Color::ones(),
            direction: Vec3::new(0.0, 0.0, -1.0),
        }],
        environment: Environment::Solid(Color::splat(0.1)),
        camera: Camera {
            position: Point3::new(0.0, 0.0, 4.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::unit_y(),
            fov_degrees: 45.0,
            focal_dist: 4.0,
            dof: 0.0,
            width: 400,
            height: 400,
        },
        materials: vec![diffuse(Color::new(0.7, 0.6, 0.2))],
        textures: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Ray;

    #[test]
    fn every_preset_builds_a_consistent_scene() {
        for preset in [
            ScenePreset::Showcase,
            ScenePreset::Cornell,
            ScenePreset::Glass,
            ScenePreset::Nested,
            ScenePreset::Triangles,
        ] {
            let scene = preset.build();
            assert!(!scene.lights.is_empty(), "{}: no lights", preset.name());
            assert!(!scene.materials.is_empty(), "{}: no materials", preset.name());
            // A ray through the image center must reach some geometry.
            let dir = scene.camera.direction.normalized();
            let ray = Ray::new(scene.camera.position, dir);
            assert!(
                scene.trace(&ray).is_some(),
                "{}: center ray hits nothing",
                preset.name()
            );
        }
    }

    #[test]
    fn cornell_walls_enclose_the_light() {
        let scene = ScenePreset::Cornell.build();
        // Straight up from the floor center: the shadow query must see the
        // ceiling before the ray escapes.
        let up = Ray::new(Point3::new(0.0, 0.1, 0.0), Vec3::unit_y());
        assert!(scene.occluded(&up, 100.0));
    }
}
