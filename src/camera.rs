use crate::math::{Mat3, Point3, Ray, Vec3};

/// The camera description as the scene loader provides it: position, view
/// direction, up hint, vertical field of view, focal distance, lens radius
/// for depth of field, and the output resolution.
pub struct Camera {
    pub position: Point3,
    pub direction: Vec3,
    pub up: Vec3,
    pub fov_degrees: f32,
    pub focal_dist: f32,
    /// Lens disk radius; zero disables depth of field.
    pub dof: f32,
    pub width: u32,
    pub height: u32,
}

/// The derived right-handed world-from-camera basis and image-plane
/// extents, built once per render. The camera looks down −z of its own
/// frame; the image plane sits at the focal distance so lens samples pivot
/// around points in perfect focus.
pub struct CameraFrame {
    cam_to_world: Mat3,
    half_width: f32,
    half_height: f32,
    pixel_size: f32,
}

impl CameraFrame {
    pub fn new(camera: &Camera) -> Self {
        let z = (-camera.direction).normalized();
        let x = camera.up.cross(z).normalized();
        let y = z.cross(x);
        let cam_to_world = Mat3::from_cols(x, y, z);

        let half_height = camera.focal_dist * (camera.fov_degrees.to_radians() / 2.0).tan();
        let aspect = camera.width as f32 / camera.height as f32;
        let half_width = aspect * half_height;
        let pixel_size = half_width * 2.0 / camera.width as f32;

        Self {
            cam_to_world,
            half_width,
            half_height,
            pixel_size,
        }
    }

    /// Emits the primary ray through continuous pixel coordinates
    /// (px, py) — integer pixel plus sub-pixel jitter — with the lens
    /// sample given as polar disk coordinates. The returned direction is
    /// deliberately unnormalized (destination minus lens origin);
    /// normalize it when `t` must equal world distance.
    pub fn primary_ray(&self, camera: &Camera, px: f32, py: f32, lens: (f32, f32)) -> Ray {
        let space_x = -self.half_width + self.pixel_size * px;
        let space_y = self.half_height - self.pixel_size * py;
        let destination = camera.position
            + self.cam_to_world * Vec3::new(space_x, space_y, -camera.focal_dist);

        let (theta, radius) = lens;
        let lens_offset = self.cam_to_world
            * Vec3::new(
                radius * camera.dof * theta.cos(),
                radius * camera.dof * theta.sin(),
                0.0,
            );
        let origin = camera.position + lens_offset;
        Ray::new(origin, destination - origin)
    }

    /// The jitter-free ray through a pixel center with a unit-length
    /// direction, used for the depth buffer where `t` is world distance.
    pub fn center_ray(&self, camera: &Camera, x: u32, y: u32) -> Ray {
        let ray = self.primary_ray(camera, x as f32 + 0.5, y as f32 + 0.5, (0.0, 0.0));
        Ray::new(ray.origin, ray.direction.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera {
            position: Point3::new(0.0, 1.0, 5.0),
            direction: Vec3::new(0.0, 0.0, -1.0),
            up: Vec3::unit_y(),
            fov_degrees: 60.0,
            focal_dist: 4.0,
            dof: 0.0,
            width: 200,
            height: 100,
        }
    }

    #[test]
    fn center_ray_follows_the_view_direction() {
        let cam = camera();
        let frame = CameraFrame::new(&cam);
        let ray = frame.center_ray(&cam, 99, 49);
        assert_eq!(ray.origin, cam.position);
        // Half a pixel off exact center; direction is almost −z.
        assert!(ray.direction.z < -0.999);
        assert!((ray.direction.length() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn image_plane_sits_at_the_focal_distance() {
        let cam = camera();
        let frame = CameraFrame::new(&cam);
        let ray = frame.primary_ray(&cam, 100.0, 50.0, (0.0, 0.0));
        // Unnormalized direction reaches the plane at t = 1.
        let dest = ray.at(1.0);
        let depth = (dest - cam.position).dot(Vec3::new(0.0, 0.0, -1.0));
        assert!((depth - cam.focal_dist).abs() < 1e-3);
    }

    #[test]
    fn corner_rays_span_the_field_of_view() {
        let cam = camera();
        let frame = CameraFrame::new(&cam);
        let top = frame.primary_ray(&cam, 100.0, 0.0, (0.0, 0.0));
        let bottom = frame.primary_ray(&cam, 100.0, 100.0, (0.0, 0.0));
        let cos = top.direction.normalized().dot(bottom.direction.normalized());
        let angle = cos.acos().to_degrees();
        assert!((angle - cam.fov_degrees).abs() < 0.5);
    }

    #[test]
    fn lens_samples_pivot_around_the_focal_point() {
        let mut cam = camera();
        cam.dof = 0.25;
        let frame = CameraFrame::new(&cam);
        let a = frame.primary_ray(&cam, 80.0, 30.0, (0.0, 1.0));
        let b = frame.primary_ray(&cam, 80.0, 30.0, (2.0, 1.0));
        assert!((a.origin - b.origin).length() > 1e-3);
        // Both rays converge on the same in-focus destination.
        assert!((a.at(1.0) - b.at(1.0)).length() < 1e-3);
    }
}
