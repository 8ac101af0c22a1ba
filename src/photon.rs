use crate::math::{Color, Point3, Ray, Vec3};
use crate::scene::Scene;
use rand::rngs::SmallRng;
use std::f32::consts::PI;

/// One stored photon: where it landed, the direction it arrived from, and
/// the flux it carried.
#[derive(Debug, Clone, Copy)]
pub struct Photon {
    pub position: Point3,
    /// Incident direction at the deposit, kept for estimators that weight
    /// by the surface cosine.
    #[allow(dead_code)]
    pub direction: Vec3,
    pub power: Color,
}

/// A fixed-capacity photon store. Emission appends until the capacity is
/// reached (`add_photon` returns false and the emitter loop winds down);
/// a one-shot `prepare` builds a balanced kd-tree for k-nearest-neighbor
/// irradiance estimation. The map never feeds the pixel estimate directly.
pub struct PhotonMap {
    photons: Vec<Photon>,
    capacity: usize,
    tree: Vec<KdNode>,
    prepared: bool,
}

struct KdNode {
    photon: u32,
    axis: usize,
    left: Option<u32>,
    right: Option<u32>,
}

impl PhotonMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            photons: Vec::with_capacity(capacity),
            capacity,
            tree: Vec::new(),
            prepared: false,
        }
    }

    pub fn len(&self) -> usize {
        self.photons.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.photons.is_empty()
    }

    /// Appends a photon; false signals the map is full and the emission
    /// loop should stop.
    pub fn add_photon(&mut self, position: Point3, direction: Vec3, power: Color) -> bool {
        if self.photons.len() >= self.capacity {
            return false;
        }
        debug_assert!(!self.prepared, "photon added after prepare()");
        self.photons.push(Photon {
            position,
            direction,
            power,
        });
        true
    }

    /// Rescales every stored flux, typically by 1/emitted-count once
    /// emission finishes.
    pub fn scale_powers(&mut self, factor: f32) {
        for p in &mut self.photons {
            p.power *= factor;
        }
    }

    /// Builds the kd-tree (median split on the widest axis). Call once,
    /// after emission and before any irradiance queries.
    pub fn prepare(&mut self) {
        self.tree.clear();
        if self.photons.is_empty() {
            self.prepared = true;
            return;
        }
        let mut order: Vec<u32> = (0..self.photons.len() as u32).collect();
        let root = self.build_node(&mut order);
        debug_assert_eq!(root, Some(0));
        self.prepared = true;
        log::info!("photon map prepared: {} photons", self.photons.len());
    }

    fn build_node(&mut self, order: &mut [u32]) -> Option<u32> {
        if order.is_empty() {
            return None;
        }
        let mut lo = Point3::splat(f32::INFINITY);
        let mut hi = Point3::splat(f32::NEG_INFINITY);
        for &i in order.iter() {
            let p = self.photons[i as usize].position;
            lo = Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z));
            hi = Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z));
        }
        let extent = hi - lo;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        let mid = order.len() / 2;
        order.select_nth_unstable_by(mid, |&a, &b| {
            let pa = self.photons[a as usize].position[axis];
            let pb = self.photons[b as usize].position[axis];
            pa.partial_cmp(&pb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let id = self.tree.len() as u32;
        self.tree.push(KdNode {
            photon: order[mid],
            axis,
            left: None,
            right: None,
        });
        // Split the slice around the median; the borrow of `order` ends
        // before each recursive call.
        let (left_slice, rest) = order.split_at_mut(mid);
        let (_, right_slice) = rest.split_at_mut(1);
        let left = self.build_node(left_slice);
        let right = self.build_node(right_slice);
        self.tree[id as usize].left = left;
        self.tree[id as usize].right = right;
        Some(id)
    }

    /// Estimated irradiance at `p`: the k nearest photons within
    /// `max_radius`, their flux summed over the gather-disk area π·r².
    #[allow(dead_code)]
    pub fn estimate_irradiance(&self, p: Point3, k: usize, max_radius: f32) -> Color {
        debug_assert!(self.prepared, "irradiance query before prepare()");
        if self.tree.is_empty() || k == 0 {
            return Color::zero();
        }

        // (distance², photon index), kept sorted with the farthest last.
        let mut nearest: Vec<(f32, u32)> = Vec::with_capacity(k + 1);
        let mut max_d2 = max_radius * max_radius;
        self.gather(0, p, k, &mut max_d2, &mut nearest);

        if nearest.is_empty() {
            return Color::zero();
        }
        let radius2 = nearest.last().map(|&(d2, _)| d2).unwrap_or(max_d2);
        if radius2 <= 0.0 {
            return Color::zero();
        }
        let mut flux = Color::zero();
        for &(_, i) in &nearest {
            flux += self.photons[i as usize].power;
        }
        flux / (PI * radius2)
    }

    fn gather(
        &self,
        node: u32,
        p: Point3,
        k: usize,
        max_d2: &mut f32,
        nearest: &mut Vec<(f32, u32)>,
    ) {
        let n = &self.tree[node as usize];
        let photon = &self.photons[n.photon as usize];

        let d2 = (photon.position - p).length_squared();
        if d2 < *max_d2 {
            let at = nearest.partition_point(|&(nd2, _)| nd2 < d2);
            nearest.insert(at, (d2, n.photon));
            if nearest.len() > k {
                nearest.pop();
                // Shrink the search sphere to the current kth distance.
                *max_d2 = nearest.last().map(|&(nd2, _)| nd2).unwrap_or(*max_d2);
            }
        }

        let split = photon.position[n.axis];
        let delta = p[n.axis] - split;
        let (near, far) = if delta < 0.0 {
            (n.left, n.right)
        } else {
            (n.right, n.left)
        };
        if let Some(near) = near {
            self.gather(near, p, k, max_d2, nearest);
        }
        if let Some(far) = far {
            if delta * delta < *max_d2 {
                self.gather(far, p, k, max_d2, nearest);
            }
        }
    }
}

// ─── Photon Emission Pass ───────────────────────────────────────────────────

/// Traces photons from the scene's first photon-source light until the map
/// fills or `max_emissions` photons have left the light. Each photon walks
/// the scene through the material sampler, depositing at every diffuse
/// surface it touches; fluxes are normalized by the emission count at the
/// end and the kd-tree is built.
pub fn emit_photons(
    scene: &Scene,
    map: &mut PhotonMap,
    max_emissions: u64,
    rng: &mut SmallRng,
) -> u64 {
    let Some(light) = scene.lights.iter().find(|l| l.is_photon_source()) else {
        log::warn!("photon pass requested but no photon-source light in scene");
        return 0;
    };

    let mut emitted = 0u64;
    'emission: while emitted < max_emissions {
        let Some((mut ray, mut power)) = light.random_photon(rng) else {
            break;
        };
        emitted += 1;

        loop {
            ray.origin += ray.direction * 2e-4;
            let Some(hit) = scene.trace(&ray) else {
                break;
            };
            if hit.light.is_some() {
                break;
            }

            let material = scene.material(hit.material);
            if material.is_photon_surface()
                && !map.add_photon(hit.point, ray.direction, power)
            {
                break 'emission;
            }

            let n = hit.normal.normalized();
            let view = -ray.direction.normalized();
            let Some((dir, info)) = material.generate_sample(n, view, hit.front, rng) else {
                break;
            };
            if info.pdf <= 0.0 {
                break;
            }
            ray = Ray::new(hit.point, dir);
            power = power.hadamard(info.mult / info.pdf);
        }
    }

    if emitted > 0 {
        map.scale_powers(1.0 / emitted as f32);
    }
    map.prepare();
    log::info!("photon pass: {emitted} emissions, {} stored", map.len());
    emitted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_photon_reports_capacity() {
        let mut map = PhotonMap::new(3);
        for i in 0..3 {
            assert!(map.add_photon(
                Point3::new(i as f32, 0.0, 0.0),
                Vec3::unit_y(),
                Color::ones()
            ));
        }
        assert!(!map.add_photon(Point3::zero(), Vec3::unit_y(), Color::ones()));
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn irradiance_of_a_single_photon() {
        let mut map = PhotonMap::new(8);
        map.add_photon(Point3::zero(), -Vec3::unit_y(), Color::splat(2.0));
        map.prepare();
        let e = map.estimate_irradiance(Point3::new(0.5, 0.0, 0.0), 4, 1.0);
        // One photon of flux 2 over π·0.25.
        let expect = 2.0 / (PI * 0.25);
        assert!((e.x - expect).abs() < 1e-3);
    }

    #[test]
    fn nearest_photons_match_brute_force() {
        let mut map = PhotonMap::new(64);
        // Deterministic scatter of positions.
        let mut positions = Vec::new();
        for i in 0..64u32 {
            let x = crate::sampling::radical_inverse(i, 2) * 10.0;
            let y = crate::sampling::radical_inverse(i, 3) * 10.0;
            let z = crate::sampling::radical_inverse(i, 5) * 10.0;
            let p = Point3::new(x, y, z);
            positions.push(p);
            map.add_photon(p, Vec3::unit_y(), Color::ones());
        }
        map.prepare();

        let query = Point3::new(5.0, 5.0, 5.0);
        let k = 5;
        let mut dists: Vec<f32> = positions
            .iter()
            .map(|p| (*p - query).length_squared())
            .collect();
        dists.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let brute_radius2 = dists[k - 1];

        let e = map.estimate_irradiance(query, k, 100.0);
        let expect = k as f32 / (PI * brute_radius2);
        assert!((e.x - expect).abs() / expect < 1e-3);
    }

    #[test]
    fn empty_map_yields_no_irradiance() {
        let mut map = PhotonMap::new(4);
        map.prepare();
        assert_eq!(
            map.estimate_irradiance(Point3::zero(), 4, 1.0),
            Color::zero()
        );
    }
}
