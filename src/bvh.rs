use crate::math::Aabb;

/// A static bounding-volume hierarchy over mesh faces, built once at mesh
/// construction. Nodes live in one flat array; leaves own a contiguous
/// range of a face-index permutation, so traversal needs no heap walk and
/// the leaf ranges partition the face set by construction.
pub struct Bvh {
    nodes: Vec<BvhNode>,
    indices: Vec<u32>,
}

pub struct BvhNode {
    pub bounds: Aabb,
    pub kind: BvhNodeKind,
}

pub enum BvhNodeKind {
    /// Face-index range [start, start+count) into the permutation.
    Leaf { start: u32, count: u32 },
    Interior { left: u32, right: u32 },
}

const LEAF_SIZE: usize = 4;

impl Bvh {
    /// Builds the tree from per-face bounds with a midpoint split on the
    /// longest centroid axis, falling back to a median split when the
    /// centroids are degenerate.
    pub fn build(face_bounds: &[Aabb]) -> Self {
        assert!(!face_bounds.is_empty(), "BVH over an empty face list");
        let mut bvh = Self {
            nodes: Vec::with_capacity(2 * face_bounds.len()),
            indices: (0..face_bounds.len() as u32).collect(),
        };
        bvh.build_range(face_bounds, 0, face_bounds.len());
        bvh
    }

    fn build_range(&mut self, face_bounds: &[Aabb], lo: usize, hi: usize) -> u32 {
        let mut bounds = Aabb::empty();
        let mut centroid_bounds = Aabb::empty();
        for &f in &self.indices[lo..hi] {
            bounds = Aabb::surrounding(&bounds, &face_bounds[f as usize]);
            centroid_bounds.grow(face_bounds[f as usize].centroid());
        }

        let id = self.nodes.len() as u32;
        if hi - lo <= LEAF_SIZE {
            self.nodes.push(BvhNode {
                bounds,
                kind: BvhNodeKind::Leaf {
                    start: lo as u32,
                    count: (hi - lo) as u32,
                },
            });
            return id;
        }

        let axis = centroid_bounds.longest_axis();
        let mid_point = centroid_bounds.centroid()[axis];
        self.indices[lo..hi].sort_unstable_by(|&a, &b| {
            let ca = face_bounds[a as usize].centroid()[axis];
            let cb = face_bounds[b as usize].centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });
        let mut split = self.indices[lo..hi]
            .partition_point(|&f| face_bounds[f as usize].centroid()[axis] < mid_point);
        if split == 0 || split == hi - lo {
            split = (hi - lo) / 2;
        }

        // Reserve the interior slot before recursing so children get
        // consecutive ids below their parent.
        self.nodes.push(BvhNode {
            bounds,
            kind: BvhNodeKind::Leaf { start: 0, count: 0 },
        });
        let left = self.build_range(face_bounds, lo, lo + split);
        let right = self.build_range(face_bounds, lo + split, hi);
        self.nodes[id as usize].kind = BvhNodeKind::Interior { left, right };
        id
    }

    pub fn root(&self) -> u32 {
        0
    }

    pub fn node(&self, id: u32) -> &BvhNode {
        &self.nodes[id as usize]
    }

    #[allow(dead_code)]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The face ids owned by a leaf range.
    pub fn leaf_faces(&self, start: u32, count: u32) -> &[u32] {
        &self.indices[start as usize..(start + count) as usize]
    }
}
