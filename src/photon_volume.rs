//! Bounding-volume tree over `VolumetricPhoton`s, each contributing a
//! sphere of radius `photon.radius` (spec.md §3, §4.A). Built bulk from a
//! flat buffer the same way `bvh::BVH` builds over primitives: recursive
//! median split on the axis of greatest centroid spread, flattened into a
//! contiguous node array with no per-query allocation.
//!
//! `intersect_segment` enumerates every photon whose sphere the half-open
//! ray segment pierces, tested in swept form against the clipped closest
//! point of the sphere center to the ray (spec.md §4.A).

use arrayvec::ArrayVec;

use crate::geometry::bounds::Bounds3f;
use crate::photon::{HasPosition3, VolumetricPhoton};
use crate::{Float, Point3f, Ray};

#[derive(Copy, Clone, Debug, PartialEq)]
struct LinearNode {
    bounds: Bounds3f,
    kind: LinearNodeKind,
}

#[derive(Copy, Clone, Debug, PartialEq)]
enum LinearNodeKind {
    Leaf { start: u32, end: u32 },
    Interior { second_child_idx: u32, split_axis: u8 },
}

pub struct VolumePhotonTree {
    photons: Vec<VolumetricPhoton>,
    nodes: Vec<LinearNode>,
    pub bounds: Bounds3f,
}

fn sphere_bounds(p: &VolumetricPhoton) -> Bounds3f {
    let r = crate::Vec3f::new(p.radius, p.radius, p.radius);
    let pos = p.position();
    Bounds3f::with_bounds(pos - r, pos + r)
}

enum BuildNode {
    Leaf { bounds: Bounds3f, start: u32, end: u32 },
    Interior { bounds: Bounds3f, axis: u8, children: [Box<BuildNode>; 2] },
}

impl BuildNode {
    fn bounds(&self) -> Bounds3f {
        match self {
            BuildNode::Leaf { bounds, .. } => *bounds,
            BuildNode::Interior { bounds, .. } => *bounds,
        }
    }
}

const LEAF_SIZE: usize = 8;

impl VolumePhotonTree {
    pub fn empty() -> Self {
        Self { photons: Vec::new(), nodes: Vec::new(), bounds: Bounds3f::empty() }
    }

    pub fn build(photons: Vec<VolumetricPhoton>) -> Self {
        if photons.is_empty() {
            return Self::empty();
        }

        let mut entries: Vec<(Bounds3f, Point3f, u32)> = photons
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let b = sphere_bounds(p);
                (b, b.centroid(), i as u32)
            })
            .collect();

        let root = Self::build_recursive(&mut entries, 0, entries.len());
        let bounds = root.bounds();

        // entries[start..end] now holds the build order; reorder photons to match.
        let ordered: Vec<VolumetricPhoton> = entries.iter().map(|(_, _, idx)| photons[*idx as usize]).collect();

        let mut nodes = Vec::new();
        Self::flatten(&mut nodes, &root);

        Self { photons: ordered, nodes, bounds }
    }

    fn build_recursive(entries: &mut [(Bounds3f, Point3f, u32)], start: usize, end: usize) -> BuildNode {
        let slice = &mut entries[start..end];
        let bounds = slice.iter().fold(Bounds3f::empty(), |b, e| b.join(&e.0));

        if slice.len() <= LEAF_SIZE {
            return BuildNode::Leaf { bounds, start: start as u32, end: end as u32 };
        }

        let centroid_bounds = slice.iter().fold(Bounds3f::empty(), |b, e| b.join_point(&e.1));
        let axis = centroid_bounds.maximum_extent() as usize;
        let mid = slice.len() / 2;
        slice.select_nth_unstable_by(mid, |a, b| a.1[axis].partial_cmp(&b.1[axis]).unwrap());

        let left = Self::build_recursive(entries, start, start + mid);
        let right = Self::build_recursive(entries, start + mid, end);
        BuildNode::Interior { bounds, axis: axis as u8, children: [Box::new(left), Box::new(right)] }
    }

    fn flatten(nodes: &mut Vec<LinearNode>, node: &BuildNode) -> usize {
        match node {
            BuildNode::Leaf { bounds, start, end } => {
                nodes.push(LinearNode { bounds: *bounds, kind: LinearNodeKind::Leaf { start: *start, end: *end } });
                1
            }
            BuildNode::Interior { bounds, axis, children } => {
                nodes.push(LinearNode {
                    bounds: *bounds,
                    kind: LinearNodeKind::Interior { second_child_idx: 0, split_axis: *axis },
                });
                let my_idx = nodes.len() - 1;
                let left_len = Self::flatten(nodes, &children[0]);
                let second_idx = my_idx + left_len + 1;
                if let LinearNodeKind::Interior { ref mut second_child_idx, .. } = nodes[my_idx].kind {
                    *second_child_idx = second_idx as u32;
                }
                let right_len = Self::flatten(nodes, &children[1]);
                left_len + right_len + 1
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.photons.is_empty()
    }

    pub fn photons(&self) -> &[VolumetricPhoton] {
        &self.photons
    }

    /// Enumerates every photon whose sphere the half-open segment
    /// `[t_near, t_far]` of `ray` pierces, appending `(photon index,
    /// t_closest)` pairs to `out`. No per-query allocation beyond `out`,
    /// which the caller is expected to reuse.
    pub fn intersect_segment(&self, ray: &Ray, t_near: Float, t_far: Float, out: &mut Vec<(u32, Float)>) {
        if self.nodes.is_empty() {
            return;
        }

        let mut stack: ArrayVec<[u32; 64]> = ArrayVec::new();
        let mut current = 0u32;

        loop {
            let node = &self.nodes[current as usize];
            if segment_hits_bounds(&node.bounds, ray, t_near, t_far) {
                match node.kind {
                    LinearNodeKind::Leaf { start, end } => {
                        for i in start..end {
                            let photon = &self.photons[i as usize];
                            if let Some(t) = sphere_segment_closest(ray, photon.position(), photon.radius, t_near, t_far) {
                                out.push((i, t));
                            }
                        }
                        match stack.pop() {
                            Some(next) => current = next,
                            None => break,
                        }
                    }
                    LinearNodeKind::Interior { second_child_idx, .. } => {
                        stack.push(second_child_idx);
                        current += 1;
                    }
                }
            } else {
                match stack.pop() {
                    Some(next) => current = next,
                    None => break,
                }
            }
        }
    }
}

fn segment_hits_bounds(bounds: &Bounds3f, ray: &Ray, t_near: Float, t_far: Float) -> bool {
    let mut clipped = *ray;
    clipped.t_max = t_far;
    // `Bounds3::intersect_test` (geometry/bounds.rs) checks [0, t_max]; shift the
    // origin to t_near so the slab test covers exactly the queried segment.
    clipped.origin = ray.at(t_near);
    clipped.t_max = (t_far - t_near).max(0.0);
    bounds.intersect_test(&clipped).is_some()
}

/// Closest-point-of-sphere-center-to-ray test, clipped to `[t_near, t_far]`
/// (spec.md §4.A). Returns the clipped parameter `t` when the clipped point
/// lies within `radius` of `center`.
fn sphere_segment_closest(ray: &Ray, center: Point3f, radius: Float, t_near: Float, t_far: Float) -> Option<Float> {
    let oc = center - ray.origin;
    let dir2 = ray.dir.x * ray.dir.x + ray.dir.y * ray.dir.y + ray.dir.z * ray.dir.z;
    if dir2 == 0.0 {
        return None;
    }
    let t = (oc.x * ray.dir.x + oc.y * ray.dir.y + oc.z * ray.dir.z) / dir2;
    let t = t.clamp(t_near, t_far);
    let p = ray.at(t);
    let d = p - center;
    let d2 = d.x * d.x + d.y * d.y + d.z * d.z;
    if d2 <= radius * radius {
        Some(t)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::photon::Photon;
    use crate::spectrum::Spectrum;
    use crate::Vec3f;

    fn vphoton(p: Point3f, radius: Float) -> VolumetricPhoton {
        VolumetricPhoton {
            photon: Photon { position: p, omega_in: Vec3f::new(0.0, 0.0, 1.0), power: Spectrum::uniform(1.0) },
            radius,
            is_direct: false,
        }
    }

    #[test]
    fn intersect_segment_finds_pierced_spheres() {
        let photons: Vec<_> = (0..50)
            .map(|i| vphoton(Point3f::new(i as f32, 0.0, 0.0), 0.3))
            .collect();
        let tree = VolumePhotonTree::build(photons);

        let ray = Ray::new(Point3f::new(-1.0, 0.0, 0.0), Vec3f::new(1.0, 0.0, 0.0));
        let mut out = Vec::new();
        tree.intersect_segment(&ray, 0.0, 100.0, &mut out);

        // Every integer x in [0, 49] is within 0.3 of the ray (which runs
        // exactly through all the centers), so all 50 spheres are pierced.
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn intersect_segment_respects_t_range() {
        let photons = vec![vphoton(Point3f::new(10.0, 0.0, 0.0), 0.3)];
        let tree = VolumePhotonTree::build(photons);
        let ray = Ray::new(Point3f::new(0.0, 0.0, 0.0), Vec3f::new(1.0, 0.0, 0.0));

        let mut out = Vec::new();
        tree.intersect_segment(&ray, 0.0, 5.0, &mut out);
        assert!(out.is_empty(), "photon at t=10 must not be found when t_far=5");

        out.clear();
        tree.intersect_segment(&ray, 0.0, 20.0, &mut out);
        assert_eq!(out.len(), 1);
    }
}
