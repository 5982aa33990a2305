//! Bulk-built point kd-tree over any `T: HasPosition3`, reused for the
//! global, caustics, and irradiance buffers, and for the *preliminary*
//! kd-tree built over volumetric photons during bandwidth selection
//! (spec.md §3, §4.A; SPEC_FULL.md §4.A).
//!
//! Nodes split on the axis of greatest variance; leaves store up to
//! `LEAF_SIZE` items. The tree owns a flat, contiguous `Vec<Node>` plus the
//! reordered item array — no per-node allocation, and no per-query
//! allocation either: `range_search` writes into a caller-provided
//! `NeighborHeap` (spec.md §4.A, "Memory").

use crate::photon::HasPosition3;
use crate::{Float, Point3f};

const LEAF_SIZE: usize = 4;

enum Node {
    Leaf { start: u32, end: u32 },
    Interior { axis: u8, split: Float, left: u32, right: u32 },
}

/// A bounded max-heap of (squared distance, item index) pairs, capacity
/// `k`. The top (`neighbors()[0]` after `into_sorted`) is always the
/// farthest accepted neighbour, matching the conventional bounded-k-NN heap
/// contract in spec.md §4.A.
pub struct NeighborHeap {
    k: usize,
    /// (squared distance, item index), kept as a binary max-heap on distance.
    heap: Vec<(Float, u32)>,
}

impl NeighborHeap {
    pub fn new(k: usize) -> Self {
        Self { k: k.max(1), heap: Vec::with_capacity(k + 1) }
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.k
    }

    /// Squared distance of the farthest currently-accepted neighbour, or
    /// `+inf` while the heap isn't yet full.
    pub fn worst_dist2(&self) -> Float {
        if self.is_full() { self.heap[0].0 } else { crate::INFINITY }
    }

    fn push(&mut self, dist2: Float, idx: u32) {
        if self.heap.len() < self.k {
            self.heap.push((dist2, idx));
            self.sift_up(self.heap.len() - 1);
        } else if dist2 < self.heap[0].0 {
            self.heap[0] = (dist2, idx);
            self.sift_down(0);
        }
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[parent].0 >= self.heap[i].0 { break; }
            self.heap.swap(parent, i);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        loop {
            let (l, r) = (2 * i + 1, 2 * i + 2);
            let mut largest = i;
            if l < self.heap.len() && self.heap[l].0 > self.heap[largest].0 { largest = l; }
            if r < self.heap.len() && self.heap[r].0 > self.heap[largest].0 { largest = r; }
            if largest == i { break; }
            self.heap.swap(i, largest);
            i = largest;
        }
    }

    /// Drains the heap into `out`, farthest-first (`out[0]` is the farthest
    /// accepted neighbour, per spec.md §4.A / property P2).
    pub fn drain_sorted_into(&mut self, out: &mut Vec<(Float, u32)>) {
        out.clear();
        out.append(&mut self.heap);
        out.sort_unstable_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    }
}

pub struct PointKdTree<T> {
    nodes: Vec<Node>,
    items: Vec<T>,
}

impl<T: HasPosition3> PointKdTree<T> {
    pub fn empty() -> Self {
        Self { nodes: Vec::new(), items: Vec::new() }
    }

    pub fn build(mut items: Vec<T>) -> Self {
        if items.is_empty() {
            return Self::empty();
        }
        let mut nodes = Vec::with_capacity(2 * items.len() / LEAF_SIZE + 1);
        Self::build_recursive(&mut items, 0, items.len(), &mut nodes);
        Self { nodes, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Returns the node index just pushed.
    fn build_recursive(items: &mut [T], start: usize, end: usize, nodes: &mut Vec<Node>) -> u32 {
        let range = &mut items[start..end];
        if range.len() <= LEAF_SIZE {
            nodes.push(Node::Leaf { start: start as u32, end: end as u32 });
            return (nodes.len() - 1) as u32;
        }

        let axis = greatest_variance_axis(range);
        let mid = range.len() / 2;
        range.select_nth_unstable_by(mid, |a, b| {
            a.position()[axis].partial_cmp(&b.position()[axis]).unwrap()
        });
        let split = range[mid].position()[axis];

        // Reserve this node's slot before recursing so we know our own index.
        let my_idx = nodes.len() as u32;
        nodes.push(Node::Leaf { start: 0, end: 0 }); // placeholder, patched below

        let left = Self::build_recursive(items, start, start + mid, nodes);
        let right = Self::build_recursive(items, start + mid, end, nodes);

        nodes[my_idx as usize] = Node::Interior { axis: axis as u8, split, left, right };
        my_idx
    }

    /// Bounded k-NN within radius `r` of `center`. Results land in `heap`
    /// (reused across calls), then are drained farthest-first into `out`.
    pub fn range_search(&self, center: Point3f, r: Float, heap: &mut NeighborHeap, out: &mut Vec<(Float, u32)>) {
        heap.clear();
        if !self.nodes.is_empty() {
            self.range_search_node(0, center, r * r, heap);
        }
        heap.drain_sorted_into(out);
    }

    fn range_search_node(&self, node_idx: u32, center: Point3f, r2: Float, heap: &mut NeighborHeap) {
        match &self.nodes[node_idx as usize] {
            Node::Leaf { start, end } => {
                for i in *start..*end {
                    let item = &self.items[i as usize];
                    let d2 = dist2(item.position(), center);
                    if d2 <= r2 && d2 <= heap.worst_dist2() {
                        heap.push(d2, i);
                    }
                }
            }
            Node::Interior { axis, split, left, right } => {
                let axis = *axis as usize;
                let diff = center[axis] - split;
                let (near, far) = if diff <= 0.0 { (*left, *right) } else { (*right, *left) };
                self.range_search_node(near, center, r2, heap);
                let max_r2 = r2.min(heap.worst_dist2());
                if diff * diff <= max_r2 {
                    self.range_search_node(far, center, r2, heap);
                }
            }
        }
    }

    /// Closest item within `r`, or `None` (the sentinel "none" of spec.md
    /// §4.A). Used for irradiance-cache lookups.
    pub fn nearest_neighbour(&self, point: Point3f, r: Float) -> Option<&T> {
        if self.nodes.is_empty() {
            return None;
        }
        let mut best: Option<(Float, u32)> = None;
        self.nearest_node(0, point, r * r, &mut best);
        best.map(|(_, i)| &self.items[i as usize])
    }

    fn nearest_node(&self, node_idx: u32, point: Point3f, r2: Float, best: &mut Option<(Float, u32)>) {
        match &self.nodes[node_idx as usize] {
            Node::Leaf { start, end } => {
                for i in *start..*end {
                    let item = &self.items[i as usize];
                    let d2 = dist2(item.position(), point);
                    if d2 <= r2 && best.map_or(true, |(bd, _)| d2 < bd) {
                        *best = Some((d2, i));
                    }
                }
            }
            Node::Interior { axis, split, left, right } => {
                let axis = *axis as usize;
                let diff = point[axis] - split;
                let (near, far) = if diff <= 0.0 { (*left, *right) } else { (*right, *left) };
                self.nearest_node(near, point, r2, best);
                let cur_best = best.map_or(r2, |(bd, _)| bd.min(r2));
                if diff * diff <= cur_best {
                    self.nearest_node(far, point, r2, best);
                }
            }
        }
    }
}

fn dist2(a: Point3f, b: Point3f) -> Float {
    let d = a - b;
    d.x * d.x + d.y * d.y + d.z * d.z
}

fn greatest_variance_axis<T: HasPosition3>(items: &[T]) -> usize {
    let n = items.len() as Float;
    let mut mean = [0.0; 3];
    for item in items {
        let p = item.position();
        mean[0] += p.x;
        mean[1] += p.y;
        mean[2] += p.z;
    }
    for m in &mut mean { *m /= n; }

    let mut var = [0.0; 3];
    for item in items {
        let p = item.position();
        var[0] += (p.x - mean[0]).powi(2);
        var[1] += (p.y - mean[1]).powi(2);
        var[2] += (p.z - mean[2]).powi(2);
    }

    if var[0] >= var[1] && var[0] >= var[2] { 0 } else if var[1] >= var[2] { 1 } else { 2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectrum::Spectrum;
    use crate::photon::Photon;
    use crate::Vec3f;

    fn photon_at(p: Point3f) -> Photon {
        Photon { position: p, omega_in: Vec3f::new(0.0, 0.0, 1.0), power: Spectrum::uniform(1.0) }
    }

    #[test]
    fn range_search_respects_radius_and_k() {
        let items: Vec<Photon> = (0..200)
            .map(|i| photon_at(Point3f::new(i as f32 * 0.1, 0.0, 0.0)))
            .collect();
        let tree = PointKdTree::build(items);

        let mut heap = NeighborHeap::new(5);
        let mut out = Vec::new();
        tree.range_search(Point3f::new(10.0, 0.0, 0.0), 0.35, &mut heap, &mut out);

        assert!(out.len() <= 5);
        for &(d2, _) in &out {
            assert!(d2 <= 0.35 * 0.35 + 1e-6);
        }
        // farthest-first: out[0] has the largest distance of the accepted set
        for w in out.windows(2) {
            assert!(w[0].0 >= w[1].0);
        }
    }

    #[test]
    fn range_search_empty_tree_returns_nothing() {
        let tree: PointKdTree<Photon> = PointKdTree::empty();
        let mut heap = NeighborHeap::new(5);
        let mut out = Vec::new();
        tree.range_search(Point3f::new(0.0, 0.0, 0.0), 1.0, &mut heap, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn nearest_neighbour_finds_closest_within_radius() {
        let items = vec![
            photon_at(Point3f::new(0.0, 0.0, 0.0)),
            photon_at(Point3f::new(5.0, 0.0, 0.0)),
            photon_at(Point3f::new(0.2, 0.0, 0.0)),
        ];
        let tree = PointKdTree::build(items);
        let found = tree.nearest_neighbour(Point3f::new(0.0, 0.0, 0.0), 1.0).unwrap();
        assert!((found.position().x - 0.0).abs() < 1e-6);
    }

    use proptest::prelude::*;

    proptest! {
        // P2: the bounded k-NN range search must agree with a brute-force
        // scan, both on which points are returned and on their
        // farthest-first order, for arbitrary scattered photons and query
        // parameters.
        #[test]
        fn range_search_matches_brute_force(
            positions in prop::collection::vec(
                (-20.0f32..20.0, -20.0f32..20.0, -20.0f32..20.0), 1..150
            ),
            cx in -20.0f32..20.0,
            cy in -20.0f32..20.0,
            cz in -20.0f32..20.0,
            radius in 0.1f32..15.0,
            k in 1usize..12,
        ) {
            let items: Vec<Photon> = positions.iter()
                .map(|&(x, y, z)| photon_at(Point3f::new(x, y, z)))
                .collect();
            let tree = PointKdTree::build(items.clone());
            let center = Point3f::new(cx, cy, cz);

            let mut heap = NeighborHeap::new(k);
            let mut out = Vec::new();
            tree.range_search(center, radius, &mut heap, &mut out);

            prop_assert!(out.len() <= k);
            for &(d2, _) in &out {
                prop_assert!(d2 <= radius * radius + 1e-3);
            }
            for w in out.windows(2) {
                prop_assert!(w[0].0 >= w[1].0 - 1e-6);
            }

            let mut brute: Vec<Float> = items.iter()
                .map(|p| dist2(p.position(), center))
                .filter(|&d2| d2 <= radius * radius)
                .collect();
            brute.sort_by(|a, b| a.partial_cmp(b).unwrap());
            let expected_len = brute.len().min(k);
            prop_assert_eq!(out.len(), expected_len);

            let mut out_sorted: Vec<Float> = out.iter().map(|&(d, _)| d).collect();
            out_sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for (a, b) in out_sorted.iter().zip(brute.iter().take(expected_len)) {
                prop_assert!((a - b).abs() < 1e-3);
            }
        }
    }
}
