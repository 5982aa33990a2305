//! Photon records and the append-only buffers they're collected into
//! (spec.md §3). Buffers are grown concurrently during emission (one shard
//! per worker, merged once emission finishes) and are read-only for the
//! rest of the render (§5 immutability contract).

use parking_lot::Mutex;

use crate::spectrum::Spectrum;
use crate::{Normal3, Point3f, Vec3f};

/// One-method trait the kd-tree is generic over, the Rust analogue of
/// LiAR's `KdTreeTraits<Buffer>` template parameter (SPEC_FULL.md §4.A).
pub trait HasPosition3 {
    fn position(&self) -> Point3f;
}

/// `{position, omegaIn, power}`. `omega_in` points *towards* the light
/// along the path that deposited the photon. `power` is scaled once, after
/// emission, by `1 / photons_emitted` (spec.md §3).
#[derive(Debug, Clone, Copy)]
pub struct Photon {
    pub position: Point3f,
    pub omega_in: Vec3f,
    pub power: Spectrum,
}

impl HasPosition3 for Photon {
    fn position(&self) -> Point3f {
        self.position
    }
}

/// `Photon ⊕ {radius, is_direct}`. `is_direct` marks photons deposited on
/// the direct-from-light segment (generation 0, pre-scatter) so the direct
/// integrator can exclude them when it estimates single-scattering itself
/// (invariant I4).
#[derive(Debug, Clone, Copy)]
pub struct VolumetricPhoton {
    pub photon: Photon,
    pub radius: f32,
    pub is_direct: bool,
}

impl VolumetricPhoton {
    pub fn position(&self) -> Point3f {
        self.photon.position
    }
}

impl HasPosition3 for VolumetricPhoton {
    fn position(&self) -> Point3f {
        self.photon.position
    }
}

/// Precomputed summary of the global map around a surface sample
/// (spec.md §3, §4.E irradiance precomputation).
#[derive(Debug, Clone, Copy)]
pub struct Irradiance {
    pub position: Point3f,
    pub normal: Normal3,
    pub irradiance: Spectrum,
    pub sqr_radius: f32,
}

impl HasPosition3 for Irradiance {
    fn position(&self) -> Point3f {
        self.position
    }
}

/// An append-only buffer filled by many worker shards during emission, then
/// flattened into one contiguous `Vec` for the read-only render phase.
/// Sharding avoids the hot lock a single `push_back` behind one mutex would
/// become under many emitting threads (spec.md §5).
pub struct PhotonBuffer<T> {
    shards: Vec<Mutex<Vec<T>>>,
}

impl<T> PhotonBuffer<T> {
    pub fn new(num_shards: usize) -> Self {
        let num_shards = num_shards.max(1);
        Self {
            shards: (0..num_shards).map(|_| Mutex::new(Vec::new())).collect(),
        }
    }

    /// Appends `value` to the shard owned by `shard_idx % num_shards`; callers
    /// pass their worker index so appends from the same worker never contend.
    pub fn push(&self, shard_idx: usize, value: T) {
        let shard = &self.shards[shard_idx % self.shards.len()];
        shard.lock().push(value);
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumes all shards into one flat buffer. Invariant I1 (buffer
    /// indices stable across the render) holds from this point on: the
    /// returned `Vec` is never reordered or relocated again.
    pub fn into_flat(self) -> Vec<T> {
        self.shards.into_iter().flat_map(|s| s.into_inner()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shards_merge_to_exact_count() {
        let buf: PhotonBuffer<u32> = PhotonBuffer::new(4);
        for i in 0..100u32 {
            buf.push(i as usize, i);
        }
        assert_eq!(buf.len(), 100);
        let mut flat = buf.into_flat();
        flat.sort();
        assert_eq!(flat, (0..100).collect::<Vec<_>>());
    }
}
