use crate::{Transform, Point2f, Vec3f, Float, Ray, RayDifferential};
use crate::interaction::SurfaceHit;
use crate::spectrum::Spectrum;
use crate::scene::Scene;
use crate::bvh::BVH;
use std::sync::Arc;
use crate::shapes::Shape;

pub mod point;
pub mod distant;
pub mod diffuse;

/// A full emission ray for photon shooting (spec.md §6, "Light" interface:
/// a separate `sampleEmission` from the position-on-light one used by
/// direct lighting), distinct from `sample_incident_radiance`'s
/// reference-point sampling.
pub struct EmissionSample {
    pub ray: Ray,
    pub normal: Vec3f,
    pub radiance: Spectrum,
    /// pdf with respect to area (or solid angle, for lights with no area)
    /// of the sampled emission position.
    pub pdf_pos: Float,
    /// pdf with respect to solid angle of the sampled emission direction.
    pub pdf_dir: Float,
}

pub trait Light: Sync + Send {
    fn flags(&self) -> LightFlags;

    fn light_to_world(&self) -> &Transform;

    fn world_to_light(&self) -> &Transform;

    fn n_samples(&self) -> usize { 1 }

    fn preprocess(&mut self, scene_prims: &BVH) {}

    fn sample_incident_radiance(&self, reference: &SurfaceHit, u: Point2f) -> LiSample;

    /// The probability density with respect to solid angle for the light's
    /// `sample_incident_radiance` method to sample the direction `wi` from the reference
    /// point `reference`.
    fn pdf_incident_radiance(&self, reference: &SurfaceHit, wi: Vec3f) -> Float;

    fn environment_emitted_radiance(&self, ray: &RayDifferential) -> Spectrum { Spectrum::new(0.0) }

    /// Samples a full emission ray for photon shooting (spec.md §4.D step
    /// 1): `u_pos` picks a position on the light, `u_dir` a direction from
    /// that position. Delta lights (point/distant) have a degenerate
    /// position distribution and ignore `u_pos`.
    fn sample_emission(&self, u_pos: Point2f, u_dir: Point2f) -> EmissionSample;

    /// Approximate total emitted power, used only to build the
    /// light-selector pdf (spec.md §4.D step 1, §6 "Light" interface's
    /// discrete `lights` registry pdf). Any value works: the quantity
    /// being estimated is divided by `lightPdf` downstream, so only the
    /// *relative* weighting across lights affects variance, not bias.
    fn power(&self) -> Float {
        1.0
    }
}

pub trait AreaLight: Light {
    /// Given a point on the area light's surface represented by `hit`, evaluate the area light's
    /// emitted radiance `L` in the given outgoing direction `w`.
    fn emitted_radiance(&self, hit: SurfaceHit, w: Vec3f) -> Spectrum;

    // TODO: this is a hack for upcasting to compare pointers, which probably isn't even needed.
    fn as_light(&self) -> &dyn Light;
}

pub trait AreaLightBuilder<S: Shape> {
    type Target: AreaLight;

    fn create(self, shape: Arc<S>) -> Self::Target;
}

pub struct LiSample {
    pub radiance: Spectrum,

    /// The direction *towards* the illumination
    pub wi: Vec3f,

    pub pdf: Float,

    pub vis: VisibilityTester,
}

pub enum LightFlags {
    DeltaPosition, DeltaDirection, Area, Infinite
}

impl LightFlags {
    pub fn is_delta_light(&self) -> bool {
        match self {
            LightFlags::DeltaDirection | LightFlags::DeltaPosition => true,
            _ => false
        }
    }
}

pub struct VisibilityTester {
    pub p0: SurfaceHit,
    pub p1: SurfaceHit,
}

impl VisibilityTester {
    pub fn unoccluded(&self, scene: &Scene) -> bool {
        !scene.intersect_test(&self.p0.spawn_ray_to_hit(self.p1))
    }
}

/// Discrete light-selector with a power-proportional pdf (spec.md §6,
/// "discrete selection via the `lights` registry with its own pdf"; §4.D
/// step 1 "Pick a light via the light-selector pdf").
pub struct LightSelector {
    dist: crate::sampling::Distribution1D,
}

impl LightSelector {
    pub fn new(lights: &[&dyn Light]) -> Self {
        let weights = if lights.is_empty() {
            Vec::new()
        } else {
            lights.iter().map(|l| l.power().max(1e-6)).collect()
        };
        Self { dist: crate::sampling::Distribution1D::new(weights) }
    }

    /// Returns `(light index, selection pdf)`, or `None` if there are no lights.
    pub fn sample(&self, u: Float) -> Option<(usize, Float)> {
        if self.dist.count() == 0 {
            return None;
        }
        let (idx, pdf) = self.dist.sample_discrete(u);
        Some((idx, pdf))
    }

    pub fn pdf(&self, index: usize) -> Float {
        self.dist.discrete_pdf(index)
    }
}