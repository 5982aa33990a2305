use std::sync::Arc;
use crate::texture::Texture;
use crate::spectrum::Spectrum;
use crate::material::{Material, TransportMode};
use crate::interaction::SurfaceInteraction;
use bumpalo::Bump;
use crate::reflection::bsdf::Bsdf;
use crate::reflection::LambertianReflection;

/// A purely diffuse (Lambertian) surface.
pub struct MatteMaterial {
    diffuse: Arc<dyn Texture<Spectrum> + Send + Sync>,
    // TODO sigma, bump map
}

impl MatteMaterial {
    pub fn new(diffuse: Arc<dyn Texture<Spectrum> + Send + Sync>) -> Self {
        Self { diffuse }
    }

    pub fn constant(reflectance: Spectrum) -> Self {
        Self::new(Arc::new(crate::texture::ConstantTexture(reflectance)))
    }
}

impl Material for MatteMaterial {
    fn compute_scattering_functions<'a>(&self, si: &SurfaceInteraction, arena: &'a Bump, mode: TransportMode, allow_multiple_lobes: bool) -> Bsdf<'a> {
        let mut bsdf = Bsdf::new(si, 1.0);

        let r = self.diffuse.evaluate(si).clamp_positive();
        if !r.is_black() {
            let lambertian = arena.alloc(LambertianReflection { r });
            bsdf.add(lambertian);
        }
        bsdf
    }
}