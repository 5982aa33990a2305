//! Whitted-style direct-lighting-only integrator (spec.md §4.C): the camera
//! ray's media is evaluated first, then the nearest surface is shaded with
//! emission, one sampling strategy's worth of direct lighting, and recursive
//! specular/shaderless-boundary bounces.

use bumpalo::Bump;
use cgmath::InnerSpace;

use crate::integrator::{estimate_direct, uniform_sample_one_light, IntegratorRadiance};
use crate::interaction::{SurfaceHit, SurfaceInteraction};
use crate::material::TransportMode;
use crate::medium::{classify_solid_event, MediumStack};
use crate::reflection::bsdf::Bsdf;
use crate::sampler::Sampler;
use crate::scene::Scene;
use crate::spectrum::Spectrum;
use crate::{Float, Point2f, Ray, RayDifferential};

pub enum LightStrategy {
    UniformSampleAll, UniformSampleOne
}

pub struct DirectLightingIntegrator {
    strategy: LightStrategy,
    max_depth: u32,
    n_light_samples: Vec<usize>,
}

impl DirectLightingIntegrator {
    pub fn new(strategy: LightStrategy, max_depth: u32) -> Self {
        Self { strategy, max_depth, n_light_samples: Vec::new() }
    }

    fn direct_lighting(
        &self,
        si: &SurfaceInteraction,
        bsdf: &Bsdf,
        scene: &Scene,
        sampler: &mut dyn Sampler,
        arena: &Bump,
        media: &MediumStack,
    ) -> Spectrum {
        match self.strategy {
            LightStrategy::UniformSampleAll => self.uniform_sample_all_lights(si, bsdf, scene, sampler, arena, media),
            LightStrategy::UniformSampleOne => uniform_sample_one_light(si, bsdf, scene, arena, sampler, media),
        }
    }

    fn uniform_sample_all_lights(
        &self,
        si: &SurfaceInteraction,
        bsdf: &Bsdf,
        scene: &Scene,
        sampler: &mut dyn Sampler,
        arena: &Bump,
        media: &MediumStack,
    ) -> Spectrum {
        let mut l = Spectrum::uniform(0.0);
        for (light, &n_samples) in scene.lights.iter().zip(self.n_light_samples.iter()) {
            if n_samples == 0 {
                continue;
            }
            let u_light: Vec<Point2f> = sampler.get_2d_array(n_samples).to_vec();
            let u_scattering: Vec<Point2f> = sampler.get_2d_array(n_samples).to_vec();

            let mut ld = Spectrum::uniform(0.0);
            for i in 0..n_samples {
                ld += estimate_direct(bsdf, si, u_scattering[i], *light, u_light[i], scene, arena, media);
            }
            l += ld / n_samples as Float;
        }
        l
    }
}

impl IntegratorRadiance for DirectLightingIntegrator {
    fn preprocess(&mut self, scene: &Scene, sampler: &mut dyn Sampler) {
        if let LightStrategy::UniformSampleAll = &self.strategy {
            self.n_light_samples = scene.lights.iter()
                .map(|light| sampler.round_count(light.n_samples()))
                .collect();

            for _ in 0..self.max_depth {
                for &n_samples in &self.n_light_samples {
                    sampler.request_2d_array(n_samples);
                    sampler.request_2d_array(n_samples);
                }
            }
        }
    }

    fn incident_radiance(
        &self,
        ray: &mut RayDifferential,
        scene: &Scene,
        sampler: &mut dyn Sampler,
        arena: &Bump,
        media: &mut MediumStack,
        depth: u16,
    ) -> Spectrum {
        let mut l = Spectrum::uniform(0.0);

        let hit = scene.intersect(&mut ray.ray);

        let (l_media, transparency) = shade_medium_segment(&ray.ray, media, scene, sampler);
        l += l_media;
        if transparency.is_black() {
            return l;
        }

        let mut si = match hit {
            Some(si) => si,
            None => return l,
        };

        let bsdf = si.compute_scattering_functions(ray, arena, true, TransportMode::Radiance);

        let bsdf = match bsdf {
            Some(b) => b,
            None => {
                // No material: this hit is a pure medium boundary (spec.md
                // §4.C step 5). Cross it and keep walking the same ray.
                let inside = si.primitive.and_then(|p| p.medium_interface()).map(|mi| mi.inside.clone());
                let event = classify_solid_event(ray.ray.dir, si.hit.n.0);
                let mut crossing = media.cross_boundary(event, inside.as_ref().unwrap_or(&None));

                let mut continuation = si.spawn_ray_with_dfferentials(ray.ray.dir, ray.diff);
                let tail = self.incident_radiance(
                    &mut continuation, scene, sampler, arena, crossing.stack_mut(), depth + 1,
                );
                return l + transparency * tail;
            }
        };

        l += transparency * si.emitted_radiance(si.wo);

        if !scene.lights.is_empty() {
            l += transparency * self.direct_lighting(&si, &bsdf, scene, sampler, arena, media);
        }

        if (depth as u32) < self.max_depth {
            l += transparency * self.specular_reflect(ray, &si, &bsdf, scene, sampler, arena, media, depth);
            l += transparency * self.specular_transmit(ray, &si, &bsdf, scene, sampler, arena, media, depth);
        }

        l
    }
}

/// Evaluates the active medium along `[0, ray.t_max]`: returns accumulated
/// in-scattered radiance and the transparency the surface term beyond the
/// segment should be scaled by (spec.md §4.C steps 2-3). A sampled
/// in-scatter event fully explains the ray in this single-sample estimate,
/// so transparency is zero and the surface term is skipped.
pub(crate) fn shade_medium_segment(
    ray: &Ray,
    media: &MediumStack,
    scene: &Scene,
    sampler: &mut dyn Sampler,
) -> (Spectrum, Spectrum) {
    if media.current().is_none() {
        return (Spectrum::uniform(0.0), Spectrum::uniform(1.0));
    }

    let u = sampler.get_1d();
    let (trans, t_scatter, pdf) = media.sample_scatter_or_transmittance(ray, u);
    if pdf <= 0.0 {
        return (Spectrum::uniform(0.0), Spectrum::uniform(0.0));
    }

    let t_scatter = match t_scatter {
        None => return (Spectrum::uniform(0.0), trans / pdf),
        Some(t) => t,
    };

    if scene.lights.is_empty() {
        return (Spectrum::uniform(0.0), Spectrum::uniform(0.0));
    }

    let p = ray.origin + ray.dir * t_scatter;
    let wo = -ray.dir.normalize();
    let hit = SurfaceHit { p, p_err: crate::Vec3f::new(0.0, 0.0, 0.0), time: ray.time, n: crate::Normal3(wo) };

    let n_lights = scene.lights.len();
    let light_num = (sampler.get_1d() * n_lights as Float).min((n_lights - 1) as Float) as usize;
    let light = scene.lights[light_num];
    let light_select_pdf = 1.0 / n_lights as Float;

    let light_sample = light.sample_incident_radiance(&hit, sampler.get_2d());
    if light_sample.pdf <= 0.0 || light_sample.radiance.is_black() || !light_sample.vis.unoccluded(scene) {
        return (Spectrum::uniform(0.0), Spectrum::uniform(0.0));
    }

    let sigma_s = media.current().map_or(Spectrum::uniform(0.0), |m| m.sigma_s());
    let phase = media.phase(p, wo, light_sample.wi);
    let shadow_ray = hit.spawn_ray_to_hit(light_sample.vis.p1);
    let shadow_trans = media.transmittance(&shadow_ray);

    let l = trans * sigma_s * phase * shadow_trans * light_sample.radiance
        / (pdf * light_select_pdf * light_sample.pdf);

    (l, Spectrum::uniform(0.0))
}
