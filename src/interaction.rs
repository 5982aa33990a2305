use crate::geometry::Normal3;
use crate::material::TransportMode;
use crate::{offset_ray_origin, Float, Point2f, Point3f, Ray, RayDifferential, Vec3f, Vec2f, solve_linear_system_2x2, Differential};
use bumpalo::Bump;
use cgmath::{EuclideanSpace, InnerSpace, Matrix2, Vector2};
use crate::reflection::bsdf::Bsdf;
use crate::primitive::Primitive;
use crate::spectrum::Spectrum;

/// A bare hit point: position, its reconstructed error bounds, time, and
/// geometric normal. Used both for full surface interactions and for the
/// lightweight reference/light-sample points passed to `Light::sample_incident_radiance`.
#[derive(Clone, Copy)]
pub struct SurfaceHit {
    pub p: Point3f,
    pub p_err: Vec3f,
    pub time: Float,
    pub n: Normal3,
}

impl SurfaceHit {
    pub fn spawn_ray(&self, dir: Vec3f) -> Ray {
        let o = offset_ray_origin(&self.p, &self.p_err, &self.n, &dir);
        Ray {
            origin: o,
            dir,
            t_max: std::f32::INFINITY,
            time: self.time,
        }
    }

    pub fn spawn_ray_with_dfferentials(&self, dir: Vec3f, diff: Option<Differential>) -> RayDifferential {
        let ray = self.spawn_ray(dir);
        RayDifferential { ray, diff }
    }

    /// A ray from `self` towards `other`, with `t_max` clipped just short of
    /// `other` so the resulting visibility test doesn't self-intersect either
    /// endpoint.
    pub fn spawn_ray_to_hit(&self, other: SurfaceHit) -> Ray {
        let dir = other.p - self.p;
        let origin = offset_ray_origin(&self.p, &self.p_err, &self.n, &dir);
        let target = offset_ray_origin(&other.p, &other.p_err, &other.n, &-dir);
        Ray {
            origin,
            dir: target - origin,
            t_max: 1.0 - 1e-3,
            time: self.time,
        }
    }
}

pub struct SurfaceInteraction<'i> {
    pub hit: SurfaceHit,

    /// (u, v) coordinates from the parametrization of the surface
    pub uv: Point2f,

    pub wo: Vec3f,

    pub geom: DiffGeom,

    pub shading_n: Normal3,

    pub shading_geom: DiffGeom,

    pub tex_diffs: Option<TextureDifferentials>,

    pub primitive: Option<&'i dyn Primitive>,
}

impl<'i> SurfaceInteraction<'i> {
    pub fn new(
        p: Point3f,
        p_err: Vec3f,
        time: Float,
        uv: Point2f,
        wo: Vec3f,
        n: Normal3,
        geom: DiffGeom,
    ) -> Self {
        Self {
            hit: SurfaceHit { p, p_err, time, n },
            uv,
            wo,
            geom,

            shading_n: n,
            shading_geom: geom,

            tex_diffs: None,
            primitive: None,
        }
    }

    pub fn spawn_ray(&self, dir: Vec3f) -> Ray {
        self.hit.spawn_ray(dir)
    }

    pub fn spawn_ray_with_dfferentials(&self, dir: Vec3f, diff: Option<Differential>) -> RayDifferential {
        self.hit.spawn_ray_with_dfferentials(dir, diff)
    }

    /// Emitted radiance towards `w` if this hit lies on an area light, black
    /// otherwise.
    pub fn emitted_radiance(&self, w: Vec3f) -> Spectrum {
        self.primitive
            .and_then(|p| p.area_light())
            .map_or(Spectrum::uniform(0.0), |al| al.emitted_radiance(self.hit, w))
    }

    pub fn compute_scattering_functions<'a>(
        &mut self,
        ray: &RayDifferential,
        arena: &'a Bump,
        allow_multiple_lobes: bool,
        mode: TransportMode,
    ) -> Option<Bsdf<'a>> {
        self.tex_diffs = self.compute_tex_differentials(ray);
        let material = self.primitive.expect("Should have a prim at this point").material()?;
        Some(material.compute_scattering_functions(self, arena, mode, allow_multiple_lobes))
    }

    fn compute_tex_differentials(&self, ray: &RayDifferential) -> Option<TextureDifferentials> {
        let n = self.hit.n;
        let diff = ray.diff?;
        let d = n.dot(self.hit.p.to_vec());

        let px = {
            let tx = -(n.dot(diff.rx_origin.to_vec()) - d) / n.dot(diff.rx_dir);
            diff.rx_origin + tx * diff.rx_dir
        };

        let py = {
            let ty = -(n.dot(diff.ry_origin.to_vec()) - d) / n.dot(diff.ry_dir);
            diff.ry_origin + ty * diff.ry_dir
        };

        let dpdx = px - self.hit.p;
        let dpdy = py - self.hit.p;

        let dim = if n.x.abs() > n.y.abs() && n.x.abs() > n.z.abs() {
            (1, 2)
        } else if n.y.abs() > n.z.abs() {
            (0, 2)
        } else {
            (0, 1)
        };

        let dpdu = self.geom.dpdu;
        let dpdv = self.geom.dpdv;
        let a = Matrix2::from_cols(
            Vector2::new(dpdu[dim.0], dpdu[dim.1]),
            Vector2::new(dpdv[dim.0], dpdv[dim.1]),
        );

        let bx = Vec2f::new(dpdx[dim.0], dpdx[dim.1]);
        let by = Vec2f::new(dpdy[dim.0], dpdy[dim.1]);

        let (dudx, dvdx) = solve_linear_system_2x2(a, bx)?.into();
        let (dudy, dvdy) = solve_linear_system_2x2(a, by)?.into();
        Some(TextureDifferentials {
            dpdx,
            dpdy,

            dudx,
            dvdx,

            dudy,
            dvdy,
        })
    }
}

#[derive(Clone, Copy)]
pub struct DiffGeom {
    pub dpdu: Vec3f,
    pub dpdv: Vec3f,
    pub dndu: Normal3,
    pub dndv: Normal3,
}

/// Partial derivatives used for texture antialiasing.
#[derive(Clone, Copy)]
pub struct TextureDifferentials {
    pub dpdx: Vec3f,
    pub dpdy: Vec3f,

    pub dudx: Float,
    pub dvdx: Float,

    pub dudy: Float,
    pub dvdy: Float,
}
