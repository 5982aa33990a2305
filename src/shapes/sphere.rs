use crate::{vec3f, point3f, bounds3f};
use crate::{Float, Point2f, Vec3f, Normal3, ComponentWiseExt};
use crate::geometry::{Transform, Ray, Transformable};
use crate::shapes::Shape;
use crate::geometry::bounds::Bounds3;
use crate::interaction::{SurfaceInteraction, SurfaceHit, DiffGeom};
use cgmath::{EuclideanSpace, InnerSpace};
use crate::sampling::uniform_sample_sphere;
use crate::consts::PI;

pub struct Sphere<'t> {
    object_to_world: &'t Transform,
    world_to_object: &'t Transform,
    reverse_orientation: bool,

    radius: Float,
    z_min: Float,
    z_max: Float,
    theta_min: Float,
    theta_max: Float,
    phi_max: Float
}

impl<'t> Sphere<'t> {
    pub fn new(
        object_to_world: &'t Transform,
        world_to_object: &'t Transform,
        reverse_orientation: bool,
        radius: Float,
        z_min: Float,
        z_max: Float,
        phi_max: Float
    ) -> Self {
        Self {
            object_to_world, world_to_object, reverse_orientation,
            radius,
            z_min: Float::min(z_min, z_max).max(-radius).min(radius),

            z_max: Float::max(z_min, z_max).max(-radius).min(radius),
            theta_min: (z_min / radius).max(-1.0).min(1.0).acos(),
            theta_max: (z_max / radius).max(-1.0).min(1.0).acos(),
            phi_max: phi_max.max(0.0).min(360.0).to_radians()
        }
    }

    /// A full, unclipped sphere.
    pub fn whole(object_to_world: &'t Transform, world_to_object: &'t Transform, radius: Float) -> Self {
        Self::new(object_to_world, world_to_object, false, radius, -radius, radius, 360.0)
    }

    fn object_intersect(&self, ray: &Ray) -> Option<(Float, crate::Point3f)> {
        let ray = ray.transform(*self.world_to_object);

        let a = ray.dir.dot(ray.dir);
        let b = 2.0 * ray.dir.dot(ray.origin.to_vec());
        let c = ray.origin.to_vec().dot(ray.origin.to_vec()) - self.radius * self.radius;

        let discrim = b * b - 4.0 * a * c;
        if discrim < 0.0 { return None; }
        let root_discrim = discrim.sqrt();

        let q = if b < 0.0 { -0.5 * (b - root_discrim) } else { -0.5 * (b + root_discrim) };
        let mut t0 = q / a;
        let mut t1 = c / q;
        if t0 > t1 { std::mem::swap(&mut t0, &mut t1); }

        if t0 > ray.t_max || t1 <= 0.0 { return None; }
        let mut t_shape_hit = t0;
        if t_shape_hit <= 0.0 {
            t_shape_hit = t1;
            if t_shape_hit > ray.t_max { return None; }
        }

        let mut p_hit = ray.at(t_shape_hit);
        // refine hit point to lie exactly on the sphere
        p_hit *= self.radius / p_hit.to_vec().magnitude();
        if p_hit.x == 0.0 && p_hit.y == 0.0 { p_hit.x = 1e-5 * self.radius; }
        let mut phi = p_hit.y.atan2(p_hit.x);
        if phi < 0.0 { phi += 2.0 * PI; }

        if (self.z_min > -self.radius && p_hit.z < self.z_min)
            || (self.z_max < self.radius && p_hit.z > self.z_max)
            || phi > self.phi_max
        {
            if t_shape_hit == t1 { return None; }
            t_shape_hit = t1;
            if t1 > ray.t_max { return None; }

            p_hit = ray.at(t_shape_hit);
            p_hit *= self.radius / p_hit.to_vec().magnitude();
            if p_hit.x == 0.0 && p_hit.y == 0.0 { p_hit.x = 1e-5 * self.radius; }
            phi = p_hit.y.atan2(p_hit.x);
            if phi < 0.0 { phi += 2.0 * PI; }

            if (self.z_min > -self.radius && p_hit.z < self.z_min)
                || (self.z_max < self.radius && p_hit.z > self.z_max)
                || phi > self.phi_max
            {
                return None;
            }
        }

        Some((t_shape_hit, p_hit))
    }

    fn surface_interaction_at(&self, p_hit: crate::Point3f) -> SurfaceInteraction<'static> {
        let mut phi = p_hit.y.atan2(p_hit.x);
        if phi < 0.0 { phi += 2.0 * PI; }
        let theta = (p_hit.z / self.radius).max(-1.0).min(1.0).acos();
        let u = phi / self.phi_max;
        let v = (theta - self.theta_min) / (self.theta_max - self.theta_min);

        let z_radius = (p_hit.x * p_hit.x + p_hit.y * p_hit.y).sqrt();
        let inv_z_radius = 1.0 / z_radius.max(1e-12);
        let cos_phi = p_hit.x * inv_z_radius;
        let sin_phi = p_hit.y * inv_z_radius;
        let dpdu = Vec3f::new(-self.phi_max * p_hit.y, self.phi_max * p_hit.x, 0.0);
        let dpdv = (self.theta_max - self.theta_min) *
            Vec3f::new(p_hit.z * cos_phi, p_hit.z * sin_phi, -self.radius * theta.sin());

        let n = Normal3(dpdu.cross(dpdv).normalize());
        let n = if self.reverse_orientation { -n } else { n };

        let p_err = p_hit.to_vec().abs() * crate::err_float::gamma(5);

        let geom = DiffGeom {
            dpdu,
            dpdv,
            dndu: Normal3::zero(),
            dndv: Normal3::zero(),
        };

        let si = SurfaceInteraction::new(
            p_hit,
            p_err,
            0.0,
            Point2f::new(u, v),
            -dpdu.normalize(), // placeholder, overwritten by caller with -ray.dir
            n,
            geom,
        );
        si.transform(*self.object_to_world)
    }
}

impl<'t> Shape for Sphere<'t> {
    fn object_bound(&self) -> Bounds3<f32> {
        bounds3f!((-self.radius, -self.radius, self.z_min), (self.radius, self.radius, self.z_max))
    }

    fn world_bound(&self) -> Bounds3<f32> {
        self.object_bound().transform(*self.object_to_world)
    }

    fn intersect<'s>(&'s self, ray: &Ray) -> Option<(Float, SurfaceInteraction<'s>)> {
        let (t_hit, p_hit) = self.object_intersect(ray)?;
        let mut si = self.surface_interaction_at(p_hit);
        let world_ray = *ray;
        si.wo = -world_ray.dir;
        Some((t_hit, si))
    }

    fn area(&self) -> Float {
        self.phi_max * self.radius * (self.z_max - self.z_min)
    }

    fn sample(&self, u: Point2f) -> (SurfaceHit, Float) {
        let p_obj = point3f!(0, 0, 0) + self.radius * uniform_sample_sphere(u);
        let n = Normal3(p_obj.to_vec().normalize());
        let n = if self.reverse_orientation { -n } else { n };
        let p_err = p_obj.to_vec().abs() * crate::err_float::gamma(5);

        let hit = SurfaceHit {
            p: p_obj.transform(*self.object_to_world),
            p_err,
            time: 0.0,
            n: n.transform(*self.object_to_world),
        };
        (hit, 1.0 / self.area())
    }
}
