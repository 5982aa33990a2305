use crate::geometry::bounds::Bounds3f;
use crate::geometry::Ray;
use crate::interaction::SurfaceHit;
use crate::{Float, Point2f};

pub mod sphere;
pub mod triangle;

pub trait Shape: Sync {
    fn object_bound(&self) -> Bounds3f;

    fn world_bound(&self) -> Bounds3f;

    fn intersect<'s>(&'s self, ray: &Ray) -> Option<(Float, crate::interaction::SurfaceInteraction<'s>)>;

    fn intersect_test(&self, ray: &Ray) -> bool {
        self.intersect(ray).is_some()
    }

    fn area(&self) -> Float;

    /// Uniformly samples a point on the shape's surface, returning its hit
    /// point and the pdf with respect to surface area (used by `DiffuseAreaLight`).
    fn sample(&self, u: Point2f) -> (SurfaceHit, Float);
}
