use crate::{Float, Point3f, Vec3f};
use cgmath::InnerSpace;
use std::ops::{Deref, DerefMut, Mul, MulAssign, Neg};

pub mod bounds;
pub mod transform;

pub use transform::{Transform, Transformable, TransformableErr};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    pub origin: Point3f,
    pub dir: Vec3f,
    pub t_max: Float,
    pub time: Float,
    // TODO: medium
}

impl Ray {
    pub fn new(origin: Point3f, dir: Vec3f) -> Self {
        Self { origin, dir, t_max: std::f32::INFINITY, time: 0.0 }
    }

    pub fn at(&self, t: Float) -> Point3f {
        self.origin + self.dir * t
    }
}

/// A ray bundled with the two auxiliary rays (one pixel over in x and y)
/// used to estimate texture-space footprint (pbrt §10.1.3).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayDifferential {
    pub ray: Ray,
    pub diff: Option<Differential>,
}

impl Deref for RayDifferential {
    type Target = Ray;
    fn deref(&self) -> &Ray { &self.ray }
}

impl DerefMut for RayDifferential {
    fn deref_mut(&mut self) -> &mut Ray { &mut self.ray }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Differential {
    pub rx_origin: Point3f,
    pub ry_origin: Point3f,
    pub rx_dir: Vec3f,
    pub ry_dir: Vec3f,
}

/// A surface normal. Kept as a distinct type from `Vec3f` so that the two
/// can't be silently mixed (normals transform by the inverse-transpose,
/// vectors don't) while still giving free access to all of `Vec3f`'s
/// arithmetic via `Deref`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Normal3(pub Vec3f);

impl Normal3 {
    pub fn new(x: Float, y: Float, z: Float) -> Self {
        Normal3(Vec3f::new(x, y, z))
    }

    pub fn zero() -> Self {
        Normal3(Vec3f::new(0.0, 0.0, 0.0))
    }

    pub fn faceforward(&self, v: Vec3f) -> Normal3 {
        if self.0.dot(v) < 0.0 { Normal3(-self.0) } else { *self }
    }
}

impl Deref for Normal3 {
    type Target = Vec3f;
    fn deref(&self) -> &Vec3f { &self.0 }
}

impl DerefMut for Normal3 {
    fn deref_mut(&mut self) -> &mut Vec3f { &mut self.0 }
}

impl From<Vec3f> for Normal3 {
    fn from(v: Vec3f) -> Self { Normal3(v) }
}

impl From<Normal3> for Vec3f {
    fn from(n: Normal3) -> Self { n.0 }
}

impl Neg for Normal3 {
    type Output = Normal3;
    fn neg(self) -> Normal3 { Normal3(-self.0) }
}

impl Mul<Float> for Normal3 {
    type Output = Normal3;
    fn mul(self, rhs: Float) -> Normal3 { Normal3(self.0 * rhs) }
}

impl MulAssign<Float> for Normal3 {
    fn mul_assign(&mut self, rhs: Float) { self.0 *= rhs; }
}
