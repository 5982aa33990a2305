//! Core numeric/geometric prelude plus the global-illumination modules.
//!
//! The geometric type aliases (`Point3f`, `Vec3f`, ...), the small helper
//! functions that operate on them, and the `macro_use`d constructor macros
//! live at the crate root so that every module can `use crate::{...}`
//! without threading a `geometry::` prefix through the whole tree.

pub mod err_float;
#[macro_use]
pub mod math;
pub mod geometry;
pub mod interaction;
pub mod primitive;
pub mod shapes;
pub mod bvh;
pub mod camera;
pub mod film;
pub mod filter;
pub mod sampler;
pub mod sampling;
pub mod spectrum;
pub mod reflection;
pub mod fresnel;
pub mod material;
pub mod light;
pub mod scene;
pub mod texture;
pub mod blocked_array;
pub mod morton;
pub mod fast_rand;
pub mod id_arena;

pub mod photon;
pub mod kdtree;
pub mod photon_volume;
pub mod medium;
pub mod integrator;
pub mod render;
pub mod config;
pub mod error;
pub mod photon_map;

pub use std::f32::consts;

use cgmath::{Point2, Point3, Vector2, Vector3};
use std::ops::{Deref, DerefMut};

/// The renderer's working precision. Everything downstream is generic over
/// this only incidentally; in practice it is always `f32`.
pub type Float = f32;

pub type Point2f = Point2<Float>;
pub type Point2i = Point2<i32>;
pub type Point3f = Point3<Float>;
pub type Vec2f = Vector2<Float>;
pub type Vec2i = Vector2<i32>;
pub type Vec3f = Vector3<Float>;

pub use err_float::EFloat;
pub use geometry::{Ray, RayDifferential, Differential, Normal3};
pub use geometry::transform::{Transform, Transformable, TransformableErr};
pub use geometry::bounds::{Bounds2, Bounds2f, Bounds2i, Bounds3, Bounds3f};
pub use interaction::SurfaceInteraction;
pub use math::{lerp, INFINITY};

/// Scalar element of a `Bounds2`/`Bounds3` corner. Implemented for the two
/// types we actually bound: pixel/tile integer coordinates and world-space
/// floats.
pub trait Scalar: cgmath::BaseNum + num::Bounded + num::NumCast + Copy {
    fn min(a: Self, b: Self) -> Self;
    fn max(a: Self, b: Self) -> Self;
}

impl Scalar for f32 {
    fn min(a: Self, b: Self) -> Self { f32::min(a, b) }
    fn max(a: Self, b: Self) -> Self { f32::max(a, b) }
}

impl Scalar for i32 {
    fn min(a: Self, b: Self) -> Self { std::cmp::min(a, b) }
    fn max(a: Self, b: Self) -> Self { std::cmp::max(a, b) }
}

/// Component-wise operations that cgmath's vector/point types don't provide
/// directly (they're intentionally minimal; this crate needs `abs`/`min`/
/// `max`/`ceil`/`floor` all over the film and triangle-intersection code).
pub trait ComponentWiseExt: Sized + Copy {
    fn abs(self) -> Self;
    fn min(self, other: Self) -> Self;
    fn max(self, other: Self) -> Self;
    fn ceil(self) -> Self;
    fn floor(self) -> Self;
}

macro_rules! impl_componentwise2 {
    ($t:ty) => {
        impl ComponentWiseExt for $t {
            fn abs(self) -> Self { Self::new(self.x.abs(), self.y.abs()) }
            fn min(self, o: Self) -> Self { Self::new(self.x.min(o.x), self.y.min(o.y)) }
            fn max(self, o: Self) -> Self { Self::new(self.x.max(o.x), self.y.max(o.y)) }
            fn ceil(self) -> Self { Self::new(self.x.ceil(), self.y.ceil()) }
            fn floor(self) -> Self { Self::new(self.x.floor(), self.y.floor()) }
        }
    };
}

macro_rules! impl_componentwise3 {
    ($t:ty) => {
        impl ComponentWiseExt for $t {
            fn abs(self) -> Self { Self::new(self.x.abs(), self.y.abs(), self.z.abs()) }
            fn min(self, o: Self) -> Self { Self::new(self.x.min(o.x), self.y.min(o.y), self.z.min(o.z)) }
            fn max(self, o: Self) -> Self { Self::new(self.x.max(o.x), self.y.max(o.y), self.z.max(o.z)) }
            fn ceil(self) -> Self { Self::new(self.x.ceil(), self.y.ceil(), self.z.ceil()) }
            fn floor(self) -> Self { Self::new(self.x.floor(), self.y.floor(), self.z.floor()) }
        }
    };
}

impl_componentwise2!(Vec2f);
impl_componentwise2!(Point2f);
impl_componentwise3!(Vec3f);
impl_componentwise3!(Point3f);

impl ComponentWiseExt for Point2i {
    fn abs(self) -> Self { Self::new(self.x.abs(), self.y.abs()) }
    fn min(self, o: Self) -> Self { Self::new(self.x.min(o.x), self.y.min(o.y)) }
    fn max(self, o: Self) -> Self { Self::new(self.x.max(o.x), self.y.max(o.y)) }
    fn ceil(self) -> Self { self }
    fn floor(self) -> Self { self }
}

impl ComponentWiseExt for Vec2i {
    fn abs(self) -> Self { Self::new(self.x.abs(), self.y.abs()) }
    fn min(self, o: Self) -> Self { Self::new(self.x.min(o.x), self.y.min(o.y)) }
    fn max(self, o: Self) -> Self { Self::new(self.x.max(o.x), self.y.max(o.y)) }
    fn ceil(self) -> Self { self }
    fn floor(self) -> Self { self }
}

/// Vector float-point helper, kept separate from `ComponentWiseExt` because
/// only floating types need it.
pub trait Lerp {
    fn lerp(self, other: Self, t: Float) -> Self;
}

impl Lerp for Point2f {
    fn lerp(self, other: Self, t: Float) -> Self {
        self + (other - self) * t
    }
}

impl Lerp for Point2i {
    fn lerp(self, other: Self, t: Float) -> Self {
        Point2i::new(
            crate::math::lerp(t, self.x as Float, other.x as Float).round() as i32,
            crate::math::lerp(t, self.y as Float, other.y as Float).round() as i32,
        )
    }
}

/// Index of the component with largest magnitude; used to permute a ray so
/// its direction's largest component is treated as "z" for watertight
/// ray-triangle intersection (Woop et al., as used in pbrt's `Triangle::Intersect`).
pub fn max_dimension(v: Vec3f) -> usize {
    if v.x > v.y && v.x > v.z { 0 } else if v.y > v.z { 1 } else { 2 }
}

pub fn permute_vec(v: Vec3f, x: usize, y: usize, z: usize) -> Vec3f {
    Vec3f::new(v[x], v[y], v[z])
}

pub fn permute_point(p: Point3f, x: usize, y: usize, z: usize) -> Point3f {
    Point3f::new(p[x], p[y], p[z])
}

/// Builds an arbitrary orthonormal basis `(v2, v3)` around the unit vector
/// `v1`, following Duff et al.'s branchless construction as used by pbrt.
pub fn coordinate_system(v1: Vec3f) -> (Vec3f, Vec3f) {
    let v2 = if v1.x.abs() > v1.y.abs() {
        Vec3f::new(-v1.z, 0.0, v1.x) / (v1.x * v1.x + v1.z * v1.z).sqrt()
    } else {
        Vec3f::new(0.0, v1.z, -v1.y) / (v1.y * v1.y + v1.z * v1.z).sqrt()
    };
    let v3 = v1.cross(v2);
    (v2, v3)
}

/// Flips `n` so that it lies in the same hemisphere as `v`.
pub fn faceforward<V>(n: V, v: V) -> V
where
    V: cgmath::InnerSpace<Scalar = Float> + std::ops::Neg<Output = V>,
{
    if n.dot(v) < 0.0 { -n } else { n }
}

pub fn abs_dot<V: cgmath::InnerSpace<Scalar = Float>>(v1: V, v2: V) -> Float {
    v1.dot(v2).abs()
}

/// Offsets a ray origin away from a surface by an amount proportional to the
/// surface-intersection error bounds, avoiding self-intersection without a
/// fixed epsilon (pbrt §3.9.5).
pub fn offset_ray_origin(p: &Point3f, p_err: &Vec3f, n: &Normal3, w: &Vec3f) -> Point3f {
    let d = abs_dot(Vec3f::new(n.x.abs(), n.y.abs(), n.z.abs()), *p_err);
    let mut offset = d * n.0;
    if w.dot(n.0) < 0.0 {
        offset = -offset;
    }
    let mut po = *p + offset;
    for i in 0..3 {
        if offset[i] > 0.0 {
            po[i] = err_float::next_float_up(po[i]);
        } else if offset[i] < 0.0 {
            po[i] = err_float::next_float_down(po[i]);
        }
    }
    po
}

/// Solves `A x = b` for a 2x2 system, returning `None` if `A` is singular.
pub fn solve_linear_system_2x2(a: cgmath::Matrix2<Float>, b: Vec2f) -> Option<Vec2f> {
    let det = a.x.x * a.y.y - a.x.y * a.y.x;
    if det.abs() < 1e-10 {
        return None;
    }
    let x0 = (a.y.y * b.x - a.x.y * b.y) / det;
    let x1 = (a.x.x * b.y - a.y.x * b.x) / det;
    if x0.is_nan() || x1.is_nan() {
        return None;
    }
    Some(Vec2f::new(x0, x1))
}

pub fn spherical_direction(sin_theta: Float, cos_theta: Float, phi: Float) -> Vec3f {
    Vec3f::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta)
}

pub fn spherical_theta(v: Vec3f) -> Float {
    v.z.max(-1.0).min(1.0).acos()
}

pub fn spherical_phi(v: Vec3f) -> Float {
    let p = v.y.atan2(v.x);
    if p < 0.0 { p + 2.0 * consts::PI } else { p }
}

/// Convenience macro for building a `Vec3f` from integer or float literals.
#[macro_export]
macro_rules! vec3f {
    ($x:expr, $y:expr, $z:expr) => {
        $crate::Vec3f::new($x as $crate::Float, $y as $crate::Float, $z as $crate::Float)
    };
}

#[macro_export]
macro_rules! point3f {
    ( ($x:expr , $y:expr , $z:expr) ) => {
        $crate::Point3f::new($x as $crate::Float, $y as $crate::Float, $z as $crate::Float)
    };
    ($x:expr , $y:expr , $z:expr) => {
        $crate::Point3f::new($x as $crate::Float, $y as $crate::Float, $z as $crate::Float)
    };
}

#[macro_export]
macro_rules! bounds3f {
    ( $p1:tt, $p2:tt ) => {
        $crate::Bounds3f::with_bounds($crate::point3f![$p1], $crate::point3f![$p2])
    };
}

/// Shorthand for squaring a numeric expression; used throughout the
/// reflection-model math where pbrt writes `Sqr(x)`.
#[macro_export]
macro_rules! sq {
    ($x:expr) => {
        ($x) * ($x)
    };
}
