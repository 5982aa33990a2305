use crate::geometry::bounds::Bounds3f;
use crate::medium::Medium;
use crate::{Ray, SurfaceInteraction};
use crate::material::Material;
use crate::light::AreaLight;
use crate::shapes::Shape;
use std::sync::Arc;

/// The media on either side of a primitive's surface. `None` on a side means
/// "vacuum". A primitive with no material is a pure media boundary (spec.md
/// §4.C step 5): its `inside`/`outside` determine what the medium stack
/// pushes or pops on entry/exit.
#[derive(Clone)]
pub struct MediumInterface {
    pub inside: Option<Arc<dyn Medium>>,
    pub outside: Option<Arc<dyn Medium>>,
}

impl MediumInterface {
    pub fn vacuum() -> Self {
        Self { inside: None, outside: None }
    }
}

/// Anything the aggregate (`BVH`) can hold: gives its world-space bound,
/// answers ray intersections, and exposes the material/area light attached
/// at that surface, if any.
pub trait Primitive: Sync {
    fn world_bound(&self) -> Bounds3f;

    /// Intersects `ray`, shrinking `ray.t_max` to the hit distance on success.
    fn intersect(&self, ray: &mut Ray) -> Option<SurfaceInteraction>;

    fn intersect_test(&self, ray: &Ray) -> bool;

    fn material(&self) -> Option<&dyn Material>;

    fn area_light(&self) -> Option<&dyn AreaLight>;

    /// `None` means the primitive carries no media (both sides vacuum);
    /// this is the default for ordinary shaded surfaces.
    fn medium_interface(&self) -> Option<&MediumInterface> {
        None
    }
}

/// A single shape bound to an (optional) material and an (optional) area
/// light, the leaf primitive type the scene is built out of.
pub struct GeometricPrimitive<S: Shape> {
    pub shape: S,
    pub material: Option<Arc<dyn Material>>,
    pub light: Option<Arc<dyn AreaLight>>,
    pub medium_interface: Option<MediumInterface>,
}

impl<S: Shape> GeometricPrimitive<S> {
    pub fn new(shape: S, material: Option<Arc<dyn Material>>, light: Option<Arc<dyn AreaLight>>) -> Self {
        Self { shape, material, light, medium_interface: None }
    }

    pub fn with_medium_interface(mut self, interface: MediumInterface) -> Self {
        self.medium_interface = Some(interface);
        self
    }
}

impl<S: Shape> Primitive for GeometricPrimitive<S> {
    fn world_bound(&self) -> Bounds3f {
        self.shape.world_bound()
    }

    fn intersect(&self, ray: &mut Ray) -> Option<SurfaceInteraction> {
        let (t_hit, mut si) = self.shape.intersect(ray)?;
        ray.t_max = t_hit;
        si.primitive = Some(self);
        Some(si)
    }

    fn intersect_test(&self, ray: &Ray) -> bool {
        self.shape.intersect_test(ray)
    }

    fn material(&self) -> Option<&dyn Material> {
        self.material.as_deref()
    }

    fn area_light(&self) -> Option<&dyn AreaLight> {
        self.light.as_deref()
    }

    fn medium_interface(&self) -> Option<&MediumInterface> {
        self.medium_interface.as_ref()
    }
}
