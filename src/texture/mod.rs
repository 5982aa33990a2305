use crate::interaction::SurfaceInteraction;
use std::sync::Arc;

pub trait Texture<T> {
    fn evaluate(&self, si: &SurfaceInteraction) -> T;
}

pub type TextureRef<T> = Arc<dyn Texture<T> + Send + Sync>;

pub struct ConstantTexture<T: Copy>(pub T);

impl<T: Copy> Texture<T> for ConstantTexture<T> {
    fn evaluate(&self, _si: &SurfaceInteraction) -> T {
        self.0
    }
}