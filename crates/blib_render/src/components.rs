//! Components the renderer reads from the registry.

use crate::scene::{PipelineId, SceneId, SceneKey, UpdateSpeed};
use blib_core::define_component;
use blib_core::ecs::Component;
use blib_core::math::{model_2d, Mat4, Quat, Vec2, Vec3};
use bytemuck::{Pod, Zeroable};

/// A component mirrored into a per-object descriptor payload.
///
/// `version` must change whenever the payload would change. Setters on the
/// built-in components bump it; `mark_dirty` forces a re-copy.
pub trait DescriptorComponent: Component {
    type Payload: Pod + Default + Send + Sync;

    fn version(&self) -> u32;

    fn refresh_descriptor(&self, payload: &mut Self::Payload);
}

/// Model matrix, column major.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ModelPayload {
    pub model: [[f32; 4]; 4],
}

impl Default for ModelPayload {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct TexturePayload {
    pub index: u32,
    _pad: [u32; 3],
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform2D {
    position: Vec2,
    rotation: f32,
    scale: Vec2,
    depth: f32,
    version: u32,
}

define_component!(Transform2D);

impl Transform2D {
    pub fn new(position: Vec2) -> Self {
        Self {
            position,
            rotation: 0.0,
            scale: Vec2::ONE,
            depth: 0.0,
            version: 1,
        }
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    pub fn scale(&self) -> Vec2 {
        self.scale
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    pub fn set_position(&mut self, position: Vec2) {
        self.position = position;
        self.mark_dirty();
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.set_position(self.position + delta);
    }

    /// Rotation in radians.
    pub fn set_rotation(&mut self, radians: f32) {
        self.rotation = radians;
        self.mark_dirty();
    }

    pub fn rotate(&mut self, radians: f32) {
        self.set_rotation(self.rotation + radians);
    }

    pub fn set_scale(&mut self, scale: Vec2) {
        self.scale = scale;
        self.mark_dirty();
    }

    pub fn set_depth(&mut self, depth: f32) {
        self.depth = depth;
        self.mark_dirty();
    }

    pub fn mark_dirty(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn model(&self) -> Mat4 {
        model_2d(self.position, self.rotation, self.scale, self.depth)
    }
}

impl DescriptorComponent for Transform2D {
    type Payload = ModelPayload;

    fn version(&self) -> u32 {
        self.version
    }

    fn refresh_descriptor(&self, payload: &mut ModelPayload) {
        payload.model = self.model().to_cols_array_2d();
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform3D {
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
    version: u32,
}

define_component!(Transform3D);

impl Transform3D {
    pub fn new(translation: Vec3) -> Self {
        Self {
            translation,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            version: 1,
        }
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn rotation(&self) -> Quat {
        self.rotation
    }

    pub fn set_translation(&mut self, translation: Vec3) {
        self.translation = translation;
        self.mark_dirty();
    }

    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.mark_dirty();
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.mark_dirty();
    }

    pub fn mark_dirty(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    pub fn model(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl DescriptorComponent for Transform3D {
    type Payload = ModelPayload;

    fn version(&self) -> u32 {
        self.version
    }

    fn refresh_descriptor(&self, payload: &mut ModelPayload) {
        payload.model = self.model().to_cols_array_2d();
    }
}

/// Index into the bound texture array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Texture {
    index: u32,
    version: u32,
}

define_component!(Texture);

impl Texture {
    pub fn new(index: u32) -> Self {
        Self { index, version: 1 }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn set_index(&mut self, index: u32) {
        if index != self.index {
            self.index = index;
            self.version = self.version.wrapping_add(1);
        }
    }
}

impl DescriptorComponent for Texture {
    type Payload = TexturePayload;

    fn version(&self) -> u32 {
        self.version
    }

    fn refresh_descriptor(&self, payload: &mut TexturePayload) {
        payload.index = self.index;
    }
}

/// Request to draw an entity. The object sync system places entities
/// carrying this into `scene`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rendered {
    pub scene: SceneId,
    pub pipeline: PipelineId,
    pub speed: UpdateSpeed,
}

define_component!(Rendered);

/// Back-reference from an entity to its scene slot. Validated against the
/// scene generation on use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneLink {
    pub scene: SceneId,
    pub key: SceneKey,
}

define_component!(SceneLink);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_bump_version() {
        let mut t = Transform2D::new(Vec2::new(1.0, 2.0));
        let v = t.version();
        t.translate(Vec2::X);
        assert_ne!(t.version(), v);
        assert_eq!(t.position(), Vec2::new(2.0, 2.0));

        let mut tex = Texture::new(3);
        let v = tex.version();
        tex.set_index(3);
        assert_eq!(tex.version(), v);
        tex.set_index(4);
        assert_ne!(tex.version(), v);
    }

    #[test]
    fn payloads_carry_component_state() {
        let mut t = Transform3D::new(Vec3::new(0.0, 5.0, 0.0));
        t.set_scale(Vec3::splat(2.0));
        let mut payload = ModelPayload::default();
        t.refresh_descriptor(&mut payload);
        let m = Mat4::from_cols_array_2d(&payload.model);
        assert_eq!(m.transform_point3(Vec3::X), Vec3::new(2.0, 5.0, 0.0));

        let mut tp = TexturePayload::default();
        Texture::new(12).refresh_descriptor(&mut tp);
        assert_eq!(tp.index, 12);
        assert_eq!(std::mem::size_of::<TexturePayload>(), 16);
    }
}
