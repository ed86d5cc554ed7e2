//! A resolved `(surface, pass)` draw call
//!
//! A draw call is the cached product of binding resolution: a compiled
//! program variant, concrete GPU buffers, and per-uniform property slots.
//! Uniform VALUES are not cached; each slot holds a weak provider reference
//! and a key, read live when the call is submitted, so plain value changes
//! (recoloring a material) never rebuild the call.

use super::backend::{BufferHandle, DrawSubmission, ProgramHandle};
use super::pass::PassStates;
use crate::data::{PropertyValue, WeakProvider};
use crate::foundation::math::{Mat4, Point3};

/// A uniform slot: where the value lives, read at submission time
///
/// The `default` carries the binding's authored value; it is submitted when
/// the property location does not resolve or has disappeared.
#[derive(Debug, Clone)]
pub(crate) struct UniformSlot {
    pub(crate) name: String,
    pub(crate) provider: WeakProvider,
    pub(crate) key: String,
    pub(crate) default: Option<PropertyValue>,
}

/// One submittable draw call
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub(crate) pass_name: String,
    pub(crate) program: ProgramHandle,
    pub(crate) vertex_buffers: Vec<BufferHandle>,
    pub(crate) index_buffer: BufferHandle,
    pub(crate) index_count: usize,
    pub(crate) uniforms: Vec<UniformSlot>,
    pub(crate) states: PassStates,
    // Matrix slots for depth sorting; absent when the scene has no
    // transform or camera.
    pub(crate) world: Option<UniformSlot>,
    pub(crate) view: Option<UniformSlot>,
}

impl DrawCall {
    /// Name of the pass this call was resolved for
    pub fn pass_name(&self) -> &str {
        &self.pass_name
    }

    /// The compiled program variant
    pub fn program(&self) -> ProgramHandle {
        self.program
    }

    /// Number of indices drawn
    pub fn index_count(&self) -> usize {
        self.index_count
    }

    /// Fixed-function states
    pub fn states(&self) -> &PassStates {
        &self.states
    }

    /// Build the submission, reading uniform values live
    ///
    /// Slots whose provider has been dropped or whose key has disappeared
    /// fall back to the binding's authored default; lacking one, the slot is
    /// skipped with a warning and the draw proceeds with the uniforms that
    /// still resolve.
    pub fn submission(&self) -> DrawSubmission {
        let mut uniforms = Vec::with_capacity(self.uniforms.len());
        for slot in &self.uniforms {
            let live = slot
                .provider
                .upgrade()
                .and_then(|provider| provider.get_value(&slot.key));
            match live.or_else(|| slot.default.clone()) {
                Some(value) => uniforms.push((slot.name.clone(), value)),
                None => log::warn!(
                    "uniform '{}': property '{}' unresolved and no default",
                    slot.name,
                    slot.key
                ),
            }
        }
        DrawSubmission {
            program: self.program,
            vertex_buffers: self.vertex_buffers.clone(),
            index_buffer: self.index_buffer,
            index_count: self.index_count,
            uniforms,
            states: self.states.clone(),
        }
    }

    /// Eye-space depth of the call's origin, for back-to-front sorting
    ///
    /// More negative is farther from the camera.
    pub fn depth(&self) -> f32 {
        let world = read_matrix(self.world.as_ref());
        let view = read_matrix(self.view.as_ref());
        (view * world).transform_point(&Point3::origin()).z
    }
}

fn read_matrix(slot: Option<&UniformSlot>) -> Mat4 {
    if let Some(slot) = slot {
        if let Some(provider) = slot.provider.upgrade() {
            if let Ok(matrix) = provider.get::<Mat4>(&slot.key) {
                return matrix;
            }
        }
    }
    Mat4::identity()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{PropertyValue, Provider};
    use crate::foundation::math::Vec4;

    fn call_with_uniform(provider: &Provider) -> DrawCall {
        DrawCall {
            pass_name: "p0".into(),
            program: ProgramHandle(1),
            vertex_buffers: vec![BufferHandle(1)],
            index_buffer: BufferHandle(2),
            index_count: 36,
            uniforms: vec![UniformSlot {
                name: "uColor".into(),
                provider: provider.downgrade(),
                key: "diffuseColor".into(),
                default: None,
            }],
            states: PassStates::default(),
            world: None,
            view: None,
        }
    }

    #[test]
    fn test_uniform_values_read_live() {
        let provider = Provider::new();
        provider.set("diffuseColor", Vec4::new(1.0, 0.0, 0.0, 1.0));
        let call = call_with_uniform(&provider);

        provider.set("diffuseColor", Vec4::new(0.0, 1.0, 0.0, 1.0));
        let submission = call.submission();
        assert_eq!(submission.uniforms.len(), 1);
        assert_eq!(
            submission.uniforms[0].1,
            PropertyValue::Vec4(Vec4::new(0.0, 1.0, 0.0, 1.0))
        );
    }

    #[test]
    fn test_dropped_provider_is_skipped() {
        let provider = Provider::new();
        provider.set("diffuseColor", Vec4::new(1.0, 0.0, 0.0, 1.0));
        let call = call_with_uniform(&provider);

        drop(provider);
        let submission = call.submission();
        assert!(submission.uniforms.is_empty());
    }

    #[test]
    fn test_authored_default_fills_unresolved_slot() {
        let provider = Provider::new();
        let mut call = call_with_uniform(&provider);
        call.uniforms[0].default = Some(PropertyValue::Vec4(Vec4::new(1.0, 1.0, 1.0, 1.0)));

        drop(provider);
        let submission = call.submission();
        assert_eq!(
            submission.uniforms[0].1,
            PropertyValue::Vec4(Vec4::new(1.0, 1.0, 1.0, 1.0))
        );
    }
}
