//! Transform component and world matrix propagation
//!
//! Each transform owns a local [`TransformData`] and publishes the composed
//! world matrix into its node's store as `transform.modelToWorldMatrix`.
//! Propagation is a single pre-order walk per frame from the root, driven by
//! [`update_world_transforms`]; the store is only written when a matrix
//! actually changed, so unrelated draw-call observers stay quiet for static
//! subtrees.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use super::Component;
use crate::data::Provider;
use crate::foundation::math::{Mat4, Quat, TransformData, Vec3};
use crate::scene::{Node, SceneError};

/// Store key the composed world matrix is published under
pub const MODEL_TO_WORLD: &str = "modelToWorldMatrix";

struct TransformShared {
    local: RefCell<TransformData>,
    provider: Provider,
}

/// Shared handle to a transform component
#[derive(Clone)]
pub struct Transform {
    inner: Rc<TransformShared>,
}

impl std::fmt::Debug for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transform")
            .field("local", &*self.inner.local.borrow())
            .finish()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl Transform {
    /// Identity transform
    pub fn new() -> Self {
        Self::with_local(TransformData::identity())
    }

    /// Transform with the given local data
    pub fn with_local(local: TransformData) -> Self {
        let provider = Provider::new();
        provider.set(MODEL_TO_WORLD, local.to_matrix());
        Self {
            inner: Rc::new(TransformShared {
                local: RefCell::new(local),
                provider,
            }),
        }
    }

    /// Snapshot of the local transform
    pub fn local(&self) -> TransformData {
        self.inner.local.borrow().clone()
    }

    /// Replace the local transform
    pub fn set_local(&self, local: TransformData) {
        *self.inner.local.borrow_mut() = local;
    }

    /// Set the local position
    pub fn set_position(&self, position: Vec3) {
        self.inner.local.borrow_mut().position = position;
    }

    /// Set the local rotation
    pub fn set_rotation(&self, rotation: Quat) {
        self.inner.local.borrow_mut().rotation = rotation;
    }

    /// Set the local scale
    pub fn set_scale(&self, scale: Vec3) {
        self.inner.local.borrow_mut().scale = scale;
    }

    /// The composed local matrix
    pub fn local_matrix(&self) -> Mat4 {
        self.inner.local.borrow().to_matrix()
    }

    /// The world matrix as last propagated
    pub fn world_matrix(&self) -> Mat4 {
        self.inner
            .provider
            .get(MODEL_TO_WORLD)
            .unwrap_or_else(|_| Mat4::identity())
    }

    fn publish_world(&self, world: Mat4) {
        let current: Option<Mat4> = self.inner.provider.get(MODEL_TO_WORLD).ok();
        if current != Some(world) {
            self.inner.provider.set(MODEL_TO_WORLD, world);
        }
    }
}

impl Component for Transform {
    fn type_name(&self) -> &'static str {
        "Transform"
    }

    fn on_attached(&mut self, node: &Node) -> Result<(), SceneError> {
        node.store().add_provider(&self.inner.provider, "transform")?;
        Ok(())
    }

    fn on_detached(&mut self, node: &Node) {
        if let Err(error) = node.store().remove_provider(&self.inner.provider, "transform") {
            log::warn!("transform detach from '{}': {error}", node.name());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Propagate world matrices through the tree under `root`
///
/// Nodes without a transform pass their parent's world matrix through
/// unchanged.
pub fn update_world_transforms(root: &Node) {
    propagate(root, Mat4::identity());
}

fn propagate(node: &Node, parent_world: Mat4) {
    let world = node
        .with_component::<Transform, Mat4>(|transform| {
            let world = parent_world * transform.local_matrix();
            transform.publish_world(world);
            world
        })
        .unwrap_or(parent_world);

    for child in node.children() {
        propagate(&child, world);
    }
}
