//! Scene components
//!
//! Components attach behavior and property providers to nodes. Instead of a
//! deep inheritance spine, there is one [`Component`] trait with capability
//! hooks that concrete components implement selectively:
//!
//! - `on_attached` / `on_detached` — register/unregister providers into the
//!   node's store; run synchronously before the structural event bubbles;
//! - `on_root_changed` — re-home root-scoped data when the node's subtree is
//!   linked under a different root;
//! - `is_root_singleton` — opt into the unique-per-root cardinality check.
//!
//! Concrete components are cheaply clonable shared handles (their state
//! lives behind `Rc`), mirroring providers: a shared `Effect`'s providers
//! may be referenced from many places while the node owns the component
//! registration itself.

mod camera;
mod light;
mod surface;
mod transform;

pub use camera::PerspectiveCamera;
pub use light::{AmbientLight, DirectionalLight, LightManager};
pub use surface::{Surface, SurfaceChange, SurfaceId};
pub use transform::{update_world_transforms, Transform};

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::scene::{Node, SceneError};

/// Behavior attachable to a scene node
pub trait Component: Any {
    /// Concrete type name, for logging and error messages
    fn type_name(&self) -> &'static str;

    /// Called synchronously when the component is attached, before the
    /// `ComponentAdded` event bubbles
    fn on_attached(&mut self, node: &Node) -> Result<(), SceneError> {
        let _ = node;
        Ok(())
    }

    /// Called synchronously when the component is detached
    fn on_detached(&mut self, node: &Node) {
        let _ = node;
    }

    /// Called when the node's root changes (subtree linked or unlinked)
    fn on_root_changed(&mut self, node: &Node) -> Result<(), SceneError> {
        let _ = node;
        Ok(())
    }

    /// Whether at most one instance of this type may exist per root
    fn is_root_singleton(&self) -> bool {
        false
    }

    /// Downcast support
    fn as_any(&self) -> &dyn Any;

    /// Mutable downcast support
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Shared handle to an attached component, as stored on a node
pub type ComponentHandle = Rc<RefCell<dyn Component>>;
