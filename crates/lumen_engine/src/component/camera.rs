//! Perspective camera component

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use nalgebra::Perspective3;

use super::Component;
use crate::data::Provider;
use crate::foundation::math::{Mat4, Point3, Vec3};
use crate::scene::{Node, SceneError};

struct CameraState {
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
}

struct CameraShared {
    state: RefCell<CameraState>,
    provider: Provider,
}

/// Perspective projection camera
///
/// Publishes `camera.viewMatrix`, `camera.projectionMatrix`, and
/// `camera.position` into the store of the node it is attached to. Passes
/// that bind these with [`BindingSource::Renderer`](crate::render::BindingSource)
/// expect the camera to sit on the renderer's node.
#[derive(Clone)]
pub struct PerspectiveCamera {
    inner: Rc<CameraShared>,
}

impl std::fmt::Debug for PerspectiveCamera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("PerspectiveCamera")
            .field("fov_y", &state.fov_y)
            .field("aspect", &state.aspect)
            .finish()
    }
}

impl PerspectiveCamera {
    /// Camera with the given vertical field of view (radians), aspect
    /// ratio, and clip planes
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let provider = Provider::new();
        provider
            .set("viewMatrix", Mat4::identity())
            .set(
                "projectionMatrix",
                Perspective3::new(aspect, fov_y, near, far).to_homogeneous(),
            )
            .set("position", Vec3::zeros());
        Self {
            inner: Rc::new(CameraShared {
                state: RefCell::new(CameraState {
                    fov_y,
                    aspect,
                    near,
                    far,
                }),
                provider,
            }),
        }
    }

    /// The camera's provider
    pub fn provider(&self) -> Provider {
        self.inner.provider.clone()
    }

    /// Update the aspect ratio, republishing the projection matrix
    pub fn set_aspect(&self, aspect: f32) {
        {
            let mut state = self.inner.state.borrow_mut();
            if (state.aspect - aspect).abs() < f32::EPSILON {
                return;
            }
            state.aspect = aspect;
        }
        self.republish_projection();
    }

    /// Update the vertical field of view, republishing the projection matrix
    pub fn set_fov_y(&self, fov_y: f32) {
        self.inner.state.borrow_mut().fov_y = fov_y;
        self.republish_projection();
    }

    /// Point the camera at `target` from `eye`
    pub fn look_at(&self, eye: Point3, target: Point3, up: Vec3) {
        let view = Mat4::look_at_rh(&eye, &target, &up);
        self.inner.provider.set("viewMatrix", view);
        self.inner.provider.set("position", eye.coords);
    }

    /// Current view matrix
    pub fn view_matrix(&self) -> Mat4 {
        self.inner
            .provider
            .get("viewMatrix")
            .unwrap_or_else(|_| Mat4::identity())
    }

    /// Current projection matrix
    pub fn projection_matrix(&self) -> Mat4 {
        self.inner
            .provider
            .get("projectionMatrix")
            .unwrap_or_else(|_| Mat4::identity())
    }

    fn republish_projection(&self) {
        let state = self.inner.state.borrow();
        let projection =
            Perspective3::new(state.aspect, state.fov_y, state.near, state.far).to_homogeneous();
        drop(state);
        self.inner.provider.set("projectionMatrix", projection);
    }
}

impl Component for PerspectiveCamera {
    fn type_name(&self) -> &'static str {
        "PerspectiveCamera"
    }

    fn on_attached(&mut self, node: &Node) -> Result<(), SceneError> {
        node.store().add_provider(&self.inner.provider, "camera")?;
        Ok(())
    }

    fn on_detached(&mut self, node: &Node) {
        if let Err(error) = node.store().remove_provider(&self.inner.provider, "camera") {
            log::warn!("camera detach from '{}': {error}", node.name());
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_provider_visible_through_node_store() {
        let node = Node::new("camera");
        let camera = PerspectiveCamera::new(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 100.0);
        node.add_component(camera).unwrap();

        assert!(node.store().has_property("camera.viewMatrix"));
        assert!(node.store().has_property("camera.projectionMatrix"));
    }

    #[test]
    fn test_set_aspect_republishes_projection() {
        let node = Node::new("camera");
        let camera = PerspectiveCamera::new(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0);
        node.add_component(camera.clone()).unwrap();

        let before = camera.projection_matrix();
        camera.set_aspect(2.0);
        let after = camera.projection_matrix();
        assert_ne!(before, after);
        // Wider aspect squeezes x.
        assert_relative_eq!(after.m11, before.m11 / 2.0);
    }

    #[test]
    fn test_look_at_publishes_position() {
        let camera = PerspectiveCamera::new(1.0, 1.0, 0.1, 10.0);
        camera.look_at(
            Point3::new(0.0, 0.0, 5.0),
            Point3::origin(),
            Vec3::new(0.0, 1.0, 0.0),
        );
        let position: Vec3 = camera.provider().get("position").unwrap();
        assert_relative_eq!(position.z, 5.0);
    }
}
