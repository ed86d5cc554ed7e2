//! Renderer component: frame orchestration
//!
//! The renderer owns a [`DrawCallPool`] bound to the tree it is attached to.
//! At attach time it scans the root's subtree for existing surfaces, then
//! keeps the pool current by observing the root's structural events, so
//! surfaces added or removed anywhere in the tree show up without a rescan.
//! Each frame it propagates world transforms, clears, and submits the pool's
//! draw calls in sorted order.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use super::backend::{ClearFlags, SharedBackend};
use super::draw_call_pool::DrawCallPool;
use crate::component::{update_world_transforms, Component, ComponentHandle, PerspectiveCamera, Surface};
use crate::foundation::math::Vec4;
use crate::foundation::signal::Slot;
use crate::scene::{Node, NodeSet, SceneError, SceneEvent, SceneEventKind, WeakNode};

/// Counters of one rendered frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Draw calls submitted
    pub draw_calls: usize,
    /// Triangles submitted
    pub triangles: usize,
    /// Program variants compiled so far, cumulative
    pub programs: usize,
}

struct RendererShared {
    backend: SharedBackend,
    clear_flags: RefCell<ClearFlags>,
    clear_color: RefCell<Vec4>,
    pool: RefCell<Option<DrawCallPool>>,
    root_slot: RefCell<Option<Slot>>,
    node: RefCell<WeakNode>,
    stats: RefCell<FrameStats>,
}

/// Shared handle to a renderer component
#[derive(Clone)]
pub struct Renderer {
    inner: Rc<RendererShared>,
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("stats", &*self.inner.stats.borrow())
            .finish()
    }
}

fn surface_of(handle: &ComponentHandle) -> Option<Surface> {
    handle
        .try_borrow()
        .ok()
        .and_then(|guard| guard.as_any().downcast_ref::<Surface>().cloned())
}

fn add_subtree_surfaces(pool: &DrawCallPool, subtree: &Node) {
    for node in NodeSet::from(subtree).descendants(true).nodes() {
        for handle in node.components() {
            if let Some(surface) = surface_of(&handle) {
                pool.add_surface(&surface, node);
            }
        }
    }
}

fn remove_subtree_surfaces(pool: &DrawCallPool, subtree: &Node) {
    for node in NodeSet::from(subtree).descendants(true).nodes() {
        for handle in node.components() {
            if let Some(surface) = surface_of(&handle) {
                pool.remove_surface(surface.id());
            }
        }
    }
}

impl Renderer {
    /// Renderer clearing color and depth to opaque black
    pub fn new(backend: SharedBackend) -> Self {
        Self {
            inner: Rc::new(RendererShared {
                backend,
                clear_flags: RefCell::new(ClearFlags::COLOR | ClearFlags::DEPTH),
                clear_color: RefCell::new(Vec4::new(0.0, 0.0, 0.0, 1.0)),
                pool: RefCell::new(None),
                root_slot: RefCell::new(None),
                node: RefCell::new(WeakNode::empty()),
                stats: RefCell::new(FrameStats::default()),
            }),
        }
    }

    /// Set the clear color
    pub fn set_clear_color(&self, color: Vec4) {
        *self.inner.clear_color.borrow_mut() = color;
    }

    /// Set which attachments are cleared each frame
    pub fn set_clear_flags(&self, flags: ClearFlags) {
        *self.inner.clear_flags.borrow_mut() = flags;
    }

    /// Push a new viewport size to the camera on this renderer's node
    pub fn set_viewport(&self, width: u32, height: u32) {
        if height == 0 {
            return;
        }
        let aspect = width as f32 / height as f32;
        if let Some(node) = self.inner.node.borrow().upgrade() {
            node.with_component::<PerspectiveCamera, ()>(|camera| camera.set_aspect(aspect));
        }
    }

    /// Counters of the last rendered frame
    pub fn stats(&self) -> FrameStats {
        *self.inner.stats.borrow()
    }

    /// Number of live draw calls
    pub fn draw_call_count(&self) -> usize {
        self.inner.pool.borrow().as_ref().map_or(0, DrawCallPool::len)
    }

    /// Number of surfaces the pool tracks
    pub fn surface_count(&self) -> usize {
        self.inner
            .pool
            .borrow()
            .as_ref()
            .map_or(0, DrawCallPool::surface_count)
    }

    /// Propagate world transforms, then render one frame
    pub fn enter_frame(&self) -> FrameStats {
        if let Some(node) = self.inner.node.borrow().upgrade() {
            update_world_transforms(&node.root());
        }
        self.render()
    }

    /// Clear and submit every draw call in sorted order
    ///
    /// A submission failure is logged and skipped; the rest of the frame
    /// still draws.
    pub fn render(&self) -> FrameStats {
        let mut stats = FrameStats::default();
        let pool = self.inner.pool.borrow().clone();
        let Some(pool) = pool else {
            return stats;
        };

        let calls = pool.sorted_calls();
        let mut backend = self.inner.backend.borrow_mut();
        backend.clear(*self.inner.clear_flags.borrow(), *self.inner.clear_color.borrow());
        for call in &calls {
            let submission = call.submission();
            match backend.submit(&submission) {
                Ok(()) => {
                    stats.draw_calls += 1;
                    stats.triangles += submission.index_count / 3;
                }
                Err(error) => log::warn!("pass '{}' submit failed: {error}", call.pass_name()),
            }
        }
        drop(backend);

        stats.programs = pool.program_count();
        *self.inner.stats.borrow_mut() = stats;
        stats
    }

    /// Bind the pool and observers to the tree `node` belongs to.
    fn bind(&self, node: &Node) {
        let root = node.root();
        let pool = DrawCallPool::new(self.inner.backend.clone(), node.store(), root.store());

        add_subtree_surfaces(&pool, &root);

        let observed = pool.clone();
        let slot = root.observers().connect(move |event: &SceneEvent| match event.kind {
            SceneEventKind::ComponentAdded => {
                if let Some(surface) = event.component.as_ref().and_then(surface_of) {
                    observed.add_surface(&surface, &event.target);
                }
            }
            SceneEventKind::ComponentRemoved => {
                if let Some(surface) = event.component.as_ref().and_then(surface_of) {
                    observed.remove_surface(surface.id());
                }
            }
            SceneEventKind::NodeAdded => {
                if let Some(child) = &event.child {
                    add_subtree_surfaces(&observed, child);
                }
            }
            SceneEventKind::NodeRemoved => {
                if let Some(child) = &event.child {
                    remove_subtree_surfaces(&observed, child);
                }
            }
        });

        *self.inner.pool.borrow_mut() = Some(pool);
        *self.inner.root_slot.borrow_mut() = Some(slot);
        *self.inner.node.borrow_mut() = node.downgrade();
    }
}

impl Component for Renderer {
    fn type_name(&self) -> &'static str {
        "Renderer"
    }

    fn on_attached(&mut self, node: &Node) -> Result<(), SceneError> {
        self.bind(node);
        Ok(())
    }

    fn on_detached(&mut self, _node: &Node) {
        *self.inner.root_slot.borrow_mut() = None;
        *self.inner.pool.borrow_mut() = None;
        *self.inner.node.borrow_mut() = WeakNode::empty();
    }

    fn on_root_changed(&mut self, node: &Node) -> Result<(), SceneError> {
        // Rebind against the new root: fresh pool, fresh observers.
        self.bind(node);
        Ok(())
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
    use crate::render::{
        AttributeBinding, Effect, Geometry, HeadlessBackend, Material, Pass, PassStates,
        ProgramTemplate, Technique,
    };

    fn flat_effect() -> Effect {
        let effect = Effect::new("flat");
        effect.add_technique(Technique::new(
            "default",
            vec![Pass::new("flat", ProgramTemplate::new("flat", "vs", "fs"))
                .with_attribute(AttributeBinding::new("aPosition", "geometry.position"))],
        ));
        effect
    }

    fn cube_surface() -> Surface {
        Surface::new(Geometry::cube(), Material::new("m"), flat_effect(), "default").unwrap()
    }

    #[test]
    fn test_scans_existing_surfaces_and_tracks_new_ones() {
        let root = Node::new("root");
        let existing = Node::new("existing");
        root.add_child(&existing).unwrap();
        existing.add_component(cube_surface()).unwrap();

        let backend = HeadlessBackend::new().into_shared();
        let renderer = Renderer::new(backend);
        root.add_component(renderer.clone()).unwrap();
        assert_eq!(renderer.surface_count(), 1);

        let late = Node::new("late");
        late.add_component(cube_surface()).unwrap();
        root.add_child(&late).unwrap();
        assert_eq!(renderer.surface_count(), 2);

        root.remove_child(&late).unwrap();
        assert_eq!(renderer.surface_count(), 1);
    }

    #[test]
    fn test_render_clears_and_submits() {
        let root = Node::new("root");
        root.add_component(cube_surface()).unwrap();

        let backend = HeadlessBackend::new().into_shared();
        let shared: SharedBackend = backend.clone();
        let renderer = Renderer::new(shared);
        root.add_component(renderer.clone()).unwrap();

        let stats = renderer.enter_frame();
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(stats.triangles, 12);
        assert_eq!(backend.borrow().clear_count(), 1);
        assert_eq!(backend.borrow_mut().take_submissions().len(), 1);
    }

    #[test]
    fn test_priority_orders_submissions() {
        let root = Node::new("root");

        let make_effect = |priority: f32| {
            let effect = Effect::new("e");
            effect.add_technique(Technique::new(
                "default",
                vec![Pass::new("p", ProgramTemplate::new("flat", "vs", "fs"))
                    .with_attribute(AttributeBinding::new("aPosition", "geometry.position"))
                    .with_states(PassStates {
                        priority,
                        ..PassStates::default()
                    })],
            ));
            effect
        };

        let low = Node::new("low");
        let high = Node::new("high");
        root.add_child(&low).unwrap();
        root.add_child(&high).unwrap();
        low.add_component(
            Surface::new(Geometry::cube(), Material::new("l"), make_effect(0.0), "default")
                .unwrap(),
        )
        .unwrap();
        high.add_component(
            Surface::new(Geometry::cube(), Material::new("h"), make_effect(10.0), "default")
                .unwrap(),
        )
        .unwrap();

        let backend = HeadlessBackend::new().into_shared();
        let shared: SharedBackend = backend.clone();
        let renderer = Renderer::new(shared);
        root.add_component(renderer.clone()).unwrap();

        let pool = renderer.inner.pool.borrow().clone().unwrap();
        let calls = pool.sorted_calls();
        assert_eq!(calls[0].states().priority, 10.0);
        assert_eq!(calls[1].states().priority, 0.0);
    }
}
