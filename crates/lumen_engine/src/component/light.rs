//! Light components and the per-root light manager
//!
//! Lights publish their providers into the store of the scene ROOT, not
//! their own node: light collections (`ambientLights`, `directionalLights`)
//! must be visible wherever passes bind against them, and passes resolve
//! root-scoped bindings against the root store. When a subtree is re-rooted,
//! each light moves its provider to the new root's store in its
//! `on_root_changed` hook.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use super::Component;
use crate::data::{Provider, Store, StoreEvent};
use crate::foundation::math::Vec3;
use crate::foundation::signal::Slot;
use crate::scene::{Node, SceneError};

/// Collection name ambient light providers register under
pub const AMBIENT_LIGHTS: &str = "ambientLights";
/// Collection name directional light providers register under
pub const DIRECTIONAL_LIGHTS: &str = "directionalLights";

/// Move `provider` from wherever it is registered to `node`'s root store.
fn rehome(
    provider: &Provider,
    registered: &RefCell<Option<Store>>,
    collection: &str,
    node: &Node,
) -> Result<(), SceneError> {
    let target = node.root().store();
    let current = registered.borrow().clone();
    if let Some(current) = current {
        if current == target {
            return Ok(());
        }
        current.remove_provider(provider, collection)?;
        *registered.borrow_mut() = None;
    }
    target.add_provider(provider, collection)?;
    *registered.borrow_mut() = Some(target);
    Ok(())
}

fn unregister(
    provider: &Provider,
    registered: &RefCell<Option<Store>>,
    collection: &str,
    node: &Node,
) {
    let current = registered.borrow_mut().take();
    if let Some(store) = current {
        if let Err(error) = store.remove_provider(provider, collection) {
            log::warn!(
                "light unregister from root of '{}': {error}",
                node.name()
            );
        }
    }
}

struct AmbientLightShared {
    provider: Provider,
    registered: RefCell<Option<Store>>,
}

/// Uniform light with no position or direction
#[derive(Clone)]
pub struct AmbientLight {
    inner: Rc<AmbientLightShared>,
}

impl AmbientLight {
    /// Ambient light with the given color and intensity
    pub fn new(color: Vec3, ambient: f32) -> Self {
        let provider = Provider::new();
        provider.set("color", color).set("ambient", ambient);
        Self {
            inner: Rc::new(AmbientLightShared {
                provider,
                registered: RefCell::new(None),
            }),
        }
    }

    /// The light's provider
    pub fn provider(&self) -> Provider {
        self.inner.provider.clone()
    }

    /// Update the light color in place
    pub fn set_color(&self, color: Vec3) {
        self.inner.provider.set("color", color);
    }

    /// Update the intensity in place
    pub fn set_ambient(&self, ambient: f32) {
        self.inner.provider.set("ambient", ambient);
    }
}

impl std::fmt::Debug for AmbientLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmbientLight")
            .field("provider", &self.inner.provider.id())
            .finish()
    }
}

impl Component for AmbientLight {
    fn type_name(&self) -> &'static str {
        "AmbientLight"
    }

    fn on_attached(&mut self, node: &Node) -> Result<(), SceneError> {
        rehome(&self.inner.provider, &self.inner.registered, AMBIENT_LIGHTS, node)
    }

    fn on_detached(&mut self, node: &Node) {
        unregister(&self.inner.provider, &self.inner.registered, AMBIENT_LIGHTS, node);
    }

    fn on_root_changed(&mut self, node: &Node) -> Result<(), SceneError> {
        rehome(&self.inner.provider, &self.inner.registered, AMBIENT_LIGHTS, node)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct DirectionalLightShared {
    provider: Provider,
    registered: RefCell<Option<Store>>,
}

/// Light with a direction but no position
#[derive(Clone)]
pub struct DirectionalLight {
    inner: Rc<DirectionalLightShared>,
}

impl DirectionalLight {
    /// Directional light with the given color, intensity, and direction
    pub fn new(color: Vec3, diffuse: f32, direction: Vec3) -> Self {
        let provider = Provider::new();
        provider
            .set("color", color)
            .set("diffuse", diffuse)
            .set("direction", direction);
        Self {
            inner: Rc::new(DirectionalLightShared {
                provider,
                registered: RefCell::new(None),
            }),
        }
    }

    /// The light's provider
    pub fn provider(&self) -> Provider {
        self.inner.provider.clone()
    }

    /// Update the direction in place
    pub fn set_direction(&self, direction: Vec3) {
        self.inner.provider.set("direction", direction);
    }

    /// Update the light color in place
    pub fn set_color(&self, color: Vec3) {
        self.inner.provider.set("color", color);
    }
}

impl std::fmt::Debug for DirectionalLight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectionalLight")
            .field("provider", &self.inner.provider.id())
            .finish()
    }
}

impl Component for DirectionalLight {
    fn type_name(&self) -> &'static str {
        "DirectionalLight"
    }

    fn on_attached(&mut self, node: &Node) -> Result<(), SceneError> {
        rehome(&self.inner.provider, &self.inner.registered, DIRECTIONAL_LIGHTS, node)
    }

    fn on_detached(&mut self, node: &Node) {
        unregister(&self.inner.provider, &self.inner.registered, DIRECTIONAL_LIGHTS, node);
    }

    fn on_root_changed(&mut self, node: &Node) -> Result<(), SceneError> {
        rehome(&self.inner.provider, &self.inner.registered, DIRECTIONAL_LIGHTS, node)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct LightManagerShared {
    provider: Provider,
    registered: RefCell<Option<Store>>,
    slots: RefCell<Vec<Slot>>,
}

impl LightManagerShared {
    /// Sum `color * ambient` over every registered ambient light.
    fn recompute(&self, store: &Store) {
        let mut sum = Vec3::zeros();
        for provider in store.providers_in(AMBIENT_LIGHTS) {
            let color: Vec3 = provider.get("color").unwrap_or_else(|_| Vec3::zeros());
            let ambient: f32 = provider.get("ambient").unwrap_or(0.0);
            sum += color * ambient;
        }
        let current: Option<Vec3> = self.provider.get("sumAmbients").ok();
        if current != Some(sum) {
            self.provider.set("sumAmbients", sum);
        }
    }
}

/// Root-unique aggregator of light collections
///
/// Publishes `lights.sumAmbients`, the intensity-weighted sum of every
/// ambient light under the root, and keeps it current as lights are added,
/// removed, or recolored.
#[derive(Clone)]
pub struct LightManager {
    inner: Rc<LightManagerShared>,
}

impl Default for LightManager {
    fn default() -> Self {
        Self::new()
    }
}

impl LightManager {
    /// Create a detached light manager
    pub fn new() -> Self {
        let provider = Provider::new();
        provider.set("sumAmbients", Vec3::zeros());
        Self {
            inner: Rc::new(LightManagerShared {
                provider,
                registered: RefCell::new(None),
                slots: RefCell::new(Vec::new()),
            }),
        }
    }

    /// The aggregate provider (`sumAmbients`)
    pub fn provider(&self) -> Provider {
        self.inner.provider.clone()
    }

    /// Current intensity-weighted ambient sum
    pub fn sum_ambients(&self) -> Vec3 {
        self.inner
            .provider
            .get("sumAmbients")
            .unwrap_or_else(|_| Vec3::zeros())
    }

    fn watch(&self, store: &Store) {
        let mut slots = self.inner.slots.borrow_mut();
        slots.clear();
        for signal in [store.on_added(), store.on_changed(), store.on_removed()] {
            let shared = Rc::clone(&self.inner);
            let watched = store.clone();
            slots.push(signal.connect(move |event: &StoreEvent| {
                if event.collection == AMBIENT_LIGHTS {
                    shared.recompute(&watched);
                }
            }));
        }
        drop(slots);
        self.inner.recompute(store);
    }
}

impl std::fmt::Debug for LightManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightManager")
            .field("sumAmbients", &self.sum_ambients())
            .finish()
    }
}

impl Component for LightManager {
    fn type_name(&self) -> &'static str {
        "LightManager"
    }

    fn is_root_singleton(&self) -> bool {
        true
    }

    fn on_attached(&mut self, node: &Node) -> Result<(), SceneError> {
        rehome(&self.inner.provider, &self.inner.registered, "lights", node)?;
        self.watch(&node.root().store());
        Ok(())
    }

    fn on_detached(&mut self, node: &Node) {
        self.inner.slots.borrow_mut().clear();
        unregister(&self.inner.provider, &self.inner.registered, "lights", node);
    }

    fn on_root_changed(&mut self, node: &Node) -> Result<(), SceneError> {
        rehome(&self.inner.provider, &self.inner.registered, "lights", node)?;
        self.watch(&node.root().store());
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
    use approx::assert_relative_eq;

    #[test]
    fn test_lights_register_at_root() {
        let root = Node::new("root");
        let child = Node::new("child");
        root.add_child(&child).unwrap();

        child
            .add_component(AmbientLight::new(Vec3::new(1.0, 1.0, 1.0), 0.2))
            .unwrap();

        assert_eq!(root.store().collection_len(AMBIENT_LIGHTS), 1);
        assert_eq!(child.store().collection_len(AMBIENT_LIGHTS), 0);
    }

    #[test]
    fn test_light_moves_on_reroot() {
        let old_root = Node::new("old");
        let lit = Node::new("lit");
        old_root.add_child(&lit).unwrap();
        lit.add_component(DirectionalLight::new(
            Vec3::new(1.0, 1.0, 1.0),
            1.0,
            Vec3::new(0.0, -1.0, 0.0),
        ))
        .unwrap();

        let new_root = Node::new("new");
        old_root.remove_child(&lit).unwrap();
        new_root.add_child(&lit).unwrap();

        assert_eq!(old_root.store().collection_len(DIRECTIONAL_LIGHTS), 0);
        assert_eq!(new_root.store().collection_len(DIRECTIONAL_LIGHTS), 1);
    }

    #[test]
    fn test_manager_sums_ambients_live() {
        let root = Node::new("root");
        let manager = LightManager::new();
        root.add_component(manager.clone()).unwrap();

        let red = AmbientLight::new(Vec3::new(1.0, 0.0, 0.0), 0.5);
        root.add_component(red.clone()).unwrap();
        root.add_component(AmbientLight::new(Vec3::new(0.0, 1.0, 0.0), 1.0))
            .unwrap();

        let sum = manager.sum_ambients();
        assert_relative_eq!(sum.x, 0.5);
        assert_relative_eq!(sum.y, 1.0);

        red.set_ambient(1.0);
        assert_relative_eq!(manager.sum_ambients().x, 1.0);
    }

    #[test]
    fn test_second_manager_rejected() {
        let root = Node::new("root");
        let child = Node::new("child");
        root.add_child(&child).unwrap();

        root.add_component(LightManager::new()).unwrap();
        assert!(matches!(
            child.add_component(LightManager::new()),
            Err(SceneError::DuplicateSingleton { .. })
        ));
    }
}
