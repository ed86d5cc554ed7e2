//! Surface component: the drawable unit
//!
//! A surface pairs a geometry, a material, and an effect technique on one
//! node. Attaching it registers the three providers (plus the surface's own)
//! into the node's store under the `geometry`, `material`, `effect`, and
//! `surface` collections, which is what pass bindings resolve against. Swaps
//! (`set_material`, `set_technique`, ...) re-register providers in place and
//! emit on the surface's change signal so draw calls rebuild incrementally.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::Component;
use crate::data::{Provider, Store};
use crate::foundation::signal::Signal;
use crate::render::{Effect, Geometry, Material};
use crate::scene::{Node, SceneError, WeakNode};

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a surface, stable for its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// What part of a surface was swapped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceChange {
    /// The geometry was replaced
    Geometry,
    /// The material was replaced
    Material,
    /// The effect or technique was replaced
    Technique,
}

struct SurfaceShared {
    id: SurfaceId,
    geometry: RefCell<Geometry>,
    material: RefCell<Material>,
    effect: RefCell<Effect>,
    provider: Provider,
    changed: Signal<SurfaceChange>,
    target: RefCell<WeakNode>,
    registered: RefCell<Option<Store>>,
}

/// Shared handle to a drawable surface
#[derive(Clone)]
pub struct Surface {
    inner: Rc<SurfaceShared>,
}

impl std::fmt::Debug for Surface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Surface")
            .field("id", &self.inner.id)
            .field("technique", &self.technique())
            .finish()
    }
}

impl PartialEq for Surface {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Surface {}

impl Surface {
    /// Create a surface drawing `geometry` with `material` through
    /// `effect`'s `technique`
    ///
    /// Fails fast if the effect does not define the technique; nothing is
    /// registered anywhere on failure.
    pub fn new(
        geometry: Geometry,
        material: Material,
        effect: Effect,
        technique: impl Into<String>,
    ) -> Result<Self, SceneError> {
        let technique = technique.into();
        if !effect.has_technique(&technique) {
            return Err(SceneError::MissingTechnique {
                effect: effect.name().to_owned(),
                technique,
            });
        }

        let id = SurfaceId(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed));
        let provider = Provider::new();
        provider.set("technique", technique);

        Ok(Self {
            inner: Rc::new(SurfaceShared {
                id,
                geometry: RefCell::new(geometry),
                material: RefCell::new(material),
                effect: RefCell::new(effect),
                provider,
                changed: Signal::new(),
                target: RefCell::new(WeakNode::empty()),
                registered: RefCell::new(None),
            }),
        })
    }

    /// Stable surface identity
    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    /// Current geometry
    pub fn geometry(&self) -> Geometry {
        self.inner.geometry.borrow().clone()
    }

    /// Current material
    pub fn material(&self) -> Material {
        self.inner.material.borrow().clone()
    }

    /// Current effect
    pub fn effect(&self) -> Effect {
        self.inner.effect.borrow().clone()
    }

    /// Current technique name
    pub fn technique(&self) -> String {
        self.inner.provider.get("technique").unwrap_or_default()
    }

    /// The surface's own provider (`surface.technique`)
    pub fn provider(&self) -> Provider {
        self.inner.provider.clone()
    }

    /// Node the surface is attached to, if any
    pub fn target(&self) -> Option<Node> {
        self.inner.target.borrow().upgrade()
    }

    /// Signal emitted after any swap
    pub fn on_changed(&self) -> Signal<SurfaceChange> {
        self.inner.changed.clone()
    }

    /// Placeholder variables for binding name templates, keyed by provider
    /// identity (`material[${materialId}].diffuseColor` and friends)
    pub fn variables(&self) -> Vec<(String, String)> {
        vec![
            ("surfaceId".to_owned(), self.inner.provider.id().to_string()),
            (
                "materialId".to_owned(),
                self.inner.material.borrow().provider().id().to_string(),
            ),
            (
                "geometryId".to_owned(),
                self.inner.geometry.borrow().provider().id().to_string(),
            ),
            (
                "effectId".to_owned(),
                self.inner.effect.borrow().provider().id().to_string(),
            ),
        ]
    }

    /// Swap the material, re-registering its provider in place
    pub fn set_material(&self, material: Material) {
        let previous = self.inner.material.replace(material.clone());
        let store = self.inner.registered.borrow().clone();
        if let Some(store) = store {
            if let Err(error) = store.remove_provider(&previous.provider(), "material") {
                log::warn!("material swap on surface {}: {error}", self.inner.id);
            }
            self.inner.effect.borrow().fill_material(&material);
            if let Err(error) = store.add_provider(&material.provider(), "material") {
                log::warn!("material swap on surface {}: {error}", self.inner.id);
            }
        }
        self.inner.changed.emit(&SurfaceChange::Material);
    }

    /// Swap the geometry, re-registering its provider in place
    pub fn set_geometry(&self, geometry: Geometry) {
        let previous = self.inner.geometry.replace(geometry.clone());
        let store = self.inner.registered.borrow().clone();
        if let Some(store) = store {
            if let Err(error) = store.remove_provider(&previous.provider(), "geometry") {
                log::warn!("geometry swap on surface {}: {error}", self.inner.id);
            }
            if let Err(error) = store.add_provider(&geometry.provider(), "geometry") {
                log::warn!("geometry swap on surface {}: {error}", self.inner.id);
            }
        }
        self.inner.changed.emit(&SurfaceChange::Geometry);
    }

    /// Switch to another technique of the current effect
    pub fn set_technique(&self, technique: impl Into<String>) -> Result<(), SceneError> {
        let technique = technique.into();
        let effect = self.inner.effect.borrow().clone();
        if !effect.has_technique(&technique) {
            return Err(SceneError::MissingTechnique {
                effect: effect.name().to_owned(),
                technique,
            });
        }
        self.inner.provider.set("technique", technique);
        self.inner.changed.emit(&SurfaceChange::Technique);
        Ok(())
    }

    /// Swap the effect and technique together
    pub fn set_effect(
        &self,
        effect: Effect,
        technique: impl Into<String>,
    ) -> Result<(), SceneError> {
        let technique = technique.into();
        if !effect.has_technique(&technique) {
            return Err(SceneError::MissingTechnique {
                effect: effect.name().to_owned(),
                technique,
            });
        }
        let previous = self.inner.effect.replace(effect.clone());
        let store = self.inner.registered.borrow().clone();
        if let Some(store) = store {
            if let Err(error) = store.remove_provider(&previous.provider(), "effect") {
                log::warn!("effect swap on surface {}: {error}", self.inner.id);
            }
            effect.fill_material(&self.inner.material.borrow());
            if let Err(error) = store.add_provider(&effect.provider(), "effect") {
                log::warn!("effect swap on surface {}: {error}", self.inner.id);
            }
        }
        self.inner.provider.set("technique", technique);
        self.inner.changed.emit(&SurfaceChange::Technique);
        Ok(())
    }

    fn register(&self, store: &Store) -> Result<(), SceneError> {
        let material = self.inner.material.borrow().clone();
        self.inner.effect.borrow().fill_material(&material);

        let providers = [
            (material.provider(), "material"),
            (self.inner.geometry.borrow().provider(), "geometry"),
            (self.inner.effect.borrow().provider(), "effect"),
            (self.inner.provider.clone(), "surface"),
        ];
        for (index, (provider, collection)) in providers.iter().enumerate() {
            if let Err(error) = store.add_provider(provider, collection) {
                for (provider, collection) in &providers[..index] {
                    let _ = store.remove_provider(provider, collection);
                }
                return Err(error.into());
            }
        }
        *self.inner.registered.borrow_mut() = Some(store.clone());
        Ok(())
    }

    fn unregister(&self, node: &Node) {
        let store = self.inner.registered.borrow_mut().take();
        let Some(store) = store else { return };
        let providers = [
            (self.inner.material.borrow().provider(), "material"),
            (self.inner.geometry.borrow().provider(), "geometry"),
            (self.inner.effect.borrow().provider(), "effect"),
            (self.inner.provider.clone(), "surface"),
        ];
        for (provider, collection) in providers {
            if let Err(error) = store.remove_provider(&provider, collection) {
                log::warn!("surface detach from '{}': {error}", node.name());
            }
        }
    }
}

impl Component for Surface {
    fn type_name(&self) -> &'static str {
        "Surface"
    }

    fn on_attached(&mut self, node: &Node) -> Result<(), SceneError> {
        self.register(&node.store())?;
        *self.inner.target.borrow_mut() = node.downgrade();
        Ok(())
    }

    fn on_detached(&mut self, node: &Node) {
        self.unregister(node);
        *self.inner.target.borrow_mut() = WeakNode::empty();
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
    use crate::render::{Pass, ProgramTemplate, Technique};

    fn test_effect() -> Effect {
        let effect = Effect::new("basic");
        effect.add_technique(Technique::new(
            "default",
            vec![Pass::new("p0", ProgramTemplate::new("flat", "vs", "fs"))],
        ));
        effect.set_default("opacity", 1.0f32);
        effect
    }

    #[test]
    fn test_unknown_technique_rejected_before_registration() {
        let err = Surface::new(
            Geometry::cube(),
            Material::new("m"),
            test_effect(),
            "missing",
        )
        .unwrap_err();
        assert!(matches!(err, SceneError::MissingTechnique { .. }));
    }

    #[test]
    fn test_attach_registers_collections_and_fills_material() {
        let node = Node::new("cube");
        let material = Material::new("m");
        let surface =
            Surface::new(Geometry::cube(), material.clone(), test_effect(), "default").unwrap();
        node.add_component(surface).unwrap();

        let store = node.store();
        assert_eq!(store.collection_len("material"), 1);
        assert_eq!(store.collection_len("geometry"), 1);
        assert_eq!(store.collection_len("surface"), 1);
        assert!(store.has_property("geometry.position"));
        // Effect default was backfilled at attach time.
        assert_eq!(material.get::<f32>("opacity"), Ok(1.0));
    }

    #[test]
    fn test_material_swap_reregisters_and_signals() {
        let node = Node::new("cube");
        let surface = Surface::new(
            Geometry::cube(),
            Material::new("old"),
            test_effect(),
            "default",
        )
        .unwrap();
        node.add_component(surface.clone()).unwrap();

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _slot = surface
            .on_changed()
            .connect(move |change: &SurfaceChange| sink.borrow_mut().push(*change));

        let replacement = Material::new("new");
        replacement.set("shininess", 2.0f32);
        surface.set_material(replacement);

        assert_eq!(*seen.borrow(), vec![SurfaceChange::Material]);
        assert_eq!(node.store().get::<f32>("material.shininess"), Ok(2.0));
        assert_eq!(node.store().collection_len("material"), 1);
    }

    #[test]
    fn test_detach_unregisters_everything() {
        let node = Node::new("cube");
        let surface =
            Surface::new(Geometry::cube(), Material::new("m"), test_effect(), "default").unwrap();
        let handle = node.add_component(surface).unwrap();
        node.remove_component(&handle).unwrap();

        for collection in ["material", "geometry", "effect", "surface"] {
            assert_eq!(node.store().collection_len(collection), 0);
        }
    }
}
