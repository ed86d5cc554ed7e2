//! Draw call pool: binding resolution and incremental rebuilds
//!
//! The pool owns every draw call of one renderer. Per surface it resolves
//! each pass of the surface's technique into a [`DrawCall`], compiling the
//! program variant selected by the pass's macro bindings. Compiled variants
//! are cached by template name and defines string, so surfaces that evaluate
//! to the same variant share one program handle.
//!
//! Rebuilds are event-driven and scoped: the pool watches exactly the
//! property names its macro and uniform bindings resolved (or failed to
//! resolve) against, and a change rebuilds only the one pass whose bindings
//! named the property; sibling passes of the same surface keep their draw
//! calls. Technique re-selection (the fallback chain) runs only when a pass
//! stops compiling or the surface itself changes. Plain value changes to
//! bound uniforms are invisible here; draw calls read those live at
//! submission.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use slotmap::{new_key_type, SlotMap};

use super::backend::SharedBackend;
use super::draw_call::{DrawCall, UniformSlot};
use super::pass::{BindingSource, MacroTrigger, Pass};
use super::program::MacroSet;
use super::RenderError;
use crate::component::{Surface, SurfaceId};
use crate::data::{Store, StoreEvent, WeakProvider};
use crate::foundation::signal::{Signal, Slot};
use crate::scene::Node;

/// Reserved material keys overriding a pass's sort states
const PRIORITY_OVERRIDE: &str = "material[${materialId}].priority";
const Z_SORTED_OVERRIDE: &str = "material[${materialId}].zSorted";

new_key_type! {
    /// Stable key of a draw call within its pool
    pub struct DrawCallKey;
}

/// What a watched property rebuilds when it fires
#[derive(Clone, Copy)]
enum WatchScope {
    /// Re-run technique selection for the whole surface
    Surface,
    /// Re-resolve one pass of the current technique
    Pass(usize),
}

struct PassRecord {
    pass: Pass,
    // None when the pass resolved without a draw call (missing attribute).
    key: Option<DrawCallKey>,
    slots: Vec<Slot>,
}

struct SurfaceRecord {
    surface: Surface,
    node: Node,
    passes: Vec<PassRecord>,
    // Watches carried over from techniques that failed to resolve, so the
    // surface re-enters resolution when a relevant property changes.
    chain_slots: Vec<Slot>,
    _changed_slot: Slot,
}

struct PoolShared {
    backend: SharedBackend,
    renderer_store: Store,
    root_store: Store,
    calls: RefCell<SlotMap<DrawCallKey, DrawCall>>,
    records: RefCell<HashMap<SurfaceId, SurfaceRecord>>,
    programs: RefCell<HashMap<String, super::backend::ProgramHandle>>,
}

/// Shared handle to a renderer's draw call pool
#[derive(Clone)]
pub struct DrawCallPool {
    inner: Rc<PoolShared>,
}

impl std::fmt::Debug for DrawCallPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawCallPool")
            .field("surfaces", &self.inner.records.borrow().len())
            .field("calls", &self.inner.calls.borrow().len())
            .finish()
    }
}

impl DrawCallPool {
    /// Pool resolving against the given renderer and root stores
    pub fn new(backend: SharedBackend, renderer_store: Store, root_store: Store) -> Self {
        Self {
            inner: Rc::new(PoolShared {
                backend,
                renderer_store,
                root_store,
                calls: RefCell::new(SlotMap::with_key()),
                records: RefCell::new(HashMap::new()),
                programs: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Start tracking `surface`, resolving its draw calls immediately
    ///
    /// A surface already in the pool is left untouched.
    pub fn add_surface(&self, surface: &Surface, node: &Node) {
        let id = surface.id();
        if self.inner.records.borrow().contains_key(&id) {
            return;
        }

        let weak = Rc::downgrade(&self.inner);
        let changed_slot = surface.on_changed().connect(move |_| {
            if let Some(shared) = weak.upgrade() {
                PoolShared::refresh(&shared, id);
            }
        });

        self.inner.records.borrow_mut().insert(
            id,
            SurfaceRecord {
                surface: surface.clone(),
                node: node.clone(),
                passes: Vec::new(),
                chain_slots: Vec::new(),
                _changed_slot: changed_slot,
            },
        );
        log::trace!("pool: tracking surface {id}");
        PoolShared::refresh(&self.inner, id);
    }

    /// Stop tracking a surface, dropping its draw calls and watches
    pub fn remove_surface(&self, id: SurfaceId) {
        let record = self.inner.records.borrow_mut().remove(&id);
        if let Some(record) = record {
            let mut calls = self.inner.calls.borrow_mut();
            for pass in record.passes {
                if let Some(key) = pass.key {
                    calls.remove(key);
                }
            }
            log::trace!("pool: dropped surface {id}");
        }
    }

    /// Whether `id` is tracked
    pub fn has_surface(&self, id: SurfaceId) -> bool {
        self.inner.records.borrow().contains_key(&id)
    }

    /// Number of tracked surfaces
    pub fn surface_count(&self) -> usize {
        self.inner.records.borrow().len()
    }

    /// Number of live draw calls
    pub fn len(&self) -> usize {
        self.inner.calls.borrow().len()
    }

    /// Whether the pool holds no draw calls
    pub fn is_empty(&self) -> bool {
        self.inner.calls.borrow().is_empty()
    }

    /// Number of distinct program variants compiled so far
    pub fn program_count(&self) -> usize {
        self.inner.programs.borrow().len()
    }

    /// Clone of the draw call stored under `key`
    pub fn draw_call(&self, key: DrawCallKey) -> Option<DrawCall> {
        self.inner.calls.borrow().get(key).cloned()
    }

    /// Draw calls in submission order
    ///
    /// Higher-priority passes come first; within one priority, z-sorted
    /// calls go back to front.
    pub fn sorted_calls(&self) -> Vec<DrawCall> {
        let mut list: Vec<DrawCall> = self.inner.calls.borrow().values().cloned().collect();
        list.sort_by(|a, b| {
            b.states
                .priority
                .partial_cmp(&a.states.priority)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    if a.states.z_sorted && b.states.z_sorted {
                        a.depth().partial_cmp(&b.depth()).unwrap_or(Ordering::Equal)
                    } else {
                        Ordering::Equal
                    }
                })
        });
        list
    }
}

impl PoolShared {
    fn store_for(&self, node: &Node, source: BindingSource) -> Store {
        match source {
            BindingSource::Target => node.store(),
            BindingSource::Renderer => self.renderer_store.clone(),
            BindingSource::Root => self.root_store.clone(),
        }
    }

    /// Tear down and re-resolve one surface's draw calls, re-running
    /// technique selection.
    fn refresh(shared: &Rc<Self>, id: SurfaceId) {
        let (surface, node) = {
            let records = shared.records.borrow();
            let Some(record) = records.get(&id) else {
                return;
            };
            (record.surface.clone(), record.node.clone())
        };

        {
            let mut records = shared.records.borrow_mut();
            let mut calls = shared.calls.borrow_mut();
            if let Some(record) = records.get_mut(&id) {
                for pass in record.passes.drain(..) {
                    if let Some(key) = pass.key {
                        calls.remove(key);
                    }
                }
                record.chain_slots.clear();
            }
        }

        let mut chain_slots = Vec::new();
        match Self::resolve_surface(shared, &surface, &node, &mut chain_slots) {
            Ok(resolved) => {
                let mut records = shared.records.borrow_mut();
                let mut calls = shared.calls.borrow_mut();
                if let Some(record) = records.get_mut(&id) {
                    record.passes = resolved
                        .into_iter()
                        .map(|(pass, call, slots)| PassRecord {
                            pass,
                            key: call.map(|call| calls.insert(call)),
                            slots,
                        })
                        .collect();
                    record.chain_slots = chain_slots;
                }
            }
            Err(error) => {
                log::warn!("surface {id} produced no draw calls: {error}");
                if let Some(record) = shared.records.borrow_mut().get_mut(&id) {
                    record.chain_slots = chain_slots;
                }
            }
        }
    }

    /// Re-resolve a single pass of the surface's current technique, leaving
    /// sibling passes untouched.
    fn refresh_pass(shared: &Rc<Self>, id: SurfaceId, index: usize) {
        let (surface, node, pass, old_key) = {
            let mut records = shared.records.borrow_mut();
            let Some(record) = records.get_mut(&id) else {
                return;
            };
            let Some(entry) = record.passes.get_mut(index) else {
                return;
            };
            entry.slots.clear();
            (
                record.surface.clone(),
                record.node.clone(),
                entry.pass.clone(),
                entry.key.take(),
            )
        };
        if let Some(key) = old_key {
            shared.calls.borrow_mut().remove(key);
        }

        let variables = surface.variables();
        match Self::resolve_pass(shared, &surface, &node, &pass, index, &variables) {
            Ok((call, slots)) => {
                let mut records = shared.records.borrow_mut();
                let mut calls = shared.calls.borrow_mut();
                if let Some(entry) = records
                    .get_mut(&id)
                    .and_then(|record| record.passes.get_mut(index))
                {
                    entry.key = call.map(|call| calls.insert(call));
                    entry.slots = slots;
                }
            }
            Err(error) => {
                // The technique stopped compiling for this pass; re-select
                // from the fallback chain.
                log::debug!(
                    "surface {id}: pass '{}' no longer satisfiable: {error}",
                    pass.name
                );
                Self::refresh(shared, id);
            }
        }
    }

    /// Walk the technique fallback chain until one resolves completely.
    ///
    /// Failed techniques leave their macro watches in `chain_slots`; a later
    /// change to one of those properties re-runs selection from the top.
    fn resolve_surface(
        shared: &Rc<Self>,
        surface: &Surface,
        node: &Node,
        chain_slots: &mut Vec<Slot>,
    ) -> Result<Vec<(Pass, Option<DrawCall>, Vec<Slot>)>, RenderError> {
        let effect = surface.effect();
        let requested = surface.technique();
        let chain = effect.fallback_chain(&requested);
        let variables = surface.variables();

        for technique in &chain {
            match Self::resolve_technique(shared, surface, node, &technique.passes, &variables) {
                Ok(resolved) => {
                    if technique.name != requested {
                        log::debug!(
                            "surface {}: fell back from '{requested}' to '{}'",
                            surface.id(),
                            technique.name
                        );
                    }
                    return Ok(resolved);
                }
                Err(error) => {
                    log::debug!(
                        "surface {}: technique '{}' not satisfiable: {error}",
                        surface.id(),
                        technique.name
                    );
                    for pass in &technique.passes {
                        Self::watch_macro_names(
                            shared,
                            surface.id(),
                            node,
                            pass,
                            &variables,
                            chain_slots,
                        );
                    }
                }
            }
        }

        Err(RenderError::NoSatisfiableTechnique {
            effect: effect.name().to_owned(),
            technique: requested,
        })
    }

    fn resolve_technique(
        shared: &Rc<Self>,
        surface: &Surface,
        node: &Node,
        passes: &[Pass],
        variables: &[(String, String)],
    ) -> Result<Vec<(Pass, Option<DrawCall>, Vec<Slot>)>, RenderError> {
        let mut resolved = Vec::with_capacity(passes.len());
        for (index, pass) in passes.iter().enumerate() {
            let (call, slots) = Self::resolve_pass(shared, surface, node, pass, index, variables)?;
            resolved.push((pass.clone(), call, slots));
        }
        Ok(resolved)
    }

    /// Resolve one pass into a draw call, watching every property name the
    /// resolution depended on.
    ///
    /// `Ok(None)` means the pass is skipped (unresolved attribute); `Err`
    /// means the program variant would not compile and the whole technique
    /// is unsatisfiable.
    fn resolve_pass(
        shared: &Rc<Self>,
        surface: &Surface,
        node: &Node,
        pass: &Pass,
        index: usize,
        variables: &[(String, String)],
    ) -> Result<(Option<DrawCall>, Vec<Slot>), RenderError> {
        let id = surface.id();
        let scope = WatchScope::Pass(index);
        let mut slots = Vec::new();

        let macros = Self::evaluate_macros(shared, id, node, pass, variables, scope, &mut slots);

        let variant_key = pass.program.variant_key(&macros);
        let cached = shared.programs.borrow().get(&variant_key).copied();
        let program = match cached {
            Some(handle) => handle,
            None => {
                let handle = shared
                    .backend
                    .borrow_mut()
                    .compile_program(&pass.program, &macros)?;
                shared.programs.borrow_mut().insert(variant_key, handle);
                handle
            }
        };

        let geometry = surface.geometry();

        // Resolve attribute bindings to geometry streams. A binding naming a
        // property the geometry lacks skips the whole pass.
        let mut stream_indices: Vec<usize> = Vec::new();
        let mut attributes_ok = true;
        for binding in &pass.attribute_bindings {
            let name = Store::format_property_name(&binding.property, variables);
            let store = shared.store_for(node, binding.source);
            Self::watch_structural(shared, id, scope, &store, &name, &mut slots);
            let Some((_, key)) = store.resolve(&name) else {
                log::warn!(
                    "pass '{}': attribute '{}' unresolved ({name})",
                    pass.name,
                    binding.name
                );
                attributes_ok = false;
                continue;
            };
            let Some((stream, _)) = geometry.attribute(&key) else {
                log::warn!(
                    "pass '{}': geometry '{}' has no attribute '{key}'",
                    pass.name,
                    geometry.name()
                );
                attributes_ok = false;
                continue;
            };
            if !stream_indices.contains(&stream) {
                stream_indices.push(stream);
            }
        }
        if !attributes_ok {
            return Ok((None, slots));
        }

        let mut backend = shared.backend.borrow_mut();
        let mut vertex_buffers = Vec::with_capacity(stream_indices.len());
        for stream in stream_indices {
            vertex_buffers.push(geometry.stream_buffer(stream, &mut *backend)?);
        }
        let index_buffer = geometry.index_buffer(&mut *backend)?;
        drop(backend);

        let mut uniforms = Vec::with_capacity(pass.uniform_bindings.len());
        for binding in &pass.uniform_bindings {
            let name = Store::format_property_name(&binding.property, variables);
            let store = shared.store_for(node, binding.source);
            Self::watch_structural(shared, id, scope, &store, &name, &mut slots);
            match store.resolve(&name) {
                Some((provider, key)) => uniforms.push(UniformSlot {
                    name: binding.name.clone(),
                    provider: provider.downgrade(),
                    key,
                    default: binding.default.clone(),
                }),
                None => match &binding.default {
                    Some(default) => uniforms.push(UniformSlot {
                        name: binding.name.clone(),
                        provider: WeakProvider::default(),
                        key: String::new(),
                        default: Some(default.clone()),
                    }),
                    None => log::warn!(
                        "pass '{}': uniform '{}' unresolved ({name})",
                        pass.name,
                        binding.name
                    ),
                },
            }
        }

        // Materials may override the pass's sort states through reserved
        // keys; the values are baked into the call, so changes rebuild it.
        let mut states = pass.states.clone();
        let target = node.store();
        let priority_name = Store::format_property_name(PRIORITY_OVERRIDE, variables);
        Self::watch_structural(shared, id, scope, &target, &priority_name, &mut slots);
        Self::watch(shared, id, scope, target.on_changed_for(&priority_name), &mut slots);
        if let Some((provider, key)) = target.resolve(&priority_name) {
            if let Ok(priority) = provider.get::<f32>(&key) {
                states.priority = priority;
            }
        }
        let z_sorted_name = Store::format_property_name(Z_SORTED_OVERRIDE, variables);
        Self::watch_structural(shared, id, scope, &target, &z_sorted_name, &mut slots);
        Self::watch(shared, id, scope, target.on_changed_for(&z_sorted_name), &mut slots);
        if let Some((provider, key)) = target.resolve(&z_sorted_name) {
            if let Ok(z_sorted) = provider.get::<bool>(&key) {
                states.z_sorted = z_sorted;
            }
        }

        let world = node
            .store()
            .resolve("transform.modelToWorldMatrix")
            .map(|(provider, key)| UniformSlot {
                name: String::new(),
                provider: provider.downgrade(),
                key,
                default: None,
            });
        let view = shared
            .renderer_store
            .resolve("camera.viewMatrix")
            .map(|(provider, key)| UniformSlot {
                name: String::new(),
                provider: provider.downgrade(),
                key,
                default: None,
            });

        let call = DrawCall {
            pass_name: pass.name.clone(),
            program,
            vertex_buffers,
            index_buffer,
            index_count: geometry.index_count(),
            uniforms,
            states,
            world,
            view,
        };
        Ok((Some(call), slots))
    }

    /// Evaluate macro bindings into a definition set, watching each bound
    /// name for future changes.
    fn evaluate_macros(
        shared: &Rc<Self>,
        id: SurfaceId,
        node: &Node,
        pass: &Pass,
        variables: &[(String, String)],
        scope: WatchScope,
        slots: &mut Vec<Slot>,
    ) -> MacroSet {
        let mut macros = MacroSet::new();
        for binding in &pass.macro_bindings {
            let store = shared.store_for(node, binding.source);
            match binding.trigger {
                MacroTrigger::Defined => {
                    let name = Store::format_property_name(&binding.property, variables);
                    if store.has_property(&name) {
                        macros.define(binding.name.as_str());
                    }
                    Self::watch_structural(shared, id, scope, &store, &name, slots);
                }
                MacroTrigger::Value => {
                    let name = Store::format_property_name(&binding.property, variables);
                    if let Some(value) = store.get_value(&name).and_then(|v| v.as_macro_int()) {
                        macros.define_value(binding.name.as_str(), value);
                    }
                    Self::watch_structural(shared, id, scope, &store, &name, slots);
                    Self::watch(shared, id, scope, store.on_changed_for(&name), slots);
                }
                MacroTrigger::Length => {
                    let collection = Store::format_property_name(&binding.property, variables);
                    let len = store.collection_len(&collection);
                    if len > 0 {
                        macros.define_value(binding.name.as_str(), len as i32);
                    }
                    let length_name = format!("{collection}.length");
                    Self::watch_structural(shared, id, scope, &store, &length_name, slots);
                    Self::watch(shared, id, scope, store.on_changed_for(&length_name), slots);
                }
            }
        }
        macros
    }

    /// Watch a failed technique's macro-relevant names, surface-scoped, so a
    /// change re-runs technique selection.
    fn watch_macro_names(
        shared: &Rc<Self>,
        id: SurfaceId,
        node: &Node,
        pass: &Pass,
        variables: &[(String, String)],
        slots: &mut Vec<Slot>,
    ) {
        let scope = WatchScope::Surface;
        for binding in &pass.macro_bindings {
            let store = shared.store_for(node, binding.source);
            match binding.trigger {
                MacroTrigger::Defined => {
                    let name = Store::format_property_name(&binding.property, variables);
                    Self::watch_structural(shared, id, scope, &store, &name, slots);
                }
                MacroTrigger::Value => {
                    let name = Store::format_property_name(&binding.property, variables);
                    Self::watch_structural(shared, id, scope, &store, &name, slots);
                    Self::watch(shared, id, scope, store.on_changed_for(&name), slots);
                }
                MacroTrigger::Length => {
                    let collection = Store::format_property_name(&binding.property, variables);
                    let length_name = format!("{collection}.length");
                    Self::watch_structural(shared, id, scope, &store, &length_name, slots);
                    Self::watch(shared, id, scope, store.on_changed_for(&length_name), slots);
                }
            }
        }
    }

    /// Watch `name` appearing or disappearing in `store`.
    fn watch_structural(
        shared: &Rc<Self>,
        id: SurfaceId,
        scope: WatchScope,
        store: &Store,
        name: &str,
        slots: &mut Vec<Slot>,
    ) {
        Self::watch(shared, id, scope, store.on_added_for(name), slots);
        Self::watch(shared, id, scope, store.on_removed_for(name), slots);
    }

    fn watch(
        shared: &Rc<Self>,
        id: SurfaceId,
        scope: WatchScope,
        signal: Signal<StoreEvent>,
        slots: &mut Vec<Slot>,
    ) {
        let weak: Weak<Self> = Rc::downgrade(shared);
        slots.push(signal.connect(move |_| {
            if let Some(shared) = weak.upgrade() {
                match scope {
                    WatchScope::Surface => Self::refresh(&shared, id),
                    WatchScope::Pass(index) => Self::refresh_pass(&shared, id, index),
                }
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{AmbientLight, Surface};
    use crate::foundation::math::Vec3;
    use crate::render::{
        AttributeBinding, Effect, Geometry, HeadlessBackend, MacroBinding, Material, Pass,
        ProgramTemplate, Technique, UniformBinding,
    };

    fn lit_effect() -> Effect {
        let effect = Effect::new("phong");
        let lit = Pass::new("lit", ProgramTemplate::new("phong", "vs", "fs"))
            .with_attribute(AttributeBinding::new("aPosition", "geometry.position"))
            .with_uniform(UniformBinding::new("uDiffuse", "material.diffuseColor"))
            .with_macro(MacroBinding::defined("HAS_SHININESS", "material.shininess"))
            .with_macro(MacroBinding::length(
                "NUM_AMBIENT_LIGHTS",
                "ambientLights",
            ));
        effect.add_technique(Technique::new("default", vec![lit]));
        effect
    }

    fn pool_for(root: &Node) -> (Rc<RefCell<HeadlessBackend>>, DrawCallPool) {
        let backend = HeadlessBackend::new().into_shared();
        let shared: SharedBackend = backend.clone();
        let pool = DrawCallPool::new(shared, root.store(), root.store());
        (backend, pool)
    }

    fn lit_surface(material: Material) -> Surface {
        Surface::new(Geometry::cube(), material, lit_effect(), "default").unwrap()
    }

    fn pass_keys(pool: &DrawCallPool, id: SurfaceId) -> Vec<Option<DrawCallKey>> {
        pool.inner.records.borrow()[&id]
            .passes
            .iter()
            .map(|pass| pass.key)
            .collect()
    }

    #[test]
    fn test_surface_lifecycle_creates_and_drops_calls() {
        let root = Node::new("root");
        let (_backend, pool) = pool_for(&root);

        let surface = lit_surface(Material::new("m"));
        root.add_component(surface.clone()).unwrap();
        pool.add_surface(&surface, &root);

        assert_eq!(pool.len(), 1);
        pool.remove_surface(surface.id());
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn test_macro_property_triggers_recompile_value_change_does_not() {
        let root = Node::new("root");
        let (backend, pool) = pool_for(&root);

        let material = Material::new("m");
        material.set("diffuseColor", 1.0f32);
        let surface = lit_surface(material.clone());
        root.add_component(surface.clone()).unwrap();
        pool.add_surface(&surface, &root);
        assert_eq!(backend.borrow().programs_compiled(), 1);
        let plain = pool.sorted_calls()[0].program();

        // Bound uniform value change: no rebuild, no recompile.
        material.set("diffuseColor", 0.5f32);
        assert_eq!(backend.borrow().programs_compiled(), 1);

        // Watched macro property appears: rebuild with a new variant.
        material.set("shininess", 32.0f32);
        assert_eq!(backend.borrow().programs_compiled(), 2);
        let shiny = pool.sorted_calls()[0].program();
        assert_ne!(plain, shiny);

        // And disappears again: the plain variant comes from the cache.
        material.unset("shininess");
        assert_eq!(backend.borrow().programs_compiled(), 2);
        assert_eq!(pool.sorted_calls()[0].program(), plain);
    }

    #[test]
    fn test_macro_rebuild_leaves_sibling_passes_alone() {
        let root = Node::new("root");
        let (backend, pool) = pool_for(&root);

        let effect = Effect::new("layered");
        let base = Pass::new("base", ProgramTemplate::new("base", "vs", "fs"))
            .with_attribute(AttributeBinding::new("aPosition", "geometry.position"));
        let detail = Pass::new("detail", ProgramTemplate::new("detail", "vs", "fs"))
            .with_attribute(AttributeBinding::new("aPosition", "geometry.position"))
            .with_macro(MacroBinding::defined("HAS_SHININESS", "material.shininess"));
        effect.add_technique(Technique::new("default", vec![base, detail]));

        let material = Material::new("m");
        let surface = Surface::new(Geometry::cube(), material.clone(), effect, "default").unwrap();
        root.add_component(surface.clone()).unwrap();
        pool.add_surface(&surface, &root);

        assert_eq!(pool.len(), 2);
        assert_eq!(backend.borrow().programs_compiled(), 2);
        let keys_before = pass_keys(&pool, surface.id());

        // The macro only binds in the second pass: the first pass's draw
        // call survives untouched, only the second is rebuilt.
        material.set("shininess", 8.0f32);
        assert_eq!(pool.len(), 2);
        assert_eq!(backend.borrow().programs_compiled(), 3);
        let keys_after = pass_keys(&pool, surface.id());
        assert_eq!(keys_before[0], keys_after[0]);
        assert_ne!(keys_before[1], keys_after[1]);
    }

    #[test]
    fn test_surfaces_with_equal_defines_share_programs() {
        let root = Node::new("root");
        let (backend, pool) = pool_for(&root);

        let a_node = Node::new("a");
        let b_node = Node::new("b");
        root.add_child(&a_node).unwrap();
        root.add_child(&b_node).unwrap();

        let a = lit_surface(Material::new("a"));
        let b = lit_surface(Material::new("b"));
        a_node.add_component(a.clone()).unwrap();
        b_node.add_component(b.clone()).unwrap();

        pool.add_surface(&a, &a_node);
        pool.add_surface(&b, &b_node);

        assert_eq!(pool.len(), 2);
        assert_eq!(backend.borrow().programs_compiled(), 1);
        let calls = pool.sorted_calls();
        assert_eq!(calls[0].program(), calls[1].program());
    }

    #[test]
    fn test_light_count_feeds_macro() {
        let root = Node::new("root");
        let (backend, pool) = pool_for(&root);

        let surface = lit_surface(Material::new("m"));
        root.add_component(surface.clone()).unwrap();
        pool.add_surface(&surface, &root);
        assert_eq!(backend.borrow().programs_compiled(), 1);

        root.add_component(AmbientLight::new(Vec3::new(1.0, 1.0, 1.0), 0.3))
            .unwrap();
        // New light count means a new variant.
        assert_eq!(backend.borrow().programs_compiled(), 2);
        assert!(backend.borrow().compiled()[1].1.contains("NUM_AMBIENT_LIGHTS=1"));
    }

    #[test]
    fn test_material_overrides_sort_state() {
        let root = Node::new("root");
        let (_backend, pool) = pool_for(&root);

        let material = Material::new("m");
        material.set("priority", 5.0f32);
        let surface = lit_surface(material.clone());
        root.add_component(surface.clone()).unwrap();
        pool.add_surface(&surface, &root);

        let states = pool.sorted_calls()[0].states().clone();
        assert!((states.priority - 5.0).abs() < f32::EPSILON);
        assert!(!states.z_sorted);

        // Overrides are live: setting the reserved keys rebuilds the call.
        material.set("priority", -1.0f32);
        material.set("zSorted", true);
        let states = pool.sorted_calls()[0].states().clone();
        assert!((states.priority + 1.0).abs() < f32::EPSILON);
        assert!(states.z_sorted);
    }

    #[test]
    fn test_fallback_when_variant_rejected() {
        let root = Node::new("root");
        let backend = {
            let mut b = HeadlessBackend::new();
            b.reject_define("HAS_SHININESS");
            b.into_shared()
        };
        let shared: SharedBackend = backend.clone();
        let pool = DrawCallPool::new(shared, root.store(), root.store());

        let effect = Effect::new("phong");
        let fancy = Pass::new("fancy", ProgramTemplate::new("phong", "vs", "fs"))
            .with_attribute(AttributeBinding::new("aPosition", "geometry.position"))
            .with_macro(MacroBinding::defined("HAS_SHININESS", "material.shininess"));
        let flat = Pass::new("flat", ProgramTemplate::new("flat", "vs", "fs"))
            .with_attribute(AttributeBinding::new("aPosition", "geometry.position"));
        effect.add_technique(Technique::new("fancy", vec![fancy]));
        effect.add_technique(Technique::new("flat", vec![flat]));
        effect.set_fallback("fancy", "flat");

        let material = Material::new("m");
        material.set("shininess", 8.0f32);
        let surface = Surface::new(Geometry::cube(), material, effect, "fancy").unwrap();
        root.add_component(surface.clone()).unwrap();
        pool.add_surface(&surface, &root);

        assert_eq!(pool.len(), 1);
        assert_eq!(pool.sorted_calls()[0].pass_name(), "flat");
    }

    #[test]
    fn test_unsatisfiable_surface_recovers_on_property_change() {
        let root = Node::new("root");
        let backend = {
            let mut b = HeadlessBackend::new();
            b.reject_define("HAS_SHININESS");
            b.into_shared()
        };
        let shared: SharedBackend = backend.clone();
        let pool = DrawCallPool::new(shared, root.store(), root.store());

        let effect = Effect::new("phong");
        let only = Pass::new("only", ProgramTemplate::new("phong", "vs", "fs"))
            .with_attribute(AttributeBinding::new("aPosition", "geometry.position"))
            .with_macro(MacroBinding::defined("HAS_SHININESS", "material.shininess"));
        effect.add_technique(Technique::new("only", vec![only]));

        let material = Material::new("m");
        material.set("shininess", 8.0f32);
        let surface = Surface::new(Geometry::cube(), material.clone(), effect, "only").unwrap();
        root.add_component(surface.clone()).unwrap();
        pool.add_surface(&surface, &root);
        assert_eq!(pool.len(), 0);

        // Removing the offending property makes the plain variant viable;
        // the failed resolution left its watches in place.
        material.unset("shininess");
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.sorted_calls()[0].pass_name(), "only");
    }
}
