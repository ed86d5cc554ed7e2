//! # Lumen Engine
//!
//! A data-binding rendering core: scene data lives in observable property
//! providers, draw calls are resolved declaratively from effect bindings,
//! and everything in between updates incrementally through signals.
//!
//! ## Architecture
//!
//! - **Providers and stores**: components publish named property providers
//!   into per-node stores; consumers resolve properties by name and observe
//!   exactly the names they care about.
//! - **Scene graph**: a tree of nodes with attached components; structural
//!   mutations bubble as events up the ancestor chain.
//! - **Draw call pool**: per `(surface, pass)` pair, binding declarations
//!   resolve against the stores into cached draw calls; macro-bound
//!   properties select compiled program variants, and plain value changes
//!   flow through without any rebuild.
//!
//! ## Quick Start
//!
//! ```rust
//! use lumen_engine::prelude::*;
//!
//! let root = Node::new("root");
//!
//! let effect = Effect::new("flat");
//! effect.add_technique(Technique::new(
//!     "default",
//!     vec![Pass::new("flat", ProgramTemplate::new("flat", "vs", "fs"))
//!         .with_attribute(AttributeBinding::new("aPosition", "geometry.position"))],
//! ));
//!
//! let surface = Surface::new(Geometry::cube(), Material::new("m"), effect, "default").unwrap();
//! root.add_component(surface).unwrap();
//!
//! let backend: SharedBackend = HeadlessBackend::new().into_shared();
//! let renderer = Renderer::new(backend);
//! root.add_component(renderer.clone()).unwrap();
//!
//! let stats = renderer.enter_frame();
//! assert_eq!(stats.draw_calls, 1);
//! ```

pub mod component;
pub mod config;
pub mod data;
pub mod foundation;
pub mod render;
pub mod scene;

pub use config::{ConfigError, EngineConfig, WindowConfig};

/// Common imports for engine users
pub mod prelude {
    pub use crate::component::{
        update_world_transforms, AmbientLight, Component, DirectionalLight, LightManager,
        PerspectiveCamera, Surface, SurfaceChange, Transform,
    };
    pub use crate::config::EngineConfig;
    pub use crate::data::{PropertyValue, Provider, Store};
    pub use crate::foundation::math::{Mat4, Point3, Quat, TransformData, Vec2, Vec3, Vec4};
    pub use crate::foundation::signal::{Signal, Slot};
    pub use crate::foundation::time::Timer;
    pub use crate::render::{
        AttributeBinding, BindingSource, ClearFlags, Effect, FrameStats, Geometry,
        HeadlessBackend, MacroBinding, Material, Pass, PassStates, ProgramTemplate, RenderBackend,
        Renderer, SharedBackend, Technique, UniformBinding,
    };
    pub use crate::scene::{Node, NodeSet, SceneError, SceneEvent, SceneEventKind};
}
