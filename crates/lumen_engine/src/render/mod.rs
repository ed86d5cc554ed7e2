//! Rendering layer: effects, draw calls, and the GPU abstraction boundary
//!
//! The data flow is: surfaces pair geometry, material, and effect; the
//! [`DrawCallPool`] resolves each visible `(surface, pass)` pair into a
//! [`DrawCall`] with concrete program and binding locations; the
//! [`Renderer`] component submits the pool's draw calls in order each frame
//! through the [`RenderBackend`] trait — the engine's sole GPU egress point.

mod backend;
mod draw_call;
mod draw_call_pool;
mod effect;
mod geometry;
mod material;
mod pass;
mod program;
mod renderer;

pub use backend::{
    BackendResult, BufferHandle, ClearFlags, DrawSubmission, HeadlessBackend, ProgramHandle,
    RenderBackend, SharedBackend,
};
pub use draw_call::DrawCall;
pub use draw_call_pool::{DrawCallKey, DrawCallPool};
pub use effect::{Effect, Technique};
pub use geometry::{Geometry, VertexAttribute, VertexStream};
pub use material::Material;
pub use pass::{
    AttributeBinding, BindingSource, MacroBinding, MacroTrigger, Pass, PassStates, UniformBinding,
};
pub use program::{MacroSet, ProgramTemplate};
pub use renderer::{FrameStats, Renderer};

use thiserror::Error;

/// Errors raised by the rendering layer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    /// The backend rejected a program variant
    #[error("program '{template}' failed to compile with defines [{defines}]: {reason}")]
    ProgramCompilation {
        /// Program template name
        template: String,
        /// Macro definition string the compile was attempted with
        defines: String,
        /// Backend-reported reason
        reason: String,
    },

    /// No technique in the fallback chain produced a compilable variant
    #[error("effect '{effect}' has no satisfiable technique starting from '{technique}'")]
    NoSatisfiableTechnique {
        /// Effect name
        effect: String,
        /// Technique the resolution started from
        technique: String,
    },

    /// A backend resource operation failed
    #[error("backend error: {0}")]
    Backend(String),
}
