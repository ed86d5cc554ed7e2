//! Scene graph: nodes, structural events, and queries
//!
//! The graph is a tree of [`Node`]s. Each node owns its children and its
//! attached components and carries the aggregated [`Store`](crate::data::Store)
//! of scene data visible at that node.
//!
//! Structural mutations (`add_child`, `add_component`, ...) produce a
//! [`SceneEvent`] value that the graph itself walks up the ancestor chain,
//! delivering to each ancestor's observer signal in increasing depth order —
//! mutation site first, root last. Root-level observers (the renderer's
//! draw-call pool, the light manager) therefore see every subtree mutation
//! without walking the tree themselves.

mod node;
mod node_set;

pub use node::{Node, SceneEvent, SceneEventKind, WeakNode};
pub use node_set::NodeSet;

use thiserror::Error;

use crate::data::DataError;

/// Structural and configuration errors of the scene layer
///
/// These are fail-fast, programmer-error-class conditions: they surface
/// synchronously from the call that caused them and leave the graph
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    /// A surface referenced a technique its effect does not define
    #[error("effect '{effect}' has no technique named '{technique}'")]
    MissingTechnique {
        /// Effect name
        effect: String,
        /// Requested technique name
        technique: String,
    },

    /// A second root-singleton component was attached under the same root
    #[error("component '{type_name}' must be unique per root")]
    DuplicateSingleton {
        /// Type name of the offending component
        type_name: &'static str,
    },

    /// `remove_child` was called for a node that is not a child
    #[error("node '{child}' is not a child of '{parent}'")]
    NotAChild {
        /// Parent node name
        parent: String,
        /// Candidate child node name
        child: String,
    },

    /// `remove_component` was called for a component not attached here
    #[error("component is not attached to node '{node}'")]
    ComponentNotAttached {
        /// Node name
        node: String,
    },

    /// `add_child` would have made a node its own ancestor
    #[error("adding '{child}' under '{parent}' would create a cycle")]
    WouldCreateCycle {
        /// Parent node name
        parent: String,
        /// Child node name
        child: String,
    },

    /// A component hook failed to register or unregister scene data
    #[error(transparent)]
    Data(#[from] DataError),
}
