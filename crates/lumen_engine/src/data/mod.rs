//! Scene data layer: typed property values, providers, and stores
//!
//! All dynamic scene data flows through this layer. A [`Provider`] is a
//! named key/value property bag with change notifications; a [`Store`] is
//! the ordered aggregation of providers visible at one scene node, grouped
//! into named collections (`"material"`, `"geometry"`, lights, ...).
//!
//! The draw-call resolver binds against this layer by name and re-resolves
//! incrementally from the change notifications, so consistency never
//! requires a full scene rescan.

mod provider;
mod store;
mod value;

pub use provider::{PropertyEvent, Provider, ProviderId, WeakProvider};
pub use store::{Store, StoreEvent};
pub use value::{PropertyKind, PropertyValue, RenderState, TextureHandle};

use thiserror::Error;

/// Errors raised by the data layer
///
/// `KeyNotFound` and `TypeMismatch` are programmer-error-class: they surface
/// synchronously from the `get` call that caused them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    /// The requested property does not exist
    #[error("property '{key}' not found")]
    KeyNotFound {
        /// The property name that failed to resolve
        key: String,
    },

    /// The property exists but holds a different value kind
    #[error("property '{key}' is a {actual}, requested {expected}")]
    TypeMismatch {
        /// The property name
        key: String,
        /// The kind requested by the caller
        expected: &'static str,
        /// The kind actually stored
        actual: &'static str,
    },

    /// The provider is already registered under this collection
    #[error("provider #{provider} already registered in collection '{collection}'")]
    ProviderAlreadyRegistered {
        /// Stable id of the offending provider
        provider: ProviderId,
        /// Collection it was registered under
        collection: String,
    },

    /// The provider is not registered under this collection
    #[error("provider #{provider} not registered in collection '{collection}'")]
    ProviderNotRegistered {
        /// Stable id of the missing provider
        provider: ProviderId,
        /// Collection searched
        collection: String,
    },
}
