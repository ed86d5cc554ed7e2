//! Materials: named property providers feeding uniform and macro bindings
//!
//! A material is a thin shared wrapper over a [`Provider`]. It carries no
//! schema of its own; whatever an effect's passes bind against (`material.*`
//! names) is whatever was set here, and effects backfill missing defaults via
//! `Effect::fill_material`.

use std::rc::Rc;

use crate::data::{DataError, PropertyKind, PropertyValue, Provider};

struct MaterialShared {
    name: String,
    provider: Provider,
}

/// Shared handle to a material
#[derive(Clone)]
pub struct Material {
    inner: Rc<MaterialShared>,
}

impl std::fmt::Debug for Material {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Material")
            .field("name", &self.inner.name)
            .field("provider", &self.inner.provider.id())
            .finish()
    }
}

impl Material {
    /// Create an empty material
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(MaterialShared {
                name: name.into(),
                provider: Provider::new(),
            }),
        }
    }

    /// Material name (debugging)
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The material's property provider
    pub fn provider(&self) -> Provider {
        self.inner.provider.clone()
    }

    /// Set a property, notifying observers; returns `&self` for chaining
    pub fn set<T: PropertyKind>(&self, key: impl Into<String>, value: T) -> &Self {
        self.inner.provider.set(key, value);
        self
    }

    /// Remove a property; a no-op if absent
    pub fn unset(&self, key: &str) -> &Self {
        self.inner.provider.unset(key);
        self
    }

    /// Whether the material defines `key`
    pub fn has(&self, key: &str) -> bool {
        self.inner.provider.has(key)
    }

    /// Typed read of a property
    pub fn get<T: PropertyKind>(&self, key: &str) -> Result<T, DataError> {
        self.inner.provider.get(key)
    }

    /// Untyped read of a property
    pub fn get_value(&self, key: &str) -> Option<PropertyValue> {
        self.inner.provider.get_value(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;

    #[test]
    fn test_chained_sets_and_reads() {
        let material = Material::new("red");
        material
            .set("diffuseColor", Vec4::new(1.0, 0.0, 0.0, 1.0))
            .set("shininess", 32.0f32);

        assert_eq!(material.get::<f32>("shininess"), Ok(32.0));
        assert!(material.has("diffuseColor"));
        assert!(!material.has("diffuseMap"));
    }

    #[test]
    fn test_clones_share_state() {
        let material = Material::new("shared");
        let alias = material.clone();
        material.set("shininess", 8.0f32);
        assert_eq!(alias.get::<f32>("shininess"), Ok(8.0));
    }
}
