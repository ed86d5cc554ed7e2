//! Render passes: binding declarations plus fixed-function state
//!
//! A pass declares, by property name, everything its program template needs:
//! vertex attributes, uniforms, and the macro bindings that select the
//! program variant. Property names may contain `${variable}` placeholders
//! resolved per surface (`material[${materialId}].diffuseColor`), and each
//! binding names which store it reads from via [`BindingSource`].

use super::program::ProgramTemplate;
use crate::data::{PropertyKind, PropertyValue, RenderState};

/// Which property store a binding resolves against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingSource {
    /// The surface's own node store
    Target,
    /// The store of the node carrying the renderer
    Renderer,
    /// The store of the scene root
    Root,
}

/// Binds a shader vertex attribute to a geometry property
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeBinding {
    /// Attribute name in the program
    pub name: String,
    /// Property name template, resolved against `source`
    pub property: String,
    /// Store the property resolves in
    pub source: BindingSource,
}

impl AttributeBinding {
    /// Binding resolved against the surface's own store
    pub fn new(name: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: property.into(),
            source: BindingSource::Target,
        }
    }
}

/// Binds a shader uniform to a property
#[derive(Debug, Clone, PartialEq)]
pub struct UniformBinding {
    /// Uniform name in the program
    pub name: String,
    /// Property name template, resolved against `source`
    pub property: String,
    /// Store the property resolves in
    pub source: BindingSource,
    /// Authored default, submitted when the property does not resolve and
    /// seeded into materials by `Effect::fill_material`
    pub default: Option<PropertyValue>,
}

impl UniformBinding {
    /// Binding resolved against the surface's own store
    pub fn new(name: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: property.into(),
            source: BindingSource::Target,
            default: None,
        }
    }

    /// Same binding resolved against a different store
    pub fn from(mut self, source: BindingSource) -> Self {
        self.source = source;
        self
    }

    /// Same binding with an authored default value
    pub fn with_default<T: PropertyKind>(mut self, value: T) -> Self {
        self.default = Some(value.into_value());
        self
    }
}

/// How a macro binding turns a property into a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacroTrigger {
    /// Define the macro (valueless) whenever the property exists
    Defined,
    /// Define the macro with the property's integer value
    Value,
    /// Define the macro with the length of the named collection
    Length,
}

/// Binds a preprocessor macro to a property
///
/// Macro bindings are what make draw calls variant-sensitive: the pool
/// watches each bound property and rebuilds the affected draw calls when it
/// appears, changes, or disappears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroBinding {
    /// Macro name in the program source
    pub name: String,
    /// Property name template, resolved against `source`
    ///
    /// For [`MacroTrigger::Length`] this is the collection name instead.
    pub property: String,
    /// Store the property resolves in
    pub source: BindingSource,
    /// How the property maps to a definition
    pub trigger: MacroTrigger,
}

impl MacroBinding {
    /// Valueless macro defined when `property` exists in the target store
    pub fn defined(name: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: property.into(),
            source: BindingSource::Target,
            trigger: MacroTrigger::Defined,
        }
    }

    /// Macro carrying the integer value of `property`
    pub fn value(name: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: property.into(),
            source: BindingSource::Target,
            trigger: MacroTrigger::Value,
        }
    }

    /// Macro carrying the length of collection `collection`
    pub fn length(name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property: collection.into(),
            source: BindingSource::Root,
            trigger: MacroTrigger::Length,
        }
    }

    /// Same binding resolved against a different store
    pub fn from(mut self, source: BindingSource) -> Self {
        self.source = source;
        self
    }
}

/// Fixed-function state applied when a pass's draw calls are submitted
#[derive(Debug, Clone, PartialEq)]
pub struct PassStates {
    /// Sort priority; higher priorities draw earlier
    pub priority: f32,
    /// Sort this pass's draw calls back to front by view-space depth
    pub z_sorted: bool,
    /// Blend mode
    pub blend: RenderState,
    /// Face culling mode
    pub cull: RenderState,
    /// Depth testing
    pub depth_test: bool,
}

impl Default for PassStates {
    fn default() -> Self {
        Self {
            priority: 0.0,
            z_sorted: false,
            blend: RenderState::BlendOpaque,
            cull: RenderState::CullBack,
            depth_test: true,
        }
    }
}

impl PassStates {
    /// States for back-to-front alpha-blended drawing
    pub fn translucent(priority: f32) -> Self {
        Self {
            priority,
            z_sorted: true,
            blend: RenderState::BlendAlpha,
            cull: RenderState::CullBack,
            depth_test: true,
        }
    }
}

/// One pass of a technique: a program template plus its bindings and states
#[derive(Debug, Clone)]
pub struct Pass {
    /// Pass name, for logging
    pub name: String,
    /// Program template the pass compiles variants of
    pub program: ProgramTemplate,
    /// Vertex attribute bindings
    pub attribute_bindings: Vec<AttributeBinding>,
    /// Uniform bindings
    pub uniform_bindings: Vec<UniformBinding>,
    /// Macro bindings
    pub macro_bindings: Vec<MacroBinding>,
    /// Fixed-function states
    pub states: PassStates,
}

impl Pass {
    /// Pass with no bindings and default states
    pub fn new(name: impl Into<String>, program: ProgramTemplate) -> Self {
        Self {
            name: name.into(),
            program,
            attribute_bindings: Vec::new(),
            uniform_bindings: Vec::new(),
            macro_bindings: Vec::new(),
            states: PassStates::default(),
        }
    }

    /// Add an attribute binding
    #[must_use]
    pub fn with_attribute(mut self, binding: AttributeBinding) -> Self {
        self.attribute_bindings.push(binding);
        self
    }

    /// Add a uniform binding
    #[must_use]
    pub fn with_uniform(mut self, binding: UniformBinding) -> Self {
        self.uniform_bindings.push(binding);
        self
    }

    /// Add a macro binding
    #[must_use]
    pub fn with_macro(mut self, binding: MacroBinding) -> Self {
        self.macro_bindings.push(binding);
        self
    }

    /// Replace the pass states
    #[must_use]
    pub fn with_states(mut self, states: PassStates) -> Self {
        self.states = states;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_bindings() {
        let pass = Pass::new("forward", ProgramTemplate::new("phong", "vs", "fs"))
            .with_attribute(AttributeBinding::new("aPosition", "geometry[${geometryId}].position"))
            .with_uniform(
                UniformBinding::new("uView", "camera.viewMatrix").from(BindingSource::Renderer),
            )
            .with_macro(MacroBinding::length("NUM_DIRECTIONAL_LIGHTS", "directionalLights"));

        assert_eq!(pass.attribute_bindings.len(), 1);
        assert_eq!(pass.uniform_bindings[0].source, BindingSource::Renderer);
        assert_eq!(pass.macro_bindings[0].trigger, MacroTrigger::Length);
        assert_eq!(pass.macro_bindings[0].source, BindingSource::Root);
    }

    #[test]
    fn test_default_states() {
        let states = PassStates::default();
        assert!(!states.z_sorted);
        assert!(states.depth_test);
        assert_eq!(states.blend, RenderState::BlendOpaque);
    }
}
