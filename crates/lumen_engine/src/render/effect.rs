//! Effects: named techniques, fallback chains, and material defaults
//!
//! An effect is the shared description of how something is drawn. Surfaces
//! reference one effect by handle; the draw call pool walks a technique's
//! passes and, when a variant will not compile, follows the effect's
//! fallback chain to a cheaper technique. Effects also carry default
//! material values and global bindings, stamped onto the passes of every
//! technique registered after the binding was declared.

use std::cell::RefCell;
use std::rc::Rc;

use super::pass::{MacroBinding, Pass, UniformBinding};
use crate::data::{PropertyKind, PropertyValue, Provider};

/// A named sequence of passes
#[derive(Debug, Clone)]
pub struct Technique {
    /// Technique name, unique within an effect
    pub name: String,
    /// Passes executed in order
    pub passes: Vec<Pass>,
}

impl Technique {
    /// Technique from a pass list
    pub fn new(name: impl Into<String>, passes: Vec<Pass>) -> Self {
        Self {
            name: name.into(),
            passes,
        }
    }
}

struct EffectShared {
    name: String,
    provider: Provider,
    techniques: RefCell<Vec<Technique>>,
    fallbacks: RefCell<Vec<(String, String)>>,
    defaults: RefCell<Vec<(String, PropertyValue)>>,
    global_uniforms: RefCell<Vec<UniformBinding>>,
    global_macros: RefCell<Vec<MacroBinding>>,
}

/// Shared handle to an effect
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectShared>,
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("name", &self.inner.name)
            .field("techniques", &self.inner.techniques.borrow().len())
            .finish()
    }
}

impl Effect {
    /// Create an effect with no techniques
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(EffectShared {
                name: name.into(),
                provider: Provider::new(),
                techniques: RefCell::new(Vec::new()),
                fallbacks: RefCell::new(Vec::new()),
                defaults: RefCell::new(Vec::new()),
                global_uniforms: RefCell::new(Vec::new()),
                global_macros: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Effect name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Effect-level property provider, registered per surface
    pub fn provider(&self) -> Provider {
        self.inner.provider.clone()
    }

    /// Add a technique, stamping previously declared global bindings onto
    /// its passes
    pub fn add_technique(&self, mut technique: Technique) -> &Self {
        for pass in &mut technique.passes {
            pass.uniform_bindings
                .extend(self.inner.global_uniforms.borrow().iter().cloned());
            pass.macro_bindings
                .extend(self.inner.global_macros.borrow().iter().cloned());
        }
        self.inner.techniques.borrow_mut().push(technique);
        self
    }

    /// Whether the effect has a technique named `name`
    pub fn has_technique(&self, name: &str) -> bool {
        self.inner
            .techniques
            .borrow()
            .iter()
            .any(|t| t.name == name)
    }

    /// Clone of the technique named `name`
    pub fn technique(&self, name: &str) -> Option<Technique> {
        self.inner
            .techniques
            .borrow()
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    /// Declare `fallback` as the technique tried when `from` cannot compile
    pub fn set_fallback(&self, from: impl Into<String>, fallback: impl Into<String>) -> &Self {
        self.inner
            .fallbacks
            .borrow_mut()
            .push((from.into(), fallback.into()));
        self
    }

    /// The fallback technique name for `from`, if any
    pub fn fallback(&self, from: &str) -> Option<String> {
        self.inner
            .fallbacks
            .borrow()
            .iter()
            .find(|(name, _)| name == from)
            .map(|(_, fallback)| fallback.clone())
    }

    /// Techniques tried in order starting from `start`, following fallbacks
    ///
    /// Stops at the first name with no fallback or at a cycle.
    pub fn fallback_chain(&self, start: &str) -> Vec<Technique> {
        let mut chain = Vec::new();
        let mut visited: Vec<String> = Vec::new();
        let mut current = start.to_string();
        loop {
            if visited.iter().any(|name| *name == current) {
                break;
            }
            visited.push(current.clone());
            if let Some(technique) = self.technique(&current) {
                chain.push(technique);
            }
            match self.fallback(&current) {
                Some(next) => current = next,
                None => break,
            }
        }
        chain
    }

    /// Declare a uniform binding stamped onto every technique registered
    /// from now on
    ///
    /// Techniques already registered are left as they are; declaration order
    /// relative to [`Effect::add_technique`] is significant.
    pub fn add_global_uniform(&self, binding: UniformBinding) -> &Self {
        self.inner.global_uniforms.borrow_mut().push(binding);
        self
    }

    /// Declare a macro binding stamped onto every technique registered from
    /// now on
    ///
    /// Same ordering rule as [`Effect::add_global_uniform`].
    pub fn add_global_macro(&self, binding: MacroBinding) -> &Self {
        self.inner.global_macros.borrow_mut().push(binding);
        self
    }

    /// Declare a default material value
    pub fn set_default<T: PropertyKind>(&self, key: impl Into<String>, value: T) -> &Self {
        self.inner
            .defaults
            .borrow_mut()
            .push((key.into(), value.into_value()));
        self
    }

    /// Copy declared defaults into `material` for keys it does not define
    ///
    /// Defaults come from two places: values authored on the passes' uniform
    /// bindings (the collection qualification is stripped, so a binding on
    /// `material[${materialId}].diffuseColor` seeds `diffuseColor`) and the
    /// effect-level [`Effect::set_default`] table. Keys the material already
    /// holds are never overwritten.
    pub fn fill_material(&self, material: &super::material::Material) {
        for technique in self.inner.techniques.borrow().iter() {
            for pass in &technique.passes {
                for binding in &pass.uniform_bindings {
                    let Some(default) = &binding.default else {
                        continue;
                    };
                    let key = binding
                        .property
                        .rsplit('.')
                        .next()
                        .unwrap_or(&binding.property);
                    if !material.has(key) {
                        material.provider().set_raw(key.to_owned(), default.clone());
                    }
                }
            }
        }
        for (key, value) in self.inner.defaults.borrow().iter() {
            if !material.has(key) {
                material.provider().set_raw(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{Material, ProgramTemplate};

    fn one_pass_technique(name: &str) -> Technique {
        Technique::new(
            name,
            vec![Pass::new("p0", ProgramTemplate::new("prog", "vs", "fs"))],
        )
    }

    #[test]
    fn test_fallback_chain_order_and_cycle_guard() {
        let effect = Effect::new("phong");
        effect
            .add_technique(one_pass_technique("shadowed"))
            .add_technique(one_pass_technique("lit"))
            .add_technique(one_pass_technique("flat"))
            .set_fallback("shadowed", "lit")
            .set_fallback("lit", "flat")
            .set_fallback("flat", "shadowed");

        let chain = effect.fallback_chain("shadowed");
        let names: Vec<&str> = chain.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["shadowed", "lit", "flat"]);
    }

    #[test]
    fn test_fill_material_does_not_overwrite() {
        let effect = Effect::new("phong");
        effect
            .set_default("shininess", 16.0f32)
            .set_default("opacity", 1.0f32);

        let material = Material::new("custom");
        material.set("shininess", 64.0f32);

        effect.fill_material(&material);
        assert_eq!(material.get::<f32>("shininess"), Ok(64.0));
        assert_eq!(material.get::<f32>("opacity"), Ok(1.0));
    }

    #[test]
    fn test_fill_material_seeds_binding_defaults() {
        use crate::foundation::math::Vec4;

        let effect = Effect::new("phong");
        let pass = Pass::new("p0", ProgramTemplate::new("prog", "vs", "fs")).with_uniform(
            UniformBinding::new("uDiffuse", "material[${materialId}].diffuseColor")
                .with_default(Vec4::new(1.0, 1.0, 1.0, 1.0)),
        );
        effect.add_technique(Technique::new("default", vec![pass]));

        let material = Material::new("bare");
        effect.fill_material(&material);
        assert_eq!(
            material.get::<Vec4>("diffuseColor"),
            Ok(Vec4::new(1.0, 1.0, 1.0, 1.0))
        );
    }

    #[test]
    fn test_global_bindings_apply_only_to_later_techniques() {
        let effect = Effect::new("phong");
        effect.add_technique(one_pass_technique("early"));
        effect.add_global_uniform(UniformBinding::new("uTime", "time"));
        effect.add_technique(one_pass_technique("late"));

        let early = effect.technique("early").unwrap();
        assert_eq!(early.passes[0].uniform_bindings.len(), 0);
        let late = effect.technique("late").unwrap();
        assert_eq!(late.passes[0].uniform_bindings.len(), 1);
    }
}
