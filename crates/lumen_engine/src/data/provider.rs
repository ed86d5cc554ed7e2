//! Named property bag with change notifications
//!
//! A [`Provider`] is a cheaply clonable shared handle: a material shared by
//! many surfaces is one provider referenced from many places, and a mutation
//! through any handle is visible to all of them. The provider is dropped
//! when the last handle goes away.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::value::{PropertyKind, PropertyValue};
use super::DataError;
use crate::foundation::signal::Signal;

static NEXT_PROVIDER_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier of a provider, unique within the process
///
/// Used to build collection-qualified property names such as
/// `material[42].diffuseColor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProviderId(u64);

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Payload of provider-level property events
#[derive(Debug, Clone)]
pub struct PropertyEvent {
    /// Id of the provider the event originated from
    pub provider: ProviderId,
    /// Bare property key within the provider
    pub key: String,
}

struct ProviderShared {
    id: ProviderId,
    // Insertion-ordered so synthetic events replay in a deterministic order.
    values: RefCell<Vec<(String, PropertyValue)>>,
    property_added: Signal<PropertyEvent>,
    property_changed: Signal<PropertyEvent>,
    property_removed: Signal<PropertyEvent>,
}

/// Shared handle to a named property bag
#[derive(Clone)]
pub struct Provider {
    inner: Rc<ProviderShared>,
}

impl Default for Provider {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Provider {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("id", &self.inner.id)
            .field("len", &self.inner.values.borrow().len())
            .finish()
    }
}

impl Provider {
    /// Create an empty provider with a fresh stable id
    pub fn new() -> Self {
        Self {
            inner: Rc::new(ProviderShared {
                id: ProviderId(NEXT_PROVIDER_ID.fetch_add(1, Ordering::Relaxed)),
                values: RefCell::new(Vec::new()),
                property_added: Signal::new(),
                property_changed: Signal::new(),
                property_removed: Signal::new(),
            }),
        }
    }

    /// Copy the source provider's current values into a new provider
    ///
    /// The copy gets its own id and its own signals; no connection to the
    /// source remains.
    pub fn copy_of(source: &Provider) -> Self {
        let copy = Self::new();
        *copy.inner.values.borrow_mut() = source.inner.values.borrow().clone();
        copy
    }

    /// Stable identifier of this provider
    pub fn id(&self) -> ProviderId {
        self.inner.id
    }

    /// Downgrade to a weak handle (lifetime probes, back-references)
    pub fn downgrade(&self) -> WeakProvider {
        WeakProvider {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// Insert or overwrite a property
    ///
    /// Fires `property_changed` if the key was already present (and the
    /// value actually differs), `property_added` otherwise, before
    /// returning.
    pub fn set<T: PropertyKind>(&self, key: impl Into<String>, value: T) -> &Self {
        self.set_raw(key, value.into_value())
    }

    /// Insert or overwrite a property from an already-tagged value
    ///
    /// Same event contract as [`Provider::set`]. Used where values are moved
    /// around untyped, such as seeding material defaults.
    pub fn set_raw(&self, key: impl Into<String>, value: PropertyValue) -> &Self {
        let key = key.into();

        let previous = {
            let mut values = self.inner.values.borrow_mut();
            match values.iter_mut().find(|(k, _)| *k == key) {
                Some((_, stored)) => Some(std::mem::replace(stored, value)),
                None => {
                    values.push((key.clone(), value));
                    None
                }
            }
        };

        let event = PropertyEvent {
            provider: self.inner.id,
            key,
        };
        match previous {
            // Value-equal overwrites are still notified: consumers that care
            // (the transform pass) filter on their side.
            Some(_) => self.inner.property_changed.emit(&event),
            None => self.inner.property_added.emit(&event),
        }
        self
    }

    /// Remove a property
    ///
    /// Fires `property_removed` before returning. Removing an absent key is
    /// a documented no-op.
    pub fn unset(&self, key: &str) -> &Self {
        let removed = {
            let mut values = self.inner.values.borrow_mut();
            let before = values.len();
            values.retain(|(k, _)| k != key);
            values.len() != before
        };

        if removed {
            self.inner.property_removed.emit(&PropertyEvent {
                provider: self.inner.id,
                key: key.to_owned(),
            });
        }
        self
    }

    /// Whether the provider holds `key`
    pub fn has(&self, key: &str) -> bool {
        self.inner.values.borrow().iter().any(|(k, _)| k == key)
    }

    /// Typed read of a property
    pub fn get<T: PropertyKind>(&self, key: &str) -> Result<T, DataError> {
        let values = self.inner.values.borrow();
        let (_, value) = values
            .iter()
            .find(|(k, _)| k == key)
            .ok_or_else(|| DataError::KeyNotFound {
                key: key.to_owned(),
            })?;
        T::from_value(value).ok_or_else(|| DataError::TypeMismatch {
            key: key.to_owned(),
            expected: T::kind_name(),
            actual: value.kind_name(),
        })
    }

    /// Untyped read of a property
    pub fn get_value(&self, key: &str) -> Option<PropertyValue> {
        self.inner
            .values
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Snapshot of keys in insertion order
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .values
            .borrow()
            .iter()
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Snapshot of entries in insertion order
    pub fn entries(&self) -> Vec<(String, PropertyValue)> {
        self.inner.values.borrow().clone()
    }

    /// Number of properties
    pub fn len(&self) -> usize {
        self.inner.values.borrow().len()
    }

    /// Whether the provider holds no properties
    pub fn is_empty(&self) -> bool {
        self.inner.values.borrow().is_empty()
    }

    /// Signal fired when a new key appears
    pub fn on_property_added(&self) -> Signal<PropertyEvent> {
        self.inner.property_added.clone()
    }

    /// Signal fired when an existing key's value is overwritten
    pub fn on_property_changed(&self) -> Signal<PropertyEvent> {
        self.inner.property_changed.clone()
    }

    /// Signal fired when a key is removed
    pub fn on_property_removed(&self) -> Signal<PropertyEvent> {
        self.inner.property_removed.clone()
    }
}

/// Weak counterpart of [`Provider`]
///
/// Upgradeable while at least one strong handle is alive. Used in tests to
/// assert that draw calls do not outlive the data they bind.
#[derive(Clone)]
pub struct WeakProvider {
    inner: Weak<ProviderShared>,
}

impl Default for WeakProvider {
    /// A weak handle that never upgrades
    fn default() -> Self {
        Self { inner: Weak::new() }
    }
}

impl WeakProvider {
    /// Try to recover a strong handle
    pub fn upgrade(&self) -> Option<Provider> {
        self.inner.upgrade().map(|inner| Provider { inner })
    }
}

impl std::fmt::Debug for WeakProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("WeakProvider")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_set_fires_added_then_changed() {
        let provider = Provider::new();
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&log);
        let _added = provider
            .on_property_added()
            .connect(move |e| sink.borrow_mut().push(format!("added:{}", e.key)));
        let sink = Rc::clone(&log);
        let _changed = provider
            .on_property_changed()
            .connect(move |e| sink.borrow_mut().push(format!("changed:{}", e.key)));

        provider.set("diffuseColor", 1.0_f32);
        provider.set("diffuseColor", 0.5_f32);

        assert_eq!(
            *log.borrow(),
            vec!["added:diffuseColor", "changed:diffuseColor"]
        );
    }

    #[test]
    fn test_set_raw_matches_typed_set() {
        let provider = Provider::new();
        let added = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&added);
        let _slot = provider
            .on_property_added()
            .connect(move |_| *sink.borrow_mut() += 1);

        provider.set_raw("opacity", PropertyValue::Float(0.5));
        assert_eq!(provider.get::<f32>("opacity"), Ok(0.5));
        assert_eq!(*added.borrow(), 1);
    }

    #[test]
    fn test_typed_get_errors() {
        let provider = Provider::new();
        provider.set("shininess", 8_i32);

        assert_eq!(provider.get::<i32>("shininess"), Ok(8));
        assert_eq!(
            provider.get::<f32>("shininess"),
            Err(DataError::TypeMismatch {
                key: "shininess".into(),
                expected: "float",
                actual: "int",
            })
        );
        assert_eq!(
            provider.get::<f32>("absent"),
            Err(DataError::KeyNotFound {
                key: "absent".into()
            })
        );
    }

    #[test]
    fn test_unset_absent_key_is_noop() {
        let provider = Provider::new();
        let fired = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&fired);
        let _slot = provider
            .on_property_removed()
            .connect(move |_| *sink.borrow_mut() += 1);

        provider.unset("missing");
        assert_eq!(*fired.borrow(), 0);

        provider.set("x", 1_i32);
        provider.unset("x");
        assert_eq!(*fired.borrow(), 1);
        assert!(!provider.has("x"));
    }

    #[test]
    fn test_shared_handles_see_mutations() {
        let a = Provider::new();
        let b = a.clone();
        a.set("color", 2_i32);
        assert_eq!(b.get::<i32>("color"), Ok(2));
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_keys_preserve_insertion_order() {
        let provider = Provider::new();
        provider.set("a", 1_i32).set("b", 2_i32).set("c", 3_i32);
        assert_eq!(provider.keys(), vec!["a", "b", "c"]);
    }
}
