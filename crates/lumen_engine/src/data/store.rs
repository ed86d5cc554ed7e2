//! Aggregated per-node property store
//!
//! A [`Store`] is an ordered list of `(collection, provider)` registrations.
//! Collections group providers by role: `"material"`, `"geometry"`,
//! `"surface"`, `"effect"`, light collections, and so on.
//!
//! Lookup policy (documented, tested): **first match wins**, in registration
//! order. Collections registered later never shadow earlier ones.
//!
//! A property registered under collection `c` by provider `#id` with key `k`
//! is reachable under three names:
//!
//! - `k` — bare, first match across every registration;
//! - `c.k` — first match within collection `c`;
//! - `c[id].k` — fully qualified, pinned to one provider instance.
//!
//! Each collection additionally maintains an integer `c.length` property in
//! a store-internal provider, updated when providers are added or removed
//! and unset when the collection empties. Macro bindings use it to react to
//! collection membership (e.g. `directionalLights.length`).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::provider::{PropertyEvent, Provider};
use super::value::{PropertyKind, PropertyValue};
use super::DataError;
use crate::foundation::signal::{Signal, Slot};

/// Payload of store-level property events
#[derive(Debug, Clone)]
pub struct StoreEvent {
    /// Provider the event originated from
    pub provider: Provider,
    /// Collection the provider is registered under (empty for `.length`
    /// bookkeeping properties)
    pub collection: String,
    /// Bare key within the provider
    pub key: String,
    /// Fully qualified name, `collection[id].key`
    pub qualified: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EventClass {
    Added,
    Changed,
    Removed,
}

struct Entry {
    collection: String,
    provider: Provider,
    // Keeps the provider→store event routing alive for this registration.
    _slots: Vec<Slot>,
}

struct StoreShared {
    entries: RefCell<Vec<Entry>>,
    lengths: Provider,
    // Routing for the internal length provider, connected once at creation.
    lengths_slots: RefCell<Vec<Slot>>,
    property_added: Signal<StoreEvent>,
    property_changed: Signal<StoreEvent>,
    property_removed: Signal<StoreEvent>,
    named_added: RefCell<HashMap<String, Signal<StoreEvent>>>,
    named_changed: RefCell<HashMap<String, Signal<StoreEvent>>>,
    named_removed: RefCell<HashMap<String, Signal<StoreEvent>>>,
}

impl StoreShared {
    fn named_map(&self, class: EventClass) -> &RefCell<HashMap<String, Signal<StoreEvent>>> {
        match class {
            EventClass::Added => &self.named_added,
            EventClass::Changed => &self.named_changed,
            EventClass::Removed => &self.named_removed,
        }
    }

    fn catch_all(&self, class: EventClass) -> &Signal<StoreEvent> {
        match class {
            EventClass::Added => &self.property_added,
            EventClass::Changed => &self.property_changed,
            EventClass::Removed => &self.property_removed,
        }
    }

    /// Deliver one provider event under all of its store-visible names.
    fn route(&self, class: EventClass, collection: &str, provider: &Provider, key: &str) {
        let qualified = format!("{}[{}].{}", collection, provider.id(), key);
        let event = StoreEvent {
            provider: provider.clone(),
            collection: collection.to_owned(),
            key: key.to_owned(),
            qualified: qualified.clone(),
        };

        self.catch_all(class).emit(&event);

        let names = [
            key.to_owned(),
            format!("{collection}.{key}"),
            qualified,
        ];
        for name in names {
            let signal = self.named_map(class).borrow().get(&name).cloned();
            if let Some(signal) = signal {
                signal.emit(&event);
            }
        }
    }

    /// Deliver a `.length` bookkeeping event. These fire named signals only:
    /// the catch-all signals reflect user providers exclusively, so that
    /// registering a provider with N keys synthesizes exactly N
    /// notifications at the store level.
    fn route_length(&self, class: EventClass, key: &str) {
        let event = StoreEvent {
            provider: self.lengths.clone(),
            collection: String::new(),
            key: key.to_owned(),
            qualified: key.to_owned(),
        };
        let signal = self.named_map(class).borrow().get(key).cloned();
        if let Some(signal) = signal {
            signal.emit(&event);
        }
    }
}

/// Shared handle to the aggregated property store of one scene node
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreShared>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("providers", &self.inner.entries.borrow().len())
            .finish()
    }
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        let inner = Rc::new(StoreShared {
            entries: RefCell::new(Vec::new()),
            lengths: Provider::new(),
            lengths_slots: RefCell::new(Vec::new()),
            property_added: Signal::new(),
            property_changed: Signal::new(),
            property_removed: Signal::new(),
            named_added: RefCell::new(HashMap::new()),
            named_changed: RefCell::new(HashMap::new()),
            named_removed: RefCell::new(HashMap::new()),
        });

        let mut slots = Vec::new();
        for (class, signal) in [
            (EventClass::Added, inner.lengths.on_property_added()),
            (EventClass::Changed, inner.lengths.on_property_changed()),
            (EventClass::Removed, inner.lengths.on_property_removed()),
        ] {
            let weak = Rc::downgrade(&inner);
            slots.push(signal.connect(move |event: &PropertyEvent| {
                if let Some(shared) = weak.upgrade() {
                    shared.route_length(class, &event.key);
                }
            }));
        }
        *inner.lengths_slots.borrow_mut() = slots;

        Self { inner }
    }

    /// Register a provider under a named collection
    ///
    /// Appends in O(1) and synthesizes one `property_added` event per key
    /// the provider already holds, in the provider's key insertion order, so
    /// subscribers bound at the store level update without a rescan. Bumps
    /// `collection.length` afterwards.
    pub fn add_provider(&self, provider: &Provider, collection: &str) -> Result<(), DataError> {
        if self.has_provider(provider, collection) {
            return Err(DataError::ProviderAlreadyRegistered {
                provider: provider.id(),
                collection: collection.to_owned(),
            });
        }

        let mut slots = Vec::new();
        for (class, signal) in [
            (EventClass::Added, provider.on_property_added()),
            (EventClass::Changed, provider.on_property_changed()),
            (EventClass::Removed, provider.on_property_removed()),
        ] {
            let weak = Rc::downgrade(&self.inner);
            let coll = collection.to_owned();
            let source = provider.clone();
            slots.push(signal.connect(move |event: &PropertyEvent| {
                if let Some(shared) = weak.upgrade() {
                    shared.route(class, &coll, &source, &event.key);
                }
            }));
        }

        self.inner.entries.borrow_mut().push(Entry {
            collection: collection.to_owned(),
            provider: provider.clone(),
            _slots: slots,
        });

        log::trace!(
            "store: added provider #{} to collection '{}'",
            provider.id(),
            collection
        );

        for key in provider.keys() {
            self.inner
                .route(EventClass::Added, collection, provider, &key);
        }

        let length = self.collection_len(collection) as i32;
        self.inner
            .lengths
            .set(format!("{collection}.length"), length);

        Ok(())
    }

    /// Unregister a provider from a collection
    ///
    /// Synthesizes one `property_removed` event per key, then decrements
    /// `collection.length`, unsetting it when the collection empties.
    pub fn remove_provider(&self, provider: &Provider, collection: &str) -> Result<(), DataError> {
        let position = self
            .inner
            .entries
            .borrow()
            .iter()
            .position(|e| e.collection == collection && e.provider == *provider);
        let Some(position) = position else {
            return Err(DataError::ProviderNotRegistered {
                provider: provider.id(),
                collection: collection.to_owned(),
            });
        };

        // Dropping the entry disconnects the routing slots first, so the
        // synthetic events below are the last this registration delivers.
        self.inner.entries.borrow_mut().remove(position);

        log::trace!(
            "store: removed provider #{} from collection '{}'",
            provider.id(),
            collection
        );

        for key in provider.keys() {
            self.inner
                .route(EventClass::Removed, collection, provider, &key);
        }

        let length = self.collection_len(collection);
        let name = format!("{collection}.length");
        if length == 0 {
            self.inner.lengths.unset(&name);
        } else {
            self.inner.lengths.set(name, length as i32);
        }

        Ok(())
    }

    /// Whether `provider` is registered under `collection`
    pub fn has_provider(&self, provider: &Provider, collection: &str) -> bool {
        self.inner
            .entries
            .borrow()
            .iter()
            .any(|e| e.collection == collection && e.provider == *provider)
    }

    /// Providers registered under `collection`, in registration order
    pub fn providers_in(&self, collection: &str) -> Vec<Provider> {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter(|e| e.collection == collection)
            .map(|e| e.provider.clone())
            .collect()
    }

    /// Number of providers registered under `collection`
    pub fn collection_len(&self, collection: &str) -> usize {
        self.inner
            .entries
            .borrow()
            .iter()
            .filter(|e| e.collection == collection)
            .count()
    }

    /// Resolve a property name to its backing provider and bare key
    ///
    /// Accepts all three name forms plus `.length` bookkeeping names.
    /// First match wins, in registration order.
    pub fn resolve(&self, name: &str) -> Option<(Provider, String)> {
        if self.inner.lengths.has(name) {
            return Some((self.inner.lengths.clone(), name.to_owned()));
        }

        if let Some((collection, id, key)) = parse_qualified(name) {
            return self
                .inner
                .entries
                .borrow()
                .iter()
                .find(|e| e.collection == collection && e.provider.id().to_string() == id)
                .filter(|e| e.provider.has(key))
                .map(|e| (e.provider.clone(), key.to_owned()));
        }

        if let Some((collection, key)) = name.split_once('.') {
            let found = self
                .inner
                .entries
                .borrow()
                .iter()
                .find(|e| e.collection == collection && e.provider.has(key))
                .map(|e| (e.provider.clone(), key.to_owned()));
            if found.is_some() {
                return found;
            }
        }

        self.inner
            .entries
            .borrow()
            .iter()
            .find(|e| e.provider.has(name))
            .map(|e| (e.provider.clone(), name.to_owned()))
    }

    /// Whether any registered provider exposes `name`
    pub fn has_property(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Typed read through name resolution
    pub fn get<T: PropertyKind>(&self, name: &str) -> Result<T, DataError> {
        let (provider, key) = self.resolve(name).ok_or_else(|| DataError::KeyNotFound {
            key: name.to_owned(),
        })?;
        provider.get::<T>(&key).map_err(|e| match e {
            DataError::TypeMismatch {
                expected, actual, ..
            } => DataError::TypeMismatch {
                key: name.to_owned(),
                expected,
                actual,
            },
            other => other,
        })
    }

    /// Untyped read through name resolution
    pub fn get_value(&self, name: &str) -> Option<PropertyValue> {
        let (provider, key) = self.resolve(name)?;
        provider.get_value(&key)
    }

    /// Catch-all signal: a key appeared under any registered provider
    pub fn on_added(&self) -> Signal<StoreEvent> {
        self.inner.property_added.clone()
    }

    /// Catch-all signal: a value changed under any registered provider
    pub fn on_changed(&self) -> Signal<StoreEvent> {
        self.inner.property_changed.clone()
    }

    /// Catch-all signal: a key disappeared from any registered provider
    pub fn on_removed(&self) -> Signal<StoreEvent> {
        self.inner.property_removed.clone()
    }

    /// Per-name `added` signal (created on demand)
    ///
    /// `name` may be any of the three lookup forms or a `.length` name; the
    /// handler only sees events matching that exact form.
    pub fn on_added_for(&self, name: &str) -> Signal<StoreEvent> {
        Self::named(&self.inner.named_added, name)
    }

    /// Per-name `changed` signal (created on demand)
    pub fn on_changed_for(&self, name: &str) -> Signal<StoreEvent> {
        Self::named(&self.inner.named_changed, name)
    }

    /// Per-name `removed` signal (created on demand)
    pub fn on_removed_for(&self, name: &str) -> Signal<StoreEvent> {
        Self::named(&self.inner.named_removed, name)
    }

    fn named(
        map: &RefCell<HashMap<String, Signal<StoreEvent>>>,
        name: &str,
    ) -> Signal<StoreEvent> {
        map.borrow_mut()
            .entry(name.to_owned())
            .or_insert_with(Signal::new)
            .clone()
    }

    /// Substitute `${variable}` placeholders in a binding property name
    ///
    /// Unknown variables are left in place; the subsequent resolution failure
    /// is reported by the caller.
    pub fn format_property_name(template: &str, variables: &[(String, String)]) -> String {
        let mut name = template.to_owned();
        for (variable, value) in variables {
            name = name.replace(&format!("${{{variable}}}"), value);
        }
        name
    }
}

/// Split `collection[id].key` into its parts
fn parse_qualified(name: &str) -> Option<(&str, &str, &str)> {
    let open = name.find('[')?;
    let close = open + name[open..].find(']')?;
    let rest = &name[close + 1..];
    if !rest.starts_with('.') || rest.len() < 2 {
        return None;
    }
    Some((&name[..open], &name[open + 1..close], &rest[1..]))
}
