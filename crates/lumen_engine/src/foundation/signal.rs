//! Single-threaded signal/slot primitive
//!
//! Signals are the engine's change-notification channel: providers, stores,
//! and the scene graph all emit through them, and every delivery is
//! synchronous — by the time `emit` returns, every connected handler has run.
//!
//! Connections are scoped: [`Signal::connect`] hands back a [`Slot`] guard
//! and dropping the guard disconnects the handler. Disconnecting is the only
//! cancellation mechanism the engine offers.
//!
//! Emission is re-entrancy tolerant: handlers may connect or disconnect
//! slots (including their own) while a dispatch is in flight. Dispatch works
//! on a snapshot of the connected handlers and re-checks liveness before
//! each call, so a handler connected during dispatch is first called on the
//! next emission, and a handler disconnected during dispatch is not called
//! again in the same emission. A handler whose body re-emits the same signal
//! is skipped in the nested dispatch; every other handler still runs.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

type Handler<T> = Rc<RefCell<dyn FnMut(&T)>>;

struct SignalInner<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

impl<T> SignalInner<T> {
    fn is_connected(&self, id: u64) -> bool {
        self.handlers.iter().any(|(slot_id, _)| *slot_id == id)
    }
}

trait Disconnect {
    fn disconnect(&mut self, id: u64);
}

impl<T> Disconnect for SignalInner<T> {
    fn disconnect(&mut self, id: u64) {
        self.handlers.retain(|(slot_id, _)| *slot_id != id);
    }
}

/// A synchronously dispatched, single-threaded signal
///
/// Cloning a `Signal` clones the handle, not the handler list: all clones
/// share the same connections.
pub struct Signal<T> {
    inner: Rc<RefCell<SignalInner<T>>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("handlers", &self.inner.borrow().handlers.len())
            .finish()
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal with no connections
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(SignalInner {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    /// Connect a handler; it stays connected for the lifetime of the
    /// returned [`Slot`]
    #[must_use = "dropping the Slot disconnects the handler immediately"]
    pub fn connect(&self, handler: impl FnMut(&T) + 'static) -> Slot {
        let mut inner = self.inner.borrow_mut();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Rc::new(RefCell::new(handler))));
        drop(inner);

        let weak = Rc::downgrade(&self.inner);
        let weak: Weak<RefCell<dyn Disconnect>> = weak;
        Slot { signal: weak, id }
    }

    /// Deliver `arg` to every currently connected handler, synchronously
    pub fn emit(&self, arg: &T) {
        // Snapshot so handlers can mutate the connection list mid-dispatch.
        let snapshot: Vec<(u64, Handler<T>)> = self
            .inner
            .borrow()
            .handlers
            .iter()
            .map(|(id, h)| (*id, Rc::clone(h)))
            .collect();

        for (id, handler) in snapshot {
            if !self.inner.borrow().is_connected(id) {
                continue;
            }
            // A handler already running further up the stack means this
            // emission is nested inside that handler; skip it here.
            if let Ok(mut handler) = handler.try_borrow_mut() {
                handler(arg);
            }
        }
    }

    /// Number of currently connected handlers
    pub fn handler_count(&self) -> usize {
        self.inner.borrow().handlers.len()
    }
}

/// Connection guard returned by [`Signal::connect`]
///
/// Dropping the slot disconnects the handler. A slot outliving its signal is
/// harmless.
pub struct Slot {
    signal: Weak<RefCell<dyn Disconnect>>,
    id: u64,
}

impl std::fmt::Debug for Slot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slot").field("id", &self.id).finish()
    }
}

impl Slot {
    /// Disconnect the handler now instead of waiting for drop
    pub fn disconnect(self) {
        // Drop does the work.
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(inner) = self.signal.upgrade() {
            inner.borrow_mut().disconnect(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_connected_handler() {
        let signal: Signal<i32> = Signal::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        let _slot = signal.connect(move |v| sink.borrow_mut().push(*v));

        signal.emit(&1);
        signal.emit(&2);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_dropping_slot_disconnects() {
        let signal: Signal<i32> = Signal::new();
        let seen = Rc::new(RefCell::new(0));

        let sink = Rc::clone(&seen);
        let slot = signal.connect(move |_| *sink.borrow_mut() += 1);

        signal.emit(&0);
        drop(slot);
        signal.emit(&0);
        assert_eq!(*seen.borrow(), 1);
        assert_eq!(signal.handler_count(), 0);
    }

    #[test]
    fn test_default_signal_starts_empty() {
        let signal: Signal<i32> = Signal::default();
        assert_eq!(signal.handler_count(), 0);
        signal.emit(&0);
    }

    #[test]
    fn test_reentrant_emit_skips_the_running_handler() {
        let signal: Signal<i32> = Signal::new();
        let other_calls = Rc::new(RefCell::new(0));

        // First handler re-emits once, the way a store subscriber setting a
        // property on a registered provider re-enters the same signal.
        let sig = signal.clone();
        let reemitted = Rc::new(RefCell::new(false));
        let flag = Rc::clone(&reemitted);
        let _first = signal.connect(move |_| {
            if !*flag.borrow() {
                *flag.borrow_mut() = true;
                sig.emit(&1);
            }
        });

        let sink = Rc::clone(&other_calls);
        let _second = signal.connect(move |_| *sink.borrow_mut() += 1);

        signal.emit(&0);
        // Second handler ran in both the nested and the outer dispatch.
        assert_eq!(*other_calls.borrow(), 2);
    }

    #[test]
    fn test_disconnect_during_dispatch_is_safe() {
        let signal: Signal<i32> = Signal::new();
        let second_calls = Rc::new(RefCell::new(0));

        // First handler disconnects the second one mid-dispatch.
        let victim: Rc<RefCell<Option<Slot>>> = Rc::new(RefCell::new(None));
        let victim_ref = Rc::clone(&victim);
        let _first = signal.connect(move |_| {
            victim_ref.borrow_mut().take();
        });

        let sink = Rc::clone(&second_calls);
        *victim.borrow_mut() = Some(signal.connect(move |_| *sink.borrow_mut() += 1));

        signal.emit(&0);
        assert_eq!(*second_calls.borrow(), 0);
    }

    #[test]
    fn test_connect_during_dispatch_deferred_to_next_emit() {
        let signal: Signal<i32> = Signal::new();
        let late_calls = Rc::new(RefCell::new(0));
        let stash: Rc<RefCell<Vec<Slot>>> = Rc::new(RefCell::new(Vec::new()));

        let sig = signal.clone();
        let sink = Rc::clone(&late_calls);
        let stash_ref = Rc::clone(&stash);
        let _slot = signal.connect(move |_| {
            if stash_ref.borrow().is_empty() {
                let inner_sink = Rc::clone(&sink);
                let new_slot = sig.connect(move |_| *inner_sink.borrow_mut() += 1);
                stash_ref.borrow_mut().push(new_slot);
            }
        });

        signal.emit(&0);
        assert_eq!(*late_calls.borrow(), 0, "not called in the same dispatch");
        signal.emit(&0);
        assert_eq!(*late_calls.borrow(), 1);
    }
}
