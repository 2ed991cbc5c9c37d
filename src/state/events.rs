// src/state/events.rs

//! Typed listener lists for node events.
//!
//! Each node carries one `Signal` per event kind. Listeners are boxed
//! closures keyed by a `HandlerId` so the owner can disconnect them later
//! (the parent disconnects its propagation listeners when a child is
//! replaced). Emission snapshots the slot list first, so a listener is free
//! to re-enter the tree; propagating a child percentage into the parent is
//! exactly that.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::action::Action;

/// Opaque handle to a connected listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

/// Payload of the activity-changed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionChange {
    /// `None` means the activity was stopped.
    pub action: Option<Action>,
    pub hint: Option<String>,
}

/// Payload of the package-progress-changed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageProgress {
    /// Package identifier, e.g. `hal;0.5.8;i386;fedora`.
    pub package_id: String,
    pub action: Action,
    pub percentage: u32,
}

/// One event kind: an ordered list of listeners.
pub(crate) struct Signal<T> {
    seq: Cell<u64>,
    slots: RefCell<Vec<(HandlerId, Rc<dyn Fn(&T)>)>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            seq: Cell::new(0),
            slots: RefCell::new(Vec::new()),
        }
    }
}

impl<T> Signal<T> {
    pub(crate) fn connect(&self, listener: impl Fn(&T) + 'static) -> HandlerId {
        let id = HandlerId(self.seq.get());
        self.seq.set(id.0 + 1);
        self.slots.borrow_mut().push((id, Rc::new(listener)));
        id
    }

    pub(crate) fn disconnect(&self, id: HandlerId) {
        self.slots.borrow_mut().retain(|(slot, _)| *slot != id);
    }

    /// Invoke every listener with the borrow released, so listeners can
    /// connect, disconnect, or call back into the node.
    pub(crate) fn emit(&self, value: &T) {
        let snapshot: Vec<Rc<dyn Fn(&T)>> = self
            .slots
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(value);
        }
    }
}

/// The full set of events a node can raise.
#[derive(Default)]
pub(crate) struct Signals {
    pub(crate) percentage: Signal<u32>,
    pub(crate) subpercentage: Signal<u32>,
    pub(crate) allow_cancel: Signal<bool>,
    pub(crate) action: Signal<ActionChange>,
    pub(crate) speed: Signal<u64>,
    pub(crate) package_progress: Signal<PackageProgress>,
}
