//! Observer registration and fan-out.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// An observer callback. Identity is the allocation, so register and
/// remove the same `Rc`.
pub type Callback = Rc<dyn Fn()>;

/// A set of callbacks notified after every recomputation.
///
/// Callbacks may add or remove observers while being notified. Each
/// notification pass works on the observers registered when it started.
#[derive(Default)]
pub struct Observers {
    callbacks: RefCell<Vec<Callback>>,
}

impl Observers {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback`. Returns false if it was already registered.
    pub fn add(&self, callback: Callback) -> bool {
        if self.contains(&callback) {
            return false;
        }
        self.callbacks.borrow_mut().push(callback);
        true
    }

    /// Unregisters `callback`. Returns false if it was not registered.
    pub fn remove(&self, callback: &Callback) -> bool {
        let mut callbacks = self.callbacks.borrow_mut();
        match callbacks.iter().position(|cb| Rc::ptr_eq(cb, callback)) {
            Some(idx) => {
                callbacks.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Returns true if `callback` is registered.
    #[must_use]
    pub fn contains(&self, callback: &Callback) -> bool {
        self.callbacks
            .borrow()
            .iter()
            .any(|cb| Rc::ptr_eq(cb, callback))
    }

    /// Number of registered callbacks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.borrow().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.borrow().is_empty()
    }

    /// Invokes every callback registered at the start of the call.
    pub fn notify(&self) {
        let snapshot: Vec<Callback> = self.callbacks.borrow().clone();
        for callback in &snapshot {
            callback();
        }
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("len", &self.len())
            .finish()
    }
}
