//! Keeps host errors alive while the guest holds an error object standing in for them.

use crate::host_error::HostError;
use rquickjs::{Object, Persistent};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

/// Name of the guest property that carries the registry key on a guest error object.
pub const IDENTITY_KEY_PROPERTY: &str = "__jsboxHostKey";

/// The guest error object a registry entry was stamped on.
pub type GuestOwner = Persistent<Object<'static>>;

/// A per-instance table of host errors that have been thrown into the guest.
///
/// Keys are synthetic and never reused, so a stale key resolves to nothing rather than to an
/// unrelated object. Each entry remembers its owner, the guest object stamped with its key, and
/// only answers a lookup made on behalf of that owner. Entries are single-use: translating the
/// guest error back to the host consumes its entry.
///
/// Owners are engine handles; the registry must be cleared before its engine is torn down.
pub struct IdentityRegistry<O = GuestOwner> {
    next_key: Cell<u64>,
    entries: RefCell<HashMap<u64, (HostError, O)>>,
}

impl<O> IdentityRegistry<O> {
    pub fn new() -> Self {
        IdentityRegistry {
            next_key: Cell::new(0),
            entries: RefCell::new(HashMap::new()),
        }
    }

    pub fn register(&self, error: HostError, owner: O) -> u64 {
        let key = self.next_key.get() + 1;
        self.next_key.set(key);
        self.entries.borrow_mut().insert(key, (error, owner));
        key
    }

    /// The host error under `key`, if `is_owner` accepts the entry's owner.
    pub fn resolve<F>(&self, key: u64, is_owner: F) -> Option<HostError>
    where
        F: FnOnce(&O) -> bool,
    {
        match self.entries.borrow().get(&key) {
            Some((error, owner)) if is_owner(owner) => Some(error.clone()),
            _ => None,
        }
    }

    /// Like [`resolve`](#method.resolve), but removes the entry it finds. An entry whose owner is
    /// rejected stays registered.
    pub fn consume<F>(&self, key: u64, is_owner: F) -> Option<HostError>
    where
        F: FnOnce(&O) -> bool,
    {
        let mut entries = self.entries.borrow_mut();
        match entries.get(&key) {
            Some((_, owner)) if is_owner(owner) => entries.remove(&key).map(|(error, _)| error),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }
}

impl<O> Default for IdentityRegistry<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> fmt::Debug for IdentityRegistry<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityRegistry")
            .field("next_key", &self.next_key.get())
            .field("entries", &self.len())
            .finish()
    }
}

/// Guest numbers are doubles; only keys that survived that trip exactly are accepted.
pub(crate) fn key_from_guest(raw: f64) -> Option<u64> {
    if raw.is_finite() && raw >= 1.0 && raw.fract() == 0.0 && raw <= 9_007_199_254_740_991.0 {
        Some(raw as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Registry = IdentityRegistry<u32>;

    #[test]
    fn entries_are_consumed_once() {
        let registry = Registry::new();
        let err = HostError::msg("boom");
        let key = registry.register(err.clone(), 7);

        let resolved = registry.resolve(key, |o| *o == 7).expect("registered key resolves");
        assert!(resolved.ptr_eq(&err));

        let consumed = registry.consume(key, |o| *o == 7).expect("registered key is consumable");
        assert!(consumed.ptr_eq(&err));
        assert!(registry.consume(key, |_| true).is_none());
        assert!(registry.resolve(key, |_| true).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn only_the_owner_can_use_a_key() {
        let registry = Registry::new();
        let key = registry.register(HostError::msg("owned"), 1);

        assert!(registry.resolve(key, |o| *o == 2).is_none());
        assert!(registry.consume(key, |o| *o == 2).is_none());
        assert_eq!(registry.len(), 1);
        assert!(registry.consume(key, |o| *o == 1).is_some());
    }

    #[test]
    fn keys_are_never_reused() {
        let registry = Registry::new();
        let first = registry.register(HostError::msg("first"), 0);
        registry.consume(first, |_| true);
        let second = registry.register(HostError::msg("second"), 0);
        assert_ne!(first, second);
        assert!(registry.resolve(first, |_| true).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn guest_keys_must_be_exact() {
        assert_eq!(key_from_guest(3.0), Some(3));
        assert_eq!(key_from_guest(3.5), None);
        assert_eq!(key_from_guest(0.0), None);
        assert_eq!(key_from_guest(f64::NAN), None);
        assert_eq!(key_from_guest(-2.0), None);
    }
}
