use std::collections::HashMap;
use std::rc::{Rc, Weak};

use slab::Slab;

use crate::Filter;

/// Idents claimed under a single filter kind.
#[derive(Debug)]
pub(crate) struct EventSet<T> {
    entries: HashMap<i32, Weak<T>>,
}

impl<T> Default for EventSet<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> EventSet<T> {
    /// Returns `true` if `ident` is claimed.
    pub(crate) fn contains(&self, ident: i32) -> bool {
        self.entries.contains_key(&ident)
    }

    /// Returns the live owner of `ident`.
    pub(crate) fn get(&self, ident: i32) -> Option<Rc<T>> {
        self.entries.get(&ident).and_then(Weak::upgrade)
    }

    /// Claims `ident` for `owner`.
    ///
    /// Returns `false` and leaves the set untouched if `ident` is already claimed.
    pub(crate) fn insert(&mut self, ident: i32, owner: Weak<T>) -> bool {
        if self.contains(ident) {
            return false;
        }
        self.entries.insert(ident, owner);
        true
    }

    /// Releases `ident`. Does nothing if it is not claimed.
    pub(crate) fn remove(&mut self, ident: i32) {
        self.entries.remove(&ident);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The registration tables of one poll instance.
///
/// Every enabled watcher holds one claim in the set of its filter kind and one token. The token
/// is the key the kernel queue reports back, so occurred events resolve to their watcher without
/// knowing the filter kind.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    read: EventSet<T>,
    write: EventSet<T>,
    signal: EventSet<T>,
    timer: EventSet<T>,
    tokens: Slab<Weak<T>>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            read: EventSet::default(),
            write: EventSet::default(),
            signal: EventSet::default(),
            timer: EventSet::default(),
            tokens: Slab::new(),
        }
    }
}

impl<T> Registry<T> {
    fn set(&self, filter: Filter) -> &EventSet<T> {
        match filter {
            Filter::Read => &self.read,
            Filter::Write => &self.write,
            Filter::Signal => &self.signal,
            Filter::Timer => &self.timer,
        }
    }

    fn set_mut(&mut self, filter: Filter) -> &mut EventSet<T> {
        match filter {
            Filter::Read => &mut self.read,
            Filter::Write => &mut self.write,
            Filter::Signal => &mut self.signal,
            Filter::Timer => &mut self.timer,
        }
    }

    /// Returns `true` if `ident` is claimed under `filter`.
    pub(crate) fn is_registered(&self, filter: Filter, ident: i32) -> bool {
        self.set(filter).contains(ident)
    }

    /// Returns the watcher claiming `ident` under `filter`.
    pub(crate) fn get(&self, filter: Filter, ident: i32) -> Option<Rc<T>> {
        self.set(filter).get(ident)
    }

    /// Returns the watcher registered with `token`.
    pub(crate) fn by_token(&self, token: usize) -> Option<Rc<T>> {
        self.tokens.get(token).and_then(Weak::upgrade)
    }

    /// Claims `ident` under `filter` and hands out a token for the kernel queue.
    ///
    /// Returns `None` if `ident` is already claimed.
    pub(crate) fn insert(&mut self, filter: Filter, ident: i32, owner: &Rc<T>) -> Option<usize> {
        if !self.set_mut(filter).insert(ident, Rc::downgrade(owner)) {
            return None;
        }
        Some(self.tokens.insert(Rc::downgrade(owner)))
    }

    /// Releases the claim and the token taken by [`Registry::insert`].
    pub(crate) fn remove(&mut self, filter: Filter, ident: i32, token: usize) {
        self.set_mut(filter).remove(ident);
        if self.tokens.contains(token) {
            self.tokens.remove(token);
        }
    }

    /// Number of registrations across all filter kinds.
    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }
}
