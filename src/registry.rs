use std::collections::HashMap;

use crate::backend::RawHandle;

/// Map from issued handles to the resources they name.
///
/// Handles start at 1, increase monotonically and are never reused, so a handle
/// that outlives its resource can never alias a newer one.
#[derive(Debug)]
pub struct HandleRegistry<T> {
    next: RawHandle,
    entries: HashMap<RawHandle, T>,
}

impl<T> Default for HandleRegistry<T> {
    fn default() -> Self {
        Self {
            next: 0,
            entries: HashMap::new(),
        }
    }
}

impl<T> HandleRegistry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` and return its new handle.
    pub fn insert(&mut self, value: T) -> RawHandle {
        self.next = self.next.saturating_add(1);
        self.entries.insert(self.next, value);
        self.next
    }

    #[must_use]
    pub fn get(&self, handle: RawHandle) -> Option<&T> {
        self.entries.get(&handle)
    }

    pub fn get_mut(&mut self, handle: RawHandle) -> Option<&mut T> {
        self.entries.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: RawHandle) -> Option<T> {
        self.entries.remove(&handle)
    }

    #[must_use]
    pub fn contains(&self, handle: RawHandle) -> bool {
        self.entries.contains_key(&handle)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every entry matching `pred`, returning how many went.
    pub fn remove_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, value| !pred(value));
        before - self.entries.len()
    }
}
