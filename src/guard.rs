//! Per-object mutual exclusion with an enforced acquisition order.
//!
//! Connections lock at [`LockLevel::Connection`]; result sets and prepared
//! statements lock at [`LockLevel::Child`]. A thread holding a child lock may
//! never block on a connection lock, which rules out the statement-execute vs.
//! connection-close deadlock. The order is tracked per thread and a violation
//! panics, like a `RefCell` double borrow: it is a bug in this crate, not a
//! runtime condition.

use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum LockLevel {
    Connection,
    Child,
}

thread_local! {
    static HELD_LEVELS: RefCell<Vec<LockLevel>> = const { RefCell::new(Vec::new()) };
}

pub(crate) struct OrderedMutex<T> {
    level: LockLevel,
    inner: Mutex<T>,
}

impl<T> OrderedMutex<T> {
    pub(crate) const fn new(level: LockLevel, value: T) -> Self {
        Self {
            level,
            inner: Mutex::new(value),
        }
    }

    pub(crate) fn lock(&self) -> OrderedGuard<'_, T> {
        HELD_LEVELS.with(|held| {
            if let Some(highest) = held.borrow().iter().max()
                && *highest > self.level
            {
                panic!(
                    "lock order violation: acquiring a {:?} lock while holding a {:?} lock",
                    self.level, highest
                );
            }
        });
        // A panic while holding the guard leaves the handle state consistent:
        // every mutation is a single assignment.
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        HELD_LEVELS.with(|held| held.borrow_mut().push(self.level));
        OrderedGuard {
            guard,
            level: self.level,
        }
    }

    pub(crate) fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct OrderedGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    level: LockLevel,
}

impl<T> Deref for OrderedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for OrderedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for OrderedGuard<'_, T> {
    fn drop(&mut self) {
        // try_with: the guard may be dropped during thread-local teardown.
        let _ = HELD_LEVELS.try_with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|level| *level == self.level) {
                held.remove(pos);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_then_child_is_allowed() {
        let parent = OrderedMutex::new(LockLevel::Connection, 1);
        let child = OrderedMutex::new(LockLevel::Child, 2);
        let p = parent.lock();
        let c = child.lock();
        assert_eq!(*p + *c, 3);
    }

    #[test]
    fn sibling_children_may_nest() {
        let a = OrderedMutex::new(LockLevel::Child, ());
        let b = OrderedMutex::new(LockLevel::Child, ());
        let _a = a.lock();
        let _b = b.lock();
    }

    #[test]
    fn released_child_no_longer_blocks_parent() {
        let parent = OrderedMutex::new(LockLevel::Connection, ());
        let child = OrderedMutex::new(LockLevel::Child, ());
        drop(child.lock());
        let _p = parent.lock();
    }

    #[test]
    #[should_panic(expected = "lock order violation")]
    fn child_then_parent_panics() {
        let parent = OrderedMutex::new(LockLevel::Connection, ());
        let child = OrderedMutex::new(LockLevel::Child, ());
        let _c = child.lock();
        let _p = parent.lock();
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let shared = std::sync::Arc::new(OrderedMutex::new(LockLevel::Child, 5));
        let clone = std::sync::Arc::clone(&shared);
        let _ = std::thread::spawn(move || {
            let _g = clone.lock();
            panic!("poison it");
        })
        .join();
        assert_eq!(*shared.lock(), 5);
    }
}
