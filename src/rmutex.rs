use parking_lot::{Condvar, Mutex};
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::thread::{self, ThreadId};

/// A re-entrant mutual exclusion primitive protecting a value of type `T`.
///
/// The thread currently holding the lock may acquire it again without
/// deadlocking; the lock is fully released once every guard has been
/// dropped. Other threads block until the depth returns to zero.
///
/// Since several guards can be live on the owning thread at once, guards
/// only hand out `&T`. Pair with a [`RefCell`](std::cell::RefCell) when the
/// protected value must be mutated.
pub struct Rmutex<T> {
    state: Mutex<LockState>,
    unlocked: Condvar,
    value: UnsafeCell<T>,
}

struct LockState {
    owner: Option<ThreadId>,
    depth: usize,
}

// Guards serialize all cross-thread access to the value, so only `T: Send`
// is required (same-thread aliasing through multiple guards is allowed).
unsafe impl<T: Send> Send for Rmutex<T> {}
unsafe impl<T: Send> Sync for Rmutex<T> {}

impl<T> Rmutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            unlocked: Condvar::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, blocking until it is free or already owned by the
    /// calling thread. Dropping the guard releases one level.
    pub fn lock(&self) -> RmutexGuard<'_, T> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while state.depth > 0 && state.owner != Some(me) {
            self.unlocked.wait(&mut state);
        }
        state.owner = Some(me);
        state.depth += 1;
        RmutexGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Consumes the lock, returning the protected value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T> fmt::Debug for Rmutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Rmutex")
            .field("owner", &state.owner)
            .field("depth", &state.depth)
            .finish_non_exhaustive()
    }
}

/// RAII guard of an [`Rmutex`]. The lock level taken by [`Rmutex::lock`] is
/// released when this guard is dropped, on every return path.
pub struct RmutexGuard<'a, T> {
    lock: &'a Rmutex<T>,
    // the guard must be dropped on the thread that acquired it
    _not_send: PhantomData<*const ()>,
}

impl<T> Deref for RmutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safe: the owner/depth protocol guarantees no other thread can
        // reach the value while any guard is live.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for RmutexGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.lock.state.lock();
        debug_assert_eq!(state.owner, Some(thread::current().id()));
        debug_assert!(state.depth > 0);
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.lock.unlocked.notify_one();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn reentrant_on_the_same_thread() {
        let lock = Rmutex::new(RefCell::new(0));
        let outer = lock.lock();
        {
            let inner = lock.lock();
            *inner.borrow_mut() += 1;
        }
        *outer.borrow_mut() += 1;
        drop(outer);
        assert_eq!(lock.into_inner().into_inner(), 2);
    }

    #[test]
    fn excludes_other_threads_until_fully_released() {
        let lock = Arc::new(Rmutex::new(RefCell::new(Vec::new())));
        let (ready_tx, ready_rx) = mpsc::channel();

        let outer = lock.lock();
        let inner = lock.lock();

        let contender = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                ready_tx.send(()).unwrap();
                let guard = lock.lock();
                guard.borrow_mut().push("contender");
            })
        };

        ready_rx.recv().unwrap();
        // give the contender a chance to block on the held lock
        thread::sleep(Duration::from_millis(20));
        inner.borrow_mut().push("owner");
        drop(inner);

        // still held once: the contender must keep waiting
        thread::sleep(Duration::from_millis(20));
        outer.borrow_mut().push("owner again");
        drop(outer);

        contender.join().unwrap();
        let order = lock.lock().borrow().clone();
        assert_eq!(order, vec!["owner", "owner again", "contender"]);
    }

    #[test]
    fn wakes_one_waiter_per_release() {
        let lock = Arc::new(Rmutex::new(RefCell::new(0u32)));
        let mut workers = Vec::new();
        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            workers.push(thread::spawn(move || {
                for _ in 0..50 {
                    let guard = lock.lock();
                    *guard.borrow_mut() += 1;
                }
            }));
        }
        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(*lock.lock().borrow(), 200);
    }
}
