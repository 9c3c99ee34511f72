// one-slot blocking handoff from a callback to a waiting thread.

use crate::time::Timeout;
use std::{
    sync::{Condvar, Mutex, MutexGuard, PoisonError},
    time::Instant,
};


// synchronization signal carrying a value.
//
// a callback puts a value, the waiting thread takes it. later puts before a take overwrite
// nothing: the first value wins.
pub(crate) struct Signal<T> {
    state: Mutex<Option<T>>,
    cond: Condvar,
}

impl<T> Signal<T> {
    pub(crate) fn new() -> Self {
        Signal {
            state: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // store the value and wake the waiter, unless a value is already stored.
    pub(crate) fn put(&self, val: T) {
        let mut lock = self.lock();
        if lock.is_none() {
            *lock = Some(val);
            self.cond.notify_all();
        }
    }

    // block until a value is put or the timeout elapses, in which case return none.
    pub(crate) fn wait(&self, timeout: Timeout) -> Option<T> {
        let deadline = timeout.deadline();
        let mut lock = self.lock();
        loop {
            if let Some(val) = lock.take() {
                return Some(val);
            }
            match deadline {
                // block on mutex + condvar indefinitely
                None => {
                    lock = self.cond.wait(lock).unwrap_or_else(PoisonError::into_inner);
                }
                // block on mutex + condvar until deadline, at which point return none
                Some(deadline) => {
                    let Some(remaining) = deadline
                        .checked_duration_since(Instant::now())
                        .filter(|remaining| !remaining.is_zero())
                    else {
                        return None;
                    };
                    lock = self.cond
                        .wait_timeout(lock, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}
