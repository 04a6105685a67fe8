//! Blocking locks, backed by `std::sync::{Mutex, Condvar}`.
//!
//! [`Sleeplock`] is a plain blocking mutex: used for buffer-cache frames,
//! which may be held across a device read/write. [`Sleepablelock`] adds a
//! condition variable and a `sleep`/`wakeup` pair on its guard; the inode
//! layer uses it to implement `deny_write`'s wait for `writer_count == 0`.

use std::sync::{Condvar, Mutex, MutexGuard};

pub struct Sleeplock<T> {
    name: &'static str,
    inner: Mutex<T>,
}

pub struct SleeplockGuard<'s, T> {
    name: &'static str,
    inner: MutexGuard<'s, T>,
}

impl<T> Sleeplock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            inner: Mutex::new(data),
        }
    }

    pub fn lock(&self) -> SleeplockGuard<'_, T> {
        SleeplockGuard {
            name: self.name,
            inner: self.inner.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> core::ops::Deref for SleeplockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> core::ops::DerefMut for SleeplockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

pub struct Sleepablelock<T> {
    name: &'static str,
    mutex: Mutex<T>,
    condvar: Condvar,
}

pub struct SleepablelockGuard<'s, T> {
    lock: &'s Sleepablelock<T>,
    guard: Option<MutexGuard<'s, T>>,
}

impl<T> Sleepablelock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            mutex: Mutex::new(data),
            condvar: Condvar::new(),
        }
    }

    pub fn lock(&self) -> SleepablelockGuard<'_, T> {
        SleepablelockGuard {
            lock: self,
            guard: Some(self.mutex.lock().unwrap_or_else(|e| e.into_inner())),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> SleepablelockGuard<'_, T> {
    /// Atomically releases the lock and blocks until `wakeup` is called on
    /// it, then re-acquires the lock before returning. Must be called in a
    /// loop re-checking the wait condition, per the usual condvar contract.
    pub fn sleep(&mut self) {
        let guard = self.guard.take().expect("sleep: guard missing");
        let guard = self
            .lock
            .condvar
            .wait(guard)
            .unwrap_or_else(|e| e.into_inner());
        self.guard = Some(guard);
    }

    /// Wakes every thread sleeping on this lock.
    pub fn wakeup(&self) {
        self.lock.condvar.notify_all();
    }
}

impl<T> core::ops::Deref for SleepablelockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        self.guard.as_ref().expect("guard missing")
    }
}

impl<T> core::ops::DerefMut for SleepablelockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.guard.as_mut().expect("guard missing")
    }
}
