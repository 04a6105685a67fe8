//! Spin locks, backed by the `spin` crate. Reserved for brief critical
//! sections that never perform device I/O while held.

pub struct Spinlock<T> {
    name: &'static str,
    inner: spin::Mutex<T>,
}

pub struct SpinlockGuard<'s, T> {
    name: &'static str,
    inner: spin::MutexGuard<'s, T>,
}

impl<T> Spinlock<T> {
    pub const fn new(name: &'static str, data: T) -> Self {
        Self {
            name,
            inner: spin::Mutex::new(data),
        }
    }

    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        SpinlockGuard {
            name: self.name,
            inner: self.inner.lock(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> core::ops::Deref for SpinlockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> core::ops::DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}
