//! RAII in-flight flags.

use std::sync::atomic::{AtomicBool, Ordering};

/// Holds an [`AtomicBool`] set for as long as the guard lives.
pub(crate) struct FlagGuard<'a>(&'a AtomicBool);

impl<'a> FlagGuard<'a> {
    /// Sets the flag if it was clear. Returns `None` if it was already set.
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
