//! FIFO ticket spin lock.
//!
//! Each `lock()` draws a ticket; the lock serves tickets in order, so waiters
//! acquire it in arrival order. Waiting spins with exponential backoff, then
//! yields, and once the optional sleep threshold is crossed sleeps for a
//! millisecond per round.

use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_utils::Backoff;

/// Smallest accepted sleep threshold, in backoff rounds.
const MIN_SLEEP_THRESHOLD: u32 = 10;

/// A ticket lock protecting a `T`.
///
/// # Example
///
/// ```
/// use native_pool::SpinLock;
/// use std::sync::Arc;
/// use std::thread;
///
/// let counter = Arc::new(SpinLock::new(0u64));
/// let handles: Vec<_> = (0..4)
///     .map(|_| {
///         let counter = counter.clone();
///         thread::spawn(move || {
///             for _ in 0..1000 {
///                 *counter.lock() += 1;
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert_eq!(*counter.lock(), 4000);
/// ```
pub struct SpinLock<T: ?Sized> {
    next_ticket: AtomicUsize,
    now_serving: AtomicUsize,
    sleep_threshold: Option<u32>,
    value: UnsafeCell<T>,
}

// SAFETY: access to `value` is serialized by the ticket protocol
unsafe impl<T: ?Sized + Send> Send for SpinLock<T> {}
unsafe impl<T: ?Sized + Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    /// Creates an unlocked lock that never sleeps while waiting.
    pub const fn new(value: T) -> Self {
        Self {
            next_ticket: AtomicUsize::new(0),
            now_serving: AtomicUsize::new(0),
            sleep_threshold: None,
            value: UnsafeCell::new(value),
        }
    }

    /// Creates an unlocked lock whose waiters start sleeping after
    /// `threshold` backoff rounds. Thresholds below 10 are raised to 10.
    pub fn with_sleep_threshold(value: T, threshold: u32) -> Self {
        Self {
            sleep_threshold: Some(threshold.max(MIN_SLEEP_THRESHOLD)),
            ..Self::new(value)
        }
    }

    /// Consumes the lock, returning the protected value.
    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Backoff rounds before a waiter sleeps, if sleeping is enabled.
    #[inline]
    pub fn sleep_threshold(&self) -> Option<u32> {
        self.sleep_threshold
    }

    /// Acquires the lock, waiting for every earlier ticket to be served.
    #[inline]
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        if self.now_serving.load(Ordering::Acquire) != ticket {
            self.wait_for(ticket);
        }
        SpinLockGuard { lock: self }
    }

    #[cold]
    fn wait_for(&self, ticket: usize) {
        let backoff = Backoff::new();
        let mut rounds = 0u32;
        while self.now_serving.load(Ordering::Acquire) != ticket {
            match self.sleep_threshold {
                Some(threshold) if rounds >= threshold => {
                    thread::sleep(Duration::from_millis(1));
                }
                _ => backoff.snooze(),
            }
            rounds = rounds.saturating_add(1);
        }
    }

    /// Acquires the lock only if no one holds or waits for it.
    #[inline]
    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        let ticket = self.now_serving.load(Ordering::Acquire);
        self.next_ticket
            .compare_exchange(
                ticket,
                ticket.wrapping_add(1),
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .ok()
            .map(|_| SpinLockGuard { lock: self })
    }

    /// Returns `true` if the lock is held or has waiters.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.next_ticket.load(Ordering::Relaxed) != self.now_serving.load(Ordering::Relaxed)
    }

    /// Mutable access without locking; `&mut self` proves exclusivity.
    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    #[inline]
    fn unlock(&self) {
        let next = self.now_serving.load(Ordering::Relaxed).wrapping_add(1);
        self.now_serving.store(next, Ordering::Release);
    }
}

impl<T: Default> Default for SpinLock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.try_lock() {
            Some(guard) => f.debug_struct("SpinLock").field("value", &&*guard).finish(),
            None => f.debug_struct("SpinLock").field("value", &"<locked>").finish(),
        }
    }
}

/// RAII guard; releases the lock on drop.
#[must_use = "dropping the guard releases the lock immediately"]
pub struct SpinLockGuard<'a, T: ?Sized> {
    lock: &'a SpinLock<T>,
}

// SAFETY: the guard only hands out references to T
unsafe impl<T: ?Sized + Sync> Sync for SpinLockGuard<'_, T> {}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the guard holds the lock
        unsafe { &*self.lock.value.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard holds the lock
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn lock_unlock() {
        let lock = SpinLock::new(5);
        {
            let mut guard = lock.lock();
            assert!(lock.is_locked());
            *guard += 1;
        }
        assert!(!lock.is_locked());
        assert_eq!(lock.into_inner(), 6);
    }

    #[test]
    fn try_lock_fails_while_held() {
        let lock = SpinLock::new(());
        let guard = lock.lock();
        assert!(lock.try_lock().is_none());
        drop(guard);
        assert!(lock.try_lock().is_some());
    }

    #[test]
    fn sleep_threshold_clamped() {
        let lock = SpinLock::with_sleep_threshold((), 3);
        assert_eq!(lock.sleep_threshold(), Some(10));
        assert_eq!(SpinLock::new(()).sleep_threshold(), None);
    }

    #[test]
    fn mutual_exclusion() {
        const THREADS: usize = 8;
        const ITERS: usize = 10_000;

        let lock = Arc::new(SpinLock::with_sleep_threshold(0usize, 20));
        let inside = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let lock = lock.clone();
                let inside = inside.clone();
                thread::spawn(move || {
                    for _ in 0..ITERS {
                        let mut guard = lock.lock();
                        assert!(!inside.swap(true, Ordering::SeqCst));
                        *guard += 1;
                        inside.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), THREADS * ITERS);
    }
}
