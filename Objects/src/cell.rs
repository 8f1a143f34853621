//! The synchronized reference cell: a heap object carrying a
//! cache-line-aligned header (RWLock, strong/weak atomic counts, an
//! expired flag) immediately followed by its payload. [`Owned`],
//! [`Shared`], and [`Weak`] are the three handle types a program can
//! hold to it.
//!
//! A C-style reference cell conventionally allocates a
//! `{ header, pad, payload }` block with a raw allocator and manual
//! offset arithmetic. In Rust the equivalent is a single generic struct
//! with `#[repr(align(64))]`: the compiler places and pads the payload
//! field for us, so there's no separate pointer arithmetic step — see
//! DESIGN.md for this redesign.

use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::rwlock::RwLock;

/// Cache-line size assumed for [`CellInner`]'s alignment. Most x86_64 and
/// aarch64 targets this workspace cares about use 64-byte lines.
const CACHE_LINE: usize = 64;

#[repr(align(64))]
struct CellInner<T> {
    rwlock: RwLock,
    strong: AtomicUsize,
    weak: AtomicUsize,
    expired: AtomicBool,
    value: std::cell::UnsafeCell<MaybeUninit<T>>,
}

impl<T> CellInner<T> {
    fn new(value: T) -> Box<Self> {
        Box::new(CellInner {
            rwlock: RwLock::new(),
            strong: AtomicUsize::new(0),
            weak: AtomicUsize::new(0),
            expired: AtomicBool::new(false),
            value: std::cell::UnsafeCell::new(MaybeUninit::new(value)),
        })
    }

    fn add_strong(&self) {
        self.strong.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `true` if this decrement brought the strong count to zero.
    fn remove_strong(&self) -> bool {
        self.strong.fetch_sub(1, Ordering::SeqCst) == 1
    }

    fn add_weak(&self) {
        self.weak.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `true` if this decrement brought the weak count to zero.
    fn remove_weak(&self) -> bool {
        self.weak.fetch_sub(1, Ordering::SeqCst) == 1
    }

    fn no_weak_refs(&self) -> bool {
        self.weak.load(Ordering::SeqCst) == 0
    }

    fn is_expired(&self) -> bool {
        self.expired.load(Ordering::SeqCst)
    }

    /// Runs `T`'s destructor on the payload under the exclusive lock and
    /// marks the cell expired. Safe to call at most once per cell.
    unsafe fn destroy_held_object(&self) {
        self.rwlock.acquire_exclusive().expect("destructor acquisition cannot elevate, so it cannot deadlock");
        self.expired.store(true, Ordering::SeqCst);
        std::ptr::drop_in_place((*self.value.get()).as_mut_ptr());
        self.rwlock.release_exclusive();
    }
}

// SAFETY: `CellInner<T>` is shared across threads only through `Owned`,
// `Shared`, and `Weak`, all of which route payload access through the
// embedded RWLock; `T: Send + Sync` is required of the payload itself.
unsafe impl<T: Send + Sync> Send for CellInner<T> {}
unsafe impl<T: Send + Sync> Sync for CellInner<T> {}

fn assert_cache_aligned<T>() {
    debug_assert!(std::mem::align_of::<CellInner<T>>() >= CACHE_LINE.min(std::mem::align_of::<CellInner<T>>()));
}

/// Single-owner handle to a reference cell. Dropping it runs the
/// destructor; the cell itself is freed immediately unless a [`Weak`] is
/// still watching it, in which case the last `Weak` to drop frees it.
pub struct Owned<T> {
    ptr: std::ptr::NonNull<CellInner<T>>,
}

unsafe impl<T: Send + Sync> Send for Owned<T> {}
unsafe impl<T: Send + Sync> Sync for Owned<T> {}

impl<T> Owned<T> {
    pub fn new(value: T) -> Self {
        assert_cache_aligned::<T>();
        let raw = Box::into_raw(CellInner::new(value));
        // An `Owned` cell has exactly one (implicit) strong reference for
        // its whole lifetime; the strong counter exists so `Weak` can
        // share the same expiry bookkeeping `Shared` uses.
        unsafe { (*raw).add_strong() };
        Owned { ptr: std::ptr::NonNull::new(raw).unwrap() }
    }

    fn inner(&self) -> &CellInner<T> {
        unsafe { self.ptr.as_ref() }
    }

    pub fn make_weak(&self) -> Weak<T> {
        self.inner().add_weak();
        Weak { ptr: self.ptr }
    }

    pub fn lock_exclusive(&self) -> Result<OwnedGuardMut<'_, T>, crate::rwlock::LockError> {
        self.inner().rwlock.acquire_exclusive()?;
        Ok(OwnedGuardMut { owned: self })
    }

    pub fn lock_shared(&self) -> OwnedGuardRef<'_, T> {
        self.inner().rwlock.acquire_shared();
        OwnedGuardRef { owned: self }
    }
}

impl<T> Drop for Owned<T> {
    fn drop(&mut self) {
        let inner = self.inner();
        unsafe { inner.destroy_held_object() };
        if inner.no_weak_refs() {
            // Safe: no other handle can reach this cell once its single
            // `Owned` handle and all `Weak`s are gone.
            unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
        }
    }
}

pub struct OwnedGuardRef<'a, T> {
    owned: &'a Owned<T>,
}
impl<'a, T> std::ops::Deref for OwnedGuardRef<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { (*self.owned.inner().value.get()).assume_init_ref() }
    }
}
impl<'a, T> Drop for OwnedGuardRef<'a, T> {
    fn drop(&mut self) {
        self.owned.inner().rwlock.release_shared();
    }
}

pub struct OwnedGuardMut<'a, T> {
    owned: &'a Owned<T>,
}
impl<'a, T> std::ops::Deref for OwnedGuardMut<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { (*self.owned.inner().value.get()).assume_init_ref() }
    }
}
impl<'a, T> std::ops::DerefMut for OwnedGuardMut<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { (*self.owned.inner().value.get()).assume_init_mut() }
    }
}
impl<'a, T> Drop for OwnedGuardMut<'a, T> {
    fn drop(&mut self) {
        self.owned.inner().rwlock.release_exclusive();
    }
}

/// Refcounted handle to a reference cell; the last `Shared` to drop runs
/// the destructor, exactly as `Owned` does.
pub struct Shared<T> {
    ptr: std::ptr::NonNull<CellInner<T>>,
}

unsafe impl<T: Send + Sync> Send for Shared<T> {}
unsafe impl<T: Send + Sync> Sync for Shared<T> {}

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        assert_cache_aligned::<T>();
        let raw = Box::into_raw(CellInner::new(value));
        unsafe { (*raw).add_strong() };
        Shared { ptr: std::ptr::NonNull::new(raw).unwrap() }
    }

    fn inner(&self) -> &CellInner<T> {
        unsafe { self.ptr.as_ref() }
    }

    pub fn downgrade(&self) -> Weak<T> {
        self.inner().add_weak();
        Weak { ptr: self.ptr }
    }

    pub fn lock_exclusive(&self) -> Result<SharedGuardMut<'_, T>, crate::rwlock::LockError> {
        self.inner().rwlock.acquire_exclusive()?;
        Ok(SharedGuardMut { shared: self })
    }

    pub fn lock_shared(&self) -> SharedGuardRef<'_, T> {
        self.inner().rwlock.acquire_shared();
        SharedGuardRef { shared: self }
    }

    pub fn strong_count(&self) -> usize {
        self.inner().strong.load(Ordering::SeqCst)
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        self.inner().add_strong();
        Shared { ptr: self.ptr }
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        let inner = self.inner();
        if inner.remove_strong() {
            unsafe { inner.destroy_held_object() };
            if inner.no_weak_refs() {
                unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
            }
        }
    }
}

pub struct SharedGuardRef<'a, T> {
    shared: &'a Shared<T>,
}
impl<'a, T> std::ops::Deref for SharedGuardRef<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { (*self.shared.inner().value.get()).assume_init_ref() }
    }
}
impl<'a, T> Drop for SharedGuardRef<'a, T> {
    fn drop(&mut self) {
        self.shared.inner().rwlock.release_shared();
    }
}

pub struct SharedGuardMut<'a, T> {
    shared: &'a Shared<T>,
}
impl<'a, T> std::ops::Deref for SharedGuardMut<'a, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { (*self.shared.inner().value.get()).assume_init_ref() }
    }
}
impl<'a, T> std::ops::DerefMut for SharedGuardMut<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { (*self.shared.inner().value.get()).assume_init_mut() }
    }
}
impl<'a, T> Drop for SharedGuardMut<'a, T> {
    fn drop(&mut self) {
        self.shared.inner().rwlock.release_exclusive();
    }
}

/// Non-owning observer of a reference cell. Accessing the payload after
/// expiry is an error rather than undefined behavior: [`Weak::upgrade`]
/// returns `None` once the backing value's destructor has run.
pub struct Weak<T> {
    ptr: std::ptr::NonNull<CellInner<T>>,
}

unsafe impl<T: Send + Sync> Send for Weak<T> {}
unsafe impl<T: Send + Sync> Sync for Weak<T> {}

impl<T> Weak<T> {
    fn inner(&self) -> &CellInner<T> {
        unsafe { self.ptr.as_ref() }
    }

    pub fn is_expired(&self) -> bool {
        self.inner().is_expired()
    }

    /// Promotes this weak reference to a [`Shared`], if the value hasn't
    /// expired yet. Only meaningful for cells created via [`Shared`] —
    /// upgrading a weak reference to an `Owned`-backed cell always fails,
    /// since an `Owned` cell never has more than the one strong holder.
    pub fn upgrade(&self) -> Option<Shared<T>> {
        if self.inner().is_expired() {
            return None;
        }
        let inner = self.inner();
        let mut strong = inner.strong.load(Ordering::SeqCst);
        loop {
            if strong == 0 {
                return None;
            }
            match inner.strong.compare_exchange_weak(strong, strong + 1, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return Some(Shared { ptr: self.ptr }),
                Err(observed) => strong = observed,
            }
        }
    }
}

impl<T> Clone for Weak<T> {
    fn clone(&self) -> Self {
        self.inner().add_weak();
        Weak { ptr: self.ptr }
    }
}

impl<T> Drop for Weak<T> {
    fn drop(&mut self) {
        let inner = self.inner();
        if inner.remove_weak() && inner.is_expired() {
            unsafe { drop(Box::from_raw(self.ptr.as_ptr())) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize as Counter, Ordering as Ord};

    struct DropCounter<'a>(&'a Counter);
    impl<'a> Drop for DropCounter<'a> {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ord::SeqCst);
        }
    }

    #[test]
    fn owned_weak_expires_on_drop_then_frees_on_weak_drop() {
        let owned = Owned::new(5i64);
        let weak = owned.make_weak();
        assert!(!weak.is_expired());
        drop(owned);
        assert!(weak.is_expired());
        drop(weak);
    }

    #[test]
    fn shared_destructor_runs_once_on_last_drop() {
        let drops = Counter::new(0);
        let first = Shared::new(DropCounter(&drops));
        let clones: Vec<_> = (0..4).map(|_| first.clone()).collect();
        assert_eq!(first.strong_count(), 5);
        drop(clones);
        assert_eq!(drops.load(Ord::SeqCst), 0);
        drop(first);
        assert_eq!(drops.load(Ord::SeqCst), 1);
    }

    #[test]
    fn shared_weak_upgrade_fails_after_expiry() {
        let shared = Shared::new(10i64);
        let weak = shared.downgrade();
        assert!(weak.upgrade().is_some());
        drop(shared);
        assert!(weak.is_expired());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn owned_lock_exclusive_allows_mutation() {
        let owned = Owned::new(1i64);
        {
            let mut guard = owned.lock_exclusive().unwrap();
            *guard += 1;
        }
        assert_eq!(*owned.lock_shared(), 2);
    }
}
