//! A reader-writer lock with elevation semantics: a shared-lock holder
//! may acquire the exclusive lock on the same cell re-entrantly
//! (`acquire_exclusive` while already holding `acquire_shared`), and an
//! exclusive holder may acquire a shared lock without deadlocking
//! against itself.
//!
//! When two or more threads hold shared locks and *all* attempt to
//! elevate simultaneously, none can make progress — each is waiting for
//! the others to drop their shared lock first. This is detected (every
//! current reader is mid-elevation, and there's more than one of them)
//! rather than left to hang: every elevating thread aborts with
//! [`LockError::Deadlock`], keeps its shared lock, and the deadlock
//! generation counter advances so a later, uninvolved acquisition starts
//! clean.
//!
//! Internal state lives in a `Mutex`-protected struct with a small
//! inline `Vec` for the intent-to-elevate set, condition-variable
//! signaled, rather than a lock-free implementation.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};

/// The only way an RWLock operation can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockError {
    Deadlock,
}

pub type LockResult<T> = Result<T, LockError>;

struct State {
    reader_count: u32,
    readers: HashSet<ThreadId>,
    /// Threads currently blocked inside `acquire_exclusive` after already
    /// holding a shared lock (i.e. attempting to elevate).
    elevating: Vec<ThreadId>,
    exclusive_owner: Option<ThreadId>,
    exclusive_reentry: u32,
    /// Bumped every time a batch of elevating threads is aborted for
    /// deadlock, so threads that were deadlocked (and already removed
    /// from `elevating` by whichever thread detected it) can tell their
    /// wait loop apart from a spurious wakeup.
    deadlock_generation: u64,
}

impl State {
    fn new() -> Self {
        State {
            reader_count: 0,
            readers: HashSet::new(),
            elevating: Vec::new(),
            exclusive_owner: None,
            exclusive_reentry: 0,
            deadlock_generation: 0,
        }
    }
}

/// Reader-writer lock with elevation and deadlock detection. See the
/// module documentation for the exact semantics.
pub struct RwLock {
    state: Mutex<State>,
    cond: Condvar,
}

impl Default for RwLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RwLock {
    pub fn new() -> Self {
        RwLock { state: Mutex::new(State::new()), cond: Condvar::new() }
    }

    /// Current reader count and the deadlock generation counter, for
    /// tests that assert on final lock state.
    pub fn debug_counts(&self) -> (u32, bool, u64) {
        let g = self.state.lock().unwrap();
        (g.reader_count, g.exclusive_owner.is_some(), g.deadlock_generation)
    }

    pub fn acquire_shared(&self) {
        let tid = thread::current().id();
        let mut g = self.state.lock().unwrap();
        // An exclusive holder acquiring shared re-entrantly never blocks.
        if g.exclusive_owner != Some(tid) {
            while g.exclusive_owner.is_some() {
                g = self.cond.wait(g).unwrap();
            }
        }
        g.reader_count += 1;
        g.readers.insert(tid);
    }

    pub fn try_acquire_shared(&self) -> bool {
        let tid = thread::current().id();
        let mut g = self.state.lock().unwrap();
        if g.exclusive_owner.is_some() && g.exclusive_owner != Some(tid) {
            return false;
        }
        g.reader_count += 1;
        g.readers.insert(tid);
        true
    }

    pub fn release_shared(&self) {
        let tid = thread::current().id();
        let mut g = self.state.lock().unwrap();
        debug_assert!(g.reader_count > 0, "release_shared with no outstanding shared lock");
        g.reader_count -= 1;
        g.readers.remove(&tid);
        self.cond.notify_all();
    }

    /// Acquires the exclusive lock. If the calling thread already holds
    /// a shared lock on this cell, this is an elevation attempt rather
    /// than a fresh acquisition, and can return [`LockError::Deadlock`].
    pub fn acquire_exclusive(&self) -> LockResult<()> {
        let tid = thread::current().id();
        let mut g = self.state.lock().unwrap();

        if g.exclusive_owner == Some(tid) {
            g.exclusive_reentry += 1;
            return Ok(());
        }

        if g.readers.contains(&tid) {
            return self.elevate(g, tid);
        }

        while g.reader_count > 0 || g.exclusive_owner.is_some() {
            g = self.cond.wait(g).unwrap();
        }
        g.exclusive_owner = Some(tid);
        g.exclusive_reentry = 1;
        Ok(())
    }

    pub fn try_acquire_exclusive(&self) -> LockResult<bool> {
        let tid = thread::current().id();
        let g = self.state.lock().unwrap();
        if g.exclusive_owner == Some(tid) {
            drop(g);
            let mut g = self.state.lock().unwrap();
            g.exclusive_reentry += 1;
            return Ok(true);
        }
        if g.readers.contains(&tid) {
            // A non-blocking elevation only succeeds if this thread is
            // already the sole reader; otherwise report "would block"
            // rather than entering the blocking deadlock-detecting path.
            if g.reader_count == 1 {
                drop(g);
                let mut g = self.state.lock().unwrap();
                g.exclusive_owner = Some(tid);
                g.exclusive_reentry = 1;
                return Ok(true);
            }
            return Ok(false);
        }
        if g.reader_count == 0 && g.exclusive_owner.is_none() {
            drop(g);
            let mut g = self.state.lock().unwrap();
            g.exclusive_owner = Some(tid);
            g.exclusive_reentry = 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn elevate<'a>(&'a self, mut g: std::sync::MutexGuard<'a, State>, tid: ThreadId) -> LockResult<()> {
        g.elevating.push(tid);
        let my_generation = g.deadlock_generation;
        loop {
            if g.elevating.len() as u32 == g.reader_count && g.elevating.len() > 1 {
                g.elevating.clear();
                g.deadlock_generation += 1;
                self.cond.notify_all();
                return Err(LockError::Deadlock);
            }
            if g.reader_count == 1 && g.exclusive_owner.is_none() {
                g.elevating.retain(|t| *t != tid);
                g.exclusive_owner = Some(tid);
                g.exclusive_reentry = 1;
                return Ok(());
            }
            if g.deadlock_generation != my_generation && !g.elevating.contains(&tid) {
                // Another thread's elevation attempt detected the
                // deadlock and cleared us out of `elevating` along with
                // itself.
                return Err(LockError::Deadlock);
            }
            g = self.cond.wait(g).unwrap();
        }
    }

    pub fn release_exclusive(&self) {
        let mut g = self.state.lock().unwrap();
        debug_assert!(g.exclusive_reentry > 0, "release_exclusive with no outstanding exclusive lock");
        g.exclusive_reentry -= 1;
        if g.exclusive_reentry == 0 {
            g.exclusive_owner = None;
        }
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn recursive_elevation_by_one_thread() {
        let lock = RwLock::new();
        lock.acquire_shared();
        lock.acquire_exclusive().unwrap();
        lock.release_exclusive();
        lock.release_shared();
        let (readers, has_exclusive, _) = lock.debug_counts();
        assert_eq!(readers, 0);
        assert!(!has_exclusive);
    }

    #[test]
    fn two_thread_successful_elevation() {
        let lock = Arc::new(RwLock::new());
        lock.acquire_shared();
        let l2 = lock.clone();
        let t2_holds = Arc::new(std::sync::Barrier::new(2));
        let barrier = t2_holds.clone();
        let handle = thread::spawn(move || {
            l2.acquire_shared();
            barrier.wait();
            // Wait until T1 has released its shared lock, then elevate.
            loop {
                if l2.try_acquire_exclusive() == Ok(true) {
                    break;
                }
                thread::yield_now();
            }
            l2.release_exclusive();
            l2.release_shared();
        });
        t2_holds.wait();
        lock.release_shared();
        handle.join().unwrap();
        let (readers, has_exclusive, _) = lock.debug_counts();
        assert_eq!(readers, 0);
        assert!(!has_exclusive);
    }

    #[test]
    fn three_thread_deadlock_all_abort() {
        let lock = Arc::new(RwLock::new());
        let barrier = Arc::new(std::sync::Barrier::new(3));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let lock = lock.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                lock.acquire_shared();
                barrier.wait();
                let result = lock.acquire_exclusive();
                lock.release_shared();
                result
            }));
        }
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.iter().all(|r| *r == Err(LockError::Deadlock)));
        let (readers, has_exclusive, generation) = lock.debug_counts();
        assert_eq!(readers, 0);
        assert!(!has_exclusive);
        assert_eq!(generation, 1);
    }

    #[test]
    fn deadlock_then_late_arrival_succeeds() {
        let lock = Arc::new(RwLock::new());
        let barrier = Arc::new(std::sync::Barrier::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let lock = lock.clone();
            let barrier = barrier.clone();
            handles.push(thread::spawn(move || {
                lock.acquire_shared();
                barrier.wait();
                let result = lock.acquire_exclusive();
                lock.release_shared();
                result
            }));
        }
        for h in handles {
            assert_eq!(h.join().unwrap(), Err(LockError::Deadlock));
        }

        lock.acquire_shared();
        lock.acquire_exclusive().unwrap();
        lock.release_exclusive();
        lock.release_shared();
    }
}
