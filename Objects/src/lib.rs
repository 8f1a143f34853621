//! The runtime object model: the cache-line-aligned synchronized
//! reference cell (`Owned`/`Shared`/`Weak`) and the reader-writer lock
//! with elevation/deadlock detection it's built on.
//!
//! Nothing in this crate is garbage collected — ownership and lifetime
//! are tracked by the handle types themselves, mirroring how the stack's
//! type slots track ownership of *scalar* values one level up.

pub mod cell;
pub mod rwlock;

pub use cell::{Owned, Shared, Weak};
pub use rwlock::{LockError, RwLock};
