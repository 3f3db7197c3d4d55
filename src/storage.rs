//! The surface shared by both storage managers.
//!
//! Event-dispatch code written against [`Storage`] runs unchanged on top of
//! [`HostStorage`] and [`LazyStorage`]; only the guarantees differ:
//!
//! | Operation      | Host-provisioned                 | Lazy                                |
//! |----------------|----------------------------------|-------------------------------------|
//! | `register`     | may fail: no free slot           | may fail: no free key               |
//! | `with_table`   | always finds a table             | allocates on first use, may fail    |
//! | `flush`        | table must exist                 | no-op when the thread has no table  |
//! | `unregister`   | frees every thread's table       | releases the key                    |
//!
//! [`HostStorage`]: crate::host::HostStorage
//! [`LazyStorage`]: crate::lazy::LazyStorage

use crate::alloc::TableAlloc;
use crate::error::ResourceExhausted;
use crate::table::Instance;
use crate::table::InstanceTable;

/// Per-thread automaton-instance storage for a set of property classes.
pub trait Storage {
  /// The automaton-instance record stored in each table.
  type Instance: Instance;

  /// The allocator backing each table.
  type Alloc: TableAlloc;

  /// Handle identifying a registered property class.
  type Class;

  /// Registers a property class needing `capacity` instances per thread.
  ///
  /// # Errors
  ///
  /// Returns [`ResourceExhausted`] if no registration slot is free or the
  /// class's tables cannot be sized.
  fn register(&self, capacity: usize) -> Result<Self::Class, ResourceExhausted>;

  /// Unregisters a property class and releases its per-thread tables.
  fn unregister(&self, class: Self::Class);

  /// Calls `f` with the calling thread's table for `class`.
  ///
  /// # Errors
  ///
  /// Returns [`ResourceExhausted`] if the thread has no table and one cannot
  /// be created. The caller should treat the thread as having no active
  /// automaton instances for the class.
  fn with_table<F, R>(&self, class: &Self::Class, f: F) -> Result<R, ResourceExhausted>
  where
    F: FnOnce(&mut InstanceTable<Self::Instance, Self::Alloc>) -> R;

  /// Resets the calling thread's table for `class`.
  fn flush(&self, class: &Self::Class);
}
