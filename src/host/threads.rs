use hashbrown::HashMap;
use std::array;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use triomphe::Arc;

use crate::alloc::TableAlloc;
use crate::consts::SLOT_MAX;
use crate::loom::sync::Mutex;
use crate::loom::sync::MutexGuard;
use crate::table::Instance;
use crate::table::InstanceTable;
use crate::thread::ThreadKey;

/// The live-thread set: every thread that passed through the creation hook
/// and has not yet exited.
pub(crate) type ThreadSet<I, A> = HashMap<ThreadKey, Arc<ThreadSlots<I, A>>>;

/// A table cell: empty when the slot is vacant.
pub(crate) type Cell<I, A> = Option<InstanceTable<I, A>>;

/// The per-slot tables owned by one thread.
///
/// Each slot has its own lock so that a provisioning walk for one class never
/// contends with the owning thread using another class's table.
pub(crate) struct ThreadSlots<I: Instance, A: TableAlloc> {
  cells: [Mutex<Cell<I, A>>; SLOT_MAX],
}

impl<I: Instance, A: TableAlloc> ThreadSlots<I, A> {
  #[inline]
  pub(crate) fn new() -> Self {
    Self {
      cells: array::from_fn(|_| Mutex::new(None)),
    }
  }

  /// Locks the table cell for `slot`.
  #[inline]
  pub(crate) fn lock(&self, slot: usize) -> MutexGuard<'_, Cell<I, A>> {
    self.cells[slot].lock()
  }

  /// Frees every table owned by the thread, returning how many were freed.
  pub(crate) fn release(&self) -> usize {
    self
      .cells
      .iter()
      .filter_map(|cell| cell.lock().take())
      .count()
  }
}

impl<I: Instance, A: TableAlloc> Debug for ThreadSlots<I, A> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.write_str("ThreadSlots(..)")
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
