//! Provisioning walk for a newly registered class.
//!
//! Every live thread must own a table for the new slot before registration
//! returns. Tables are first allocated without blocking while the walk holds
//! the thread-set and per-thread locks. When that fails the walk drops every
//! lock, allocates once with blocking allowed, and re-enters:
//!
//! ```text
//!             try_new ok / all provisioned
//!   ┌──────────────┐ ──────────────────────────────────▶ done
//!   │   Scanning   │
//!   └──────────────┘ ◀──────────────────────┐
//!          │ try_new failed                 │ installed
//!          ▼                                │
//!   ┌───────────────────┐  new    ┌──────────────┐
//!   │ BlockedAllocating │ ──────▶ │  Installing  │ ──▶ done (surplus freed)
//!   └───────────────────┘         └──────────────┘
//! ```
//!
//! `Installing` re-validates: a thread that lacked a table before the locks
//! were dropped may have exited since. If no thread still needs a table the
//! surplus one is freed and the walk ends.

use std::alloc::handle_alloc_error;

use crate::alloc::TableAlloc;
use crate::host::threads::Cell;
use crate::host::threads::ThreadSet;
use crate::loom::sync::MutexGuard;
use crate::loom::sync::RwLock;
use crate::loom::sync::RwLockReadGuard;
use crate::table::Instance;
use crate::table::InstanceTable;
use crate::table::TableSpec;

// -----------------------------------------------------------------------------
// Phase
// -----------------------------------------------------------------------------

/// Named states of the provisioning walk.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub(crate) enum Phase {
  Scanning,
  BlockedAllocating,
  Installing,
}

enum State<I: Instance, A: TableAlloc> {
  Scanning,
  BlockedAllocating,
  Installing(InstanceTable<I, A>),
  Done,
}

// -----------------------------------------------------------------------------
// Provision Report
// -----------------------------------------------------------------------------

/// Counters describing one completed walk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ProvisionReport {
  /// Tables installed into threads.
  pub(crate) installed: usize,
  /// Blocking allocations performed with every lock released.
  pub(crate) blocked: usize,
  /// Tables allocated while blocked but no longer needed.
  pub(crate) surplus: usize,
}

// -----------------------------------------------------------------------------
// Provisioner
// -----------------------------------------------------------------------------

pub(crate) struct Provisioner<'a, I: Instance, A: TableAlloc> {
  slot: usize,
  spec: TableSpec<I>,
  alloc: &'a A,
  threads: &'a RwLock<ThreadSet<I, A>>,
  state: State<I, A>,
  report: ProvisionReport,
}

impl<'a, I: Instance, A: TableAlloc> Provisioner<'a, I, A> {
  #[inline]
  pub(crate) fn new(
    slot: usize,
    spec: TableSpec<I>,
    alloc: &'a A,
    threads: &'a RwLock<ThreadSet<I, A>>,
  ) -> Self {
    Self {
      slot,
      spec,
      alloc,
      threads,
      state: State::Scanning,
      report: ProvisionReport::default(),
    }
  }

  /// Runs the walk to completion.
  pub(crate) fn run(mut self) -> ProvisionReport {
    while self.step().is_some() {}
    self.report()
  }

  /// Executes one transition, returning the phase that ran.
  ///
  /// Returns `None` once every live thread owns a table for the slot.
  pub(crate) fn step(&mut self) -> Option<Phase> {
    let (phase, next): (Phase, State<I, A>) = match std::mem::replace(&mut self.state, State::Done) {
      State::Scanning => (Phase::Scanning, self.scan()),
      State::BlockedAllocating => (Phase::BlockedAllocating, self.allocate()),
      State::Installing(table) => (Phase::Installing, self.install(table)),
      State::Done => return None,
    };

    tracing::trace!(target: "rvslots", slot = self.slot, ?phase, "provision step");

    self.state = next;

    Some(phase)
  }

  #[inline]
  pub(crate) const fn report(&self) -> ProvisionReport {
    self.report
  }

  fn scan(&mut self) -> State<I, A> {
    let threads: RwLockReadGuard<'_, ThreadSet<I, A>> = self.threads.read();

    for slots in threads.values() {
      let mut cell: MutexGuard<'_, Cell<I, A>> = slots.lock(self.slot);

      if cell.is_some() {
        continue;
      }

      let Some(table) = InstanceTable::try_new(self.spec, self.alloc) else {
        return State::BlockedAllocating;
      };

      *cell = Some(table);
      self.report.installed += 1;
    }

    State::Done
  }

  fn allocate(&mut self) -> State<I, A> {
    let Some(table) = InstanceTable::new(self.spec, self.alloc) else {
      handle_alloc_error(self.spec.layout());
    };

    self.report.blocked += 1;

    State::Installing(table)
  }

  fn install(&mut self, table: InstanceTable<I, A>) -> State<I, A> {
    let threads: RwLockReadGuard<'_, ThreadSet<I, A>> = self.threads.read();
    let mut table: Option<InstanceTable<I, A>> = Some(table);

    for slots in threads.values() {
      let mut cell: MutexGuard<'_, Cell<I, A>> = slots.lock(self.slot);

      if cell.is_none() {
        *cell = table.take();
        self.report.installed += 1;
        return State::Scanning;
      }
    }

    // Every thread gained a table, or exited, while we were blocked.
    drop(table);
    self.report.surplus += 1;

    State::Done
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
