//! The calling thread's lazily allocated tables.
//!
//! Ownership of a table moves into the thread-local cell when it is created
//! and is released when the owning thread exits and the cell is dropped.

use std::any::Any;
use std::cell::RefCell;
use std::mem;
use std::thread::AccessError;

use crate::consts::CAP_LOCAL_TABLES;
use crate::error::fatal;
use crate::lazy::keys::LazyKey;

thread_local! {
  static LOCAL: RefCell<LocalTables> = RefCell::new(LocalTables::new());
}

/// Calls `f` with the calling thread's local tables.
///
/// Fails once the thread's local storage has been torn down.
#[inline]
pub(crate) fn with<F, R>(f: F) -> Result<R, AccessError>
where
  F: FnOnce(&RefCell<LocalTables>) -> R,
{
  LOCAL.try_with(f)
}

// -----------------------------------------------------------------------------
// Local Entry
// -----------------------------------------------------------------------------

enum State {
  Present(Box<dyn Any>),
  Leased,
}

struct LocalEntry {
  generation: u64,
  state: State,
}

/// Result of looking a key up in the local cell.
pub(crate) enum Lookup {
  /// The thread owns no table for the key.
  Absent,
  /// The table, moved out of the cell until it is restored.
  Found(Box<dyn Any>),
}

// -----------------------------------------------------------------------------
// Local Tables
// -----------------------------------------------------------------------------

/// Per-thread tables indexed by key.
pub(crate) struct LocalTables {
  entries: Vec<Option<LocalEntry>>,
}

impl LocalTables {
  #[inline]
  pub(crate) fn new() -> Self {
    Self {
      entries: Vec::with_capacity(CAP_LOCAL_TABLES),
    }
  }

  /// Moves the table for `key` out of the cell, leaving it leased.
  ///
  /// Stale tables left behind by a released key are freed.
  pub(crate) fn lease(&mut self, key: LazyKey) -> Lookup {
    let Some(slot) = self.entries.get_mut(key.index) else {
      return Lookup::Absent;
    };

    match slot {
      Some(entry) if entry.generation == key.generation => {
        match mem::replace(&mut entry.state, State::Leased) {
          State::Present(table) => Lookup::Found(table),
          State::Leased => fatal!("re-entrant access to a thread-local table"),
        }
      }
      Some(_) => {
        *slot = None;
        Lookup::Absent
      }
      None => Lookup::Absent,
    }
  }

  /// Marks `key` as leased by a newly created table.
  pub(crate) fn reserve(&mut self, key: LazyKey) {
    if self.entries.len() <= key.index {
      self.entries.resize_with(key.index + 1, || None);
    }

    self.entries[key.index] = Some(LocalEntry {
      generation: key.generation,
      state: State::Leased,
    });
  }

  /// Returns a leased table to the cell.
  pub(crate) fn restore(&mut self, key: LazyKey, table: Box<dyn Any>) {
    match self.entries.get_mut(key.index) {
      Some(Some(entry)) if entry.generation == key.generation => {
        entry.state = State::Present(table);
      }
      _ => fatal!("restored a thread-local table that was never leased"),
    }
  }

  /// Returns the table for `key` without leasing it.
  pub(crate) fn get_mut(&mut self, key: LazyKey) -> Option<&mut Box<dyn Any>> {
    match self.entries.get_mut(key.index)? {
      Some(LocalEntry {
        generation,
        state: State::Present(table),
      }) if *generation == key.generation => Some(table),
      Some(LocalEntry {
        generation,
        state: State::Leased,
      }) if *generation == key.generation => fatal!("thread-local table accessed while leased"),
      _ => None,
    }
  }

  /// Returns `true` if the thread owns a table for `key`.
  #[inline]
  pub(crate) fn contains(&self, key: LazyKey) -> bool {
    matches!(
      self.entries.get(key.index),
      Some(Some(entry)) if entry.generation == key.generation,
    )
  }

  /// Frees the table for `key`, if any.
  pub(crate) fn remove(&mut self, key: LazyKey) -> bool {
    let Some(slot) = self.entries.get_mut(key.index) else {
      return false;
    };

    let current: bool = matches!(slot, Some(entry) if entry.generation == key.generation);

    *slot = None;

    current
  }

  /// Returns the number of tables held, stale ones included.
  #[inline]
  pub(crate) fn len(&self) -> usize {
    self.entries.iter().filter(|entry| entry.is_some()).count()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
