//! Process-wide thread-local key space.
//!
//! A key names one table in every thread's local cell. Keys are recycled
//! after release, so each carries a generation: a table stored under an
//! older generation of the same index is stale and never handed out.

use parking_lot::Mutex;
use parking_lot::const_mutex;

use crate::consts::LAZY_KEY_MAX;

static KEYS: Mutex<KeySpace> = const_mutex(KeySpace::new(LAZY_KEY_MAX));

/// Identity of a registered lazy class.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub(crate) struct LazyKey {
  pub(crate) index: usize,
  pub(crate) generation: u64,
}

pub(crate) struct KeySpace {
  generations: Vec<u64>,
  free: Vec<usize>,
  limit: usize,
}

impl KeySpace {
  #[inline]
  pub(crate) const fn new(limit: usize) -> Self {
    Self {
      generations: Vec::new(),
      free: Vec::new(),
      limit,
    }
  }

  /// Claims an unused key, preferring recycled indices.
  pub(crate) fn create(&mut self) -> Option<LazyKey> {
    let index: usize = match self.free.pop() {
      Some(index) => index,
      None if self.generations.len() < self.limit => {
        self.generations.push(0);
        self.generations.len() - 1
      }
      None => return None,
    };

    Some(LazyKey {
      index,
      generation: self.generations[index],
    })
  }

  /// Releases `key`; returns `false` if it was already released.
  pub(crate) fn delete(&mut self, key: LazyKey) -> bool {
    match self.generations.get_mut(key.index) {
      Some(generation) if *generation == key.generation => {
        *generation += 1;
        self.free.push(key.index);
        true
      }
      _ => false,
    }
  }

  /// Returns the number of keys currently claimed.
  #[inline]
  pub(crate) fn live(&self) -> usize {
    self.generations.len() - self.free.len()
  }
}

/// Claims a key from the process-wide key space.
#[inline]
pub(crate) fn create() -> Option<LazyKey> {
  KEYS.lock().create()
}

/// Releases a key to the process-wide key space.
#[inline]
pub(crate) fn delete(key: LazyKey) -> bool {
  KEYS.lock().delete(key)
}

/// Returns the number of keys claimed across the process.
#[inline]
pub(crate) fn live() -> usize {
  KEYS.lock().live()
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
