//! Thread identities used to key per-thread tables.

use std::cell::Cell;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::num::NonZeroU64;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread::AccessError;

use crate::consts::MAX_STD_THREAD_KEY;
use crate::error::fatal;

thread_local! {
  static CURRENT: Cell<Option<ThreadKey>> = const { Cell::new(None) };
}

/// Identity of a thread as seen by a storage manager.
///
/// Hosts with their own notion of thread identity construct keys with
/// [`ThreadKey::new`]; std threads get a unique key from
/// [`ThreadKey::current`]. Keys are never reused within a process.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ThreadKey {
  inner: NonZeroU64,
}

impl ThreadKey {
  /// Creates a key from a host-supplied thread identity.
  ///
  /// Returns `None` if `value` is zero.
  #[inline]
  pub const fn new(value: u64) -> Option<Self> {
    match NonZeroU64::new(value) {
      Some(inner) => Some(Self { inner }),
      None => None,
    }
  }

  /// Returns the key of the calling std thread.
  ///
  /// Keys are assigned on first use. Returns an error if called while the
  /// thread's local storage is being torn down.
  #[inline]
  pub fn current() -> Result<Self, AccessError> {
    CURRENT.try_with(|thread| {
      thread.get().unwrap_or_else(
        #[cold]
        || {
          let key: ThreadKey = next_thread_key();
          thread.set(Some(key));
          key
        },
      )
    })
  }

  /// Returns this key as a numeric identifier.
  #[inline]
  pub const fn get(&self) -> NonZeroU64 {
    self.inner
  }
}

impl Display for ThreadKey {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    write!(f, "#Thread<{}>", self.inner)
  }
}

fn next_thread_key() -> ThreadKey {
  static ID: AtomicU64 = AtomicU64::new(0);

  let mut last: u64 = ID.load(Ordering::Relaxed);

  'next: loop {
    let Some(id) = last.checked_add(1) else {
      exhausted();
    };

    if id > MAX_STD_THREAD_KEY {
      exhausted();
    }

    match ID.compare_exchange_weak(last, id, Ordering::Relaxed, Ordering::Relaxed) {
      Ok(_) => match ThreadKey::new(id) {
        Some(key) => break 'next key,
        None => exhausted(),
      },
      Err(next) => last = next,
    }
  }
}

#[cold]
fn exhausted() -> ! {
  fatal!("failed to generate unique thread key: bitspace exhausted")
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
