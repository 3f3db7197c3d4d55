//! Error types returned by the storage managers.
//!
//! Only resource exhaustion is reported as a value. Broken invariants are
//! programming errors in the host integration and abort via [`fatal!`].

mod macros;

pub(crate) use self::macros::fatal;

use std::error::Error;
use std::fmt::Display;
use std::fmt::Formatter;
use std::fmt::Result;

// -----------------------------------------------------------------------------
// Resource
// -----------------------------------------------------------------------------

/// The resource that ran out.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum Resource {
  /// Every host-provisioned registry slot is taken.
  Slot,
  /// Every lazy thread-local key is taken.
  Key,
  /// A table allocation failed, or its size overflowed.
  Memory,
  /// The calling thread's local storage has already been torn down.
  ThreadStorage,
}

impl Resource {
  #[inline]
  const fn label(&self) -> &'static str {
    match self {
      Self::Slot => "no free registry slot",
      Self::Key => "no free thread-local key",
      Self::Memory => "table allocation failed",
      Self::ThreadStorage => "thread-local storage unavailable",
    }
  }
}

// -----------------------------------------------------------------------------
// Resource Exhausted
// -----------------------------------------------------------------------------

/// Error returned when a registration or a table allocation cannot be
/// satisfied.
///
/// This is an ordinary operating condition: the caller decides whether to
/// disable the property check or to treat the thread as unmonitored.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub struct ResourceExhausted {
  resource: Resource,
}

impl ResourceExhausted {
  #[inline]
  pub(crate) const fn new(resource: Resource) -> Self {
    Self { resource }
  }

  /// Returns the resource that ran out.
  #[inline]
  pub const fn resource(&self) -> Resource {
    self.resource
  }
}

impl Display for ResourceExhausted {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    write!(f, "[rvslots]: (SysCap) {}", self.resource.label())
  }
}

impl Error for ResourceExhausted {}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
