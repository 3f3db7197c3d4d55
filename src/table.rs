//! Automaton-instance tables.
//!
//! A table is one contiguous allocation: a small header holding the table's
//! capacity and free count, followed by `capacity` instance records. The
//! records are opaque to this crate; they are zeroed on allocation and on
//! [`flush`], and otherwise belong to the event-dispatch code that reads and
//! writes them.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────┬──────┬────────┬────────┬─────┬────────────────┐
//! │ capacity │ free │ inst 0 │ inst 1 │ ... │ inst (cap - 1) │
//! └──────────┴──────┴────────┴────────┴─────┴────────────────┘
//!  └─ header ──────┘ └─ offset
//! ```
//!
//! [`flush`]: InstanceTable::flush

use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::slice;

use crate::alloc::SystemAlloc;
use crate::alloc::TableAlloc;
use crate::error::Resource;
use crate::error::ResourceExhausted;
use crate::error::fatal;
use crate::loom::alloc::Layout;

// -----------------------------------------------------------------------------
// Instance
// -----------------------------------------------------------------------------

/// A fixed-size automaton-instance record.
///
/// # Safety
///
/// The all-zero bit pattern must be a valid value of the implementing type.
/// Tables are zeroed in place and never run destructors on their records.
pub unsafe trait Instance: Copy + Send + 'static {}

macro_rules! impl_instance {
  ($($ty:ty),+ $(,)?) => {
    $(unsafe impl Instance for $ty {})+
  };
}

impl_instance!((), u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize);

unsafe impl<T: Instance, const N: usize> Instance for [T; N] {}

// -----------------------------------------------------------------------------
// Table Header
// -----------------------------------------------------------------------------

#[repr(C)]
struct Header {
  capacity: usize,
  free: usize,
}

// -----------------------------------------------------------------------------
// Table Spec
// -----------------------------------------------------------------------------

/// Size and layout of one table for a property class.
///
/// Computed once at registration and copied into every table allocated for
/// the class.
pub struct TableSpec<I> {
  capacity: usize,
  layout: Layout,
  offset: usize,
  marker: PhantomData<fn() -> I>,
}

impl<I: Instance> TableSpec<I> {
  /// Computes the layout of a table holding `capacity` instances.
  ///
  /// # Errors
  ///
  /// Returns [`ResourceExhausted`] if the table size overflows `isize`.
  pub fn new(capacity: usize) -> Result<Self, ResourceExhausted> {
    let overflow = |_| ResourceExhausted::new(Resource::Memory);

    let header: Layout = Layout::new::<Header>();
    let records: Layout = Layout::array::<I>(capacity).map_err(overflow)?;
    let (layout, offset): (Layout, usize) = header.extend(records).map_err(overflow)?;

    Ok(Self {
      capacity,
      layout: layout.pad_to_align(),
      offset,
      marker: PhantomData,
    })
  }
}

impl<I> TableSpec<I> {
  /// Returns the number of instances in each table.
  #[inline]
  pub const fn capacity(&self) -> usize {
    self.capacity
  }

  /// Returns the byte length of one table, header included.
  #[inline]
  pub const fn byte_len(&self) -> usize {
    self.layout.size()
  }

  #[inline]
  pub(crate) const fn layout(&self) -> Layout {
    self.layout
  }
}

impl<I> Clone for TableSpec<I> {
  #[inline]
  fn clone(&self) -> Self {
    *self
  }
}

impl<I> Copy for TableSpec<I> {}

impl<I> PartialEq for TableSpec<I> {
  #[inline]
  fn eq(&self, other: &Self) -> bool {
    self.capacity == other.capacity && self.layout == other.layout
  }
}

impl<I> Eq for TableSpec<I> {}

impl<I> Debug for TableSpec<I> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("TableSpec")
      .field("capacity", &self.capacity)
      .field("byte_len", &self.layout.size())
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Instance Table
// -----------------------------------------------------------------------------

/// The automaton-instance table owned by one (thread, class) pair.
///
/// The table's memory is released when the value is dropped.
pub struct InstanceTable<I: Instance, A: TableAlloc = SystemAlloc> {
  ptr: NonNull<Header>,
  spec: TableSpec<I>,
  alloc: A,
}

impl<I: Instance, A: TableAlloc> InstanceTable<I, A> {
  /// Allocates a zeroed table without blocking.
  ///
  /// Returns `None` if the allocator cannot satisfy the request right now.
  #[inline]
  pub fn try_new(spec: TableSpec<I>, alloc: &A) -> Option<Self> {
    alloc
      .try_allocate_zeroed(spec.layout())
      .map(|memory| Self::init(memory, spec, alloc.clone()))
  }

  /// Allocates a zeroed table, waiting for memory if necessary.
  ///
  /// Returns `None` if the allocator gives up.
  #[inline]
  pub fn new(spec: TableSpec<I>, alloc: &A) -> Option<Self> {
    alloc
      .allocate_zeroed(spec.layout())
      .map(|memory| Self::init(memory, spec, alloc.clone()))
  }

  fn init(memory: NonNull<u8>, spec: TableSpec<I>, alloc: A) -> Self {
    let ptr: NonNull<Header> = memory.cast();

    // SAFETY: `memory` is valid for `spec.layout`, which starts with a header.
    unsafe {
      ptr.write(Header {
        capacity: spec.capacity,
        free: spec.capacity,
      });
    }

    Self { ptr, spec, alloc }
  }

  /// Returns the number of instance records in the table.
  #[inline]
  pub fn capacity(&self) -> usize {
    self.header().capacity
  }

  /// Returns the number of unused instance records.
  #[inline]
  pub fn free_count(&self) -> usize {
    self.header().free
  }

  /// Updates the number of unused instance records.
  ///
  /// # Panics
  ///
  /// Aborts the process if `free` exceeds the table's capacity.
  #[inline]
  pub fn set_free_count(&mut self, free: usize) {
    if free > self.capacity() {
      fatal!("free count exceeds table capacity");
    }

    self.header_mut().free = free;
  }

  /// Returns the table's instance records.
  #[inline]
  pub fn instances(&self) -> &[I] {
    // SAFETY: The records follow the header at `spec.offset`, were zeroed on
    //         allocation, and `I` is valid when zeroed.
    unsafe { slice::from_raw_parts(self.records().as_ptr(), self.capacity()) }
  }

  /// Returns the table's instance records for mutation.
  #[inline]
  pub fn instances_mut(&mut self) -> &mut [I] {
    // SAFETY: As above; `&mut self` guarantees exclusive access.
    unsafe { slice::from_raw_parts_mut(self.records().as_ptr(), self.capacity()) }
  }

  /// Zeroes every instance record and marks them all free.
  pub fn flush(&mut self) {
    let capacity: usize = self.capacity();

    // SAFETY: The records region holds exactly `capacity` values of `I`.
    unsafe { self.records().write_bytes(0, capacity) };

    self.header_mut().free = capacity;
  }

  /// Returns the byte length of the table allocation.
  #[inline]
  pub fn byte_len(&self) -> usize {
    self.spec.byte_len()
  }

  /// Returns the address of the table, for identity comparisons.
  #[inline]
  pub fn addr(&self) -> usize {
    self.ptr.as_ptr().addr()
  }

  #[inline]
  fn records(&self) -> NonNull<I> {
    // SAFETY: `offset` lies within the allocation by construction of `spec`.
    unsafe { self.ptr.cast::<u8>().add(self.spec.offset).cast() }
  }

  #[inline]
  fn header(&self) -> &Header {
    // SAFETY: The header was written in `init` and lives as long as `self`.
    unsafe { self.ptr.as_ref() }
  }

  #[inline]
  fn header_mut(&mut self) -> &mut Header {
    // SAFETY: As above; `&mut self` guarantees exclusive access.
    unsafe { self.ptr.as_mut() }
  }
}

// SAFETY: The table exclusively owns its allocation; records are `Send`.
unsafe impl<I: Instance, A: TableAlloc> Send for InstanceTable<I, A> {}

impl<I: Instance, A: TableAlloc> Drop for InstanceTable<I, A> {
  fn drop(&mut self) {
    // SAFETY: The memory was allocated by `self.alloc` with this exact layout,
    //         and we're the sole owner at drop time.
    unsafe { self.alloc.deallocate(self.ptr.cast(), self.spec.layout()) }
  }
}

impl<I: Instance, A: TableAlloc> Debug for InstanceTable<I, A> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("InstanceTable")
      .field("capacity", &self.capacity())
      .field("free", &self.free_count())
      .finish_non_exhaustive()
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
