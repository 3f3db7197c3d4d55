//! Allocation seam for instance tables.
//!
//! Table memory is requested through [`TableAlloc`] so that the two storage
//! managers can distinguish a non-blocking attempt from one that is allowed
//! to wait for memory, and so that hosts can route tables to their own
//! allocator.

use std::ptr::NonNull;

use crate::loom::alloc::Layout;
use crate::loom::alloc::alloc_zeroed;
use crate::loom::alloc::dealloc;

/// A source of zeroed table memory.
///
/// # Safety
///
/// Implementations must return memory that is valid for `layout`, entirely
/// zeroed, and exclusively owned by the caller until it is passed back to
/// [`deallocate`] with the same layout.
///
/// [`deallocate`]: TableAlloc::deallocate
pub unsafe trait TableAlloc: Clone + Send + Sync + 'static {
  /// Attempts to allocate zeroed memory without blocking.
  ///
  /// Called while storage locks are held; must not wait for memory to
  /// become available.
  fn try_allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>>;

  /// Allocates zeroed memory, waiting for it if necessary.
  ///
  /// Never called while storage locks are held. Returns `None` only if the
  /// allocator gives up entirely.
  fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>>;

  /// Releases memory obtained from this allocator.
  ///
  /// # Safety
  ///
  /// `ptr` must have been returned by this allocator for exactly `layout`
  /// and must not be used afterwards.
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Table allocator backed by the global allocator.
///
/// The global allocator has no non-blocking mode, so both allocation paths
/// behave the same. Hosts can wrap it to observe table allocations:
///
/// ```
/// use rvslots::SystemAlloc;
/// use rvslots::TableAlloc;
/// use std::alloc::Layout;
/// use std::ptr::NonNull;
/// use std::sync::Arc;
/// use std::sync::atomic::AtomicUsize;
/// use std::sync::atomic::Ordering;
///
/// #[derive(Clone, Default)]
/// struct Tracked(Arc<AtomicUsize>);
///
/// unsafe impl TableAlloc for Tracked {
///   fn try_allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
///     self.allocate_zeroed(layout)
///   }
///
///   fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
///     self.0.fetch_add(1, Ordering::Relaxed);
///     SystemAlloc.allocate_zeroed(layout)
///   }
///
///   unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
///     self.0.fetch_sub(1, Ordering::Relaxed);
///     unsafe { SystemAlloc.deallocate(ptr, layout) }
///   }
/// }
///
/// let alloc: Tracked = Tracked::default();
/// let layout: Layout = Layout::new::<[u64; 4]>();
/// let memory: NonNull<u8> = alloc.allocate_zeroed(layout).unwrap();
///
/// assert_eq!(alloc.0.load(Ordering::Relaxed), 1);
/// unsafe { alloc.deallocate(memory, layout) };
/// assert_eq!(alloc.0.load(Ordering::Relaxed), 0);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemAlloc;

unsafe impl TableAlloc for SystemAlloc {
  #[inline]
  fn try_allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
    self.allocate_zeroed(layout)
  }

  #[inline]
  fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
    debug_assert!(layout.size() != 0, "table layouts always include a header");

    // SAFETY: Table layouts always include a non-zero sized header.
    NonNull::new(unsafe { alloc_zeroed(layout) })
  }

  #[inline]
  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    // SAFETY: This is guaranteed to be safe by the caller.
    unsafe { dealloc(ptr.as_ptr(), layout) }
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
