#![allow(dead_code)]

use rvslots::SystemAlloc;
use rvslots::TableAlloc;
use rvslots::ThreadKey;
use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use triomphe::Arc;

#[derive(Default)]
struct Counters {
  allocs: AtomicUsize,
  frees: AtomicUsize,
  blocked: AtomicUsize,
  fail_try: AtomicBool,
  fail_all: AtomicBool,
}

/// Table allocator that counts allocations and can be told to fail.
#[derive(Clone, Default)]
pub struct CountingAlloc {
  inner: Arc<Counters>,
}

impl CountingAlloc {
  pub fn new() -> Self {
    Self::default()
  }

  /// Makes every non-blocking allocation fail.
  pub fn fail_try(&self, value: bool) {
    self.inner.fail_try.store(value, Ordering::SeqCst);
  }

  /// Makes every allocation fail.
  pub fn fail_all(&self, value: bool) {
    self.inner.fail_all.store(value, Ordering::SeqCst);
  }

  pub fn allocs(&self) -> usize {
    self.inner.allocs.load(Ordering::SeqCst)
  }

  pub fn frees(&self) -> usize {
    self.inner.frees.load(Ordering::SeqCst)
  }

  /// Number of blocking allocations served.
  pub fn blocked(&self) -> usize {
    self.inner.blocked.load(Ordering::SeqCst)
  }

  pub fn live(&self) -> usize {
    self.allocs() - self.frees()
  }

  fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
    if self.inner.fail_all.load(Ordering::SeqCst) {
      return None;
    }

    let memory: NonNull<u8> = SystemAlloc.allocate_zeroed(layout)?;

    self.inner.allocs.fetch_add(1, Ordering::SeqCst);

    Some(memory)
  }
}

unsafe impl TableAlloc for CountingAlloc {
  fn try_allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
    if self.inner.fail_try.load(Ordering::SeqCst) {
      return None;
    }

    self.allocate(layout)
  }

  fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
    let memory: NonNull<u8> = self.allocate(layout)?;

    self.inner.blocked.fetch_add(1, Ordering::SeqCst);

    Some(memory)
  }

  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    self.inner.frees.fetch_add(1, Ordering::SeqCst);

    unsafe { SystemAlloc.deallocate(ptr, layout) }
  }
}

pub fn key(id: u64) -> ThreadKey {
  ThreadKey::new(id).unwrap()
}
