use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result;
use std::marker::PhantomData;

use crate::alloc::TableAlloc;
use crate::host::HostStorage;
use crate::table::Instance;
use crate::thread::ThreadKey;

/// Keeps the calling std thread registered with a [`HostStorage`].
///
/// Created by [`HostStorage::attach`]; dropping the guard runs the
/// thread-destruction hook. The guard cannot leave the thread it was
/// created on.
pub struct ThreadGuard<'a, I: Instance, A: TableAlloc> {
  storage: &'a HostStorage<I, A>,
  thread: ThreadKey,
  marker: PhantomData<*const ()>,
}

impl<'a, I: Instance, A: TableAlloc> ThreadGuard<'a, I, A> {
  #[inline]
  pub(crate) fn new(storage: &'a HostStorage<I, A>, thread: ThreadKey) -> Self {
    storage.on_thread_create(thread);

    Self {
      storage,
      thread,
      marker: PhantomData,
    }
  }

  /// Returns the key of the guarded thread.
  #[inline]
  pub const fn thread(&self) -> ThreadKey {
    self.thread
  }
}

impl<I: Instance, A: TableAlloc> Drop for ThreadGuard<'_, I, A> {
  fn drop(&mut self) {
    self.storage.on_thread_exit(self.thread);
  }
}

impl<I: Instance, A: TableAlloc> Debug for ThreadGuard<'_, I, A> {
  fn fmt(&self, f: &mut Formatter<'_>) -> Result {
    f.debug_tuple("ThreadGuard").field(&self.thread).finish()
  }
}
