#[cfg(not(loom))]
pub(crate) mod export {
  pub(crate) mod alloc {
    pub(crate) use std::alloc::Layout;
    pub(crate) use std::alloc::alloc_zeroed;
    pub(crate) use std::alloc::dealloc;
  }

  pub(crate) mod sync {
    pub(crate) use parking_lot::Mutex;
    pub(crate) use parking_lot::MutexGuard;
    pub(crate) use parking_lot::RwLock;
    pub(crate) use parking_lot::RwLockReadGuard;
    pub(crate) use parking_lot::RwLockWriteGuard;
  }
}

#[cfg(loom)]
pub(crate) mod export {
  pub(crate) mod alloc {
    pub(crate) use loom::alloc::Layout;
    pub(crate) use loom::alloc::alloc_zeroed;
    pub(crate) use loom::alloc::dealloc;
  }

  pub(crate) mod sync {
    pub(crate) use loom::sync::MutexGuard;
    pub(crate) use loom::sync::RwLockReadGuard;
    pub(crate) use loom::sync::RwLockWriteGuard;

    // loom locks report poisoning; the storage never panics while holding
    // a guard, so these wrappers expose the `parking_lot` surface instead.

    #[derive(Debug)]
    pub(crate) struct Mutex<T> {
      inner: loom::sync::Mutex<T>,
    }

    impl<T> Mutex<T> {
      #[inline]
      pub(crate) fn new(value: T) -> Self {
        Self {
          inner: loom::sync::Mutex::new(value),
        }
      }

      #[inline]
      pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        match self.inner.lock() {
          Ok(guard) => guard,
          Err(error) => error.into_inner(),
        }
      }
    }

    #[derive(Debug)]
    pub(crate) struct RwLock<T> {
      inner: loom::sync::RwLock<T>,
    }

    impl<T> RwLock<T> {
      #[inline]
      pub(crate) fn new(value: T) -> Self {
        Self {
          inner: loom::sync::RwLock::new(value),
        }
      }

      #[inline]
      pub(crate) fn read(&self) -> RwLockReadGuard<'_, T> {
        match self.inner.read() {
          Ok(guard) => guard,
          Err(error) => error.into_inner(),
        }
      }

      #[inline]
      pub(crate) fn write(&self) -> RwLockWriteGuard<'_, T> {
        match self.inner.write() {
          Ok(guard) => guard,
          Err(error) => error.into_inner(),
        }
      }
    }
  }
}

#[doc(inline)]
pub(crate) use self::export::*;
