#![cfg(loom)]

use loom::model::Builder;
use loom::thread;
use rvslots::Storage;
use rvslots::SystemAlloc;
use rvslots::TableAlloc;
use rvslots::ThreadKey;
use rvslots::host::HostClass;
use rvslots::host::HostStorage;
use std::alloc::Layout;
use std::ptr::NonNull;
use triomphe::Arc;

/// Allocator whose non-blocking path always fails, forcing every
/// provisioning walk through its blocking state.
#[derive(Clone)]
struct Blocking;

unsafe impl TableAlloc for Blocking {
  fn try_allocate_zeroed(&self, _layout: Layout) -> Option<NonNull<u8>> {
    None
  }

  fn allocate_zeroed(&self, layout: Layout) -> Option<NonNull<u8>> {
    SystemAlloc.allocate_zeroed(layout)
  }

  unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
    unsafe { SystemAlloc.deallocate(ptr, layout) }
  }
}

fn key(id: u64) -> ThreadKey {
  ThreadKey::new(id).unwrap()
}

fn model<F>(f: F)
where
  F: Fn() + Sync + Send + 'static,
{
  let mut builder: Builder = Builder::new();
  builder.preemption_bound = Some(2);
  builder.check(f);
}

#[test]
fn register_during_thread_create() {
  model(|| {
    let storage: Arc<HostStorage<u64>> = Arc::new(HostStorage::new());

    let t1 = {
      let storage: Arc<HostStorage<u64>> = Arc::clone(&storage);

      thread::spawn(move || storage.on_thread_create(key(1)))
    };

    let t2 = {
      let storage: Arc<HostStorage<u64>> = Arc::clone(&storage);

      thread::spawn(move || storage.register(2).unwrap())
    };

    t1.join().unwrap();
    let class: HostClass = t2.join().unwrap();

    let capacity: Option<usize> = storage.table_info(key(1), class.slot()).map(|info| info.capacity);
    assert_eq!(capacity, Some(2), "Thread created during registration has no table!");

    storage.unregister(class);
    storage.on_thread_exit(key(1));
  });
}

#[test]
fn blocked_register_during_thread_create() {
  model(|| {
    let storage: Arc<HostStorage<u64, Blocking>> = Arc::new(HostStorage::with_alloc(Blocking));

    storage.on_thread_create(key(1));

    let t1 = {
      let storage: Arc<HostStorage<u64, Blocking>> = Arc::clone(&storage);

      thread::spawn(move || storage.on_thread_create(key(2)))
    };

    let t2 = {
      let storage: Arc<HostStorage<u64, Blocking>> = Arc::clone(&storage);

      thread::spawn(move || storage.register(1).unwrap())
    };

    t1.join().unwrap();
    let class: HostClass = t2.join().unwrap();

    for id in 1..=2 {
      assert!(storage.table_info(key(id), class.slot()).is_some(), "Thread left without a table!");
    }

    storage.unregister(class);
  });
}

#[test]
fn register_during_thread_exit() {
  model(|| {
    let storage: Arc<HostStorage<u64>> = Arc::new(HostStorage::new());

    storage.on_thread_create(key(1));

    let t1 = {
      let storage: Arc<HostStorage<u64>> = Arc::clone(&storage);

      thread::spawn(move || storage.on_thread_exit(key(1)))
    };

    let t2 = {
      let storage: Arc<HostStorage<u64>> = Arc::clone(&storage);

      thread::spawn(move || storage.register(3).unwrap())
    };

    t1.join().unwrap();
    let class: HostClass = t2.join().unwrap();

    assert_eq!(storage.threads(), 0);
    assert!(storage.table_info(key(1), class.slot()).is_none());

    storage.unregister(class);
  });
}

#[test]
fn unregister_during_thread_create() {
  model(|| {
    let storage: Arc<HostStorage<u64>> = Arc::new(HostStorage::new());
    let class: HostClass = storage.register(2).unwrap();
    let slot: usize = class.slot();

    let t1 = {
      let storage: Arc<HostStorage<u64>> = Arc::clone(&storage);

      thread::spawn(move || storage.on_thread_create(key(1)))
    };

    let t2 = {
      let storage: Arc<HostStorage<u64>> = Arc::clone(&storage);

      thread::spawn(move || storage.unregister(class))
    };

    t1.join().unwrap();
    t2.join().unwrap();

    assert!(storage.table_info(key(1), slot).is_none(), "Table survived unregistration!");
    assert_eq!(storage.registered(), 0);

    storage.on_thread_exit(key(1));
  });
}
