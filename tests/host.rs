#![cfg(not(loom))]

mod common;

use rvslots::Resource;
use rvslots::Storage;
use rvslots::host::HostClass;
use rvslots::host::HostStorage;
use rvslots::host::TableInfo;
use std::sync::Barrier;
use std::thread;

use self::common::CountingAlloc;
use self::common::key;

const THREADS: u64 = 5;

#[test]
fn register_create_unregister_reregister() {
  let alloc: CountingAlloc = CountingAlloc::new();
  let storage: HostStorage<[u64; 2], CountingAlloc> = HostStorage::with_alloc(alloc.clone());

  for id in 1..=THREADS {
    storage.on_thread_create(key(id));
  }

  let class: HostClass = storage.register(4).unwrap();
  let slot: usize = class.slot();

  for id in 1..=THREADS {
    let info: TableInfo = storage.table_info(key(id), slot).unwrap();
    assert_eq!((info.capacity, info.free), (4, 4));
  }

  storage.on_thread_create(key(THREADS + 1));

  let info: TableInfo = storage.table_info(key(THREADS + 1), slot).unwrap();
  assert_eq!((info.capacity, info.free), (4, 4));

  storage.unregister(class);

  for id in 1..=THREADS + 1 {
    assert!(storage.table_info(key(id), slot).is_none());
  }

  assert_eq!(alloc.live(), 0);

  let class: HostClass = storage.register(2).unwrap();
  assert_eq!(class.slot(), slot);

  storage.on_thread_create(key(THREADS + 2));

  for id in 1..=THREADS + 2 {
    let info: TableInfo = storage.table_info(key(id), slot).unwrap();
    assert_eq!((info.capacity, info.free), (2, 2));
  }

  storage.unregister(class);
  storage.teardown();

  assert_eq!(alloc.allocs(), alloc.frees());
}

#[test]
fn flush_is_idempotent() {
  let storage: HostStorage<[u8; 8]> = HostStorage::new();
  let _guard = storage.attach();
  let class: HostClass = storage.register(3).unwrap();

  storage
    .with_table(&class, |table| {
      table.instances_mut().fill([0xAA; 8]);
      table.set_free_count(0);
    })
    .unwrap();

  storage.flush(&class);

  let once: (usize, bool) = storage
    .with_table(&class, |table| {
      (table.free_count(), table.instances().iter().all(|record| *record == [0; 8]))
    })
    .unwrap();

  storage.flush(&class);

  let twice: (usize, bool) = storage
    .with_table(&class, |table| {
      (table.free_count(), table.instances().iter().all(|record| *record == [0; 8]))
    })
    .unwrap();

  assert_eq!(once, (3, true));
  assert_eq!(once, twice);

  storage.unregister(class);
}

#[test]
fn blocked_walk_provisions_every_thread() {
  let alloc: CountingAlloc = CountingAlloc::new();
  let storage: HostStorage<u64, CountingAlloc> = HostStorage::with_alloc(alloc.clone());

  for id in 1..=THREADS {
    storage.on_thread_create(key(id));
  }

  let before: usize = alloc.blocked();

  alloc.fail_try(true);

  let class: HostClass = storage.register(6).unwrap();

  alloc.fail_try(false);

  assert_eq!(alloc.blocked() - before, THREADS as usize);

  for id in 1..=THREADS {
    assert_eq!(storage.table_info(key(id), class.slot()).map(|info| info.capacity), Some(6));
  }

  storage.unregister(class);
  storage.teardown();

  assert_eq!(alloc.live(), 0);
}

#[test]
fn registration_races_thread_creation() {
  const WORKERS: usize = 8;

  let alloc: CountingAlloc = CountingAlloc::new();
  let storage: HostStorage<u32, CountingAlloc> = HostStorage::with_alloc(alloc.clone());
  let barrier: Barrier = Barrier::new(WORKERS + 1);

  thread::scope(|scope| {
    let mut handles = Vec::with_capacity(WORKERS);

    for _ in 0..WORKERS {
      handles.push(scope.spawn(|| {
        barrier.wait();

        // Registration is in flight.
        let guard = storage.attach();

        barrier.wait();

        let found: usize = (0..rvslots::consts::SLOT_MAX)
          .filter_map(|slot| storage.table_info(guard.thread(), slot))
          .count();

        barrier.wait();

        found
      }));
    }

    barrier.wait();

    let class: HostClass = storage.register(8).unwrap();

    barrier.wait();
    barrier.wait();

    for handle in handles {
      assert_eq!(handle.join().unwrap(), 1);
    }

    storage.unregister(class);
  });

  assert_eq!(storage.threads(), 0);
  assert_eq!(alloc.live(), 0);
}

#[test]
fn slot_exhaustion_is_recoverable() {
  let storage: HostStorage<u8> = HostStorage::new();

  let classes: Vec<HostClass> = (0..rvslots::consts::SLOT_MAX)
    .map(|_| storage.register(1).unwrap())
    .collect();

  let error = storage.register(1).unwrap_err();

  assert_eq!(error.resource(), Resource::Slot);
  assert_eq!(error.to_string(), "[rvslots]: (SysCap) no free registry slot");

  let mut classes = classes.into_iter();
  let first: HostClass = classes.next().unwrap();
  let slot: usize = first.slot();

  storage.unregister(first);

  assert_eq!(storage.register(1).unwrap().slot(), slot);

  storage.teardown();
}
