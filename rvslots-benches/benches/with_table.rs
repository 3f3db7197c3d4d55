use criterion::BenchmarkGroup;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use rvslots::Storage;
use rvslots::host::HostClass;
use rvslots::host::HostStorage;
use rvslots::lazy::LazyClass;
use rvslots::lazy::LazyStorage;
use std::hint::black_box;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

const THREADS: &[usize] = &[2, 4, 6, 8, 10];
const CAPACITY: usize = 64;

type Record = [u64; 4];

fn touch<S: Storage<Instance = Record>>(storage: &S, class: &S::Class) {
  storage
    .with_table(class, |table| {
      table.instances_mut()[0][0] += 1;
      black_box(table.free_count())
    })
    .unwrap();
}

fn bench_with_table(criterion: &mut Criterion) {
  let mut group: BenchmarkGroup<_> = criterion.benchmark_group("with_table");

  group.bench_function("host/single-threaded", |bench| {
    let storage: HostStorage<Record> = HostStorage::new();
    let _guard = storage.attach();
    let class: HostClass = storage.register(CAPACITY).unwrap();

    bench.iter(|| touch(&storage, &class));

    storage.unregister(class);
  });

  group.bench_function("lazy/single-threaded", |bench| {
    let storage: LazyStorage<Record> = LazyStorage::new();
    let class: LazyClass<Record> = storage.register(CAPACITY).unwrap();

    bench.iter(|| touch(&storage, &class));

    storage.unregister(class);
  });

  for threads in THREADS {
    let id: BenchmarkId = BenchmarkId::new("host/multi-threaded", threads);

    group.bench_with_input(id, threads, |bench, &threads| {
      let storage: Arc<HostStorage<Record>> = Arc::new(HostStorage::new());
      let class: Arc<HostClass> = Arc::new(storage.register(CAPACITY).unwrap());

      bench.iter_custom(|iters| {
        let barrier: Arc<Barrier> = Arc::new(Barrier::new(threads + 1));
        let mut handles: Vec<JoinHandle<Duration>> = Vec::with_capacity(threads);

        for _ in 0..threads {
          let barrier: Arc<Barrier> = barrier.clone();
          let storage: Arc<HostStorage<Record>> = storage.clone();
          let class: Arc<HostClass> = class.clone();

          let handle: JoinHandle<Duration> = thread::spawn(move || {
            let _guard = storage.attach();

            barrier.wait();

            let start: Instant = Instant::now();

            for _ in 0..iters {
              touch(&*storage, &*class);
            }

            start.elapsed()
          });

          handles.push(handle);
        }

        barrier.wait();

        handles
          .into_iter()
          .map(|handle| handle.join().unwrap())
          .sum()
      })
    });
  }

  for threads in THREADS {
    let id: BenchmarkId = BenchmarkId::new("lazy/multi-threaded", threads);

    group.bench_with_input(id, threads, |bench, &threads| {
      let storage: Arc<LazyStorage<Record>> = Arc::new(LazyStorage::new());
      let class: Arc<LazyClass<Record>> = Arc::new(storage.register(CAPACITY).unwrap());

      bench.iter_custom(|iters| {
        let barrier: Arc<Barrier> = Arc::new(Barrier::new(threads + 1));
        let mut handles: Vec<JoinHandle<Duration>> = Vec::with_capacity(threads);

        for _ in 0..threads {
          let barrier: Arc<Barrier> = barrier.clone();
          let storage: Arc<LazyStorage<Record>> = storage.clone();
          let class: Arc<LazyClass<Record>> = class.clone();

          let handle: JoinHandle<Duration> = thread::spawn(move || {
            barrier.wait();

            let start: Instant = Instant::now();

            for _ in 0..iters {
              touch(&*storage, &*class);
            }

            start.elapsed()
          });

          handles.push(handle);
        }

        barrier.wait();

        handles
          .into_iter()
          .map(|handle| handle.join().unwrap())
          .sum()
      })
    });
  }

  group.finish();
}

criterion_group! {
  name = benches;
  config = Criterion::default();
  targets = bench_with_table
}

criterion_main!(benches);
