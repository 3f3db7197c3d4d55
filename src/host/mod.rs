//! Host-provisioned per-thread storage.
//!
//! [`HostStorage`] pre-allocates a table for every live thread as soon as a
//! class registers, and for every thread created afterwards, so that a
//! registered class always finds its table. The host reports thread
//! lifecycle through [`on_thread_create`] and [`on_thread_exit`] (or through
//! a [`ThreadGuard`] for std threads).
//!
//! # Locking
//!
//! | Lock        | Kind    | Taken by                                              |
//! |-------------|---------|-------------------------------------------------------|
//! | `lifecycle` | mutex   | register, unregister                                  |
//! | `registry`  | rwlock  | exclusive: slot reservation/retirement; shared: hooks |
//! | `threads`   | rwlock  | exclusive: hooks insert/remove; shared: walks, lookup |
//! | cell        | mutex   | one per (thread, slot)                                |
//!
//! Locks are acquired in the order `lifecycle -> registry -> threads -> cell`
//! and no lock except `lifecycle` and a creation hook's shared `registry`
//! lock is held across a blocking allocation.
//!
//! # Teardown
//!
//! [`teardown`] (or dropping the storage) frees every remaining table. It
//! must only run once every instrumented call site has quiesced.
//!
//! [`on_thread_create`]: HostStorage::on_thread_create
//! [`on_thread_exit`]: HostStorage::on_thread_exit
//! [`teardown`]: HostStorage::teardown

mod guard;
mod provision;
mod registry;
mod threads;

pub use self::guard::ThreadGuard;

use crossbeam_utils::CachePadded;
use hashbrown::HashMap;
use std::alloc::handle_alloc_error;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use tracing::Span;
use tracing::debug;
use tracing::trace;
use tracing::warn;
use triomphe::Arc;

use crate::alloc::SystemAlloc;
use crate::alloc::TableAlloc;
use crate::config::StorageConfig;
use crate::error::Resource;
use crate::error::ResourceExhausted;
use crate::error::fatal;
use crate::loom::sync::Mutex;
use crate::loom::sync::MutexGuard;
use crate::loom::sync::RwLock;
use crate::loom::sync::RwLockReadGuard;
use crate::loom::sync::RwLockWriteGuard;
use crate::storage::Storage;
use crate::table::Instance;
use crate::table::InstanceTable;
use crate::table::TableSpec;
use crate::thread::ThreadKey;

use self::provision::ProvisionReport;
use self::provision::Provisioner;
use self::registry::SlotRegistry;
use self::threads::ThreadSet;
use self::threads::ThreadSlots;

// -----------------------------------------------------------------------------
// Host Class
// -----------------------------------------------------------------------------

/// A property class registered with a [`HostStorage`].
///
/// Handles are not `Clone`: [`HostStorage::unregister`] consumes the handle,
/// so a class cannot be unregistered twice.
#[derive(Debug, PartialEq, Eq)]
pub struct HostClass {
  storage: u64,
  class: u64,
  slot: usize,
  capacity: usize,
}

impl HostClass {
  /// Returns the registry slot assigned to the class.
  #[inline]
  pub const fn slot(&self) -> usize {
    self.slot
  }

  /// Returns the number of automaton instances per thread.
  #[inline]
  pub const fn capacity(&self) -> usize {
    self.capacity
  }
}

// -----------------------------------------------------------------------------
// Table Info
// -----------------------------------------------------------------------------

/// A snapshot of one thread's table for one slot.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct TableInfo {
  /// Number of instance records.
  pub capacity: usize,
  /// Number of unused instance records.
  pub free: usize,
  /// Address of the table allocation.
  pub addr: usize,
}

impl TableInfo {
  #[inline]
  fn new<I: Instance, A: TableAlloc>(table: &InstanceTable<I, A>) -> Self {
    Self {
      capacity: table.capacity(),
      free: table.free_count(),
      addr: table.addr(),
    }
  }
}

// -----------------------------------------------------------------------------
// Host Storage
// -----------------------------------------------------------------------------

/// Per-thread storage with a provisioning guarantee.
///
/// Once [`register`] returns a class, every thread known to the storage, and
/// every thread created before the class unregisters, owns a table for it.
///
/// # Examples
///
/// ```
/// use rvslots::host::HostStorage;
/// use rvslots::Storage;
///
/// let storage: HostStorage<u64> = HostStorage::new();
/// let _guard = storage.attach();
///
/// let class = storage.register(4).unwrap();
///
/// storage.with_table(&class, |table| {
///   assert_eq!(table.capacity(), 4);
///   assert_eq!(table.free_count(), 4);
/// }).unwrap();
///
/// storage.unregister(class);
/// ```
///
/// [`register`]: Storage::register
pub struct HostStorage<I: Instance, A: TableAlloc = SystemAlloc> {
  id: u64,
  alloc: A,
  lifecycle: Mutex<u64>,
  registry: CachePadded<RwLock<SlotRegistry<I>>>,
  threads: CachePadded<RwLock<ThreadSet<I, A>>>,
}

impl<I: Instance> HostStorage<I> {
  /// Creates storage backed by the global allocator.
  #[inline]
  pub fn new() -> Self {
    Self::with_alloc(SystemAlloc)
  }
}

impl<I: Instance> Default for HostStorage<I> {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl<I: Instance, A: TableAlloc> HostStorage<I, A> {
  /// Creates storage allocating tables from `alloc`.
  #[inline]
  pub fn with_alloc(alloc: A) -> Self {
    Self::with_config(alloc, &StorageConfig::new())
  }

  /// Creates storage allocating tables from `alloc` with custom settings.
  pub fn with_config(alloc: A, config: &StorageConfig) -> Self {
    static ID: AtomicU64 = AtomicU64::new(1);

    let id: u64 = ID.fetch_add(1, Ordering::Relaxed);

    debug!(target: "rvslots", storage = id, "host storage initialized");

    Self {
      id,
      alloc,
      lifecycle: Mutex::new(0),
      registry: CachePadded::new(RwLock::new(SlotRegistry::new())),
      threads: CachePadded::new(RwLock::new(HashMap::with_capacity(config.thread_capacity))),
    }
  }

  // ---------------------------------------------------------------------------
  // Thread Lifecycle
  // ---------------------------------------------------------------------------

  /// Thread-creation hook: provisions `thread` for every registered class.
  ///
  /// Allocation may block. Concurrent creation hooks do not exclude each
  /// other, but a registration waits for in-flight hooks before reserving
  /// its slot.
  ///
  /// # Panics
  ///
  /// Aborts the process if `thread` is already live.
  pub fn on_thread_create(&self, thread: ThreadKey) {
    let slots: ThreadSlots<I, A> = ThreadSlots::new();

    // Held until the thread is visible to provisioning walks, so a class
    // reserved after this point is guaranteed to find the new thread.
    let registry: RwLockReadGuard<'_, SlotRegistry<I>> = self.registry.read();
    let mut count: usize = 0;

    for (slot, spec) in registry.active() {
      *slots.lock(slot) = Some(self.alloc_blocking(spec));
      count += 1;
    }

    let mut threads: RwLockWriteGuard<'_, ThreadSet<I, A>> = self.threads.write();

    if threads.contains_key(&thread) {
      fatal!("thread creation hook ran twice for a live thread");
    }

    threads.insert(thread, Arc::new(slots));

    drop(threads);
    drop(registry);

    trace!(target: "rvslots", %thread, tables = count, "thread created");
  }

  /// Thread-destruction hook: frees every table owned by `thread`.
  ///
  /// Threads that never passed through [`on_thread_create`] own nothing and
  /// are ignored.
  ///
  /// [`on_thread_create`]: Self::on_thread_create
  pub fn on_thread_exit(&self, thread: ThreadKey) {
    let Some(slots) = self.threads.write().remove(&thread) else {
      trace!(target: "rvslots", %thread, "exit of unknown thread ignored");
      return;
    };

    let count: usize = slots.release();

    trace!(target: "rvslots", %thread, tables = count, "thread exited");
  }

  /// Runs the creation hook for the calling std thread and returns a guard
  /// that runs the destruction hook when dropped.
  #[inline]
  pub fn attach(&self) -> ThreadGuard<'_, I, A> {
    ThreadGuard::new(self, current_thread())
  }

  // ---------------------------------------------------------------------------
  // Table Access
  // ---------------------------------------------------------------------------

  /// Calls `f` with `thread`'s table for `class`.
  ///
  /// The table stays locked for the duration of `f`; `f` must not access the
  /// same class's table again.
  ///
  /// # Panics
  ///
  /// Aborts the process if `thread` is not live or has no table for `class`.
  pub fn with_thread_table<F, R>(&self, thread: ThreadKey, class: &HostClass, f: F) -> R
  where
    F: FnOnce(&mut InstanceTable<I, A>) -> R,
  {
    self.check_owner(class);

    let slots: Arc<ThreadSlots<I, A>> = match self.threads.read().get(&thread) {
      Some(slots) => Arc::clone(slots),
      None => fatal!("table requested for a thread that is not live"),
    };

    let mut cell: MutexGuard<'_, Option<InstanceTable<I, A>>> = slots.lock(class.slot);

    let Some(table) = cell.as_mut() else {
      fatal!("live thread has no table for a registered class");
    };

    f(table)
  }

  /// Resets `thread`'s table for `class`.
  #[inline]
  pub fn flush_thread(&self, thread: ThreadKey, class: &HostClass) {
    self.with_thread_table(thread, class, InstanceTable::flush);
  }

  // ---------------------------------------------------------------------------
  // Introspection
  // ---------------------------------------------------------------------------

  /// Returns the number of registered classes.
  #[inline]
  pub fn registered(&self) -> usize {
    self.registry.read().len()
  }

  /// Returns the number of live threads.
  #[inline]
  pub fn threads(&self) -> usize {
    self.threads.read().len()
  }

  /// Returns the table spec of the class registered in `slot`, if any.
  #[inline]
  pub fn slot_spec(&self, slot: usize) -> Option<TableSpec<I>> {
    self.registry.read().spec(slot)
  }

  /// Returns a snapshot of `thread`'s table in `slot`.
  ///
  /// Returns `None` if the thread is not live or owns no table there.
  pub fn table_info(&self, thread: ThreadKey, slot: usize) -> Option<TableInfo> {
    if slot >= crate::consts::SLOT_MAX {
      return None;
    }

    let slots: Arc<ThreadSlots<I, A>> = self.threads.read().get(&thread).cloned()?;
    let cell: MutexGuard<'_, Option<InstanceTable<I, A>>> = slots.lock(slot);

    cell.as_ref().map(TableInfo::new)
  }

  // ---------------------------------------------------------------------------
  // Teardown
  // ---------------------------------------------------------------------------

  /// Frees every remaining table and destroys the storage.
  ///
  /// Outstanding class handles become meaningless; instrumented call sites
  /// must have quiesced before this is called.
  pub fn teardown(self) {
    let span: Span = tracing::debug_span!(target: "rvslots", "host::teardown", storage = self.id);
    let _enter = span.enter();

    let classes: usize = self.registered();
    let (threads, tables): (usize, usize) = self.release_all();

    debug!(target: "rvslots", classes, threads, tables, "host storage torn down");
  }

  fn release_all(&self) -> (usize, usize) {
    let drained: Vec<Arc<ThreadSlots<I, A>>> = self
      .threads
      .write()
      .drain()
      .map(|(_, slots)| slots)
      .collect();

    let tables: usize = drained.iter().map(|slots| slots.release()).sum();

    (drained.len(), tables)
  }

  // ---------------------------------------------------------------------------
  // Internals
  // ---------------------------------------------------------------------------

  #[inline]
  fn check_owner(&self, class: &HostClass) {
    if class.storage != self.id {
      fatal!("class handle used with a storage it was not registered with");
    }
  }

  #[inline]
  fn alloc_blocking(&self, spec: TableSpec<I>) -> InstanceTable<I, A> {
    match InstanceTable::new(spec, &self.alloc) {
      Some(table) => table,
      None => handle_alloc_error(spec.layout()),
    }
  }

  fn do_register(&self, capacity: usize) -> Result<HostClass, ResourceExhausted> {
    let spec: TableSpec<I> = TableSpec::new(capacity)?;

    let mut serial: MutexGuard<'_, u64> = self.lifecycle.lock();
    let class: u64 = *serial;

    let reserved: Option<usize> = self.registry.write().reserve(class, spec);

    let Some(slot) = reserved else {
      warn!(target: "rvslots", capacity, "no free registry slot");
      return Err(ResourceExhausted::new(Resource::Slot));
    };

    *serial += 1;

    let report: ProvisionReport = Provisioner::new(slot, spec, &self.alloc, &self.threads).run();

    debug!(
      target: "rvslots",
      class,
      slot,
      capacity,
      byte_len = spec.byte_len(),
      installed = report.installed,
      blocked = report.blocked,
      surplus = report.surplus,
      "class registered",
    );

    drop(serial);

    Ok(HostClass {
      storage: self.id,
      class,
      slot,
      capacity,
    })
  }

  fn do_unregister(&self, class: HostClass) {
    self.check_owner(&class);

    let serial: MutexGuard<'_, u64> = self.lifecycle.lock();

    self.registry.write().retire(class.slot, class.class);

    let freed: usize = self
      .threads
      .read()
      .values()
      .filter_map(|slots| slots.lock(class.slot).take())
      .count();

    self.registry.write().vacate(class.slot, class.class);

    drop(serial);

    debug!(
      target: "rvslots",
      class = class.class,
      slot = class.slot,
      freed,
      "class unregistered",
    );
  }
}

impl<I: Instance, A: TableAlloc> Storage for HostStorage<I, A> {
  type Instance = I;
  type Alloc = A;
  type Class = HostClass;

  fn register(&self, capacity: usize) -> Result<Self::Class, ResourceExhausted> {
    let span: Span = tracing::debug_span!(target: "rvslots", "host::register", storage = self.id);
    let _enter = span.enter();

    self.do_register(capacity)
  }

  fn unregister(&self, class: Self::Class) {
    let span: Span = tracing::debug_span!(target: "rvslots", "host::unregister", storage = self.id);
    let _enter = span.enter();

    self.do_unregister(class)
  }

  /// Never fails: a live thread always owns a table for a registered class.
  #[inline]
  fn with_table<F, R>(&self, class: &Self::Class, f: F) -> Result<R, ResourceExhausted>
  where
    F: FnOnce(&mut InstanceTable<I, A>) -> R,
  {
    Ok(self.with_thread_table(current_thread(), class, f))
  }

  #[inline]
  fn flush(&self, class: &Self::Class) {
    self.flush_thread(current_thread(), class);
  }
}

impl<I: Instance, A: TableAlloc> Drop for HostStorage<I, A> {
  fn drop(&mut self) {
    self.release_all();
  }
}

impl<I: Instance, A: TableAlloc> Debug for HostStorage<I, A> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("HostStorage")
      .field("id", &self.id)
      .field("registered", &self.registered())
      .field("threads", &self.threads())
      .finish_non_exhaustive()
  }
}

#[inline]
fn current_thread() -> ThreadKey {
  match ThreadKey::current() {
    Ok(thread) => thread,
    Err(_) => fatal!("thread key requested during thread teardown"),
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
