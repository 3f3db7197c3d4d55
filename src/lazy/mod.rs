//! Lazily allocated per-thread storage.
//!
//! [`LazyStorage`] needs no thread lifecycle hooks. A class claims a key from
//! a process-wide key space at registration; each thread allocates its table
//! for the class on first access and frees it when the thread exits.
//!
//! Because nothing is provisioned ahead of time, [`with_table`] can fail if
//! memory runs out on first access. Callers treat such a thread as having no
//! active automaton instances for the class.
//!
//! # Unregistration
//!
//! Releasing a key frees only the calling thread's table. Tables held by
//! other threads become stale and are freed when those threads exit, or when
//! the key is reused and the thread next touches it. Unregistration must only
//! run after every thread has stopped dispatching events for the class.
//!
//! [`with_table`]: Storage::with_table

mod keys;
mod local;

use std::any::Any;
use std::cell::RefCell;
use std::cell::RefMut;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use std::marker::PhantomData;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::thread::AccessError;
use tracing::Span;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::alloc::SystemAlloc;
use crate::alloc::TableAlloc;
use crate::error::Resource;
use crate::error::ResourceExhausted;
use crate::error::fatal;
use crate::storage::Storage;
use crate::table::Instance;
use crate::table::InstanceTable;
use crate::table::TableSpec;

use self::keys::LazyKey;
use self::local::LocalTables;
use self::local::Lookup;

// -----------------------------------------------------------------------------
// Lazy Class
// -----------------------------------------------------------------------------

/// A property class registered with a [`LazyStorage`].
///
/// Handles are not `Clone`: [`LazyStorage::unregister`] consumes the handle,
/// so a key cannot be released twice.
pub struct LazyClass<I> {
  storage: u64,
  key: LazyKey,
  spec: TableSpec<I>,
}

impl<I> LazyClass<I> {
  /// Returns the number of automaton instances per thread.
  #[inline]
  pub const fn capacity(&self) -> usize {
    self.spec.capacity()
  }

  /// Returns the key index assigned to the class.
  #[inline]
  pub const fn key(&self) -> usize {
    self.key.index
  }
}

impl<I> Debug for LazyClass<I> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("LazyClass")
      .field("key", &self.key.index)
      .field("generation", &self.key.generation)
      .field("capacity", &self.spec.capacity())
      .finish()
  }
}

// -----------------------------------------------------------------------------
// Lazy Storage
// -----------------------------------------------------------------------------

/// Per-thread storage allocated on first access.
///
/// # Examples
///
/// ```
/// use rvslots::lazy::LazyStorage;
/// use rvslots::Storage;
///
/// let storage: LazyStorage<u32> = LazyStorage::new();
/// let class = storage.register(8).unwrap();
///
/// let free = storage.with_table(&class, |table| table.free_count()).unwrap();
/// assert_eq!(free, 8);
///
/// storage.unregister(class);
/// ```
pub struct LazyStorage<I: Instance, A: TableAlloc = SystemAlloc> {
  id: u64,
  alloc: A,
  registered: AtomicUsize,
  marker: PhantomData<fn() -> I>,
}

impl<I: Instance> LazyStorage<I> {
  /// Creates storage backed by the global allocator.
  #[inline]
  pub fn new() -> Self {
    Self::with_alloc(SystemAlloc)
  }
}

impl<I: Instance> Default for LazyStorage<I> {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}

impl<I: Instance, A: TableAlloc> LazyStorage<I, A> {
  /// Creates storage allocating tables from `alloc`.
  pub fn with_alloc(alloc: A) -> Self {
    static ID: AtomicU64 = AtomicU64::new(1);

    let id: u64 = ID.fetch_add(1, Ordering::Relaxed);

    debug!(target: "rvslots", storage = id, "lazy storage initialized");

    Self {
      id,
      alloc,
      registered: AtomicUsize::new(0),
      marker: PhantomData,
    }
  }

  /// Returns `true` if the calling thread has allocated its table for
  /// `class`.
  pub fn has_table(&self, class: &LazyClass<I>) -> bool {
    self.check_owner(class);
    local::with(|cell| cell.borrow().contains(class.key)).unwrap_or(false)
  }

  /// Returns the number of classes registered with this storage.
  #[inline]
  pub fn registered(&self) -> usize {
    self.registered.load(Ordering::Acquire)
  }

  /// Returns the number of keys claimed across the process.
  #[inline]
  pub fn keys_live() -> usize {
    keys::live()
  }

  /// Returns the number of tables held by the calling thread across every
  /// lazy storage, stale tables included.
  #[inline]
  pub fn local_tables() -> usize {
    local::with(|cell| cell.borrow().len()).unwrap_or(0)
  }

  // ---------------------------------------------------------------------------
  // Internals
  // ---------------------------------------------------------------------------

  #[inline]
  fn check_owner(&self, class: &LazyClass<I>) {
    if class.storage != self.id {
      fatal!("class handle used with a storage it was not registered with");
    }
  }

  fn lease_and_call<F, R>(
    &self,
    cell: &RefCell<LocalTables>,
    class: &LazyClass<I>,
    f: F,
  ) -> Result<R, ResourceExhausted>
  where
    F: FnOnce(&mut InstanceTable<I, A>) -> R,
  {
    let lookup: Lookup = cell.borrow_mut().lease(class.key);

    let table: Box<dyn Any> = match lookup {
      Lookup::Found(table) => table,
      Lookup::Absent => self.create(cell, class)?,
    };

    let mut lease: Lease<'_> = Lease {
      cell,
      key: class.key,
      table: Some(table),
    };

    let Some(table) = lease
      .table
      .as_mut()
      .and_then(|table| table.downcast_mut::<InstanceTable<I, A>>())
    else {
      fatal!("thread-local table has an unexpected type");
    };

    Ok(f(table))
  }

  fn create(&self, cell: &RefCell<LocalTables>, class: &LazyClass<I>) -> Result<Box<dyn Any>, ResourceExhausted> {
    let Some(table) = InstanceTable::new(class.spec, &self.alloc) else {
      warn!(
        target: "rvslots",
        key = class.key.index,
        byte_len = class.spec.byte_len(),
        "thread-local table allocation failed",
      );

      return Err(ResourceExhausted::new(Resource::Memory));
    };

    trace!(target: "rvslots", key = class.key.index, capacity = table.capacity(), "thread-local table allocated");

    cell.borrow_mut().reserve(class.key);

    Ok(Box::new(table))
  }
}

impl<I: Instance, A: TableAlloc> Storage for LazyStorage<I, A> {
  type Instance = I;
  type Alloc = A;
  type Class = LazyClass<I>;

  fn register(&self, capacity: usize) -> Result<Self::Class, ResourceExhausted> {
    let span: Span = tracing::debug_span!(target: "rvslots", "lazy::register", storage = self.id);
    let _enter = span.enter();

    let spec: TableSpec<I> = TableSpec::new(capacity)?;

    let Some(key) = keys::create() else {
      warn!(target: "rvslots", capacity, "no free thread-local key");
      return Err(ResourceExhausted::new(Resource::Key));
    };

    self.registered.fetch_add(1, Ordering::AcqRel);

    debug!(
      target: "rvslots",
      key = key.index,
      generation = key.generation,
      capacity,
      byte_len = spec.byte_len(),
      "class registered",
    );

    Ok(LazyClass {
      storage: self.id,
      key,
      spec,
    })
  }

  fn unregister(&self, class: Self::Class) {
    let span: Span = tracing::debug_span!(target: "rvslots", "lazy::unregister", storage = self.id);
    let _enter = span.enter();

    self.check_owner(&class);

    let freed: bool = local::with(|cell| cell.borrow_mut().remove(class.key)).unwrap_or(false);

    if !keys::delete(class.key) {
      fatal!("thread-local key released twice");
    }

    self.registered.fetch_sub(1, Ordering::AcqRel);

    debug!(target: "rvslots", key = class.key.index, freed, "class unregistered");
  }

  fn with_table<F, R>(&self, class: &Self::Class, f: F) -> Result<R, ResourceExhausted>
  where
    F: FnOnce(&mut InstanceTable<I, A>) -> R,
  {
    self.check_owner(class);

    match local::with(|cell| self.lease_and_call(cell, class, f)) {
      Ok(result) => result,
      Err(_) => Err(ResourceExhausted::new(Resource::ThreadStorage)),
    }
  }

  fn flush(&self, class: &Self::Class) {
    self.check_owner(class);

    let result: Result<(), AccessError> = local::with(|cell| {
      let mut tables: RefMut<'_, LocalTables> = cell.borrow_mut();

      let Some(table) = tables.get_mut(class.key) else {
        return;
      };

      match table.downcast_mut::<InstanceTable<I, A>>() {
        Some(table) => table.flush(),
        None => fatal!("thread-local table has an unexpected type"),
      }
    });

    if result.is_err() {
      trace!(target: "rvslots", key = class.key.index, "flush during thread teardown ignored");
    }
  }
}

impl<I: Instance, A: TableAlloc> Debug for LazyStorage<I, A> {
  fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
    f.debug_struct("LazyStorage")
      .field("id", &self.id)
      .field("registered", &self.registered())
      .finish_non_exhaustive()
  }
}

// -----------------------------------------------------------------------------
// Lease
// -----------------------------------------------------------------------------

/// A table moved out of the local cell; put back on drop, unwinding included.
struct Lease<'a> {
  cell: &'a RefCell<LocalTables>,
  key: LazyKey,
  table: Option<Box<dyn Any>>,
}

impl Drop for Lease<'_> {
  fn drop(&mut self) {
    if let Some(table) = self.table.take() {
      self.cell.borrow_mut().restore(self.key, table);
    }
  }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
