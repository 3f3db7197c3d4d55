//! rvslots - Per-thread automaton-instance storage for runtime verification.
//!
//! A runtime verification engine monitors properties by running one
//! automaton per property instance. Each thread keeps, for every registered
//! property class, a fixed-capacity table of automaton-instance records so
//! that event dispatch never contends with other threads.
//!
//! Two storage managers implement the [`Storage`] trait:
//!
//! - [`HostStorage`]: the host reports thread lifecycle; every live thread
//!   owns a table for every registered class before the class is handed
//!   out, so table access never fails.
//! - [`LazyStorage`]: no lifecycle hooks; each thread allocates its table on
//!   first access and frees it on exit. First access may fail under memory
//!   pressure.
//!
//! # Quick Start
//!
//! ```
//! use rvslots::Storage;
//! use rvslots::host::HostStorage;
//!
//! let storage: HostStorage<[u64; 2]> = HostStorage::new();
//! let _guard = storage.attach();
//!
//! let class = storage.register(16).unwrap();
//!
//! storage.with_table(&class, |table| {
//!   table.instances_mut()[0] = [1, 42];
//!   table.set_free_count(15);
//! }).unwrap();
//!
//! storage.flush(&class);
//! storage.unregister(class);
//! ```
//!
//! # Core Modules
//!
//! - [`host`]: Host-provisioned storage
//! - [`lazy`]: Lazily allocated storage
//! - [`table`]: Automaton-instance tables
//! - [`alloc`]: Table allocation seam
//! - [`error`]: Resource exhaustion errors
//! - [`consts`]: Compile-time limits
//!
//! [`HostStorage`]: host::HostStorage
//! [`LazyStorage`]: lazy::LazyStorage

mod loom;

pub mod alloc;
pub mod config;
pub mod consts;
pub mod error;
pub mod host;
pub mod lazy;
pub mod storage;
pub mod table;
pub mod thread;

pub use self::alloc::SystemAlloc;
pub use self::alloc::TableAlloc;
pub use self::error::Resource;
pub use self::error::ResourceExhausted;
pub use self::storage::Storage;
pub use self::table::Instance;
pub use self::table::InstanceTable;
pub use self::table::TableSpec;
pub use self::thread::ThreadKey;
