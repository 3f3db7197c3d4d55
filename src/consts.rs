// -----------------------------------------------------------------------------
// Host-Provisioned Storage
// -----------------------------------------------------------------------------

/// Maximum number of property classes registered at the same time with a
/// [`HostStorage`].
///
/// Every live thread carries one table pointer per slot, so this bounds the
/// per-thread footprint as well as the number of concurrent classes.
///
/// [`HostStorage`]: crate::host::HostStorage
pub const SLOT_MAX: usize = 16;

/// Number of pre-allocated entries in the live-thread set.
pub const CAP_LIVE_THREADS: usize = 64;

// -----------------------------------------------------------------------------
// Lazy Storage
// -----------------------------------------------------------------------------

/// Maximum number of thread-local keys live at the same time across every
/// [`LazyStorage`] in the process.
///
/// [`LazyStorage`]: crate::lazy::LazyStorage
pub const LAZY_KEY_MAX: usize = 1024;

/// Number of pre-allocated entries in each thread's local table cell.
pub const CAP_LOCAL_TABLES: usize = 8;

// -----------------------------------------------------------------------------
// Thread Identity
// -----------------------------------------------------------------------------

/// Largest identity handed out by [`ThreadKey::current`].
///
/// Keys above this bound remain available to hosts that supply their own
/// thread identities.
///
/// [`ThreadKey::current`]: crate::thread::ThreadKey::current
pub const MAX_STD_THREAD_KEY: u64 = (1 << 48) - 1;
