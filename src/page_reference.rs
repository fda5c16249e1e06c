use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{
    atomic::{
        AtomicI32, AtomicI64, AtomicU64,
        Ordering::{Acquire, Release, SeqCst},
    },
    Arc,
};

use crate::{NULL_ID_INT, NULL_ID_LONG};

// allocates the identities that equality and hashing are based on
static NEXT_IDENTITY: AtomicU64 = AtomicU64::new(0);

#[derive(Debug)]
struct Slots {
    identity: u64,
    key: AtomicI64,
    log_key: AtomicI32,
    persistent_log_key: AtomicI64,
}

/// An identity handle for a page that a transaction has
/// modified.
///
/// Cloning a `PageReference` yields another handle to the
/// same reference: both observe the same slot identifiers, and
/// they compare equal. Two references created separately are
/// never equal, even if all of their slots hold the same
/// values. Hashing is consistent with this and never looks at
/// the slots, which the intent log rewrites while the
/// reference is being used as a map key.
#[derive(Clone)]
pub struct PageReference(Arc<Slots>);

impl Default for PageReference {
    fn default() -> PageReference {
        PageReference::new()
    }
}

impl PageReference {
    /// Create an unlogged reference with all slots set to
    /// their null sentinels.
    pub fn new() -> PageReference {
        PageReference(Arc::new(Slots {
            identity: NEXT_IDENTITY.fetch_add(1, SeqCst),
            key: AtomicI64::new(NULL_ID_LONG),
            log_key: AtomicI32::new(NULL_ID_INT),
            persistent_log_key: AtomicI64::new(NULL_ID_LONG),
        }))
    }

    /// The stable identity of this reference, shared by all of
    /// its clones.
    pub fn identity(&self) -> u64 {
        self.0.identity
    }

    /// The logical page key assigned by the engine, or
    /// `NULL_ID_LONG` while the page is staged in the log.
    pub fn key(&self) -> i64 {
        self.0.key.load(Acquire)
    }

    pub fn set_key(&self, key: i64) {
        self.0.key.store(key, Release);
    }

    /// The key assigned by the most recent `IntentLog::put` of
    /// this reference, or `NULL_ID_INT` if it was never logged.
    pub fn log_key(&self) -> i32 {
        self.0.log_key.load(Acquire)
    }

    pub fn set_log_key(&self, log_key: i32) {
        self.0.log_key.store(log_key, Release);
    }

    /// The overflow slot holding this reference's container,
    /// or `NULL_ID_LONG` while it is resident in memory.
    pub fn persistent_log_key(&self) -> i64 {
        self.0.persistent_log_key.load(Acquire)
    }

    pub fn set_persistent_log_key(&self, persistent_log_key: i64) {
        self.0
            .persistent_log_key
            .store(persistent_log_key, Release);
    }

    pub fn is_logged(&self) -> bool {
        self.log_key() != NULL_ID_INT
    }
}

impl PartialEq for PageReference {
    fn eq(&self, other: &PageReference) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for PageReference {}

impl Hash for PageReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.0.identity);
    }
}

impl fmt::Debug for PageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageReference")
            .field("identity", &self.identity())
            .field("key", &self.key())
            .field("log_key", &self.log_key())
            .field("persistent_log_key", &self.persistent_log_key())
            .finish()
    }
}
