//! # intent_log
//!
//! The transaction intent log is the staging area a write
//! transaction uses for every page it modifies before it
//! commits. It keeps a bounded number of the most recently
//! logged pages in memory and spills the least recently
//! inserted ones into a transaction-scoped overflow file.
//!
//! Pages are addressed by [`PageReference`], an identity
//! handle shared with the engine's page graph. The log stamps
//! three slot identifiers on each reference as it moves
//! between tiers:
//!
//! * the log key, a 32-bit identity assigned by every `put`,
//! * the persistent log key, the overflow slot while spilled,
//! * the page key, which stays `NULL_ID_LONG` until commit.
//!
//! A bijective translation table between log keys and
//! persistent keys lets a spilled reference be found again
//! after its persistent key has been reset. Reading a spilled
//! reference rehydrates it into memory at the most-recent
//! position, which may in turn spill the oldest resident entry.
//!
//! Eviction is by insertion order, not by read order: a hit on
//! a resident entry does not change which entry is spilled
//! next. This makes the spill sequence a pure function of the
//! sequence of `put` calls.
//!
//! The overflow file lives only as long as the transaction.
//! It is removed on `close` or `truncate`, and nothing is ever
//! recovered from it.
//!
//! # Examples
//!
//! ```
//! use intent_log::{BincodeReader, Config, PageContainer, PageReference};
//!
//! let config = Config {
//!     path: "intent_log_doc".into(),
//!     capacity: 2,
//!     ..Default::default()
//! };
//!
//! let mut log = config.open::<Vec<u8>>().unwrap();
//!
//! let a = PageReference::new();
//! let b = PageReference::new();
//! let c = PageReference::new();
//!
//! log.put(&a, PageContainer::new(vec![1], vec![1, 1])).unwrap();
//! log.put(&b, PageContainer::new(vec![2], vec![2, 2])).unwrap();
//!
//! // `a` is the oldest entry and gets spilled to disk
//! log.put(&c, PageContainer::new(vec![3], vec![3, 3])).unwrap();
//! assert_eq!(log.used_entries(), 2);
//! assert_eq!(log.spilled_entries(), 1);
//!
//! // reading `a` rehydrates it and spills `b`
//! let container = log.get(&a, &BincodeReader).unwrap().unwrap();
//! assert_eq!(container.complete(), Some(&vec![1]));
//! assert!(!log.contains(&b));
//!
//! log.close().unwrap();
//! # std::fs::remove_dir_all("intent_log_doc").unwrap();
//! ```
use std::io;
use std::path::Path;

/// Hashes integer keys to themselves. Log keys, slots and
/// reference identities are already unique.
#[derive(Clone, Copy)]
pub(crate) struct IdentityHasher(u64);

impl Default for IdentityHasher {
    #[inline]
    fn default() -> IdentityHasher {
        IdentityHasher(0)
    }
}

impl std::hash::Hasher for IdentityHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }

    #[inline]
    fn write_u8(&mut self, n: u8) {
        self.0 = u64::from(n);
    }

    #[inline]
    fn write_u32(&mut self, n: u32) {
        self.0 = u64::from(n);
    }

    #[inline]
    fn write_i32(&mut self, n: i32) {
        self.0 = n as u32 as u64;
    }

    #[inline]
    fn write_u64(&mut self, n: u64) {
        self.0 = n;
    }

    #[inline]
    fn write_i64(&mut self, n: i64) {
        self.0 = n as u64;
    }

    #[inline]
    fn write(&mut self, _: &[u8]) {
        panic!("trying to use IdentityHasher with incorrect type");
    }
}

type Map<K, V> = std::collections::HashMap<K, V, std::hash::BuildHasherDefault<IdentityHasher>>;

mod config;
#[cfg(feature = "runtime_validation")]
mod debug_history;
mod intent_log;
mod key_translator;
mod overflow;
mod page_container;
mod page_reference;
mod readpath;
mod resident;
mod slot_location;
mod writepath;
mod zstd;

pub use config::Config;
pub use intent_log::IntentLog;
pub use key_translator::KeyTranslator;
pub use overflow::{OverflowStats, OverflowStore};
pub use page_container::{BincodeReader, PageContainer, PageReader};
pub use page_reference::PageReference;

use resident::Resident;
use slot_location::SlotLocation;

/// The reserved invalid 32-bit log key. A reference carrying
/// it has never been logged.
pub const NULL_ID_INT: i32 = i32::MIN;

/// The reserved invalid 64-bit key, used both for persistent
/// log keys of resident references and for page keys that have
/// not been assigned by a commit yet.
pub const NULL_ID_LONG: i64 = i64::MIN;

// crc (4) + slot (8) + stored length (8) + raw length (8)
const HEADER_LEN: usize = 28;

fn hash(slot_buf: [u8; 8], len_buf: [u8; 8], raw_len_buf: [u8; 8], body: &[u8]) -> [u8; 4] {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&slot_buf);
    hasher.update(&len_buf);
    hasher.update(&raw_len_buf);
    hasher.update(body);
    let crc: u32 = hasher.finalize();
    crc.to_le_bytes()
}

/// Open an intent log with default configuration, keeping its
/// spill files in the provided directory.
pub fn open<P, D: AsRef<Path>>(path: D) -> io::Result<IntentLog<P>> {
    let config = Config {
        path: path.as_ref().into(),
        ..Config::default()
    };

    config.open()
}
