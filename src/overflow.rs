use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering::SeqCst};

use fault_injection::{annotate, fallible};
use fs2::FileExt;

use crate::{Config, Map, PageReference, SlotLocation, NULL_ID_LONG};

const SPILL_SUFFIX: &str = "spill";
const WARN: &str = "DO_NOT_PUT_YOUR_FILES_HERE";

/// Statistics about the spill file of an `OverflowStore`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OverflowStats {
    /// Slots whose latest record can be read back.
    pub live_slots: u64,
    /// Slots that have been tombstoned and read back as
    /// `PageContainer::EMPTY`.
    pub tombstoned_slots: u64,
    /// Records in the spill file that have been superseded by
    /// a later record for the same slot or by a tombstone.
    pub dead_records: u64,
    /// The current size of the spill file in bytes.
    pub file_size: u64,
    /// The number of bytes written since the store was opened,
    /// including record headers.
    pub bytes_written: u64,
}

/// The overflow tier of the intent log: a transaction-scoped
/// map from 64-bit slots to serialized page containers, backed
/// by a single append-only spill file.
///
/// Records are never read back after the store is closed, so
/// the file carries no recovery metadata and is deleted by
/// `close` or on drop.
pub struct OverflowStore {
    pub(crate) file: Option<File>,
    pub(crate) path: PathBuf,
    // maps from slot to the location of its latest record
    pub(crate) slots: Map<u64, SlotLocation>,
    // maps from slot to the identity of the reference spilled
    // into it
    pub(crate) owners: Map<u64, u64>,
    pub(crate) next_slot: u64,
    pub(crate) next_offset: u64,
    pub(crate) max_container_size: usize,
    pub(crate) fsync_each_spill: bool,
    pub(crate) zstd_compression_level: Option<i32>,
    pub(crate) bytes_written: u64,
    pub(crate) dead_records: u64,
}

impl fmt::Debug for OverflowStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverflowStore")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

impl Drop for OverflowStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!(
                "failed to remove spill file {:?} on drop: {:?}",
                self.path,
                e
            );
        }
    }
}

impl OverflowStore {
    /// Create a new, empty spill file under `config.path`.
    /// Every store gets its own file, so several stores may
    /// share a directory.
    pub fn open(config: &Config) -> io::Result<OverflowStore> {
        // allocates unique spill file names within this process
        static SPILL_COUNTER: AtomicU64 = AtomicU64::new(0);

        config.validate()?;

        fallible!(fs::create_dir_all(&config.path));
        let _ = File::create(config.path.join(WARN));

        let file_name = format!(
            "{:08x}-{:016x}.{}",
            std::process::id(),
            SPILL_COUNTER.fetch_add(1, SeqCst),
            SPILL_SUFFIX
        );
        let path = config.path.join(file_name);

        let mut options = OpenOptions::new();
        options.read(true).write(true).create_new(true);

        let file = fallible!(options.open(&path));
        fallible!(file.try_lock_exclusive());

        log::debug!("opened overflow store at {:?}", path);

        Ok(OverflowStore {
            file: Some(file),
            path,
            slots: Map::default(),
            owners: Map::default(),
            next_slot: 0,
            next_offset: 0,
            max_container_size: config.max_container_size,
            fsync_each_spill: config.fsync_each_spill,
            zstd_compression_level: config.zstd_compression_level,
            bytes_written: 0,
            dead_records: 0,
        })
    }

    /// Forget every slot and delete the spill file. Calling
    /// this on a closed store does nothing.
    pub fn close(&mut self) -> io::Result<()> {
        let file = if let Some(file) = self.file.take() {
            file
        } else {
            return Ok(());
        };

        let slots = self.slots.len();
        self.slots.clear();
        self.owners.clear();

        // dropping the handle releases the exclusive lock
        drop(file);
        fallible!(fs::remove_file(&self.path));

        log::debug!(
            "closed overflow store at {:?} holding {} slots",
            self.path,
            slots
        );

        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// The spill file backing this store, while it is open.
    pub fn path(&self) -> Option<&Path> {
        if self.is_closed() {
            None
        } else {
            Some(&self.path)
        }
    }

    pub fn stats(&self) -> OverflowStats {
        let tombstoned_slots = self.slots.values().filter(|l| l.is_tombstone()).count() as u64;

        OverflowStats {
            live_slots: self.slots.len() as u64 - tombstoned_slots,
            tombstoned_slots,
            dead_records: self.dead_records,
            file_size: self.next_offset,
            bytes_written: self.bytes_written,
        }
    }

    /// The slot named by `persistent_log_key`, if it holds a
    /// readable record.
    pub(crate) fn live_slot(&self, persistent_log_key: i64) -> Option<u64> {
        let slot = key_to_slot(persistent_log_key)?;
        match self.slots.get(&slot) {
            Some(location) if !location.is_tombstone() => Some(slot),
            _ => None,
        }
    }

    /// The slot named by `reference`'s persistent log key, if
    /// `reference` was spilled into it and it holds a readable
    /// record.
    pub(crate) fn owned_live_slot(&self, reference: &PageReference) -> Option<u64> {
        let slot = self.live_slot(reference.persistent_log_key())?;
        if self.is_owner(slot, reference) {
            Some(slot)
        } else {
            None
        }
    }

    pub(crate) fn is_owner(&self, slot: u64, reference: &PageReference) -> bool {
        self.owners.get(&slot) == Some(&reference.identity())
    }
}

pub(crate) fn key_to_slot(persistent_log_key: i64) -> Option<u64> {
    if persistent_log_key == NULL_ID_LONG {
        return None;
    }
    u64::try_from(persistent_log_key).ok()
}

pub(crate) fn slot_to_key(slot: u64) -> i64 {
    i64::try_from(slot).expect("overflow slot space exhausted")
}

pub(crate) fn closed_error() -> io::Error {
    annotate!(io::Error::new(
        io::ErrorKind::Other,
        "the overflow store has been closed"
    ))
}
