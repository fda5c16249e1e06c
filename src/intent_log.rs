use std::fmt;
use std::io;

use fault_injection::annotate;
use serde::Serialize;

#[cfg(feature = "runtime_validation")]
use crate::debug_history::DebugHistory;
// the number of entries that memory is reserved for up front,
// larger logs grow on demand
const PREALLOCATED_ENTRIES: usize = 4096;

use crate::{
    Config, KeyTranslator, OverflowStats, OverflowStore, PageContainer, PageReader,
    PageReference, Resident, NULL_ID_INT, NULL_ID_LONG,
};

/// The transaction intent log: every page a write transaction
/// modifies is logged here until commit.
///
/// Up to `Config::capacity` entries are kept in memory, in
/// insertion order. Each `put` beyond that spills the least
/// recently inserted entry into the `OverflowStore`, and
/// reading a spilled reference with `get` brings it back into
/// memory as the most recent entry.
///
/// The log is owned by a single transaction and all mutating
/// operations take `&mut self`.
pub struct IntentLog<P> {
    resident: Resident<P>,
    // maps from log key to the overflow slot of spilled references
    translator: KeyTranslator,
    overflow: OverflowStore,
    next_log_key: i32,
    config: Config,
    #[cfg(feature = "runtime_validation")]
    debug_history: DebugHistory,
}

impl<P> fmt::Debug for IntentLog<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntentLog")
            .field("capacity", &self.config.capacity)
            .field("used_entries", &self.used_entries())
            .field("spilled_entries", &self.spilled_entries())
            .field("next_log_key", &self.next_log_key)
            .field("overflow", &self.overflow)
            .finish()
    }
}

impl<P> fmt::Display for IntentLog<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntentLog {{ ... }}")
    }
}

impl<P> IntentLog<P> {
    /// Create an empty log on top of an already opened overflow
    /// store, keeping at most `capacity` entries in memory.
    pub fn new(overflow: OverflowStore, capacity: usize) -> io::Result<IntentLog<P>> {
        let config = Config {
            path: overflow
                .path
                .parent()
                .map(Into::into)
                .unwrap_or_else(|| Config::default().path),
            capacity,
            max_container_size: overflow.max_container_size,
            fsync_each_spill: overflow.fsync_each_spill,
            zstd_compression_level: overflow.zstd_compression_level,
        };

        config.validate()?;

        Ok(IntentLog::from_parts(config, overflow))
    }

    pub(crate) fn from_parts(config: Config, overflow: OverflowStore) -> IntentLog<P> {
        let preallocated = config.capacity.min(PREALLOCATED_ENTRIES);

        IntentLog {
            resident: Resident::with_capacity(preallocated + 1),
            translator: KeyTranslator::with_capacity(preallocated),
            overflow,
            next_log_key: 0,
            config,
            #[cfg(feature = "runtime_validation")]
            debug_history: DebugHistory::default(),
        }
    }

    /// Forget `reference`. A resident container is dropped, a
    /// spilled one has its slot tombstoned. The space of that
    /// slot is only reclaimed when the overflow store is
    /// truncated or closed.
    pub fn remove(&mut self, reference: &PageReference) {
        if self.resident.remove(reference).is_some() {
            log::trace!("removed resident {:?}", reference);
        } else {
            self.forget_spilled(reference);
        }
    }

    /// Drop every resident entry and restart log key
    /// assignment at 0. Spilled entries and the translation
    /// table are left alone, use `truncate` for those.
    pub fn clear(&mut self) {
        self.resident.clear();
        self.next_log_key = 0;

        #[cfg(feature = "runtime_validation")]
        self.debug_history.reset_log_keys();
    }

    /// Drop both tiers and delete the overflow store's spill
    /// file. Spilling is impossible afterwards until `reopen`
    /// installs a fresh overflow store.
    pub fn truncate(&mut self) -> io::Result<&mut IntentLog<P>> {
        log::debug!(
            "truncating intent log with {} resident and {} spilled entries",
            self.resident.len(),
            self.translator.len()
        );

        self.resident.clear();
        self.translator.clear();

        #[cfg(feature = "runtime_validation")]
        self.debug_history.reset_spills();

        self.overflow.close()?;

        Ok(self)
    }

    /// Truncate the log and open a fresh overflow store with
    /// the log's configuration, making it usable again.
    pub fn reopen(&mut self) -> io::Result<()> {
        self.truncate()?;
        self.overflow = OverflowStore::open(&self.config)?;
        log::debug!("reopened intent log at {:?}", self.overflow.path);
        Ok(())
    }

    /// Drop both tiers and close the overflow store. Calling
    /// this more than once is fine.
    pub fn close(&mut self) -> io::Result<()> {
        self.resident.clear();
        self.translator.clear();

        #[cfg(feature = "runtime_validation")]
        self.debug_history.reset_spills();

        self.overflow.close()
    }

    /// The number of resident entries. Spilled entries are not
    /// counted.
    pub fn used_entries(&self) -> usize {
        self.resident.len()
    }

    /// The number of entries that currently live in the
    /// overflow tier.
    pub fn spilled_entries(&self) -> usize {
        self.translator.len()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Whether `reference` is resident. Spilled references are
    /// not reported.
    pub fn contains(&self, reference: &PageReference) -> bool {
        self.resident.contains(reference)
    }

    /// Iterate over the resident entries from the least to the
    /// most recently inserted one.
    pub fn iter(&self) -> impl '_ + ExactSizeIterator<Item = (&PageReference, &PageContainer<P>)> {
        self.resident.iter()
    }

    /// A copy of the resident entries, least recently inserted
    /// first. Spilled entries are not part of the snapshot.
    pub fn snapshot_entries(&self) -> Vec<(PageReference, PageContainer<P>)>
    where
        P: Clone,
    {
        self.resident
            .iter()
            .map(|(reference, container)| (reference.clone(), container.clone()))
            .collect()
    }

    pub fn translator(&self) -> &KeyTranslator {
        &self.translator
    }

    pub fn overflow(&self) -> &OverflowStore {
        &self.overflow
    }

    pub fn overflow_stats(&self) -> OverflowStats {
        self.overflow.stats()
    }

    // drops the translator pair and tombstones the slot of a
    // reference that is currently spilled
    fn forget_spilled(&mut self, reference: &PageReference) {
        if self.overflow.owned_live_slot(reference).is_none() {
            return;
        }

        let persistent_log_key = reference.persistent_log_key();
        self.translator.drop_by_persistent_key(persistent_log_key);
        self.overflow.remove(persistent_log_key);

        #[cfg(feature = "runtime_validation")]
        self.debug_history.mark_forget(reference.identity());

        log::trace!("forgot spilled {:?}", reference);
    }

    fn assign_log_key(&mut self) -> io::Result<i32> {
        fn exhausted() -> io::Error {
            annotate!(io::Error::new(
                io::ErrorKind::Other,
                "log keys exhausted, the transaction logged too many pages"
            ))
        }

        let mut log_key = self.next_log_key;

        // entries spilled before a `clear` keep their log keys
        while self.translator.forward(log_key).is_some() {
            log_key = log_key.checked_add(1).ok_or_else(exhausted)?;
        }

        self.next_log_key = log_key.checked_add(1).ok_or_else(exhausted)?;

        #[cfg(feature = "runtime_validation")]
        self.debug_history.mark_assign(log_key);

        Ok(log_key)
    }
}

impl<P: Serialize> IntentLog<P> {
    /// Log `container` for `reference` as the most recently
    /// inserted entry, replacing anything logged for it so far.
    ///
    /// The reference gets a fresh log key and its page key and
    /// persistent log key are reset. If this takes the log over
    /// capacity, the least recently inserted entry is spilled
    /// before returning. Should spilling fail, the error is
    /// returned and the entry stays resident.
    pub fn put(&mut self, reference: &PageReference, container: PageContainer<P>) -> io::Result<()> {
        let log_key = self.assign_log_key()?;
        self.insert(reference, container, log_key)
    }

    fn insert(
        &mut self,
        reference: &PageReference,
        container: PageContainer<P>,
        log_key: i32,
    ) -> io::Result<()> {
        if self.resident.remove(reference).is_none() {
            self.forget_spilled(reference);
        }

        reference.set_key(NULL_ID_LONG);
        reference.set_log_key(log_key);
        reference.set_persistent_log_key(NULL_ID_LONG);

        self.resident.push_newest(reference.clone(), container);

        while self.resident.len() > self.config.capacity {
            self.spill_oldest()?;
        }

        Ok(())
    }

    /// Look up the container logged for `reference`.
    ///
    /// A resident hit does not change the eviction order. A
    /// spilled entry is read back from the overflow tier and
    /// logged again with `put`, which makes it the most recent
    /// entry and may spill another one. Returns `Ok(None)` if
    /// `reference` is not logged.
    pub fn get<R: PageReader<P> + ?Sized>(
        &mut self,
        reference: &PageReference,
        reader: &R,
    ) -> io::Result<Option<&PageContainer<P>>> {
        if self.load(reference, reader)? {
            Ok(self.resident.get(reference))
        } else {
            Ok(None)
        }
    }

    /// Like `get`, but hands out the container for
    /// modification.
    pub fn get_mut<R: PageReader<P> + ?Sized>(
        &mut self,
        reference: &PageReference,
        reader: &R,
    ) -> io::Result<Option<&mut PageContainer<P>>> {
        if self.load(reference, reader)? {
            Ok(self.resident.get_mut(reference))
        } else {
            Ok(None)
        }
    }

    // makes `reference` resident if it is spilled, returning
    // whether it is resident afterwards
    fn load<R: PageReader<P> + ?Sized>(
        &mut self,
        reference: &PageReference,
        reader: &R,
    ) -> io::Result<bool> {
        if self.resident.contains(reference) {
            return Ok(true);
        }

        let log_key = reference.log_key();
        let stamped = reference.persistent_log_key();

        let paired = if log_key == NULL_ID_INT {
            None
        } else {
            self.translator.forward(log_key)
        };

        // the slot stamped on the reference wins over a pair that
        // names some other slot
        let persistent_log_key = match paired {
            Some(paired) if stamped == NULL_ID_LONG => paired,
            _ => stamped,
        };

        if persistent_log_key == NULL_ID_LONG {
            return Ok(false);
        }

        reference.set_persistent_log_key(persistent_log_key);

        // the overflow store only hands out slots that this
        // reference was spilled into
        let container = match self.overflow.get(reference, reader) {
            Ok(Some(container)) if !container.is_empty() => container,
            Ok(_) => {
                reference.set_persistent_log_key(stamped);
                return Ok(false);
            }
            Err(e) => {
                reference.set_persistent_log_key(stamped);
                return Err(e);
            }
        };

        // nothing is given up before the entry can be logged again
        let new_log_key = self.assign_log_key()?;

        self.translator.drop_by_persistent_key(persistent_log_key);
        self.overflow.remove(persistent_log_key);
        reference.set_persistent_log_key(NULL_ID_LONG);

        #[cfg(feature = "runtime_validation")]
        self.debug_history
            .mark_rehydrate(reference.identity(), persistent_log_key);

        log::trace!(
            "rehydrating {:?} from persistent log key {}",
            reference,
            persistent_log_key
        );

        self.insert(reference, container, new_log_key)?;

        Ok(true)
    }

    fn spill_oldest(&mut self) -> io::Result<()> {
        let (victim, container) = if let Some(oldest) = self.resident.pop_oldest() {
            oldest
        } else {
            return Ok(());
        };

        assert_ne!(
            victim.log_key(),
            NULL_ID_INT,
            "evicting {:?} which was never logged",
            victim
        );

        if let Err(e) = self.overflow.put(&victim, &container) {
            log::error!("failed to spill {:?} to the overflow tier: {:?}", victim, e);
            self.resident.push_oldest(victim, container);
            return Err(e);
        }

        let persistent_log_key = victim.persistent_log_key();
        assert_ne!(persistent_log_key, NULL_ID_LONG);

        self.translator.record(victim.log_key(), persistent_log_key);

        #[cfg(feature = "runtime_validation")]
        self.debug_history
            .mark_spill(victim.identity(), persistent_log_key);

        log::trace!("spilled {:?}", victim);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BincodeReader;

    #[test]
    fn exhausted_log_keys_leave_spilled_entries_in_place() {
        let config = Config {
            path: "testing_data_directories/unit_log_key_exhaustion".into(),
            capacity: 1,
            ..Default::default()
        };
        let _ = std::fs::remove_dir_all(&config.path);

        let mut log = config.open::<Vec<u8>>().unwrap();

        let a = PageReference::new();
        let b = PageReference::new();
        log.put(&a, PageContainer::new(vec![1], vec![1, 1])).unwrap();
        log.put(&b, PageContainer::new(vec![2], vec![2, 2])).unwrap();

        let slot = a.persistent_log_key();
        assert_eq!(log.translator.forward(a.log_key()), Some(slot));

        log.next_log_key = i32::MAX;
        assert!(log.get(&a, &BincodeReader).is_err());
        assert!(log.put(&PageReference::new(), PageContainer::EMPTY).is_err());

        // a is still spilled and readable
        assert!(!log.contains(&a));
        assert_eq!(a.persistent_log_key(), slot);
        assert_eq!(log.translator.forward(a.log_key()), Some(slot));
        assert_eq!(log.overflow.owned_live_slot(&a), Some(slot as u64));

        log.next_log_key = 2;
        let got = log.get(&a, &BincodeReader).unwrap().cloned();
        assert_eq!(got, Some(PageContainer::new(vec![1], vec![1, 1])));

        log.close().unwrap();
        std::fs::remove_dir_all(&config.path).unwrap();
    }
}
