use std::io;
use std::os::unix::fs::FileExt;

use fault_injection::{annotate, fallible};
use serde::Serialize;

use crate::{
    hash, overflow::closed_error, overflow::slot_to_key, zstd, OverflowStore, PageContainer,
    PageReference, SlotLocation, HEADER_LEN,
};

impl OverflowStore {
    /// Serialize `container` into the spill file and stamp
    /// `reference` with the slot it was written to.
    ///
    /// If the reference already names a live slot of this
    /// store that it was spilled into, that slot is reused and
    /// its previous record becomes dead. Otherwise a new slot
    /// is allocated.
    pub fn put<P: Serialize>(
        &mut self,
        reference: &PageReference,
        container: &PageContainer<P>,
    ) -> io::Result<()> {
        if self.is_closed() {
            return Err(closed_error());
        }

        let raw_object = container.serialize()?;

        if raw_object.len() > self.max_container_size {
            return Err(annotate!(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "container for {:?} has a serialized size of {}, which is larger than the \
                     configured `max_container_size` of {}. If this is intentional, please \
                     increase the configured `max_container_size`.",
                    reference,
                    raw_object.len(),
                    self.max_container_size,
                )
            )));
        }

        let compressed_object = if let Some(level) = self.zstd_compression_level {
            Some(zstd::compress(&raw_object, level)?)
        } else {
            None
        };

        let output_object: &[u8] = compressed_object
            .as_ref()
            .map(AsRef::as_ref)
            .unwrap_or(&raw_object);

        let (slot, reused) = match self.owned_live_slot(reference) {
            Some(slot) => (slot, true),
            None => (self.next_slot, false),
        };

        let slot_buf: [u8; 8] = slot.to_le_bytes();
        let len_buf: [u8; 8] = (output_object.len() as u64).to_le_bytes();
        let raw_len_buf: [u8; 8] = (raw_object.len() as u64).to_le_bytes();

        let crc = hash(slot_buf, len_buf, raw_len_buf, output_object);

        let mut buf = Vec::with_capacity(HEADER_LEN + output_object.len());
        buf.extend_from_slice(&crc);
        buf.extend_from_slice(&slot_buf);
        buf.extend_from_slice(&len_buf);
        buf.extend_from_slice(&raw_len_buf);
        buf.extend_from_slice(output_object);

        let offset = self.next_offset;

        let file = self.file.as_ref().ok_or_else(closed_error)?;
        fallible!(file.write_all_at(&buf, offset));

        if self.fsync_each_spill {
            fallible!(file.sync_all());
        }

        log::trace!(
            "spilled {:?} into slot {} at offset {} with crc {:?}, reused slot: {}",
            reference,
            slot,
            offset,
            crc,
            reused
        );

        self.next_offset += buf.len() as u64;
        self.bytes_written += buf.len() as u64;

        if !reused {
            self.next_slot += 1;
        }

        if let Some(old) = self.slots.insert(slot, SlotLocation::new(offset)) {
            assert!(!old.is_tombstone());
            self.dead_records += 1;
        }
        self.owners.insert(slot, reference.identity());

        reference.set_persistent_log_key(slot_to_key(slot));

        Ok(())
    }

    /// Tombstone the slot named by `persistent_log_key`. Reading
    /// it back afterwards yields `PageContainer::EMPTY`. The
    /// space of its record is only given back when the store
    /// is closed. Returns `false` if the slot was not live.
    pub fn remove(&mut self, persistent_log_key: i64) -> bool {
        let slot = if let Some(slot) = self.live_slot(persistent_log_key) {
            slot
        } else {
            return false;
        };

        let location = self.slots[&slot];
        self.slots.insert(slot, location.to_tombstone());
        self.dead_records += 1;

        log::trace!("tombstoned slot {}", slot);

        true
    }
}
