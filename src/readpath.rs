use std::io;
use std::os::unix::fs::FileExt;

use fault_injection::{annotate, fallible};

use crate::{
    hash, overflow::closed_error, overflow::key_to_slot, zstd, OverflowStore, PageContainer,
    PageReader, PageReference, HEADER_LEN,
};

impl OverflowStore {
    /// Read the container stored in the slot named by
    /// `reference`'s persistent log key, decoding its pages
    /// with `reader`.
    ///
    /// Returns `Ok(None)` if the reference names no slot of
    /// this store that it was spilled into, and
    /// `PageContainer::EMPTY` if its slot has been tombstoned.
    pub fn get<P, R: PageReader<P> + ?Sized>(
        &self,
        reference: &PageReference,
        reader: &R,
    ) -> io::Result<Option<PageContainer<P>>> {
        let slot = if let Some(slot) = key_to_slot(reference.persistent_log_key()) {
            slot
        } else {
            return Ok(None);
        };

        let location = if let Some(location) = self.slots.get(&slot) {
            *location
        } else {
            return Ok(None);
        };

        if !self.is_owner(slot, reference) {
            log::trace!("{:?} names slot {} of another reference", reference, slot);
            return Ok(None);
        }

        if location.is_tombstone() {
            return Ok(Some(PageContainer::EMPTY));
        }

        let file = self.file.as_ref().ok_or_else(closed_error)?;

        let file_offset = location.offset();

        let mut header_buf = [0_u8; HEADER_LEN];
        fallible!(file.read_exact_at(&mut header_buf, file_offset));

        let crc_expected: [u8; 4] = header_buf[0..4].try_into().unwrap();
        let slot_buf: [u8; 8] = header_buf[4..12].try_into().unwrap();
        let len_buf: [u8; 8] = header_buf[12..20].try_into().unwrap();
        let raw_len_buf: [u8; 8] = header_buf[20..].try_into().unwrap();

        let object_offset = file_offset + HEADER_LEN as u64;

        let len = u64::from_le_bytes(len_buf);
        let raw_len = u64::from_le_bytes(raw_len_buf);

        if object_offset.saturating_add(len) > self.next_offset
            || raw_len > self.max_container_size as u64
        {
            return Err(annotate!(io::Error::new(
                io::ErrorKind::InvalidData,
                "corrupted length detected"
            )));
        }

        let mut object_buf = vec![0; len as usize];
        fallible!(file.read_exact_at(&mut object_buf, object_offset));

        let crc_actual = hash(slot_buf, len_buf, raw_len_buf, &object_buf);

        if crc_expected != crc_actual {
            log::warn!(
                "crc mismatch when reading slot {} at offset {} in spill file {:?}",
                slot,
                file_offset,
                self.path
            );
            return Err(annotate!(io::Error::new(
                io::ErrorKind::InvalidData,
                "crc mismatch"
            )));
        }

        let read_slot = u64::from_le_bytes(slot_buf);

        assert_eq!(slot, read_slot);

        let raw_object = if self.zstd_compression_level.is_some() {
            zstd::decompress(&object_buf, raw_len as usize)?
        } else {
            object_buf
        };

        if raw_object.len() as u64 != raw_len {
            return Err(annotate!(io::Error::new(
                io::ErrorKind::InvalidData,
                "decoded container length does not match its header"
            )));
        }

        log::trace!(
            "read slot {} of {} bytes at offset {} for {:?}",
            slot,
            raw_len,
            file_offset,
            reference
        );

        PageContainer::deserialize(&raw_object, reader).map(Some)
    }
}
