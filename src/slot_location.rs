use std::num::NonZeroU64;

fn shift_location(offset: u64, is_tombstone: bool) -> u64 {
    assert_eq!(offset << 1 >> 1, offset);
    if is_tombstone {
        offset << 1
    } else {
        (offset << 1) + 1
    }
}

fn unshift_location(location: u64) -> (u64, bool) {
    if location % 2 == 0 {
        (location >> 1, true)
    } else {
        (location >> 1, false)
    }
}

/// Where the latest record of an overflow slot lives in the
/// spill file, and whether the slot has since been
/// tombstoned. The low bit distinguishes the two states, so
/// a live record at offset 0 is still representable.
#[derive(Debug, Clone, Copy, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub(crate) struct SlotLocation(NonZeroU64);

impl SlotLocation {
    pub fn new(offset: u64) -> SlotLocation {
        SlotLocation(NonZeroU64::new(shift_location(offset, false)).unwrap())
    }

    pub fn tombstone(offset: u64) -> SlotLocation {
        // offset 0 would shift to the forbidden raw value of 0
        let raw = shift_location(offset, true).max(2);
        SlotLocation(NonZeroU64::new(raw).unwrap())
    }

    fn unshift(&self) -> (u64, bool) {
        unshift_location(self.0.get())
    }

    pub fn offset(&self) -> u64 {
        self.unshift().0
    }

    pub fn is_tombstone(&self) -> bool {
        self.unshift().1
    }

    pub fn to_tombstone(&self) -> SlotLocation {
        SlotLocation::tombstone(self.offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_and_tombstone_bits() {
        let live = SlotLocation::new(0);
        assert_eq!(live.offset(), 0);
        assert!(!live.is_tombstone());

        let live = SlotLocation::new(4096);
        assert_eq!(live.offset(), 4096);

        let dead = live.to_tombstone();
        assert!(dead.is_tombstone());
        assert_eq!(dead.offset(), 4096);
        assert_ne!(live, dead);
    }

    #[test]
    fn tombstone_at_zero_is_representable() {
        let dead = SlotLocation::new(0).to_tombstone();
        assert!(dead.is_tombstone());
    }
}
