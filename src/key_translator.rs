use crate::Map;

/// A bijection between the 32-bit log keys that the intent
/// log assigns and the 64-bit slots of the overflow tier.
///
/// Every key takes part in at most one pair. Dropping a pair
/// from either side removes it from both.
#[derive(Debug, Default, Clone)]
pub struct KeyTranslator {
    forward: Map<i32, i64>,
    inverse: Map<i64, i32>,
}

impl KeyTranslator {
    pub fn with_capacity(capacity: usize) -> KeyTranslator {
        KeyTranslator {
            forward: Map::with_capacity_and_hasher(capacity, Default::default()),
            inverse: Map::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    /// Pair `log_key` with `persistent_log_key`. Recording a
    /// pair that already exists does nothing.
    ///
    /// # Panics
    ///
    /// Panics if either key is already paired with a different
    /// key. Pairs are only ever given up through `drop_by_*` or
    /// `clear`.
    pub fn record(&mut self, log_key: i32, persistent_log_key: i64) {
        if let Some(bound) = self.inverse.get(&persistent_log_key) {
            assert_eq!(
                *bound, log_key,
                "persistent log key {} is already paired with log key {}",
                persistent_log_key, bound
            );
        }

        if let Some(bound) = self.forward.get(&log_key) {
            assert_eq!(
                *bound, persistent_log_key,
                "log key {} is already paired with persistent log key {}",
                log_key, bound
            );
        }

        self.forward.insert(log_key, persistent_log_key);
        self.inverse.insert(persistent_log_key, log_key);
    }

    pub fn forward(&self, log_key: i32) -> Option<i64> {
        self.forward.get(&log_key).copied()
    }

    pub fn inverse(&self, persistent_log_key: i64) -> Option<i32> {
        self.inverse.get(&persistent_log_key).copied()
    }

    /// Remove the pair that `persistent_log_key` takes part in,
    /// returning its log key.
    pub fn drop_by_persistent_key(&mut self, persistent_log_key: i64) -> Option<i32> {
        let log_key = self.inverse.remove(&persistent_log_key)?;
        let removed = self.forward.remove(&log_key);
        assert_eq!(removed, Some(persistent_log_key));
        Some(log_key)
    }

    /// Remove the pair that `log_key` takes part in, returning
    /// its persistent log key.
    pub fn drop_by_log_key(&mut self, log_key: i32) -> Option<i64> {
        let persistent_log_key = self.forward.remove(&log_key)?;
        let removed = self.inverse.remove(&persistent_log_key);
        assert_eq!(removed, Some(log_key));
        Some(persistent_log_key)
    }

    pub fn clear(&mut self) {
        self.forward.clear();
        self.inverse.clear();
    }

    pub fn len(&self) -> usize {
        debug_assert_eq!(self.forward.len(), self.inverse.len());
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
