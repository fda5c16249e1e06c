use std::collections::HashSet;

use crate::Map;

/// `DebugHistory` asserts that log keys are handed out at most
/// once between two calls to `IntentLog::clear`, and that a
/// reference is only ever rehydrated from the slot that it was
/// last spilled into.
#[derive(Default, Debug)]
pub struct DebugHistory {
    assigned: HashSet<i32>,
    // reference identity -> slot it was spilled into
    spilled: Map<u64, i64>,
}

impl DebugHistory {
    pub fn mark_assign(&mut self, log_key: i32) {
        let new_assignment = self.assigned.insert(log_key);
        assert!(new_assignment, "log key {} was handed out twice", log_key);
    }

    pub fn mark_spill(&mut self, identity: u64, persistent_log_key: i64) {
        let old = self.spilled.insert(identity, persistent_log_key);
        assert!(
            old.is_none(),
            "reference {} spilled into {} while still spilled in {:?}",
            identity,
            persistent_log_key,
            old
        );
    }

    pub fn mark_rehydrate(&mut self, identity: u64, persistent_log_key: i64) {
        let spilled_into = self.spilled.remove(&identity);
        assert_eq!(
            spilled_into,
            Some(persistent_log_key),
            "reference {} rehydrated from a slot it was not spilled into",
            identity
        );
    }

    pub fn mark_forget(&mut self, identity: u64) {
        self.spilled.remove(&identity);
    }

    pub fn reset_log_keys(&mut self) {
        self.assigned.clear();
    }

    pub fn reset_spills(&mut self) {
        self.spilled.clear();
    }
}
