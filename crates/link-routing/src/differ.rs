//! Link-Set Differ

use crate::LinkKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Minimal change between the active link set and the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDiff {
    pub tear_down: Vec<LinkKey>,
    pub stand_up: Vec<LinkKey>,
}

impl LinkDiff {
    pub fn is_empty(&self) -> bool {
        self.tear_down.is_empty() && self.stand_up.is_empty()
    }

    /// Bring `active` to the target set this diff was computed for.
    pub fn apply(&self, active: &mut BTreeSet<LinkKey>) {
        for key in &self.stand_up {
            active.insert(*key);
        }
        for key in &self.tear_down {
            active.remove(key);
        }
    }
}

/// `tear_down = active - next`, `stand_up = next - active`, both in key order.
pub fn diff(active: &BTreeSet<LinkKey>, next: &BTreeSet<LinkKey>) -> LinkDiff {
    LinkDiff {
        tear_down: active.difference(next).copied().collect(),
        stand_up: next.difference(active).copied().collect(),
    }
}
