use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::heap::InstanceHeap;

/// What a delete removed. An empty `freed` list means the target was shared and
/// nothing changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Pre-delete indices of the removed instances, ascending.
    pub freed: Vec<u32>,
    /// Surviving field values that pointed into the removed set.
    pub nulled_references: usize,
    pub dropped_roots: usize,
    pub removed_containers: usize,
}

impl DeleteReport {
    pub fn is_noop(&self) -> bool {
        self.freed.is_empty()
    }
}

impl InstanceHeap {
    /// Instances that would disappear with `index`: everything reachable from it
    /// that nothing outside the reachable set keeps alive. Empty when `index`
    /// itself is shared.
    pub fn exclusive_set(&self, index: u32) -> Result<BTreeSet<u32>> {
        self.instance(index)?;
        let referrers = self.referrers();
        let reach = self.reachable([index], |_| true);

        let external = |node: u32| -> usize {
            referrers
                .get(&node)
                .map_or(0, |from| from.iter().filter(|r| !reach.contains(r)).count())
        };

        let seeds: Vec<u32> = reach
            .iter()
            .copied()
            .filter(|&n| n != index && (self.is_root(n) || external(n) > 0))
            .collect();
        let alive = self.reachable(seeds, |n| reach.contains(&n));

        if external(index) >= 2 || alive.contains(&index) {
            return Ok(BTreeSet::new());
        }
        Ok(reach.difference(&alive).copied().collect())
    }

    /// Removes the exclusive set of `index`, nulls every surviving reference into
    /// it and closes the gap so numbering stays dense.
    pub fn delete(&mut self, index: u32) -> Result<DeleteReport> {
        let doomed = self.exclusive_set(index)?;
        if doomed.is_empty() {
            log::debug!("heap: instance {index} is shared, delete skipped");
            return Ok(DeleteReport::default());
        }

        let len = self.len() as u32;
        let mut map = BTreeMap::new();
        let mut removed_below = 0u32;
        for i in 1..len {
            if doomed.contains(&i) {
                map.insert(i, 0);
                removed_below += 1;
            } else if removed_below > 0 {
                map.insert(i, i - removed_below);
            }
        }

        self.retain_slots(|i| !doomed.contains(&i));
        let shift = self.shift_references(&map);
        self.rebuild_hierarchy();

        let report = DeleteReport {
            freed: doomed.into_iter().collect(),
            nulled_references: shift.nulled,
            dropped_roots: shift.dropped_roots,
            removed_containers: shift.dropped_containers,
        };
        log::debug!(
            "heap: deleted {} instance(s) rooted at {index}, nulled {} reference(s)",
            report.freed.len(),
            report.nulled_references
        );
        Ok(report)
    }
}
