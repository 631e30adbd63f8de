//! Slot reconciliation between persisted and current node definitions
//!
//! When a saved node is loaded against a node type whose slot list has
//! changed, persisted slots are matched to the current ones in two passes:
//!
//! 1. by name: the persisted slot (with its link) takes the current slot's place;
//! 2. by type, for current slots left unmatched: the current slot keeps its
//!    name and type and inherits the persisted slot's links.
//!
//! Persisted slots that matched nothing and whose name is not declared by the
//! current type are appended, so dynamically added slots survive. The result
//! carries a remap table `persisted index -> new index` for every slot that
//! moved, which the graph applies to its link table.

use std::collections::BTreeMap;

use crate::slot::{InputSlot, OutputSlot, SlotDescriptor};

/// Reconciled slot list plus the index remap for links
#[derive(Debug, Clone, PartialEq)]
pub struct SlotSync<S> {
    pub slots: Vec<S>,
    /// persisted index -> new index, only for slots whose index changed
    pub remap: BTreeMap<usize, usize>,
    /// persisted indices that were dropped
    pub dropped: Vec<usize>,
}

impl<S> SlotSync<S> {
    pub fn has_changes(&self) -> bool {
        !self.remap.is_empty() || !self.dropped.is_empty()
    }
}

/// Slots that can inherit the connection state of another slot
pub trait InheritLinks {
    fn inherit_links(&mut self, from: &Self);
}

impl InheritLinks for InputSlot {
    fn inherit_links(&mut self, from: &Self) {
        self.link = from.link.clone();
    }
}

impl InheritLinks for OutputSlot {
    fn inherit_links(&mut self, from: &Self) {
        self.links = from.links.clone();
    }
}

/// Reconcile `persisted` slots against the `current` slot definitions
pub fn sync_slots<S>(persisted: &[S], current: &[S]) -> SlotSync<S>
where
    S: SlotDescriptor + InheritLinks + Clone,
{
    let mut used = vec![false; persisted.len()];
    let mut slots: Vec<Option<S>> = vec![None; current.len()];
    let mut remap = BTreeMap::new();

    // pass 1: name
    for (dest, slot) in current.iter().enumerate() {
        let found = persisted
            .iter()
            .enumerate()
            .find(|(src, p)| !used[*src] && p.name() == slot.name());
        if let Some((src, p)) = found {
            used[src] = true;
            slots[dest] = Some(p.clone());
            if src != dest {
                remap.insert(src, dest);
            }
        }
    }

    // pass 2: type, for the current slots still open
    for (dest, slot) in current.iter().enumerate() {
        if slots[dest].is_some() {
            continue;
        }
        let found = persisted.iter().enumerate().find(|(src, p)| {
            !used[*src]
                && p.slot_type() == slot.slot_type()
                && !current.iter().any(|c| c.name() == p.name())
        });
        let mut fresh = slot.clone();
        if let Some((src, p)) = found {
            log::debug!(
                "Slot '{}' matched persisted slot '{}' by type {}",
                slot.name(),
                p.name(),
                p.slot_type()
            );
            used[src] = true;
            fresh.inherit_links(p);
            if src != dest {
                remap.insert(src, dest);
            }
        }
        slots[dest] = Some(fresh);
    }

    let mut slots: Vec<S> = slots.into_iter().flatten().collect();

    // pass 3: leftovers
    let mut dropped = Vec::new();
    for (src, p) in persisted.iter().enumerate() {
        if used[src] {
            continue;
        }
        if current.iter().any(|c| c.name() == p.name()) {
            log::debug!("Dropping duplicate persisted slot '{}' at {}", p.name(), src);
            dropped.push(src);
            continue;
        }
        let dest = slots.len();
        slots.push(p.clone());
        if src != dest {
            remap.insert(src, dest);
        }
    }

    SlotSync {
        slots,
        remap,
        dropped,
    }
}
