//! Display slot bookkeeping
//!
//! A slot is a view that shows one page at a time (a pager cell, a list row).
//! Every bind or release bumps the slot's generation; a decoded page is only
//! delivered if it carries the generation the slot has now. This replaces any
//! notion of holding weak references to views.

use crate::JobId;
use std::collections::HashMap;

/// Identifies a display slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SlotState {
    generation: u64,
    index: Option<u32>,
    job: Option<JobId>,
}

/// Current binding of every slot
#[derive(Debug, Default)]
pub struct SlotTable {
    slots: HashMap<SlotId, SlotState>,
}

impl SlotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `slot` to `index` and return the new generation
    ///
    /// The job of the previous binding, if any, is returned so it can be
    /// cancelled.
    pub fn bind(&mut self, slot: SlotId, index: u32) -> (u64, Option<JobId>) {
        let state = self.slots.entry(slot).or_default();
        state.generation += 1;
        state.index = Some(index);
        (state.generation, state.job.take())
    }

    /// Record the job decoding the current binding
    pub fn set_job(&mut self, slot: SlotId, generation: u64, job: JobId) {
        if let Some(state) = self.slots.get_mut(&slot) {
            if state.generation == generation {
                state.job = Some(job);
            }
        }
    }

    /// Unbind `slot`, invalidating anything in flight for it
    pub fn release(&mut self, slot: SlotId) -> Option<JobId> {
        let state = self.slots.get_mut(&slot)?;
        state.generation += 1;
        state.index = None;
        state.job.take()
    }

    /// Whether a result for `generation` is still wanted by `slot`
    pub fn is_current(&self, slot: SlotId, generation: u64) -> bool {
        self.slots
            .get(&slot)
            .map(|state| state.index.is_some() && state.generation == generation)
            .unwrap_or(false)
    }

    /// Mark a delivered binding as having no job in flight
    pub fn complete(&mut self, slot: SlotId, generation: u64) {
        if let Some(state) = self.slots.get_mut(&slot) {
            if state.generation == generation {
                state.job = None;
            }
        }
    }

    /// Page index `slot` is bound to
    pub fn index(&self, slot: SlotId) -> Option<u32> {
        self.slots.get(&slot).and_then(|state| state.index)
    }

    pub fn generation(&self, slot: SlotId) -> u64 {
        self.slots.get(&slot).map(|state| state.generation).unwrap_or(0)
    }

    /// Jobs of every binding, leaving all slots unbound
    pub fn release_all(&mut self) -> Vec<JobId> {
        self.slots
            .values_mut()
            .filter_map(|state| {
                state.generation += 1;
                state.index = None;
                state.job.take()
            })
            .collect()
    }
}
