//! Dense, zero-based ordering of siblings inside one container.
//!
//! Every operation works on the fully loaded sibling set and rewrites the
//! whole sequence, returning only the slots whose position actually changed.
//! Running any of them again on an already dense sequence yields no changes.
//!
//! Siblings that share a position keep the order they were loaded in, so the
//! loader decides the tie-break (insertion order).

use serde::{Deserialize, Serialize};

/// One sibling and its position in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot<I> {
    pub id: I,
    pub position: u32,
}

impl<I> Slot<I> {
    pub const fn new(id: I, position: u32) -> Self {
        Self { id, position }
    }
}

/// Position for a new item appended after every live sibling.
#[must_use]
pub fn append_position<I>(slots: &[Slot<I>]) -> u32 {
    to_position(slots.len())
}

/// Drops `target` and closes the gap it leaves behind.
pub fn remove_and_repack<I: Copy + PartialEq>(slots: &mut Vec<Slot<I>>, target: I) -> Vec<Slot<I>> {
    settle(slots);
    slots.retain(|slot| slot.id != target);
    repack(slots)
}

/// Moves `target` to `new_index` among its siblings. Indexes past either end
/// clamp to the first or last slot. An absent target only repacks.
pub fn reorder_within_container<I: Copy + PartialEq>(
    slots: &mut Vec<Slot<I>>,
    target: I,
    new_index: i64,
) -> Vec<Slot<I>> {
    settle(slots);
    let Some(current) = slots.iter().position(|slot| slot.id == target) else {
        return repack(slots);
    };
    let moving = slots.remove(current);
    let index = clamp_index(new_index, slots.len());
    slots.insert(index, moving);
    repack(slots)
}

/// Inserts `id` arriving from another container at `new_index` (clamped to
/// `[0, len]`). The inserted slot is always part of the returned changes.
pub fn insert_and_repack<I: Copy + PartialEq>(
    slots: &mut Vec<Slot<I>>,
    id: I,
    new_index: i64,
) -> Vec<Slot<I>> {
    settle(slots);
    slots.retain(|slot| slot.id != id);
    let index = clamp_index(new_index, slots.len());
    slots.insert(index, Slot::new(id, to_position(index)));
    let mut changed = repack(slots);
    if !changed.iter().any(|slot| slot.id == id) {
        changed.push(slots[index]);
    }
    changed
}

/// `true` when positions are exactly `0..n` with no duplicates.
#[must_use]
pub fn is_dense<I>(slots: &[Slot<I>]) -> bool {
    let mut seen = vec![false; slots.len()];
    for slot in slots {
        let Ok(position) = usize::try_from(slot.position) else {
            return false;
        };
        match seen.get_mut(position) {
            Some(flag) if !*flag => *flag = true,
            _ => return false,
        }
    }
    true
}

fn settle<I>(slots: &mut [Slot<I>]) {
    // stable: equal positions keep load order
    slots.sort_by_key(|slot| slot.position);
}

fn repack<I: Copy>(slots: &mut [Slot<I>]) -> Vec<Slot<I>> {
    let mut changed = Vec::new();
    for (index, slot) in slots.iter_mut().enumerate() {
        let position = to_position(index);
        if slot.position != position {
            slot.position = position;
            changed.push(*slot);
        }
    }
    changed
}

fn clamp_index(requested: i64, max: usize) -> usize {
    if requested <= 0 {
        return 0;
    }
    usize::try_from(requested).map_or(max, |index| index.min(max))
}

fn to_position(index: usize) -> u32 {
    u32::try_from(index).unwrap_or(u32::MAX)
}
