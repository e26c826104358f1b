//! A generational arena for the sync-node tree.
//!
//! Nodes reference their parent and children by index, which would be a
//! plain `Vec<SyncNode>` except that nodes are removed as often as they are
//! added (deletes, move-aways) and a stale index must never be silently
//! reinterpreted as a different, later node that happens to reuse the slot.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Id {
    index: u32,
    generation: NonZeroU32,
}

enum Slot<T> {
    Occupied { value: T, generation: NonZeroU32 },
    /// `generation` is the generation the *next* occupant of this slot will
    /// be issued, one past whatever was last removed from it.
    Vacant {
        next_free: Option<u32>,
        generation: NonZeroU32,
    },
}

/// Stable-index storage with generation-tagged handles: removing an entry
/// and inserting a new one in its place yields an [`Id`] that compares
/// unequal to any handle issued before the removal.
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    len: usize,
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

const FIRST_GENERATION: NonZeroU32 = match NonZeroU32::new(1) {
    Some(n) => n,
    None => unreachable!(),
};

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, value: T) -> Id {
        self.len += 1;
        if let Some(index) = self.free_head {
            let slot = &mut self.slots[index as usize];
            let generation = match *slot {
                Slot::Vacant { generation, .. } => generation,
                Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
            };
            self.free_head = match *slot {
                Slot::Vacant { next_free, .. } => next_free,
                Slot::Occupied { .. } => unreachable!(),
            };
            *slot = Slot::Occupied { value, generation };
            return Id { index, generation };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot::Occupied {
            value,
            generation: FIRST_GENERATION,
        });
        Id {
            index,
            generation: FIRST_GENERATION,
        }
    }

    pub fn get(&self, id: Id) -> Option<&T> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { value, generation } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: Id) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { value, generation } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn contains(&self, id: Id) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: Id) -> Option<T> {
        let slot = self.slots.get_mut(id.index as usize)?;
        let matches = matches!(slot, Slot::Occupied { generation, .. } if *generation == id.generation);
        if !matches {
            return None;
        }
        let next_generation =
            NonZeroU32::new(id.generation.get().wrapping_add(1)).unwrap_or(FIRST_GENERATION);
        let old = std::mem::replace(
            slot,
            Slot::Vacant {
                next_free: self.free_head,
                generation: next_generation,
            },
        );
        self.free_head = Some(id.index);
        self.len -= 1;
        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => unreachable!(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Id, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| match slot {
            Slot::Occupied { value, generation } => Some((
                Id {
                    index: index as u32,
                    generation: *generation,
                },
                value,
            )),
            Slot::Vacant { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_get_round_trip() {
        let mut arena = Arena::new();
        let id = arena.insert("a");
        assert_eq!(arena.get(id), Some(&"a"));
    }

    #[test]
    fn removed_id_does_not_alias_reinserted_slot() {
        let mut arena = Arena::new();
        let first = arena.insert("a");
        arena.remove(first).unwrap();
        let second = arena.insert("b");
        assert_eq!(second.index, first.index);
        assert_ne!(second.generation, first.generation);
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&"b"));
    }

    #[test]
    fn len_tracks_live_entries() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        let _b = arena.insert(2);
        assert_eq!(arena.len(), 2);
        arena.remove(a);
        assert_eq!(arena.len(), 1);
    }
}
