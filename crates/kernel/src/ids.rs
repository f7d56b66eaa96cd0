use aoiworld_common::EntityId;
use parking_lot::Mutex;

/// Hands out entity ids from a single serialized counter.
///
/// Ids are strictly increasing and never reused. Once `u32::MAX` has been
/// issued the allocator is exhausted and returns `None`.
#[derive(Debug)]
pub struct IdAllocator {
    next: Mutex<Option<u32>>,
}

impl IdAllocator {
    /// Allocator whose first id is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            next: Mutex::new(Some(first)),
        }
    }

    pub fn allocate(&self) -> Option<EntityId> {
        let mut next = self.next.lock();
        let id = (*next)?;
        *next = id.checked_add(1);
        Some(EntityId(id))
    }

    /// The id the next `allocate` call would return.
    pub fn peek(&self) -> Option<EntityId> {
        (*self.next.lock()).map(EntityId)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
