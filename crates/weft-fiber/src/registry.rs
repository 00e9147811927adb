// Copyright 2025 the weft developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-thread fiber storage and current-context tracking.
//!
//! Each OS thread owns an independent [`FiberRegistry`]: a bounded arena of
//! boxed fiber records addressed by generation-checked handles, plus the
//! marker for which record is presently running. Slots are recycled through
//! a free list; releasing a slot bumps its generation so stale handles fail
//! the lookup instead of aliasing whatever reuses the slot.
//!
//! Records are boxed so their addresses stay stable across arena growth.
//! The switch engine holds raw pointers into two records for the duration
//! of a transfer, after every registry borrow has been released.

use crate::arch::SavedContext;
use crate::error::FiberError;
use crate::fiber::EntryProc;
use crate::handle::{FiberHandle, FiberStatus};
use crate::stack::FiberStack;
use std::cell::RefCell;

/// Upper bound on live fibers per thread, converted context included.
pub(crate) const MAX_FIBERS_PER_THREAD: usize = 256;

/// Everything the primitive knows about one fiber.
pub(crate) struct FiberRecord {
    pub(crate) status: FiberStatus,
    /// Machine state; meaningful only while `status` is not `Running`.
    pub(crate) saved: SavedContext,
    /// Owned stack. `None` for a thread-converted record, which borrows the
    /// thread's native stack and owns nothing.
    pub(crate) stack: Option<FiberStack>,
    /// Entry procedure. `None` for a thread-converted record.
    pub(crate) entry: Option<EntryProc>,
    /// Caller-supplied data, immutable for the record's lifetime.
    pub(crate) parameter: *mut (),
}

struct Slot {
    generation: u32,
    record: Option<Box<FiberRecord>>,
}

/// Bounded, generation-checked arena of fiber records for one thread.
pub(crate) struct FiberRegistry {
    slots: Vec<Slot>,
    freed: Vec<u32>,
    current: Option<FiberHandle>,
    converted: Option<FiberHandle>,
}

thread_local! {
    pub(crate) static REGISTRY: RefCell<FiberRegistry> = RefCell::new(FiberRegistry::new());
}

impl FiberRegistry {
    fn new() -> Self {
        Self {
            slots: Vec::new(),
            freed: Vec::new(),
            current: None,
            converted: None,
        }
    }

    /// Stores a record, recycling a freed slot when one exists.
    ///
    /// Recycled slots keep the generation bump applied at release time, so
    /// the returned handle never collides with a handle minted for a
    /// previous occupant.
    pub(crate) fn insert(&mut self, record: Box<FiberRecord>) -> Result<FiberHandle, FiberError> {
        if let Some(index) = self.freed.pop() {
            let slot = &mut self.slots[index as usize];
            slot.record = Some(record);
            return Ok(FiberHandle {
                index,
                generation: slot.generation,
            });
        }

        if self.slots.len() >= MAX_FIBERS_PER_THREAD {
            return Err(FiberError::OutOfResources("fiber registry is full"));
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            record: Some(record),
        });
        Ok(FiberHandle {
            index,
            generation: 0,
        })
    }

    /// Generation-checked lookup.
    pub(crate) fn get(&self, handle: FiberHandle) -> Option<&FiberRecord> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_deref())
    }

    /// Generation-checked mutable lookup.
    pub(crate) fn get_mut(&mut self, handle: FiberHandle) -> Option<&mut FiberRecord> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.record.as_deref_mut())
    }

    /// Raw pointer to a record, for the switch engine.
    ///
    /// The pointee is a boxed record, so the address survives any arena
    /// growth; it is invalidated only by [`remove`](Self::remove).
    pub(crate) fn record_ptr(&mut self, handle: FiberHandle) -> Option<*mut FiberRecord> {
        self.get_mut(handle).map(|record| record as *mut FiberRecord)
    }

    /// Releases a slot, bumping its generation and returning the record.
    pub(crate) fn remove(&mut self, handle: FiberHandle) -> Option<Box<FiberRecord>> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?;
        let record = slot.record.take()?;
        slot.generation += 1;
        self.freed.push(handle.index);
        if self.current == Some(handle) {
            self.current = None;
        }
        if self.converted == Some(handle) {
            self.converted = None;
        }
        Some(record)
    }

    /// Handle of the record presently running on this thread.
    pub(crate) fn current(&self) -> Option<FiberHandle> {
        self.current
    }

    pub(crate) fn set_current(&mut self, handle: FiberHandle) {
        self.current = Some(handle);
    }

    /// Handle of this thread's conversion record, if the thread is converted.
    pub(crate) fn converted(&self) -> Option<FiberHandle> {
        self.converted
    }

    pub(crate) fn set_converted(&mut self, handle: FiberHandle) {
        self.converted = Some(handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    fn dummy_record() -> Box<FiberRecord> {
        Box::new(FiberRecord {
            status: FiberStatus::Unstarted,
            saved: SavedContext::default(),
            stack: None,
            entry: None,
            parameter: ptr::null_mut(),
        })
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut registry = FiberRegistry::new();
        let handle = registry.insert(dummy_record()).unwrap();
        assert!(registry.get(handle).is_some());
        assert_eq!(registry.get(handle).unwrap().status, FiberStatus::Unstarted);
    }

    #[test]
    fn removed_handles_go_stale() {
        let mut registry = FiberRegistry::new();
        let handle = registry.insert(dummy_record()).unwrap();
        assert!(registry.remove(handle).is_some());
        assert!(registry.get(handle).is_none());
        assert!(registry.remove(handle).is_none());
    }

    #[test]
    fn recycled_slot_gets_a_new_generation() {
        let mut registry = FiberRegistry::new();
        let first = registry.insert(dummy_record()).unwrap();
        registry.remove(first).unwrap();

        let second = registry.insert(dummy_record()).unwrap();
        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);

        // The stale handle must miss even though the slot is occupied again.
        assert!(registry.get(first).is_none());
        assert!(registry.get(second).is_some());
    }

    #[test]
    fn removal_clears_current_and_converted_markers() {
        let mut registry = FiberRegistry::new();
        let handle = registry.insert(dummy_record()).unwrap();
        registry.set_current(handle);
        registry.set_converted(handle);

        registry.remove(handle).unwrap();
        assert_eq!(registry.current(), None);
        assert_eq!(registry.converted(), None);
    }

    #[test]
    fn capacity_is_bounded() {
        let mut registry = FiberRegistry::new();
        for _ in 0..MAX_FIBERS_PER_THREAD {
            registry.insert(dummy_record()).unwrap();
        }
        let err = registry.insert(dummy_record()).unwrap_err();
        assert_eq!(err, FiberError::OutOfResources("fiber registry is full"));
    }
}
