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

//! Owned fiber stacks.
//!
//! A [`FiberStack`] is a heap block, 16-byte aligned, exclusively owned by
//! one fiber record and released when the record is destroyed. The block's
//! low end carries a guard word that the switch engine verifies whenever the
//! owning fiber is switched away from: the stack grows downward, so an
//! overflow tramples the guard first. There is no unmapped guard page; the
//! canary is the overflow detector this crate carries.

use crate::arch::STACK_ALIGN;
use crate::error::FiberError;
use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

/// Smallest accepted stack size, in bytes.
///
/// Below this there is no room for the entry thunk's initial frame plus any
/// useful work, and undersized stacks overflow before the first switch can
/// even check the guard word.
pub const MIN_STACK_SIZE: usize = 4 * 1024;

/// Default stack size for fibers whose workload is unknown, in bytes.
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Value planted at the low end of every owned stack.
const GUARD_WORD: u64 = 0xFEED_FACE_CAFE_BEEF;

/// An owned, aligned block of stack memory with a guard word at its base.
#[derive(Debug)]
pub(crate) struct FiberStack {
    base: NonNull<u8>,
    layout: Layout,
}

impl FiberStack {
    /// Allocates a stack of `size` bytes.
    ///
    /// Fails with [`FiberError::OutOfResources`] on a zero or undersized
    /// request and on allocator failure.
    pub(crate) fn allocate(size: usize) -> Result<Self, FiberError> {
        if size == 0 {
            return Err(FiberError::OutOfResources("stack size is zero"));
        }
        if size < MIN_STACK_SIZE {
            return Err(FiberError::OutOfResources(
                "stack size is below the supported minimum",
            ));
        }

        let layout = Layout::from_size_align(size, STACK_ALIGN)
            .map_err(|_| FiberError::OutOfResources("stack size overflows a layout"))?;

        // SAFETY: layout has non-zero size, checked above.
        let base = unsafe { alloc(layout) };
        let base = NonNull::new(base)
            .ok_or(FiberError::OutOfResources("stack allocation failed"))?;

        // SAFETY: the block is at least MIN_STACK_SIZE bytes and 16-byte
        // aligned, so the first 8 bytes are valid and aligned for a u64.
        unsafe { (base.as_ptr() as *mut u64).write(GUARD_WORD) };

        Ok(Self { base, layout })
    }

    /// Highest usable address of the stack, aligned down to the ABI's
    /// 16-byte requirement. This is where a fresh fiber's frame is seeded.
    pub(crate) fn top(&self) -> usize {
        let end = self.base.as_ptr() as usize + self.layout.size();
        end & !(STACK_ALIGN - 1)
    }

    /// True while the guard word at the stack base is untouched.
    ///
    /// A false return means some frame grew past the low end of the block;
    /// adjacent heap memory may already be trampled.
    pub(crate) fn guard_intact(&self) -> bool {
        // SAFETY: base points at a live allocation of >= 8 aligned bytes.
        unsafe { (self.base.as_ptr() as *const u64).read() == GUARD_WORD }
    }
}

impl Drop for FiberStack {
    fn drop(&mut self) {
        // SAFETY: base/layout are exactly what allocate() produced.
        unsafe { dealloc(self.base.as_ptr(), self.layout) };
    }
}
