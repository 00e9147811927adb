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

//! Context switching for aarch64, AAPCS64.
//!
//! The snapshot holds the stack pointer, the link register, the frame
//! pointer, the general-purpose callee-saved set x19-x28, and the low 64
//! bits of v8-v15, which AAPCS64 makes callee-saved. x18 is the platform
//! register and is deliberately left alone.

use super::FiberMain;
use std::arch::naked_asm;

/// Callee-saved machine state for one suspended fiber.
///
/// Field order is load-bearing: the switch routine addresses this struct by
/// fixed byte offsets, so it is `repr(C)` and must stay in sync with the
/// assembly below.
#[repr(C)]
#[derive(Debug, Clone, Default)]
pub(crate) struct SavedContext {
    /// Stack pointer at the suspension point.
    sp: u64, // 0x00
    /// Link register; `ret` resumes through it.
    lr: u64, // 0x08
    fp: u64,  // 0x10
    x19: u64, // 0x18
    x20: u64, // 0x20
    x21: u64, // 0x28
    x22: u64, // 0x30
    x23: u64, // 0x38
    x24: u64, // 0x40
    x25: u64, // 0x48
    x26: u64, // 0x50
    x27: u64, // 0x58
    x28: u64, // 0x60
    d8: u64,  // 0x68
    d9: u64,  // 0x70
    d10: u64, // 0x78
    d11: u64, // 0x80
    d12: u64, // 0x88
    d13: u64, // 0x90
    d14: u64, // 0x98
    d15: u64, // 0xa0
}

impl SavedContext {
    /// Snapshot for a fiber that has not started yet.
    ///
    /// On aarch64 `ret` resumes through the link register, so the thunk
    /// address goes in `lr` and nothing is written to the stack. AAPCS64
    /// keeps the stack pointer 16-byte aligned at every public interface,
    /// which the aligned `stack_top` already satisfies.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the aligned top of a live, exclusively owned stack
    /// block of at least [`crate::stack::MIN_STACK_SIZE`] bytes.
    pub(crate) unsafe fn for_entry(stack_top: usize, main: FiberMain, record: *mut ()) -> Self {
        SavedContext {
            sp: stack_top as u64,
            lr: entry_thunk as usize as u64,
            x19: record as u64,
            x20: main as usize as u64,
            ..Default::default()
        }
    }
}

/// First code a fresh fiber executes, on its own stack.
///
/// Moves the record pointer from its callee-saved carrier into the first
/// argument register and calls the portable main routine. The main routine
/// never returns; `brk` traps if that contract is broken.
#[unsafe(naked)]
extern "C" fn entry_thunk() -> ! {
    naked_asm!(
        "mov x0, x19",
        "blr x20",
        "brk #0",
    );
}

/// Saves the calling fiber's state into `save` and resumes `restore`.
///
/// The call returns when some later switch restores `save`. For a snapshot
/// built by [`SavedContext::for_entry`], the final `ret` lands in
/// [`entry_thunk`] instead of a previous switch site.
///
/// # Safety
///
/// Both pointers must be valid and distinct. `restore` must hold either a
/// state captured by a previous `switch_context` or one seeded by
/// `for_entry`; resuming anything else jumps through garbage.
#[unsafe(naked)]
pub(crate) unsafe extern "C" fn switch_context(
    _save: *mut SavedContext,
    _restore: *const SavedContext,
) {
    // x0 = save, x1 = restore. x9 stages the stack pointer, which str/ldp
    // cannot address directly.
    naked_asm!(
        // Spill the callee-saved set into `save`.
        "mov x9, sp",
        "stp x9, lr, [x0, #0x00]",
        "stp fp, x19, [x0, #0x10]",
        "stp x20, x21, [x0, #0x20]",
        "stp x22, x23, [x0, #0x30]",
        "stp x24, x25, [x0, #0x40]",
        "stp x26, x27, [x0, #0x50]",
        "str x28, [x0, #0x60]",
        "stp d8, d9, [x0, #0x68]",
        "stp d10, d11, [x0, #0x78]",
        "stp d12, d13, [x0, #0x88]",
        "stp d14, d15, [x0, #0x98]",
        // Adopt the target's stack and callee-saved set from `restore`.
        "ldp x9, lr, [x1, #0x00]",
        "mov sp, x9",
        "ldp fp, x19, [x1, #0x10]",
        "ldp x20, x21, [x1, #0x20]",
        "ldp x22, x23, [x1, #0x30]",
        "ldp x24, x25, [x1, #0x40]",
        "ldp x26, x27, [x1, #0x50]",
        "ldr x28, [x1, #0x60]",
        "ldp d8, d9, [x1, #0x68]",
        "ldp d10, d11, [x1, #0x78]",
        "ldp d12, d13, [x1, #0x88]",
        "ldp d14, d15, [x1, #0x98]",
        // Resume the target: either its suspended switch site or the entry
        // thunk for a never-started fiber.
        "ret",
    );
}
