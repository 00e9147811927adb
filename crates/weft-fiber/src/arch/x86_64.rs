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

//! Context switching for x86_64, System V AMD64 ABI.
//!
//! The snapshot holds the six callee-saved general-purpose registers plus
//! the stack pointer. All SSE registers are caller-saved under this ABI, so
//! nothing beyond the integer set needs to survive a switch.

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
    /// Stack pointer. Points at the saved return address, so restoring it
    /// and executing `ret` resumes the fiber.
    rsp: u64, // 0x00
    rbp: u64, // 0x08
    rbx: u64, // 0x10
    r12: u64, // 0x18
    r13: u64, // 0x20
    r14: u64, // 0x28
    r15: u64, // 0x30
}

impl SavedContext {
    /// Snapshot for a fiber that has not started yet.
    ///
    /// `stack_top` is the highest address of the fiber's stack, 16-byte
    /// aligned. The thunk address is planted where the switch routine's
    /// `ret` will pop it; the fiber record pointer and the portable main
    /// routine travel in callee-saved registers, which the switch restores
    /// before that `ret`.
    ///
    /// The ABI wants the stack pointer congruent to 8 (mod 16) at function
    /// entry, exactly as if the function had been reached by `call`. Planting
    /// the thunk address at `stack_top - 16` gives the thunk a stack pointer
    /// of `stack_top - 8` once `ret` consumes it, which satisfies that.
    ///
    /// # Safety
    ///
    /// `stack_top` must be the aligned top of a live, exclusively owned stack
    /// block of at least [`crate::stack::MIN_STACK_SIZE`] bytes.
    pub(crate) unsafe fn for_entry(stack_top: usize, main: FiberMain, record: *mut ()) -> Self {
        let initial_rsp = stack_top - 16;
        std::ptr::write(initial_rsp as *mut u64, entry_thunk as usize as u64);

        SavedContext {
            rsp: initial_rsp as u64,
            rbx: main as usize as u64,
            r15: record as u64,
            ..Default::default()
        }
    }
}

/// First code a fresh fiber executes, on its own stack.
///
/// Moves the record pointer from its callee-saved carrier into the first
/// argument register and calls the portable main routine. The `sub`
/// re-aligns the stack pointer to 16 ahead of the call, as the ABI requires.
/// The main routine never returns; `ud2` traps if that contract is broken.
#[unsafe(naked)]
extern "C" fn entry_thunk() -> ! {
    naked_asm!(
        "mov rdi, r15",
        "sub rsp, 8",
        "call rbx",
        "ud2",
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
    naked_asm!(
        // Spill the callee-saved set into `save` (rdi). rsp still points at
        // our own return address, which is the resumption point.
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        // Adopt the target's stack and callee-saved set from `restore` (rsi).
        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        // Pop the target's resumption address: either its own suspended
        // switch site or the entry thunk for a never-started fiber.
        "ret",
    );
}
