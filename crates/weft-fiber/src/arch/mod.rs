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

//! Architecture-specific context switching.
//!
//! Everything platform-coupled lives behind this module's narrow surface:
//!
//! - [`SavedContext`]: the callee-saved register snapshot for one fiber,
//!   meaningful only while the fiber is not running.
//! - [`SavedContext::for_entry`]: seeds a snapshot so that the first switch
//!   into it lands in an architecture-level thunk, which recovers the fiber
//!   record pointer from a callee-saved register and tail-calls the portable
//!   fiber main routine.
//! - [`switch_context`]: the save/restore engine. One implementation per
//!   target ISA/ABI; the rest of the crate is portable.
//!
//! Only the callee-saved register set is captured. Caller-saved registers
//! are dead across any call boundary by definition, and every switch is an
//! ordinary function call from the suspending fiber's point of view.

#[cfg(all(unix, target_arch = "x86_64"))]
mod x86_64;
#[cfg(all(unix, target_arch = "x86_64"))]
pub(crate) use x86_64::{switch_context, SavedContext};

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "aarch64")]
pub(crate) use aarch64::{switch_context, SavedContext};

#[cfg(not(any(all(unix, target_arch = "x86_64"), target_arch = "aarch64")))]
compile_error!(
    "weft-fiber implements context switching for System V x86_64 and AAPCS64 aarch64 only"
);

/// Portable entry routine invoked on a fresh fiber's own stack.
///
/// Receives the fiber record pointer that was seeded into the snapshot at
/// creation time. Must never return; the architecture thunks trap if it does.
pub(crate) type FiberMain = extern "C" fn(*mut ()) -> !;

/// Stack alignment both supported ABIs require at a call boundary.
pub(crate) const STACK_ALIGN: usize = 16;
