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

//! # weft-fiber
//!
//! A cooperative fiber primitive: convert a thread into a switchable
//! execution context, create more contexts with dedicated stacks, and
//! transfer control between them synchronously without the OS scheduler.
//!
//! The primitive is purely mechanical. It decides nothing about which fiber
//! runs next, carries no timers and no I/O, and never preempts: a fiber
//! runs until it explicitly switches away. Scheduling policy, job
//! decomposition, and cross-thread work movement are all concerns of
//! whatever sits on top.
//!
//! ## Model
//!
//! Each OS thread owns an independent fiber group. [`convert_thread`] turns
//! the thread's native execution into the group's first context;
//! [`spawn_fiber`] adds contexts with their own stacks and entry
//! procedures; [`switch_to`] hands control to one of them and returns only
//! when something hands control back. Handles are index-plus-generation
//! values, so a destroyed fiber's handle is detected as stale instead of
//! silently reaching recycled memory.
//!
//! ```no_run
//! use weft_fiber::{convert_thread, current_parameter, spawn_fiber, switch_to, DEFAULT_STACK_SIZE};
//!
//! fn worker(_arg: *mut ()) {
//!     // Recover the argument, do a slice of work, hand control back, and
//!     // never return.
//!     let main = current_parameter().unwrap() as *mut weft_fiber::FiberHandle;
//!     loop {
//!         let _ = switch_to(unsafe { *main });
//!     }
//! }
//!
//! let mut main = convert_thread(std::ptr::null_mut()).unwrap();
//! let fiber = spawn_fiber(
//!     DEFAULT_STACK_SIZE,
//!     worker,
//!     &mut main as *mut _ as *mut (),
//! )
//! .unwrap();
//! switch_to(fiber).unwrap();
//! ```
//!
//! ## Safety boundary
//!
//! The API is safe to call; the unsafety lives where it belongs. Parameter
//! pointers are carried, never dereferenced, by the primitive, so an entry
//! procedure is responsible for whatever its pointer aims at. Stack
//! overflow detection is a guard word at the base of each owned stack,
//! checked at every switch away; overflowing between switches is caught
//! only after the fact. Destroying a suspended fiber discards its parked
//! frames without running destructors of locals on that stack. A panic
//! that unwinds out of an entry procedure crosses the non-unwinding entry
//! trampoline and aborts the process; there is no frame to unwind into.

#![warn(missing_docs)]

mod arch;
mod error;
mod fiber;
mod handle;
mod registry;
mod stack;
mod telemetry;

pub use error::FiberError;
pub use fiber::{
    convert_thread, current_fiber, current_parameter, destroy_fiber, fiber_status,
    is_thread_converted, spawn_fiber, switch_to, EntryProc,
};
pub use handle::{FiberHandle, FiberStatus};
pub use stack::{DEFAULT_STACK_SIZE, MIN_STACK_SIZE};
pub use telemetry::{fiber_stats, FiberStats};
