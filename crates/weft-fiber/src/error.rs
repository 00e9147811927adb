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

//! Error type for fiber operations.

use thiserror::Error;

/// Errors reported by the fiber primitive.
///
/// Setup failures (`AlreadyConverted`, `OutOfResources`) are recoverable and
/// leave the thread's fiber state untouched. `InvalidHandle` marks contract
/// misuse that the registry's generation and status checks were able to
/// catch; misuse the checks cannot see (a dangling parameter pointer, stack
/// overflow past the guard word) remains undefined behavior and is called
/// out on the individual operations.
///
/// There is deliberately no variant for an entry procedure that returns:
/// by the time that is detectable the fiber's stack has no frame to unwind
/// into, so the trampoline aborts the process instead of reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FiberError {
    /// The calling thread has already been converted into a fiber context.
    #[error("thread is already converted into a fiber context")]
    AlreadyConverted,

    /// Stack allocation failed, the requested stack size is unusable, or
    /// the per-thread fiber registry is full.
    #[error("out of fiber resources: {0}")]
    OutOfResources(&'static str),

    /// The handle is stale, was never minted by this thread's registry, or
    /// names a fiber in a state the operation forbids.
    #[error("invalid fiber handle: {0}")]
    InvalidHandle(&'static str),
}
