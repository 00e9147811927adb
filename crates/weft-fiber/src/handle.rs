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

//! Fiber identity and lifecycle state types.

use std::fmt;

/// A unique identifier for a fiber on the thread that created it.
///
/// It combines a registry slot index with a generation count to solve the
/// "ABA problem". When a fiber is destroyed, its slot can be recycled for a
/// new fiber, but the generation is incremented. This ensures that old
/// `FiberHandle`s pointing to a recycled slot become invalid and cannot
/// accidentally resume or destroy the new fiber.
///
/// Handles are only meaningful on the OS thread whose registry minted them;
/// the primitive provides no cross-thread migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FiberHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl fmt::Display for FiberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fiber#{}v{}", self.index, self.generation)
    }
}

/// Lifecycle state of a fiber.
///
/// ```text
/// Unstarted ──switch into──▶ Running ──switch away──▶ Suspended
///                               ▲                          │
///                               └───────switch into────────┘
///
/// (any non-Running state) ──destroy──▶ Terminated
/// ```
///
/// At most one fiber per OS thread is `Running` at any instant. A
/// thread-converted fiber is born `Running`; a created fiber is born
/// `Unstarted` and enters its entry procedure the first time it is
/// switched into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberStatus {
    /// Created but never switched into; the entry procedure has not run.
    Unstarted,
    /// Currently executing on its owning thread.
    Running,
    /// Switched away; saved state holds the exact resumption point.
    Suspended,
    /// Destroyed; the slot generation has been bumped and the handle is stale.
    Terminated,
}

impl fmt::Display for FiberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FiberStatus::Unstarted => write!(f, "unstarted"),
            FiberStatus::Running => write!(f, "running"),
            FiberStatus::Suspended => write!(f, "suspended"),
            FiberStatus::Terminated => write!(f, "terminated"),
        }
    }
}
