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

//! The fiber operations: convert, create, switch, destroy, introspect.
//!
//! All operations act on the calling thread's own fiber group. A handle is
//! only meaningful on the thread that minted it: registries are
//! thread-local, so on any other thread the lookup either misses and
//! reports `InvalidHandle`, or resolves to an unrelated local fiber that
//! happens to share index and generation. Handles must not cross threads;
//! the primitive provides no cross-thread migration.
//!
//! The switch itself is a synchronous hand-off: [`switch_to`] does not
//! return until some later switch names the caller as its target. No value
//! describes why control came back; consumers that need a resumption reason
//! signal it through memory reachable from the parameter pointer.

use crate::arch::{switch_context, SavedContext};
use crate::error::FiberError;
use crate::handle::{FiberHandle, FiberStatus};
use crate::registry::{FiberRecord, REGISTRY};
use crate::stack::FiberStack;
use crate::telemetry::{CONTEXT_SWITCHES, FIBERS_CREATED, FIBERS_DESTROYED, THREADS_CONVERTED};
use std::ptr::addr_of_mut;
use std::sync::atomic::Ordering;

/// Entry procedure of a created fiber.
///
/// Invoked with the fiber's parameter the first time the fiber is switched
/// into. It must never return: its frame sits at the bottom of the fiber's
/// stack and there is no continuation behind it. A procedure that finishes
/// its work parks itself by switching away and lets its owner destroy the
/// fiber; one that returns instead takes the whole process down (the
/// trampoline logs and aborts, since by then there is no valid frame left
/// to report an error into).
pub type EntryProc = fn(*mut ());

/// Converts the calling thread into a fiber context.
///
/// The returned handle represents the thread's own native stack; the record
/// owns no memory and is `Running` from the moment of conversion. This must
/// happen before any [`switch_to`] on the thread, and at most once:
/// a second call fails with [`FiberError::AlreadyConverted`] and leaves the
/// existing context untouched.
///
/// `parameter` is retrievable via [`current_parameter`] while the converted
/// context is running, exactly as for created fibers.
pub fn convert_thread(parameter: *mut ()) -> Result<FiberHandle, FiberError> {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        if registry.converted().is_some() || registry.current().is_some() {
            return Err(FiberError::AlreadyConverted);
        }

        let record = Box::new(FiberRecord {
            status: FiberStatus::Running,
            saved: SavedContext::default(),
            stack: None,
            entry: None,
            parameter,
        });
        let handle = registry.insert(record)?;
        registry.set_current(handle);
        registry.set_converted(handle);

        THREADS_CONVERTED.fetch_add(1, Ordering::Relaxed);
        log::debug!("converted thread into {handle}");
        Ok(handle)
    })
}

/// Creates a fiber with a dedicated stack of `stack_size` bytes.
///
/// The fiber is returned `Unstarted`; `entry` runs with `parameter` on the
/// new stack the first time the fiber is switched into, never before. A
/// zero or undersized `stack_size`, allocation failure, and a full registry
/// all fail with [`FiberError::OutOfResources`].
///
/// The primitive never dereferences `parameter`; it hands the pointer back
/// to `entry` and to [`current_parameter`] callers. Whatever it points at
/// must stay valid for as long as the fiber can run.
pub fn spawn_fiber(
    stack_size: usize,
    entry: EntryProc,
    parameter: *mut (),
) -> Result<FiberHandle, FiberError> {
    let stack = FiberStack::allocate(stack_size)?;
    let stack_top = stack.top();

    let mut record = Box::new(FiberRecord {
        status: FiberStatus::Unstarted,
        saved: SavedContext::default(),
        stack: Some(stack),
        entry: Some(entry),
        parameter,
    });

    // SAFETY: stack_top is the aligned top of the stack owned by this very
    // record, live until the record is destroyed; the record pointer is the
    // box's stable heap address and is only read back inside fiber_main
    // while the record is still registered.
    let record_ptr = addr_of_mut!(*record) as *mut ();
    record.saved = unsafe { SavedContext::for_entry(stack_top, fiber_main, record_ptr) };

    REGISTRY.with(|registry| {
        let handle = registry.borrow_mut().insert(record)?;
        FIBERS_CREATED.fetch_add(1, Ordering::Relaxed);
        log::debug!("created {handle} with a {stack_size} byte stack");
        Ok(handle)
    })
}

/// Suspends the calling context and resumes `target`.
///
/// `target` must be `Unstarted` or `Suspended`, must belong to this
/// thread's fiber group, and must not be the caller itself (a self-switch
/// is rejected with [`FiberError::InvalidHandle`], not treated as a no-op).
/// An `Unstarted` target begins at its entry procedure on its own stack; a
/// `Suspended` target resumes at the exact point of its last switch-away
/// with all locals on its stack intact.
///
/// On success the call blocks, in the cooperative sense, until some later
/// switch names the caller as its target; only then does it return `Ok`.
/// Errors are reported before any state is touched, so a failed switch
/// leaves the calling context running and unchanged.
pub fn switch_to(target: FiberHandle) -> Result<(), FiberError> {
    let (save, restore) = REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();

        let current = registry
            .current()
            .ok_or(FiberError::InvalidHandle("calling thread is not converted"))?;
        if current == target {
            return Err(FiberError::InvalidHandle("target is the calling fiber"));
        }
        match registry.get(target) {
            None => {
                return Err(FiberError::InvalidHandle(
                    "stale, foreign, or destroyed handle",
                ))
            }
            Some(record) => match record.status {
                FiberStatus::Unstarted | FiberStatus::Suspended => {}
                FiberStatus::Running => {
                    return Err(FiberError::InvalidHandle("target is already running"))
                }
                FiberStatus::Terminated => {
                    return Err(FiberError::InvalidHandle("target is terminated"))
                }
            },
        }

        {
            let caller = registry
                .get_mut(current)
                .ok_or(FiberError::InvalidHandle("current fiber record is missing"))?;
            if let Some(stack) = &caller.stack {
                if !stack.guard_intact() {
                    // The overflow has already trampled memory below the
                    // stack; there is no state safe to continue from.
                    log::error!("stack guard of {current} is corrupt; aborting");
                    std::process::abort();
                }
            }
            caller.status = FiberStatus::Suspended;
        }
        if let Some(record) = registry.get_mut(target) {
            record.status = FiberStatus::Running;
        }

        let save = registry
            .record_ptr(current)
            .ok_or(FiberError::InvalidHandle("current fiber record is missing"))?;
        let restore = registry.record_ptr(target).ok_or(FiberError::InvalidHandle(
            "stale, foreign, or destroyed handle",
        ))?;

        registry.set_current(target);
        CONTEXT_SWITCHES.fetch_add(1, Ordering::Relaxed);
        log::trace!("switch {current} -> {target}");
        Ok((save, restore))
    })?;

    // SAFETY: both pointers are boxed records the registry keeps alive; the
    // registry borrow is released, so nothing aliases them while the switch
    // engine runs. The target's saved state was produced either by
    // for_entry at creation or by a previous switch_context, per the status
    // check above. When this call returns, some other fiber has named the
    // caller as its switch target and restored this exact frame.
    unsafe {
        switch_context(
            addr_of_mut!((*save).saved),
            addr_of_mut!((*restore).saved) as *const SavedContext,
        );
    }
    Ok(())
}

/// Destroys a fiber, releasing its slot and owned stack.
///
/// The target must not be `Running`: destroying the caller's own context
/// would reclaim the stack it is executing on. The thread's conversion
/// record can be destroyed like any other suspended fiber, necessarily
/// from inside another fiber; doing so clears the conversion marker and
/// abandons the thread's native stack permanently, so the remaining fibers
/// keep the thread for themselves.
///
/// A `Suspended` fiber may be destroyed; its parked frames are discarded
/// without unwinding, so destructors of locals living on that stack never
/// run. Any handle kept around after destruction goes stale and is
/// reported as [`FiberError::InvalidHandle`] by every later operation.
pub fn destroy_fiber(handle: FiberHandle) -> Result<(), FiberError> {
    REGISTRY.with(|registry| {
        let mut registry = registry.borrow_mut();
        match registry.get(handle) {
            None => {
                return Err(FiberError::InvalidHandle(
                    "stale, foreign, or destroyed handle",
                ))
            }
            Some(record) if record.status == FiberStatus::Running => {
                return Err(FiberError::InvalidHandle("target is currently running"))
            }
            Some(_) => {}
        }

        let mut record = registry.remove(handle).ok_or(FiberError::InvalidHandle(
            "stale, foreign, or destroyed handle",
        ))?;
        let previous = record.status;
        record.status = FiberStatus::Terminated;

        FIBERS_DESTROYED.fetch_add(1, Ordering::Relaxed);
        log::debug!("destroyed {handle} (was {previous})");
        Ok(())
        // record drops here, releasing the owned stack if any
    })
}

/// Parameter bound to the currently running context.
///
/// Returns `None` when the calling thread has not been converted. Entry
/// procedures use this to recover the argument they were started with,
/// since the switch operation itself passes nothing on resume.
pub fn current_parameter() -> Option<*mut ()> {
    REGISTRY.with(|registry| {
        let registry = registry.borrow();
        let current = registry.current()?;
        registry.get(current).map(|record| record.parameter)
    })
}

/// Handle of the currently running context.
///
/// Returns `None` when the calling thread has not been converted. Consumers
/// store this before switching away so a peer can switch back to them.
pub fn current_fiber() -> Option<FiberHandle> {
    REGISTRY.with(|registry| registry.borrow().current())
}

/// True once [`convert_thread`] has succeeded on the calling thread and the
/// conversion record has not been destroyed since.
pub fn is_thread_converted() -> bool {
    REGISTRY.with(|registry| registry.borrow().converted().is_some())
}

/// Lifecycle status of a fiber, or `None` for a stale or foreign handle.
pub fn fiber_status(handle: FiberHandle) -> Option<FiberStatus> {
    REGISTRY.with(|registry| registry.borrow().get(handle).map(|record| record.status))
}

/// Portable landing point for a fresh fiber, invoked by the architecture
/// entry thunk on the fiber's own stack.
extern "C" fn fiber_main(record: *mut ()) -> ! {
    let record = record as *const FiberRecord;
    // SAFETY: the pointer was seeded by spawn_fiber from the boxed record
    // the registry owns, and an Unstarted fiber can only be reached while
    // its record is still registered (the generation check rejects switches
    // to destroyed fibers).
    let (entry, parameter) = unsafe { ((*record).entry, (*record).parameter) };

    if let Some(entry) = entry {
        entry(parameter);
    }

    // No continuation exists behind an entry procedure; its frame is the
    // bottom of this stack. Unrecoverable by contract.
    log::error!("fiber entry procedure returned; aborting");
    std::process::abort();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    // Every test drives the registry from a dedicated thread so that
    // thread-local fiber state never leaks between tests, whatever the
    // harness threading mode.
    fn on_fresh_thread<T: Send + 'static>(f: fn() -> T) -> T {
        thread::spawn(f).join().expect("test thread panicked")
    }

    #[test]
    fn convert_twice_fails_and_preserves_the_context() {
        on_fresh_thread(|| {
            let mut value = 11u32;
            let handle = convert_thread(&mut value as *mut u32 as *mut ()).unwrap();

            assert_eq!(convert_thread(std::ptr::null_mut()), Err(FiberError::AlreadyConverted));

            // The original context is intact and still current.
            assert_eq!(current_fiber(), Some(handle));
            let parameter = current_parameter().unwrap() as *mut u32;
            assert_eq!(unsafe { *parameter }, 11);
        });
    }

    #[test]
    fn unconverted_thread_has_no_current_context() {
        on_fresh_thread(|| {
            assert_eq!(current_fiber(), None);
            assert_eq!(current_parameter(), None);
            assert!(!is_thread_converted());
        });
    }

    #[test]
    fn self_switch_is_rejected() {
        on_fresh_thread(|| {
            let me = convert_thread(std::ptr::null_mut()).unwrap();
            assert_eq!(
                switch_to(me),
                Err(FiberError::InvalidHandle("target is the calling fiber"))
            );
            // Still running, still current.
            assert_eq!(fiber_status(me), Some(FiberStatus::Running));
            assert_eq!(current_fiber(), Some(me));
        });
    }

    #[test]
    fn switch_requires_conversion() {
        on_fresh_thread(|| {
            fn never_runs(_: *mut ()) {}
            let fiber =
                spawn_fiber(crate::stack::DEFAULT_STACK_SIZE, never_runs, std::ptr::null_mut())
                    .unwrap();
            assert_eq!(
                switch_to(fiber),
                Err(FiberError::InvalidHandle("calling thread is not converted"))
            );
            destroy_fiber(fiber).unwrap();
        });
    }

    #[test]
    fn destroying_the_running_context_is_rejected() {
        on_fresh_thread(|| {
            let me = convert_thread(std::ptr::null_mut()).unwrap();
            assert_eq!(
                destroy_fiber(me),
                Err(FiberError::InvalidHandle("target is currently running"))
            );
            assert!(is_thread_converted());
        });
    }

    #[test]
    fn create_then_destroy_never_runs_the_entry() {
        on_fresh_thread(|| {
            static TOUCHED: std::sync::atomic::AtomicBool =
                std::sync::atomic::AtomicBool::new(false);
            fn entry(_: *mut ()) {
                TOUCHED.store(true, Ordering::Relaxed);
            }

            let fiber =
                spawn_fiber(crate::stack::DEFAULT_STACK_SIZE, entry, std::ptr::null_mut()).unwrap();
            assert_eq!(fiber_status(fiber), Some(FiberStatus::Unstarted));
            destroy_fiber(fiber).unwrap();

            assert!(!TOUCHED.load(Ordering::Relaxed));
            assert_eq!(fiber_status(fiber), None);
        });
    }

    #[test]
    fn spawn_rejects_unusable_stack_sizes() {
        on_fresh_thread(|| {
            fn entry(_: *mut ()) {}
            assert!(matches!(
                spawn_fiber(0, entry, std::ptr::null_mut()),
                Err(FiberError::OutOfResources(_))
            ));
            assert!(matches!(
                spawn_fiber(128, entry, std::ptr::null_mut()),
                Err(FiberError::OutOfResources(_))
            ));
        });
    }
}
