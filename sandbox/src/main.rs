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

// weft sandbox
// Converts the main thread, spawns a few worker fibers, and round-robins
// them by explicit switches. Each worker signals its progress through the
// shared board its parameter points at, since the switch itself conveys
// nothing.

use anyhow::{anyhow, Result};
use weft_fiber::{
    convert_thread, current_parameter, destroy_fiber, fiber_stats, spawn_fiber, switch_to,
    FiberHandle, DEFAULT_STACK_SIZE,
};

const WORKERS: usize = 3;
const SLICES_PER_WORKER: u32 = 5;

/// Shared between the converted main thread and every worker fiber.
struct Board {
    main: Option<FiberHandle>,
    /// Work slices completed, per worker.
    progress: [u32; WORKERS],
    /// Index of the worker being switched into, set by main before each switch.
    active: usize,
}

fn worker(arg: *mut ()) {
    // The parameter carries the board; the accessor returns the same
    // pointer the fiber was created with.
    debug_assert_eq!(current_parameter(), Some(arg));
    let board = unsafe { &mut *(arg as *mut Board) };

    let me = board.active;
    let mut done = 0u32;
    loop {
        if done < SLICES_PER_WORKER {
            done += 1;
            board.progress[me] = done;
            log::info!("worker {me} finished slice {done}/{SLICES_PER_WORKER}");
        }
        switch_to(board.main.expect("main handle is set before any switch"))
            .expect("main context outlives every worker");
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut board = Box::new(Board {
        main: None,
        progress: [0; WORKERS],
        active: 0,
    });
    let arg = &mut *board as *mut Board as *mut ();

    let main = convert_thread(std::ptr::null_mut())
        .map_err(|e| anyhow!("converting the main thread: {e}"))?;
    board.main = Some(main);

    let mut fibers = Vec::with_capacity(WORKERS);
    for _ in 0..WORKERS {
        fibers.push(spawn_fiber(DEFAULT_STACK_SIZE, worker, arg)?);
    }

    // Round-robin until every worker has finished its slices.
    for _slice in 0..SLICES_PER_WORKER {
        for (index, fiber) in fibers.iter().enumerate() {
            board.active = index;
            switch_to(*fiber)?;
        }
    }

    for (index, fiber) in fibers.into_iter().enumerate() {
        log::info!(
            "worker {index} done ({} slices), retiring its fiber",
            board.progress[index]
        );
        destroy_fiber(fiber)?;
    }

    let stats = fiber_stats();
    log::info!(
        "fiber stats: {} created, {} destroyed, {} switches, {} live",
        stats.fibers_created,
        stats.fibers_destroyed,
        stats.context_switches,
        stats.live_records
    );
    Ok(())
}
