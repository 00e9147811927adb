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

//! Alternation and resumption-point fidelity under sustained switching.

use weft_fiber::{
    convert_thread, destroy_fiber, fiber_stats, spawn_fiber, switch_to, FiberHandle,
    DEFAULT_STACK_SIZE,
};

const ROUNDS: u32 = 1000;

/// Shared scoreboard reachable from every participant via its parameter.
struct PingPong {
    main: Option<FiberHandle>,
    player_a: Option<FiberHandle>,
    player_b: Option<FiberHandle>,
    a_total: u32,
    b_total: u32,
}

fn player_a(arg: *mut ()) {
    let shared = unsafe { &mut *(arg as *mut PingPong) };
    // Lives on this fiber's own stack; every resumption must find it intact.
    let mut local = 0u32;
    for _ in 0..ROUNDS {
        local += 1;
        switch_to(shared.player_b.unwrap()).unwrap();
    }
    shared.a_total = local;
    loop {
        switch_to(shared.main.unwrap()).unwrap();
    }
}

fn player_b(arg: *mut ()) {
    let shared = unsafe { &mut *(arg as *mut PingPong) };
    let mut local = 0u32;
    loop {
        local += 1;
        shared.b_total = local;
        switch_to(shared.player_a.unwrap()).unwrap();
    }
}

/// A and B alternate strictly for `ROUNDS` round trips; each side's local
/// counter must reach `ROUNDS` deterministically, proving every resumption
/// continued from the exact prior switch-away point.
#[test]
fn ping_pong_preserves_each_stack_across_thousand_round_trips() {
    let _ = env_logger::builder().is_test(true).try_init();
    std::thread::spawn(|| {
        let before = fiber_stats();

        let mut shared = Box::new(PingPong {
            main: None,
            player_a: None,
            player_b: None,
            a_total: 0,
            b_total: 0,
        });
        let arg = &mut *shared as *mut PingPong as *mut ();

        let main = convert_thread(std::ptr::null_mut()).unwrap();
        let a = spawn_fiber(DEFAULT_STACK_SIZE, player_a, arg).unwrap();
        let b = spawn_fiber(DEFAULT_STACK_SIZE, player_b, arg).unwrap();
        shared.main = Some(main);
        shared.player_a = Some(a);
        shared.player_b = Some(b);

        // A drives the whole exchange and hands control back when done.
        switch_to(a).unwrap();

        assert_eq!(shared.a_total, ROUNDS);
        assert_eq!(shared.b_total, ROUNDS);

        // Both players are parked in a switch; retire them.
        destroy_fiber(a).unwrap();
        destroy_fiber(b).unwrap();

        // 2 switches per round trip, plus the entries and the final return.
        // Other tests may run concurrently, so only a lower bound holds.
        let after = fiber_stats();
        assert!(after.context_switches - before.context_switches >= 2 * ROUNDS as u64);
    })
    .join()
    .expect("ping pong thread panicked");
}

/// Two OS threads each drive their own fiber group; the groups must not
/// interfere, and a handle minted on one thread is dead on the other.
#[test]
fn fiber_groups_are_independent_per_thread() {
    fn run_group(rounds: u32) -> (u32, FiberHandle) {
        struct Solo {
            main: Option<FiberHandle>,
            rounds: u32,
            counted: u32,
        }

        fn worker(arg: *mut ()) {
            let solo = unsafe { &mut *(arg as *mut Solo) };
            for i in 1..=solo.rounds {
                solo.counted = i;
                switch_to(solo.main.unwrap()).unwrap();
            }
            loop {
                switch_to(solo.main.unwrap()).unwrap();
            }
        }

        let mut solo = Box::new(Solo {
            main: None,
            rounds,
            counted: 0,
        });
        let arg = &mut *solo as *mut Solo as *mut ();

        let main = convert_thread(std::ptr::null_mut()).unwrap();
        let fiber = spawn_fiber(DEFAULT_STACK_SIZE, worker, arg).unwrap();
        solo.main = Some(main);

        for _ in 0..rounds {
            switch_to(fiber).unwrap();
        }
        assert_eq!(solo.counted, rounds);
        destroy_fiber(fiber).unwrap();
        (solo.counted, fiber)
    }

    let first = std::thread::spawn(|| run_group(300));
    let second = std::thread::spawn(|| run_group(700));
    let (count_a, foreign) = first.join().expect("first group panicked");
    let (count_b, _) = second.join().expect("second group panicked");
    assert_eq!(count_a, 300);
    assert_eq!(count_b, 700);

    // The foreign handle never existed in this fresh thread's registry.
    std::thread::spawn(move || {
        convert_thread(std::ptr::null_mut()).unwrap();
        assert!(switch_to(foreign).is_err());
    })
    .join()
    .expect("foreign handle thread panicked");
}
