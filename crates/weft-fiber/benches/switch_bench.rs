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

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use weft_fiber::{
    convert_thread, current_parameter, spawn_fiber, switch_to, FiberHandle, DEFAULT_STACK_SIZE,
};

fn echo(_: *mut ()) {
    // Bounce straight back to whoever woke us, forever.
    let main = unsafe { *(current_parameter().unwrap() as *const FiberHandle) };
    loop {
        switch_to(main).unwrap();
    }
}

fn bench_switching(c: &mut Criterion) {
    let mut main_handle = Box::new(convert_thread(std::ptr::null_mut()).unwrap());
    let partner = spawn_fiber(
        DEFAULT_STACK_SIZE,
        echo,
        &mut *main_handle as *mut FiberHandle as *mut (),
    )
    .unwrap();

    let mut group = c.benchmark_group("Context Switching");

    group.bench_function("round trip (switch there and back)", |b| {
        b.iter(|| {
            switch_to(black_box(partner)).unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_switching);
criterion_main!(benches);
