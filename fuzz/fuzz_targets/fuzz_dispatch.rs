#![no_main]

use fchat_session::dispatch::Dispatcher;
use fchat_session::WorldState;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    // One frame per line, all applied to the same world.
    let dispatcher = Dispatcher::new("Fuzz");
    let mut world = WorldState::new();
    for raw in input.lines() {
        let _ = dispatcher.handle_frame(&mut world, raw);
    }
});
