#![no_main]

use fchat_session::protocol::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        let frame = Frame::parse(raw);
        assert!(frame.payload.is_object());
        let _ = Frame::encode(&frame.code, Some(&frame.payload));
    }
});
