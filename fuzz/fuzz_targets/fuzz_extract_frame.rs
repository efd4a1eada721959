#![no_main]

use dlt645_rs::dlt645::serial::extract_frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = extract_frame(data) {
        assert_eq!(frame.first(), Some(&0x68));
        assert_eq!(frame.last(), Some(&0x16));
    }
});
