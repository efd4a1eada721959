#![no_main]

use dlt645_rs::constants::{CONTROL_OFFSET, MIN_FRAME_SIZE};
use dlt645_rs::dlt645::frame::parse_frame;
use dlt645_rs::Dlt645Packager;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let packager = Dlt645Packager::new(304_257_140_001);
    let _ = parse_frame(data);

    if let Ok(payload) = packager.decode(data) {
        // Flag-free frames re-encode to the same length.
        if data[CONTROL_OFFSET] & 0xE0 == 0 {
            if let Ok(raw) = packager.encode_to(0, &payload) {
                assert_eq!(raw.len(), data.len());
            }
        }
    }

    if data.len() >= MIN_FRAME_SIZE {
        let _ = packager.verify(data, data);
    }
});
