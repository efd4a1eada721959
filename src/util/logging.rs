//! # Frame Logging Utilities
//!
//! Hex dump helpers so every frame that crosses the serial link shows up in
//! debug logs in the same format.
//!
//! ## Usage
//!
//! ```rust
//! use dlt645_rs::util::logging::log_frame_hex;
//!
//! let frame = [0x68, 0x01, 0x00, 0x14, 0x57, 0x42, 0x30, 0x68, 0x11, 0x00, 0xBF, 0x16];
//! log_frame_hex("dlt645: sending", &frame);
//! ```

/// Log frame data in hex format for debugging
///
/// Output is limited to the first 64 bytes.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    let display_data = if data.len() > MAX_LOG_BYTES {
        &data[..MAX_LOG_BYTES]
    } else {
        data
    };

    let hex_str = crate::util::hex::format_hex_compact(display_data);
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };

    log::debug!("{prefix}: {hex_str}{suffix}");
}

/// Log frame data with structured information
///
/// Combines hex logging with the decoded control fields.
pub fn log_frame_structured(prefix: &str, data: &[u8], function_code: u8, follow_up: bool) {
    log::debug!(
        target: "dlt645::frame",
        "{}: {} bytes, function=0x{:02X}, follow_up={}, data={}",
        prefix,
        data.len(),
        function_code,
        follow_up,
        crate::util::hex::format_hex_compact(&data[..data.len().min(32)])
    );
}
