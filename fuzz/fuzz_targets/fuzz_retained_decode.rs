//! Fuzz target: RTC-retained blob decoder
//!
//! Decodes arbitrary 16-byte blobs (RTC memory after a cold boot holds
//! garbage) and verifies:
//! - No panics
//! - Anything accepted re-encodes to exactly the same blob
//!
//! cargo fuzz run fuzz_retained_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensornode::retained::{RETAINED_LEN, RetainedState};

fuzz_target!(|data: &[u8]| {
    let Ok(blob) = <[u8; RETAINED_LEN]>::try_from(data) else {
        return;
    };
    if let Some(state) = RetainedState::decode(&blob) {
        assert_eq!(state.encode(), blob);
    }
});
