//! State that survives deep sleep.
//!
//! Only the WiFi association parameters cross the sleep boundary.  They are
//! written as a fixed-size, self-checking blob so that a cold boot (RTC
//! memory holding garbage) is told apart from a warm wake.
//!
//! ```text
//! ┌─────┬────────────────────┬────────────┬──────────┐
//! │ ver │ postcard payload   │ sha256[..4]│ zero pad │
//! │ 1 B │ 7 B (bssid, chan)  │ 4 B        │ 4 B      │
//! └─────┴────────────────────┴────────────┴──────────┘
//! ```

use log::debug;
use serde::{Deserialize, Serialize};

/// Size of the blob reserved in RTC memory.
pub const RETAINED_LEN: usize = 16;

const FORMAT_VERSION: u8 = 1;
const PAYLOAD_LEN: usize = 7;
const DIGEST_LEN: usize = 4;
const DIGEST_START: usize = 1 + PAYLOAD_LEN;

/// Association parameters of the last successful connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetainedState {
    /// MAC of the access point we were associated with.
    pub bssid: [u8; 6],
    /// Primary channel of that access point.
    pub channel: u8,
}

impl RetainedState {
    /// Serialise into the fixed-size blob.
    pub fn encode(&self) -> [u8; RETAINED_LEN] {
        let mut blob = [0u8; RETAINED_LEN];
        blob[0] = FORMAT_VERSION;
        // Fixed-width fields only, so the payload length never varies.
        match postcard::to_slice(self, &mut blob[1..DIGEST_START]) {
            Ok(used) if used.len() == PAYLOAD_LEN => {}
            _ => return [0u8; RETAINED_LEN],
        }
        let digest = hmac_sha256::Hash::hash(&blob[..DIGEST_START]);
        blob[DIGEST_START..DIGEST_START + DIGEST_LEN].copy_from_slice(&digest[..DIGEST_LEN]);
        blob
    }

    /// Parse a blob; `None` for an unknown version, dirty padding or a
    /// digest mismatch.
    pub fn decode(blob: &[u8; RETAINED_LEN]) -> Option<Self> {
        if blob[0] != FORMAT_VERSION {
            debug!("Retained: unknown format version {}", blob[0]);
            return None;
        }
        if blob[DIGEST_START + DIGEST_LEN..].iter().any(|b| *b != 0) {
            debug!("Retained: padding not zero");
            return None;
        }
        let digest = hmac_sha256::Hash::hash(&blob[..DIGEST_START]);
        if blob[DIGEST_START..DIGEST_START + DIGEST_LEN] != digest[..DIGEST_LEN] {
            debug!("Retained: digest mismatch");
            return None;
        }
        postcard::from_bytes(&blob[1..DIGEST_START]).ok()
    }
}
