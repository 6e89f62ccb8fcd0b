//! Firmware availability check and image streaming.
//!
//! Flow: GET firmware → version gate → begin → N × 4 KiB write → finalize
//!
//! The image is never held in memory: blocks coming off the connection are
//! staged into one 4 KiB buffer and written to the partition as it fills.
//!
//! The controller reboots after this step whatever the outcome, so every
//! failure path here only has to leave the OTA session closed.

use core::cmp::Ordering;

use log::{debug, info, warn};

use crate::app::ports::{BodySink, FirmwarePort, Response, TransportPort};
use crate::config::{FIRMWARE_VERSION, GlobalConfig, USER_AGENT};
use crate::error::{ConfigError, Error, OtaError};

/// Bytes handed to the firmware port per write.
pub const CHUNK_SIZE: usize = 4096;

/// Largest image the inactive partition can hold.
pub const MAX_IMAGE_SIZE: usize = 4 * 1024 * 1024;

/// What the firmware check concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareOutcome {
    /// Server has nothing for this device (non-200).
    NoUpdate,
    /// Server offered an image that is not newer than the running one.
    UpToDate { offered: String },
    /// Image written and marked bootable.
    Applied { bytes: usize },
}

/// `true` when dotted-numeric `candidate` sorts strictly after `running`.
///
/// Missing trailing components count as zero (`1.2 == 1.2.0`).  A
/// candidate with a non-numeric component is never newer.
pub fn is_newer(candidate: &str, running: &str) -> bool {
    let (Some(c), Some(r)) = (parse_version(candidate), parse_version(running)) else {
        return false;
    };
    let len = c.len().max(r.len());
    for i in 0..len {
        let a = c.get(i).copied().unwrap_or(0);
        let b = r.get(i).copied().unwrap_or(0);
        match a.cmp(&b) {
            Ordering::Greater => return true,
            Ordering::Less => return false,
            Ordering::Equal => {}
        }
    }
    false
}

fn parse_version(v: &str) -> Option<Vec<u32>> {
    let v = v.trim().trim_start_matches(['v', 'V']);
    if v.is_empty() {
        return None;
    }
    v.split('.').map(|part| part.parse::<u32>().ok()).collect()
}

/// Streams the firmware response into a [`FirmwarePort`].
struct ImageWriter<'a> {
    firmware: &'a mut dyn FirmwarePort,
    staged: Vec<u8>,
    declared: usize,
    received: usize,
    began: bool,
    skipped: Option<FirmwareOutcome>,
    error: Option<OtaError>,
}

impl<'a> ImageWriter<'a> {
    fn new(firmware: &'a mut dyn FirmwarePort) -> Self {
        Self {
            firmware,
            staged: Vec::new(),
            declared: 0,
            received: 0,
            began: false,
            skipped: None,
            error: None,
        }
    }

    fn write_staged(&mut self) -> bool {
        if self.staged.is_empty() {
            return true;
        }
        match self.firmware.write(&self.staged) {
            Ok(_) => {
                self.staged.clear();
                true
            }
            Err(e) => {
                warn!("OTA: write failed: {}", e);
                self.error = Some(e);
                false
            }
        }
    }
}

impl BodySink for ImageWriter<'_> {
    fn start(&mut self, head: &Response) -> bool {
        if !head.is_ok() {
            info!("OTA: no firmware offered (HTTP {})", head.status);
            self.skipped = Some(FirmwareOutcome::NoUpdate);
            return false;
        }

        if let Some(offered) = head.header("X-firmware-version") {
            if !is_newer(offered, FIRMWARE_VERSION) {
                info!("OTA: offered {} is not newer than {}", offered, FIRMWARE_VERSION);
                self.skipped = Some(FirmwareOutcome::UpToDate {
                    offered: offered.to_owned(),
                });
                return false;
            }
            info!("OTA: updating {} -> {}", FIRMWARE_VERSION, offered);
        }

        let size = head
            .header("Content-Length")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0 && *n as usize <= MAX_IMAGE_SIZE);
        let Some(size) = size else {
            warn!("OTA: missing or unusable Content-Length");
            self.error = Some(OtaError::InvalidSize);
            return false;
        };

        if let Err(e) = self.firmware.begin(size) {
            self.error = Some(e);
            return false;
        }
        self.began = true;
        self.declared = size as usize;
        self.staged = Vec::with_capacity(CHUNK_SIZE);
        true
    }

    fn data(&mut self, mut block: &[u8]) -> bool {
        self.received += block.len();
        if self.received > self.declared {
            self.error = Some(OtaError::Overflow);
            return false;
        }
        while !block.is_empty() {
            let room = CHUNK_SIZE - self.staged.len();
            let (head, rest) = block.split_at(room.min(block.len()));
            self.staged.extend_from_slice(head);
            block = rest;
            if self.staged.len() == CHUNK_SIZE && !self.write_staged() {
                return false;
            }
        }
        true
    }
}

/// Ask the control server for a firmware image and flash it if offered.
pub fn check_and_apply(
    global: &GlobalConfig,
    chip_id: &str,
    transport: &mut dyn TransportPort,
    firmware: &mut dyn FirmwarePort,
) -> Result<FirmwareOutcome, Error> {
    let base = global.api_base().ok_or(ConfigError::InvalidControlUrl)?;
    let url = format!("{}/firmware", base);
    let headers = [
        ("User-Agent", USER_AGENT),
        ("X-chip-id", chip_id),
        ("X-firmware-version", FIRMWARE_VERSION),
    ];

    debug!("OTA: GET {}", url);
    let mut writer = ImageWriter::new(firmware);
    let fetched = transport.get_streaming(&url, &headers, &mut writer);

    let failure = match fetched {
        Err(e) => {
            warn!("OTA: firmware request failed: {}", e);
            Some(OtaError::FetchFailed)
        }
        Ok(_) => writer.error.take(),
    };
    if let Some(e) = failure {
        if writer.began {
            writer.firmware.abort();
        }
        return Err(e.into());
    }
    if let Some(outcome) = writer.skipped.take() {
        return Ok(outcome);
    }
    if !writer.began {
        return Err(OtaError::FetchFailed.into());
    }
    if writer.received != writer.declared {
        warn!(
            "OTA: connection closed after {} of {} bytes",
            writer.received, writer.declared
        );
        writer.firmware.abort();
        return Err(OtaError::IncompleteTransfer.into());
    }

    if !writer.write_staged() {
        writer.firmware.abort();
        return Err(writer.error.take().unwrap_or(OtaError::WriteFailed).into());
    }
    if let Err(e) = writer.firmware.finalize() {
        warn!("OTA: finalize failed: {}", e);
        writer.firmware.abort();
        return Err(e.into());
    }
    info!("OTA: {} bytes written, new image bootable", writer.received);
    Ok(FirmwareOutcome::Applied {
        bytes: writer.received,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::Response;
    use crate::error::NetworkError;

    #[test]
    fn version_ordering() {
        assert!(is_newer("1.0.1", "1.0.0"));
        assert!(is_newer("2.0", "1.9.9"));
        assert!(is_newer("v0.10.0", "0.9.0"));
        assert!(!is_newer("1.2", "1.2.0"));
        assert!(!is_newer("1.2.0", "1.2.1"));
        assert!(!is_newer("1.3.beta", "1.2.0"));
        assert!(!is_newer("", "0.0.1"));
    }

    struct Fixed(Result<Response, NetworkError>);

    impl TransportPort for Fixed {
        fn get(&mut self, _: &str, _: &[(&str, &str)]) -> Result<Response, NetworkError> {
            self.0.clone()
        }

        fn post(&mut self, _: &str, _: &[(&str, &str)], _: &[u8]) -> Result<Response, NetworkError> {
            Err(NetworkError::Io)
        }
    }

    #[derive(Default)]
    struct Flash {
        declared: u32,
        chunks: Vec<usize>,
        fail_write_at: Option<usize>,
        finalized: bool,
        aborted: bool,
    }

    impl FirmwarePort for Flash {
        fn begin(&mut self, size: u32) -> Result<(), OtaError> {
            self.declared = size;
            Ok(())
        }

        fn write(&mut self, chunk: &[u8]) -> Result<u32, OtaError> {
            if self.fail_write_at == Some(self.chunks.len()) {
                return Err(OtaError::WriteFailed);
            }
            self.chunks.push(chunk.len());
            Ok(self.chunks.iter().sum::<usize>() as u32)
        }

        fn finalize(&mut self) -> Result<(), OtaError> {
            self.finalized = true;
            Ok(())
        }

        fn abort(&mut self) {
            self.aborted = true;
        }
    }

    fn global() -> GlobalConfig {
        GlobalConfig::default()
    }

    #[test]
    fn non_200_means_no_update() {
        let mut t = Fixed(Ok(Response::new(304, Vec::new())));
        let mut f = Flash::default();
        let out = check_and_apply(&global(), "0x1", &mut t, &mut f).unwrap();
        assert_eq!(out, FirmwareOutcome::NoUpdate);
        assert!(f.chunks.is_empty());
    }

    #[test]
    fn image_streams_in_chunks() {
        let body = vec![0xE9u8; CHUNK_SIZE * 2 + 100];
        let mut t = Fixed(Ok(Response::new(200, body).with_header("X-firmware-version", "999.0.0")));
        let mut f = Flash::default();
        let out = check_and_apply(&global(), "0x1", &mut t, &mut f).unwrap();
        assert_eq!(out, FirmwareOutcome::Applied { bytes: CHUNK_SIZE * 2 + 100 });
        assert_eq!(f.chunks, [CHUNK_SIZE, CHUNK_SIZE, 100]);
        assert_eq!(f.declared as usize, CHUNK_SIZE * 2 + 100);
        assert!(f.finalized && !f.aborted);
    }

    #[test]
    fn stale_image_is_ignored() {
        let mut t = Fixed(Ok(
            Response::new(200, vec![1u8; 16]).with_header("x-firmware-version", FIRMWARE_VERSION)
        ));
        let mut f = Flash::default();
        let out = check_and_apply(&global(), "0x1", &mut t, &mut f).unwrap();
        assert!(matches!(out, FirmwareOutcome::UpToDate { .. }));
        assert!(f.chunks.is_empty());
    }

    #[test]
    fn write_failure_aborts_session() {
        let mut t = Fixed(Ok(Response::new(200, vec![0u8; CHUNK_SIZE * 3])));
        let mut f = Flash {
            fail_write_at: Some(1),
            ..Flash::default()
        };
        let err = check_and_apply(&global(), "0x1", &mut t, &mut f).unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::WriteFailed));
        assert!(f.aborted && !f.finalized);
    }

    #[test]
    fn empty_image_is_refused() {
        let mut t = Fixed(Ok(Response::new(200, Vec::new())));
        let mut f = Flash::default();
        let err = check_and_apply(&global(), "0x1", &mut t, &mut f).unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::InvalidSize));
    }

    #[test]
    fn short_body_aborts_as_incomplete() {
        let resp = Response::new(200, vec![0u8; 100]).with_header("Content-Length", "5000");
        let mut t = Fixed(Ok(resp));
        let mut f = Flash::default();
        let err = check_and_apply(&global(), "0x1", &mut t, &mut f).unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::IncompleteTransfer));
        assert_eq!(f.declared, 5000);
        assert!(f.aborted && !f.finalized);
    }

    /// Produces a large image block by block, never as one buffer.
    struct Wire {
        len: usize,
        cut_after: Option<usize>,
    }

    impl TransportPort for Wire {
        fn get(&mut self, _: &str, _: &[(&str, &str)]) -> Result<Response, NetworkError> {
            Err(NetworkError::Io)
        }

        fn get_streaming(
            &mut self,
            _: &str,
            _: &[(&str, &str)],
            sink: &mut dyn BodySink,
        ) -> Result<Response, NetworkError> {
            let head = Response::new(200, Vec::new())
                .with_header("Content-Length", &self.len.to_string());
            if !sink.start(&head) {
                return Ok(head);
            }
            let block = [0xA5u8; 1000];
            let mut sent = 0;
            while sent < self.len {
                if self.cut_after.is_some_and(|cut| sent >= cut) {
                    return Err(NetworkError::Io);
                }
                let n = block.len().min(self.len - sent);
                if !sink.data(&block[..n]) {
                    break;
                }
                sent += n;
            }
            Ok(head)
        }

        fn post(&mut self, _: &str, _: &[(&str, &str)], _: &[u8]) -> Result<Response, NetworkError> {
            Err(NetworkError::Io)
        }
    }

    #[test]
    fn large_image_is_written_as_it_arrives() {
        let len = 1_200_000;
        let mut t = Wire {
            len,
            cut_after: None,
        };
        let mut f = Flash::default();
        let out = check_and_apply(&global(), "0x1", &mut t, &mut f).unwrap();
        assert_eq!(out, FirmwareOutcome::Applied { bytes: len });
        assert_eq!(f.chunks.len(), len.div_ceil(CHUNK_SIZE));
        assert!(f.chunks[..f.chunks.len() - 1].iter().all(|c| *c == CHUNK_SIZE));
        assert_eq!(f.chunks.iter().sum::<usize>(), len);
        assert!(f.finalized);
    }

    #[test]
    fn dropped_connection_aborts_open_session() {
        let mut t = Wire {
            len: 50_000,
            cut_after: Some(20_000),
        };
        let mut f = Flash::default();
        let err = check_and_apply(&global(), "0x1", &mut t, &mut f).unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::FetchFailed));
        assert_eq!(f.declared, 50_000);
        assert!(f.aborted && !f.finalized);
    }

    #[test]
    fn unreachable_server_is_a_fetch_failure() {
        let mut t = Fixed(Err(NetworkError::ConnectFailed));
        let mut f = Flash::default();
        let err = check_and_apply(&global(), "0x1", &mut t, &mut f).unwrap_err();
        assert_eq!(err, Error::Ota(OtaError::FetchFailed));
    }
}
