//! OTA partition writer backed by the `esp-ota` crate.
//!
//! Implements [`FirmwarePort`]: begin → N × write → finalize.  Finalize
//! verifies the image and makes it the boot partition; the controller
//! reboots afterwards.
//!
//! On simulation targets only the size bookkeeping runs.

use log::{info, warn};

use crate::app::ports::FirmwarePort;
use crate::error::OtaError;
use crate::update::firmware::MAX_IMAGE_SIZE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving { expected_size: u32, bytes_written: u32 },
    ReadyToReboot,
    Failed,
}

pub struct OtaAdapter {
    state: OtaState,
    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
}

impl OtaAdapter {
    pub fn new() -> Self {
        Self {
            state: OtaState::Idle,
            #[cfg(target_os = "espidf")]
            update: None,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }
}

impl Default for OtaAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FirmwarePort for OtaAdapter {
    fn begin(&mut self, size: u32) -> Result<(), OtaError> {
        if matches!(self.state, OtaState::Receiving { .. }) {
            return Err(OtaError::AlreadyInProgress);
        }
        if size == 0 || size as usize > MAX_IMAGE_SIZE {
            return Err(OtaError::InvalidSize);
        }

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                OtaError::BeginFailed
            })?;
            self.update = Some(update);
        }

        self.state = OtaState::Receiving {
            expected_size: size,
            bytes_written: 0,
        };
        info!("OTA: begin ({} bytes)", size);
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> Result<u32, OtaError> {
        let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = self.state
        else {
            return Err(OtaError::NotReceiving);
        };
        let new_written = bytes_written
            .checked_add(chunk.len() as u32)
            .filter(|n| *n <= expected_size)
            .ok_or(OtaError::Overflow)?;

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.update.as_mut() else {
                return Err(OtaError::NotReceiving);
            };
            if let Err(e) = update.write(chunk) {
                warn!("esp-ota write failed: {:?}", e);
                self.abort();
                return Err(OtaError::WriteFailed);
            }
        }

        self.state = OtaState::Receiving {
            expected_size,
            bytes_written: new_written,
        };
        Ok(new_written)
    }

    fn finalize(&mut self) -> Result<(), OtaError> {
        match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if bytes_written == expected_size => {}
            OtaState::Receiving { .. } => return Err(OtaError::IncompleteTransfer),
            _ => return Err(OtaError::NotReceiving),
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.update.take() else {
                self.state = OtaState::Failed;
                return Err(OtaError::NotReceiving);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::VerifyFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::BootSetFailed
            })?;
        }

        self.state = OtaState::ReadyToReboot;
        info!("OTA: finalized, ready to reboot");
        Ok(())
    }

    fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // Dropping the handle aborts the esp-ota session.
            self.update.take();
        }
        if self.state != OtaState::Idle {
            warn!("OTA: aborted");
        }
        self.state = OtaState::Idle;
    }
}

/// Mark the running image valid so the bootloader does not roll back.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}
