//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing one line per lifecycle event to the
//! ESP-IDF logger (UART / USB-CDC in production, stderr in simulation).
//! Each line starts with a short tag so a serial capture greps cleanly.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::update::FirmwareOutcome;

/// Adapter that logs every [`AppEvent`] to the console.
///
/// Counts events so a host harness can assert something was emitted.
#[derive(Default)]
pub struct LogEventSink {
    emitted: usize,
}

impl LogEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        self.emitted += 1;
        match event {
            AppEvent::Booted {
                reset,
                needs_update,
            } => {
                info!("BOOT  | reset={:?} needs_update={}", reset, needs_update);
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::SensorsInstantiated { requested, created } => {
                if created < requested {
                    warn!("SENS  | {}/{} sensors created", created, requested);
                } else {
                    info!("SENS  | {} sensors created", created);
                }
            }
            AppEvent::Online { polls } => {
                info!("NET   | online after {} polls", polls);
            }
            AppEvent::AssociationFailed => {
                warn!("NET   | association failed");
            }
            AppEvent::ConfigRefreshed { name, outcome } => {
                info!("CONFIG | {} {:?}", name.endpoint(), outcome);
            }
            AppEvent::FirmwareChecked(outcome) => match outcome {
                Some(FirmwareOutcome::NoUpdate) => info!("OTA   | no update offered"),
                Some(FirmwareOutcome::UpToDate { offered }) => {
                    info!("OTA   | offered {} is not newer", offered)
                }
                Some(FirmwareOutcome::Applied { bytes }) => {
                    info!("OTA   | applied {} bytes", bytes)
                }
                None => warn!("OTA   | check failed"),
            },
            AppEvent::Published { points, flushed } => {
                info!(
                    "TELEM | {} point(s), flush {}",
                    points,
                    if *flushed { "ok" } else { "FAILED" }
                );
            }
            AppEvent::Sleeping { secs } => {
                info!("POWER | deep sleep {}s", secs);
            }
            AppEvent::Rebooting => {
                info!("POWER | rebooting");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::LifecycleState;

    #[test]
    fn counts_every_event() {
        let mut sink = LogEventSink::new();
        sink.emit(&AppEvent::StateChanged {
            from: LifecycleState::Boot,
            to: LifecycleState::Sampling,
        });
        sink.emit(&AppEvent::FirmwareChecked(None));
        sink.emit(&AppEvent::Sleeping { secs: 60 });
        assert_eq!(sink.emitted(), 3);
    }
}
