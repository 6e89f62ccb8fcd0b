//! Outbound lifecycle events.
//!
//! The [`LifecycleController`](super::service::LifecycleController) emits
//! these through the [`EventSink`](super::ports::EventSink) port.  Adapters
//! decide what to do with them; the stock one logs a line per event.

use crate::app::ports::ResetReason;
use crate::fsm::LifecycleState;
use crate::update::{ConfigName, FirmwareOutcome, UpdateOutcome};

/// Structured events emitted by the lifecycle core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// Boot work finished and the update decision is made.
    Booted {
        reset: ResetReason,
        needs_update: bool,
    },

    /// The FSM moved between states.
    StateChanged {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// The registry turned `requested` descriptors into `created` sensors.
    SensorsInstantiated { requested: usize, created: usize },

    /// Association succeeded after `polls` polls and the clock is synced.
    Online { polls: u32 },

    /// The association budget ran out.
    AssociationFailed,

    /// A configuration refresh reached a decision.
    ConfigRefreshed {
        name: ConfigName,
        outcome: UpdateOutcome,
    },

    /// The firmware check finished (`None` when it failed).
    FirmwareChecked(Option<FirmwareOutcome>),

    /// Sensor points handed to the sink; `flushed` is the flush result.
    Published { points: usize, flushed: bool },

    /// Entering deep sleep.
    Sleeping { secs: u32 },

    /// About to restart.
    Rebooting,
}
