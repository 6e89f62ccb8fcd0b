//! Blackboard threaded through every lifecycle handler.
//!
//! The controller writes the outcome of each state's work here (did boot
//! finish, did association succeed, is the sampling round done) and the
//! table handlers turn it into transitions.  Nothing in here survives the
//! cycle; [`RetainedState`](crate::retained::RetainedState) is the only
//! thing that crosses deep sleep.

/// Flags for one wake cycle.
#[derive(Debug, Clone, Default)]
pub struct LifecycleContext {
    // -- Timing --
    /// Ticks elapsed since the current state was entered.
    pub ticks_in_state: u64,
    pub total_ticks: u64,

    // -- Boot --
    /// Configuration loaded and the update decision made.
    pub boot_done: bool,
    /// Local config absent/unreadable, power-on or external reset, or the
    /// global document needs refreshing.  Sampling never runs while set.
    pub needs_update: bool,

    // -- Connectivity --
    pub online: bool,
    /// The most recent association attempt used up its budget.
    pub association_failed: bool,
    /// Association attempts made this cycle.
    pub association_attempts: u32,

    // -- Sampling --
    /// Mirrors [`SensorSampler::round_complete`](crate::sensors::sampler::SensorSampler::round_complete).
    pub round_complete: bool,
    /// Mirrors [`SensorSampler::upload_requested`](crate::sensors::sampler::SensorSampler::upload_requested).
    pub upload_requested: bool,
    /// Points handed to the sink and flushed (or the flush failed and was logged).
    pub published: bool,
}

impl LifecycleContext {
    pub fn new() -> Self {
        Self::default()
    }
}
