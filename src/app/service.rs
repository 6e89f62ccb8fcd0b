//! Lifecycle controller, the hexagonal core of a wake cycle.
//!
//! [`LifecycleController`] owns the FSM, the configuration store and the
//! sampler.  Each [`tick`](LifecycleController::tick) performs the I/O of
//! the current state through the injected [`Ports`], records the outcome
//! on the FSM blackboard and lets the state table pick the next state.
//!
//! ```text
//!  StoragePort ──▶ ┌──────────────────────────┐ ──▶ TelemetrySink
//! TransportPort ◀─▶│   LifecycleController    │ ──▶ FirmwarePort
//!  ConnectivityPort│  FSM · ConfigStore ·     │ ──▶ EventSink
//!       TimePort ─▶│  SensorSampler           │ ──▶ PowerPort
//!                  └──────────────────────────┘
//! ```
//!
//! The cycle ends with [`Tick::Halt`]; the caller then sleeps or restarts
//! through [`PowerPort`](super::ports::PowerPort).

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::config::{
    ASSOCIATION_POLL_INTERVAL_MS, ASSOCIATION_POLLS, CLOCK_SYNC_POLL_INTERVAL_MS, ChipId,
    FIRMWARE_VERSION, NTP_SERVERS, UNCONFIGURED_SLEEP_SECS,
};
use crate::error::NetworkError;
use crate::fsm::context::LifecycleContext;
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, LifecycleState};
use crate::retained::RetainedState;
use crate::sensors::registry::SensorRegistry;
use crate::sensors::sampler::SensorSampler;
use crate::sensors::{PublishContext, Sensor, SensorInstance};
use crate::update::{ConfigName, ConfigStore, firmware};

use super::events::AppEvent;
use super::ports::{ConnectivityPort, Ports, ResetReason, TimePort};

/// How a wake cycle ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// Restart now (after an update attempt).
    Reboot,
    /// Deep sleep for `secs`.
    Sleep { secs: u32 },
}

/// Result of one controller tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    Halt(Terminal),
}

// ───────────────────────────────────────────────────────────────
// Connectivity helpers
// ───────────────────────────────────────────────────────────────

/// Start association and poll until associated or the budget runs out.
///
/// Returns the number of polls it took.  `ASSOCIATION_POLLS` polls spaced
/// `ASSOCIATION_POLL_INTERVAL_MS` apart bound the wait.
pub fn associate<D: DelayNs + ?Sized>(
    wifi: &mut dyn ConnectivityPort,
    delay: &mut D,
    ssid: &str,
    password: &str,
    hint: Option<&RetainedState>,
) -> Result<u32, NetworkError> {
    wifi.begin(ssid, password, hint)?;
    for poll in 1..=ASSOCIATION_POLLS {
        if wifi.is_associated() {
            return Ok(poll);
        }
        delay.delay_ms(ASSOCIATION_POLL_INTERVAL_MS);
    }
    Err(NetworkError::AssociationTimeout)
}

/// Block until the wall clock is set.  There is no upper bound.
pub fn sync_clock(time: &mut dyn TimePort) -> u32 {
    time.start_sync(&NTP_SERVERS);
    let mut polls = 0u32;
    while !time.is_synced() {
        time.delay_ms(CLOCK_SYNC_POLL_INTERVAL_MS);
        polls = polls.wrapping_add(1);
        if polls % 20 == 0 {
            info!("Clock: still waiting for NTP ({} polls)", polls);
        }
    }
    debug!("Clock: synced after {} polls", polls);
    polls
}

// ───────────────────────────────────────────────────────────────
// LifecycleController
// ───────────────────────────────────────────────────────────────

/// Drives one wake cycle from boot to sleep or reboot.
pub struct LifecycleController<'r, S = Sensor> {
    fsm: Fsm,
    ctx: LifecycleContext,
    registry: &'r SensorRegistry<S>,
    store: ConfigStore,
    sampler: SensorSampler<S>,
    retained: Option<RetainedState>,
    reset: ResetReason,
}

impl<'r, S: SensorInstance> LifecycleController<'r, S> {
    /// Build a controller in BOOT.  No I/O happens until the first tick.
    pub fn new(chip_id: ChipId, registry: &'r SensorRegistry<S>) -> Self {
        let mut ctx = LifecycleContext::new();
        let mut fsm = Fsm::new(build_state_table(), LifecycleState::Boot);
        fsm.start(&mut ctx);
        Self {
            fsm,
            ctx,
            registry,
            store: ConfigStore::new(chip_id),
            sampler: SensorSampler::new(Vec::new()),
            retained: None,
            reset: ResetReason::Unknown,
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Perform the current state's work, then advance the FSM.
    pub fn tick(&mut self, ports: &mut Ports<'_>) -> Tick {
        let prev = self.fsm.current_state();

        match prev {
            LifecycleState::Boot => {
                if !self.ctx.boot_done {
                    self.boot(ports);
                }
            }
            LifecycleState::Sampling => self.sample(ports),
            LifecycleState::GoingOnline => self.go_online(ports),
            LifecycleState::OnlineIdle => {}
            LifecycleState::OtaUpdating => return Tick::Halt(self.apply_updates(ports)),
            LifecycleState::SleepPending => return Tick::Halt(self.prepare_sleep(ports)),
        }

        self.fsm.tick(&mut self.ctx);

        let next = self.fsm.current_state();
        if next != prev {
            ports.events.emit(&AppEvent::StateChanged {
                from: prev,
                to: next,
            });
        }
        Tick::Continue
    }

    /// Tick until the cycle ends.
    pub fn run(&mut self, ports: &mut Ports<'_>) -> Terminal {
        loop {
            if let Tick::Halt(terminal) = self.tick(ports) {
                return terminal;
            }
        }
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn state(&self) -> LifecycleState {
        self.fsm.current_state()
    }

    pub fn context(&self) -> &LifecycleContext {
        &self.ctx
    }

    pub fn config(&self) -> &ConfigStore {
        &self.store
    }

    pub fn sampler(&self) -> &SensorSampler<S> {
        &self.sampler
    }

    pub fn reset_reason(&self) -> ResetReason {
        self.reset
    }

    /// Configured sleep period, or the unconfigured fallback.
    pub fn sleep_secs(&self) -> u32 {
        self.store
            .local()
            .map_or(UNCONFIGURED_SLEEP_SECS, |l| l.sleep_time_s)
    }

    // ── BOOT ──────────────────────────────────────────────────

    fn boot(&mut self, ports: &mut Ports<'_>) {
        self.reset = ports.power.reset_reason();
        self.retained = ports.power.read_retained();
        info!(
            "Boot: firmware {} chip {} reset {:?} retained={}",
            FIRMWARE_VERSION,
            self.store.chip_id(),
            self.reset,
            self.retained.is_some()
        );

        self.store.load_global(&*ports.storage);
        let has_local = self.store.load_local(&*ports.storage).is_some();

        if self.store.global_needs_refresh() {
            info!("Boot: global document missing, refreshed on the next update cycle");
        }
        let needs_update = !has_local || self.reset.forces_update();

        if !needs_update {
            let descs = self
                .store
                .local()
                .map(|l| l.sensors.as_slice())
                .unwrap_or_default();
            let sensors = self.registry.instantiate_all(descs);
            ports.events.emit(&AppEvent::SensorsInstantiated {
                requested: descs.len(),
                created: sensors.len(),
            });
            self.sampler = SensorSampler::new(sensors);
        }

        self.ctx.needs_update = needs_update;
        self.ctx.boot_done = true;
        ports.events.emit(&AppEvent::Booted {
            reset: self.reset,
            needs_update,
        });
    }

    // ── SAMPLING ──────────────────────────────────────────────

    fn sample(&mut self, ports: &mut Ports<'_>) {
        if !self.sampler.round_complete() {
            self.sampler.tick();
        }
        self.ctx.round_complete = self.sampler.round_complete();
        self.ctx.upload_requested = self.sampler.upload_requested();

        if self.ctx.round_complete
            && self.ctx.upload_requested
            && self.ctx.online
            && !self.ctx.published
        {
            self.publish(ports);
        }
    }

    fn publish(&mut self, ports: &mut Ports<'_>) {
        let chip_id = self.store.chip_id();
        let device = self
            .store
            .local()
            .map_or(chip_id, |l| l.device_name_or(chip_id));
        let pctx = PublishContext {
            device,
            chip_id,
            firmware: FIRMWARE_VERSION,
            timestamp: ports.time.unix_time(),
        };

        let summary = self.sampler.publish(&mut *ports.telemetry, &pctx);
        if summary.failed > 0 {
            warn!(
                "Publish: {} sensor(s) dropped, first error: {:?}",
                summary.failed, summary.first_error
            );
        }

        let flushed = match ports.telemetry.flush() {
            Ok(()) => true,
            Err(e) => {
                warn!("Publish: flush failed: {}", e);
                false
            }
        };
        info!(
            "Publish: {} point(s) from {} sensor(s), flushed={}",
            summary.published,
            self.sampler.len(),
            flushed
        );
        ports.events.emit(&AppEvent::Published {
            points: summary.published,
            flushed,
        });
        self.ctx.published = true;
    }

    // ── GOING_ONLINE ──────────────────────────────────────────

    fn go_online(&mut self, ports: &mut Ports<'_>) {
        self.ctx.association_attempts += 1;
        let global = self.store.global();
        let result = associate(
            &mut *ports.wifi,
            &mut *ports.time,
            &global.wifi_ssid,
            &global.wifi_pass,
            self.retained.as_ref(),
        );

        match result {
            Ok(polls) => {
                info!("WiFi: associated after {} poll(s), rssi={:?}", polls, ports.wifi.rssi());
                sync_clock(&mut *ports.time);
                self.ctx.online = true;
                ports.events.emit(&AppEvent::Online { polls });

                if !self.ctx.needs_update {
                    let endpoint = global.telemetry_endpoint();
                    if let Err(e) = ports.telemetry.open(&endpoint, self.sampler.len()) {
                        warn!("Telemetry: open failed: {}", e);
                    }
                }
            }
            Err(e) => {
                warn!(
                    "WiFi: association to '{}' failed: {} (attempt {})",
                    global.wifi_ssid, e, self.ctx.association_attempts
                );
                // A stale hint must not poison the next attempt.
                self.retained = None;
                self.ctx.association_failed = true;
                ports.events.emit(&AppEvent::AssociationFailed);
            }
        }
    }

    // ── OTA_UPDATING ──────────────────────────────────────────

    fn apply_updates(&mut self, ports: &mut Ports<'_>) -> Terminal {
        if self.store.global().api_base().is_none() {
            warn!(
                "OTA: control URL '{}' unusable, skipping updates",
                self.store.global().ctrl_url
            );
        } else {
            for name in [ConfigName::Global, ConfigName::Local] {
                match self
                    .store
                    .refresh(name, &mut *ports.storage, &mut *ports.transport)
                {
                    Ok(outcome) => {
                        ports.events.emit(&AppEvent::ConfigRefreshed { name, outcome });
                    }
                    Err(e) => warn!("OTA: {} refresh failed: {}", name.endpoint(), e),
                }
            }

            let fw = match firmware::check_and_apply(
                self.store.global(),
                self.store.chip_id(),
                &mut *ports.transport,
                &mut *ports.firmware,
            ) {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!("OTA: firmware step failed: {}", e);
                    None
                }
            };
            ports.events.emit(&AppEvent::FirmwareChecked(fw));
        }

        info!("OTA: rebooting");
        ports.events.emit(&AppEvent::Rebooting);
        Terminal::Reboot
    }

    // ── SLEEP_PENDING ─────────────────────────────────────────

    fn prepare_sleep(&mut self, ports: &mut Ports<'_>) -> Terminal {
        if self.ctx.online {
            match ports.wifi.shutdown() {
                Some(state) => ports.power.write_retained(&state),
                None => debug!("Sleep: nothing to retain"),
            }
            self.ctx.online = false;
        }
        let secs = self.sleep_secs();
        info!("Sleep: {}s", secs);
        ports.events.emit(&AppEvent::Sleeping { secs });
        Terminal::Sleep { secs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Station {
        associate_after: Option<u32>,
        polls: Cell<u32>,
        began: bool,
    }

    impl ConnectivityPort for Station {
        fn begin(&mut self, _: &str, _: &str, _: Option<&RetainedState>) -> Result<(), NetworkError> {
            self.began = true;
            Ok(())
        }

        fn is_associated(&self) -> bool {
            let n = self.polls.get() + 1;
            self.polls.set(n);
            self.associate_after.is_some_and(|after| n >= after)
        }

        fn shutdown(&mut self) -> Option<RetainedState> {
            None
        }

        fn rssi(&self) -> Option<i8> {
            None
        }
    }

    #[derive(Default)]
    struct CountingDelay {
        total_ms: u64,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ms += u64::from(ns) / 1_000_000;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.total_ms += u64::from(ms);
        }
    }

    #[test]
    fn reachable_network_associates_within_budget() {
        let mut wifi = Station {
            associate_after: Some(7),
            polls: Cell::new(0),
            began: false,
        };
        let mut delay = CountingDelay::default();
        let polls = associate(&mut wifi, &mut delay, "ssid", "pass", None).unwrap();
        assert!(wifi.began);
        assert_eq!(polls, 7);
        assert_eq!(delay.total_ms, 6 * u64::from(ASSOCIATION_POLL_INTERVAL_MS));
    }

    #[test]
    fn unreachable_network_exhausts_budget() {
        let mut wifi = Station {
            associate_after: None,
            polls: Cell::new(0),
            began: false,
        };
        let mut delay = CountingDelay::default();
        let err = associate(&mut wifi, &mut delay, "ssid", "pass", None).unwrap_err();
        assert_eq!(err, NetworkError::AssociationTimeout);
        assert_eq!(wifi.polls.get(), ASSOCIATION_POLLS);
        assert_eq!(
            delay.total_ms,
            u64::from(ASSOCIATION_POLLS) * u64::from(ASSOCIATION_POLL_INTERVAL_MS)
        );
    }
}
