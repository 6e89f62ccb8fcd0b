//! Lifecycle state handlers and table builder.
//!
//! ```text
//!  BOOT ──[!needs_update]──▶ SAMPLING ──[round done, no upload]──────────▶ SLEEP_PENDING
//!    │                         │   ▲                                          ▲
//!    │                 [upload,│   │[upload branch]                           │
//!    │                 offline]▼   │                                          │
//!    └──[needs_update]──▶ GOING_ONLINE ──[ok]──▶ ONLINE_IDLE                  │
//!                          │    ▲   │                 │                       │
//!                          └────┘   └─[failed, upload]┼───────────────────────┘
//!                  [failed, needs_update]             │[needs_update]
//!                                                     ▼
//!                                               OTA_UPDATING ──▶ reboot
//! ```
//!
//! SAMPLING with an upload pending and the link up holds until the
//! controller has published, then moves to SLEEP_PENDING.

use super::context::LifecycleContext;
use super::{LifecycleState, StateDescriptor};
use log::{debug, info, warn};

/// Build the state table.  Called once per controller.
pub fn build_state_table() -> [StateDescriptor; LifecycleState::COUNT] {
    [
        StateDescriptor {
            id: LifecycleState::Boot,
            name: "BOOT",
            on_enter: Some(boot_enter),
            on_exit: None,
            on_update: boot_update,
        },
        StateDescriptor {
            id: LifecycleState::Sampling,
            name: "SAMPLING",
            on_enter: Some(sampling_enter),
            on_exit: None,
            on_update: sampling_update,
        },
        StateDescriptor {
            id: LifecycleState::GoingOnline,
            name: "GOING_ONLINE",
            on_enter: Some(going_online_enter),
            on_exit: Some(going_online_exit),
            on_update: going_online_update,
        },
        StateDescriptor {
            id: LifecycleState::OnlineIdle,
            name: "ONLINE_IDLE",
            on_enter: None,
            on_exit: None,
            on_update: online_idle_update,
        },
        StateDescriptor {
            id: LifecycleState::OtaUpdating,
            name: "OTA_UPDATING",
            on_enter: Some(ota_enter),
            on_exit: None,
            on_update: terminal_update,
        },
        StateDescriptor {
            id: LifecycleState::SleepPending,
            name: "SLEEP_PENDING",
            on_enter: Some(sleep_enter),
            on_exit: None,
            on_update: terminal_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  BOOT
// ═══════════════════════════════════════════════════════════════════════════

fn boot_enter(ctx: &mut LifecycleContext) {
    ctx.boot_done = false;
}

fn boot_update(ctx: &mut LifecycleContext) -> Option<LifecycleState> {
    if !ctx.boot_done {
        return None;
    }
    if ctx.needs_update {
        info!("BOOT: update required, going online");
        Some(LifecycleState::GoingOnline)
    } else {
        Some(LifecycleState::Sampling)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  SAMPLING
// ═══════════════════════════════════════════════════════════════════════════

fn sampling_enter(ctx: &mut LifecycleContext) {
    debug!(
        "SAMPLING: round_complete={} upload={} online={}",
        ctx.round_complete, ctx.upload_requested, ctx.online
    );
}

fn sampling_update(ctx: &mut LifecycleContext) -> Option<LifecycleState> {
    if !ctx.round_complete {
        return None;
    }
    if !ctx.upload_requested {
        return Some(LifecycleState::SleepPending);
    }
    if !ctx.online {
        return Some(LifecycleState::GoingOnline);
    }
    ctx.published.then_some(LifecycleState::SleepPending)
}

// ═══════════════════════════════════════════════════════════════════════════
//  GOING_ONLINE
// ═══════════════════════════════════════════════════════════════════════════

fn going_online_enter(ctx: &mut LifecycleContext) {
    ctx.association_failed = false;
}

fn going_online_exit(ctx: &mut LifecycleContext) {
    info!(
        "GOING_ONLINE: online={} after {} attempt(s)",
        ctx.online, ctx.association_attempts
    );
}

fn going_online_update(ctx: &mut LifecycleContext) -> Option<LifecycleState> {
    if ctx.online {
        return Some(LifecycleState::OnlineIdle);
    }
    if !ctx.association_failed {
        return None;
    }
    if ctx.needs_update {
        // Retry on the next tick for as long as the update is pending.
        warn!("GOING_ONLINE: association failed, retrying");
        ctx.association_failed = false;
        return None;
    }
    warn!("GOING_ONLINE: association failed, skipping telemetry");
    Some(LifecycleState::SleepPending)
}

// ═══════════════════════════════════════════════════════════════════════════
//  ONLINE_IDLE
// ═══════════════════════════════════════════════════════════════════════════

fn online_idle_update(ctx: &mut LifecycleContext) -> Option<LifecycleState> {
    if ctx.needs_update {
        Some(LifecycleState::OtaUpdating)
    } else {
        Some(LifecycleState::Sampling)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
//  Terminal states
// ═══════════════════════════════════════════════════════════════════════════

fn ota_enter(_ctx: &mut LifecycleContext) {
    info!("OTA_UPDATING: refreshing configuration and firmware");
}

fn sleep_enter(ctx: &mut LifecycleContext) {
    info!(
        "SLEEP_PENDING: online={} published={} after {} tick(s)",
        ctx.online, ctx.published, ctx.total_ticks
    );
}

fn terminal_update(_ctx: &mut LifecycleContext) -> Option<LifecycleState> {
    None
}
