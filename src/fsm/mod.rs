//! Function-pointer finite state machine engine for the wake cycle.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  StateTable                                                   │
//! │  ┌──────────────┬───────────┬──────────┬───────────────────┐  │
//! │  │ LifecycleState│ on_enter  │ on_exit  │ on_update         │  │
//! │  ├──────────────┼───────────┼──────────┼───────────────────┤  │
//! │  │ Boot         │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ Sampling     │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ GoingOnline  │ fn(ctx)   │ fn(ctx)  │ fn(ctx)->Option<> │  │
//! │  │ OnlineIdle   │ -         │ -        │ fn(ctx)->Option<> │  │
//! │  │ OtaUpdating  │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  │ SleepPending │ fn(ctx)   │ -        │ fn(ctx)->Option<> │  │
//! │  └──────────────┴───────────┴──────────┴───────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The table only decides transitions.  All I/O for a state happens in
//! the [`LifecycleController`](crate::app::service::LifecycleController)
//! before the engine ticks; the handlers read the outcome from the
//! [`LifecycleContext`] blackboard.

pub mod context;
pub mod states;

use context::LifecycleContext;
use log::info;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Phases of one wake cycle.
/// Must stay in sync with the table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Boot = 0,
    Sampling = 1,
    GoingOnline = 2,
    OnlineIdle = 3,
    OtaUpdating = 4,
    SleepPending = 5,
}

impl LifecycleState {
    pub const COUNT: usize = 6;

    /// Convert a table index back to a state.  Out-of-range indices map to
    /// `SleepPending`, the state that ends the cycle.
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Boot,
            1 => Self::Sampling,
            2 => Self::GoingOnline,
            3 => Self::OnlineIdle,
            4 => Self::OtaUpdating,
            5 => Self::SleepPending,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::SleepPending
            }
        }
    }

    /// Whether the controller leaves the tick loop from this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::OtaUpdating | Self::SleepPending)
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// `on_enter` / `on_exit` action.
pub type StateActionFn = fn(&mut LifecycleContext);

/// Per-tick handler.  `Some(next)` requests a transition.
pub type StateUpdateFn = fn(&mut LifecycleContext) -> Option<LifecycleState>;

/// One row of the state table.
pub struct StateDescriptor {
    pub id: LifecycleState,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

pub struct Fsm {
    table: [StateDescriptor; LifecycleState::COUNT],
    current: usize,
    tick_count: u64,
    state_entry_tick: u64,
}

impl Fsm {
    pub fn new(table: [StateDescriptor; LifecycleState::COUNT], initial: LifecycleState) -> Self {
        Self {
            table,
            current: initial as usize,
            tick_count: 0,
            state_entry_tick: 0,
        }
    }

    /// Run the initial `on_enter`.  Call once before the first `tick()`.
    pub fn start(&mut self, ctx: &mut LifecycleContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance by one tick: run `on_update` for the current state and, if
    /// it asks for one, perform `on_exit(current)` → switch → `on_enter(next)`.
    pub fn tick(&mut self, ctx: &mut LifecycleContext) {
        self.tick_count += 1;
        ctx.ticks_in_state = self.tick_count - self.state_entry_tick;
        ctx.total_ticks = self.tick_count;

        if let Some(next) = (self.table[self.current].on_update)(ctx) {
            self.transition(next, ctx);
        }
    }

    pub fn current_state(&self) -> LifecycleState {
        LifecycleState::from_index(self.current)
    }

    pub fn state_name(&self) -> &'static str {
        self.table[self.current].name
    }

    pub fn ticks_in_current_state(&self) -> u64 {
        self.tick_count - self.state_entry_tick
    }

    fn transition(&mut self, next: LifecycleState, ctx: &mut LifecycleContext) {
        let next_idx = next as usize;
        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        self.state_entry_tick = self.tick_count;
        ctx.ticks_in_state = 0;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}
