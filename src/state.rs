//! Presentation lifecycle state machine.
//!
//! The legal edges form a fixed graph with no terminal state:
//!
//! ```text
//! BOOT -> IDLE -> FADE_IN -> RUN <-> TRANSITION
//!                    ^        \        /
//!                    |       FADE_OUT
//!                    +-- BLACK <-+
//! ```
//!
//! Entering a state runs that state's listeners synchronously, in
//! registration order, against a caller-supplied context.

use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

/// Visual lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    Boot,
    Idle,
    FadeIn,
    Run,
    Transition,
    FadeOut,
    Black,
}

impl AppState {
    pub const ALL: [AppState; 7] = [
        AppState::Boot,
        AppState::Idle,
        AppState::FadeIn,
        AppState::Run,
        AppState::Transition,
        AppState::FadeOut,
        AppState::Black,
    ];

    /// States reachable from `self` in one step
    pub fn successors(self) -> &'static [AppState] {
        match self {
            AppState::Boot => &[AppState::Idle],
            AppState::Idle => &[AppState::FadeIn],
            AppState::FadeIn => &[AppState::Run],
            AppState::Run => &[AppState::Transition, AppState::FadeOut],
            AppState::Transition => &[AppState::Run, AppState::FadeOut],
            AppState::FadeOut => &[AppState::Black],
            AppState::Black => &[AppState::FadeIn],
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AppState::Boot => "BOOT",
            AppState::Idle => "IDLE",
            AppState::FadeIn => "FADE_IN",
            AppState::Run => "RUN",
            AppState::Transition => "TRANSITION",
            AppState::FadeOut => "FADE_OUT",
            AppState::Black => "BLACK",
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// On-enter handler
pub type EnterListener<C> = Box<dyn FnMut(&mut C)>;

/// Finite-state machine over [`AppState`] with on-enter listeners
pub struct StateMachine<C = ()> {
    current: AppState,
    listeners: HashMap<AppState, Vec<EnterListener<C>>>,
}

impl<C> StateMachine<C> {
    pub fn new() -> Self {
        Self {
            current: AppState::Boot,
            listeners: HashMap::new(),
        }
    }

    pub fn current_state(&self) -> AppState {
        self.current
    }

    pub fn can_transition(&self, to: AppState) -> bool {
        self.current.successors().contains(&to)
    }

    /// Move to `to` if the edge exists, then run its listeners.
    ///
    /// Returns `false` and leaves the state untouched for illegal edges.
    pub fn transition_to(&mut self, to: AppState, ctx: &mut C) -> bool {
        if !self.can_transition(to) {
            warn!("Invalid transition from {} to {}", self.current, to);
            return false;
        }

        let previous = self.current;
        self.current = to;
        info!("State transition: {} -> {}", previous, to);

        if let Some(listeners) = self.listeners.get_mut(&to) {
            for listener in listeners.iter_mut() {
                listener(ctx);
            }
        }

        true
    }

    /// Register a listener run each time `state` is entered
    pub fn on_state_enter(&mut self, state: AppState, listener: EnterListener<C>) {
        self.listeners.entry(state).or_default().push(listener);
    }

    /// Force the machine back to BOOT without validation or listeners
    pub fn reset(&mut self) {
        self.current = AppState::Boot;
    }
}

impl<C> Default for StateMachine<C> {
    fn default() -> Self {
        Self::new()
    }
}
