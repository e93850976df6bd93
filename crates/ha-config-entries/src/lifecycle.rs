//! Config entry lifecycle transitions
//!
//! ```text
//! NotLoaded -> SetupInProgress -> Loaded
//!                              -> SetupError -> SetupInProgress
//!                              -> SetupRetry -> SetupInProgress
//!
//! Loaded | SetupError | SetupRetry -> UnloadInProgress -> NotLoaded
//!                                                      -> FailedUnload (terminal)
//! ```

use std::time::Duration;

use crate::entry::{ConfigEntry, ConfigEntryState};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid config entry transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ConfigEntryState,
    pub to: ConfigEntryState,
}

impl ConfigEntryState {
    pub fn can_transition_to(self, to: ConfigEntryState) -> bool {
        use ConfigEntryState::*;

        matches!(
            (self, to),
            (NotLoaded, SetupInProgress)
                | (SetupInProgress, Loaded | SetupError | SetupRetry)
                | (SetupError | SetupRetry, SetupInProgress | UnloadInProgress)
                | (Loaded, UnloadInProgress)
                | (UnloadInProgress, NotLoaded | FailedUnload)
        )
    }

    pub fn try_transition(
        self,
        to: ConfigEntryState,
    ) -> Result<ConfigEntryState, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

impl ConfigEntry {
    /// Move to `new_state`, rejecting transitions the lifecycle forbids
    pub fn try_set_state(
        &mut self,
        new_state: ConfigEntryState,
        reason: Option<String>,
    ) -> Result<(), InvalidTransition> {
        self.state = self.state.try_transition(new_state)?;
        self.reason = reason;

        if !matches!(
            new_state,
            ConfigEntryState::SetupRetry | ConfigEntryState::SetupInProgress
        ) {
            self.tries = 0;
        }
        Ok(())
    }
}

/// Delay before setup attempt number `tries` is retried
///
/// 5s, 10s, 20s, 40s, then 80s for every further attempt, plus up to 100ms jitter.
pub fn calculate_retry_delay(tries: u32) -> Duration {
    let base = 2_u64.pow(tries.min(4)) * 5;
    let jitter = rand::random::<f64>() * 0.1;
    Duration::from_secs(base) + Duration::from_secs_f64(jitter)
}
