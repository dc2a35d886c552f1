//! Single-flight guard
//!
//! At most one command runs at a time. Acquiring the guard moves the state
//! from `Idle` to `Executing(token)` and hands back a [`RunGuard`]; dropping
//! the guard restores `Idle` on every exit path. A second acquire while a
//! run is in progress fails instead of waiting.

use std::sync::{Mutex, MutexGuard};

use netops_core::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub enum DispatchState {
    #[default]
    Idle,
    Executing(CancellationToken),
}

impl DispatchState {
    pub fn is_idle(&self) -> bool {
        matches!(self, DispatchState::Idle)
    }
}

pub struct SingleFlight {
    state: Mutex<DispatchState>,
    /// Parent of every run token; cancelled at shutdown
    root: CancellationToken,
}

impl Default for SingleFlight {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl SingleFlight {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            state: Mutex::new(DispatchState::Idle),
            root,
        }
    }

    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enter `Executing` with a fresh token, or `None` if a run is active.
    pub fn try_acquire(&self) -> Option<RunGuard<'_>> {
        let mut state = self.lock();
        if !state.is_idle() {
            return None;
        }
        *state = DispatchState::Executing(self.root.child_token());
        debug!("single-flight guard acquired");
        Some(RunGuard { flight: self })
    }

    pub fn is_idle(&self) -> bool {
        self.lock().is_idle()
    }

    pub fn state(&self) -> DispatchState {
        self.lock().clone()
    }

    /// Signal the active run's token. Returns whether anything was running.
    pub fn cancel_current(&self) -> bool {
        match &*self.lock() {
            DispatchState::Executing(token) => {
                info!("cancelling current run");
                token.cancel();
                true
            }
            DispatchState::Idle => false,
        }
    }
}

/// Proof that the caller owns the current run
pub struct RunGuard<'a> {
    flight: &'a SingleFlight,
}

impl RunGuard<'_> {
    /// Token of the step in flight
    pub fn token(&self) -> CancellationToken {
        match &*self.flight.lock() {
            DispatchState::Executing(token) => token.clone(),
            // Unreachable while the guard lives; a cancelled token is the safe answer.
            DispatchState::Idle => {
                let token = CancellationToken::new();
                token.cancel();
                token
            }
        }
    }

    /// Start the next step of the run with a fresh token. A cancellation
    /// already requested is kept, so it still stops the next step.
    pub fn renew(&self) -> CancellationToken {
        let mut state = self.flight.lock();
        match &*state {
            DispatchState::Executing(token) if token.is_cancelled() => token.clone(),
            _ => {
                let token = self.flight.root.child_token();
                *state = DispatchState::Executing(token.clone());
                token
            }
        }
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.flight.lock() = DispatchState::Idle;
        debug!("single-flight guard released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let flight = SingleFlight::default();
        let guard = flight.try_acquire().unwrap();
        assert!(!flight.is_idle());
        assert!(flight.try_acquire().is_none());
        drop(guard);
        assert!(flight.is_idle());
        assert!(flight.try_acquire().is_some());
    }

    #[test]
    fn test_cancel_targets_current_token() {
        let flight = SingleFlight::default();
        assert!(!flight.cancel_current());

        let guard = flight.try_acquire().unwrap();
        let token = guard.token();
        assert!(flight.cancel_current());
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_renew_swaps_token_but_keeps_pending_cancel() {
        let flight = SingleFlight::default();
        let guard = flight.try_acquire().unwrap();

        let first = guard.token();
        let second = guard.renew();
        assert!(!second.is_cancelled());
        flight.cancel_current();
        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());

        let third = guard.renew();
        assert!(third.is_cancelled());
    }

    #[test]
    fn test_released_on_panic() {
        let flight = SingleFlight::default();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = flight.try_acquire().unwrap();
            panic!("operation blew up");
        }));
        assert!(result.is_err());
        assert!(flight.is_idle());
    }

    #[test]
    fn test_root_cancel_reaches_runs() {
        let root = CancellationToken::new();
        let flight = SingleFlight::new(root.clone());
        let guard = flight.try_acquire().unwrap();
        root.cancel();
        assert!(guard.token().is_cancelled());
    }
}
