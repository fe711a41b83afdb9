//! Coalescing for concurrent refreshes.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

/// Admits one refresh at a time, but never waits on a stalled one forever.
///
/// A caller that finds a refresh in flight waits until it finishes or until
/// it has been running for `stall_after`. In the second case the caller takes
/// over and the stalled holder keeps running unobserved.
#[derive(Debug, Default)]
pub(crate) struct RefreshGate {
    state: Mutex<GateState>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct GateState {
    next_ticket: u64,
    holder: Option<Holder>,
}

#[derive(Debug, Clone, Copy)]
struct Holder {
    ticket: u64,
    since: Instant,
}

/// Held for the duration of one refresh.
#[derive(Debug)]
pub(crate) struct GatePass<'a> {
    gate: &'a RefreshGate,
    ticket: u64,
}

impl RefreshGate {
    pub(crate) fn enter(&self, stall_after: Duration) -> GatePass<'_> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        while let Some(holder) = state.holder {
            let elapsed = holder.since.elapsed();
            if elapsed >= stall_after {
                warn!(
                    stalled_ms = elapsed.as_millis() as u64,
                    "In-flight certificate refresh stalled, starting another"
                );
                break;
            }
            state = self
                .released
                .wait_timeout(state, stall_after - elapsed)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        state.next_ticket += 1;
        let ticket = state.next_ticket;
        state.holder = Some(Holder { ticket, since: Instant::now() });
        GatePass { gate: self, ticket }
    }
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock().unwrap_or_else(PoisonError::into_inner);
        // A holder that was taken over must not release its successor.
        if state.holder.is_some_and(|holder| holder.ticket == self.ticket) {
            state.holder = None;
        }
        drop(state);
        self.gate.released.notify_all();
    }
}
