// src/proc/gate.rs

//! Dependency gate: bounded polling wait for another process's readiness.
//!
//! A dependent polls its dependency's state with a decreasing-interval
//! backoff: with `n` rounds remaining it sleeps `n` time units, so the
//! intervals run 10, 9, ..., 1 and the worst-case wait is 55 units. The
//! front-loaded intervals tolerate slow dependency startup while keeping the
//! total wait bounded.

use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::proc::{ProcHandle, ProcState};

/// Number of polling rounds before a dependent gives up.
pub const GATE_ROUNDS: u32 = 10;

/// Poll `dep` until it reports Running or the round budget is exhausted.
///
/// Returns `true` if the dependency became Running with budget remaining; the
/// caller may then register itself as a dependent and launch its workload.
/// Returns `false` on exhaustion, in which case the caller must not launch.
pub async fn wait_for_running(dep: &ProcHandle, unit: Duration) -> bool {
    let mut rounds = GATE_ROUNDS;
    while dep.state() == ProcState::NotRunning && rounds > 0 {
        debug!(
            dependency = %dep.name(),
            rounds_left = rounds,
            "dependency not running; sleeping another round"
        );
        sleep(unit * rounds).await;
        rounds -= 1;
    }
    rounds > 0
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[tokio::test]
    async fn succeeds_immediately_when_dependency_is_running() {
        let dep = ProcHandle::new("dep");
        dep.set_state(ProcState::Running);

        let started = Instant::now();
        assert!(wait_for_running(&dep, Duration::from_millis(5)).await);
        assert!(started.elapsed() < Duration::from_millis(5));
    }

    #[tokio::test]
    async fn succeeds_when_dependency_comes_up_mid_poll() {
        let dep = ProcHandle::new("dep");
        let waiter = dep.clone();

        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            waiter.set_state(ProcState::Running);
        });

        assert!(wait_for_running(&dep, Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn gives_up_after_the_full_budget() {
        let dep = ProcHandle::new("dep");
        let unit = Duration::from_millis(2);

        let started = Instant::now();
        assert!(!wait_for_running(&dep, unit).await);

        // Sum of 10..=1 rounds at 2ms per unit.
        assert!(started.elapsed() >= unit * 55);
    }
}
