//! Single-flight coalescing for the update pipeline.
//!
//! A gate runs at most one pass at a time. Triggers that land while a pass
//! is running either set one pending-rerun flag or are discarded, so a burst
//! of triggers costs at most one extra pass.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Idle,
    Running,
    RunningWithReschedule,
}

/// What a trigger does when the gate is busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfRunning {
    /// Flag one rerun after the current pass.
    #[default]
    Reschedule,
    /// Drop the trigger.
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// Another pass owned the gate; this trigger was folded into it or dropped.
    Coalesced,
    /// This caller ran `runs` passes back to back.
    Completed { runs: usize },
}

#[derive(Debug)]
pub struct SingleFlightGate {
    name: String,
    state: Mutex<GateState>,
}

impl SingleFlightGate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(GateState::Idle),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> GateState {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Take the gate, or record the trigger against the running pass.
    fn try_enter(&self, policy: IfRunning) -> bool {
        let mut state = self.lock();
        match (*state, policy) {
            (GateState::Idle, _) => {
                *state = GateState::Running;
                true
            }
            (GateState::Running, IfRunning::Reschedule) => {
                *state = GateState::RunningWithReschedule;
                false
            }
            _ => false,
        }
    }

    /// End of a pass. Returns true when a rerun was requested; the gate then
    /// stays held for it.
    fn finish_pass(&self) -> bool {
        let mut state = self.lock();
        match *state {
            GateState::RunningWithReschedule => {
                *state = GateState::Running;
                true
            }
            _ => {
                *state = GateState::Idle;
                false
            }
        }
    }

    /// Run `pass` under the gate.
    pub async fn run<F, Fut>(&self, policy: IfRunning, mut pass: F) -> GateOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        if !self.try_enter(policy) {
            tracing::trace!(gate = %self.name, "Gate busy, trigger coalesced");
            return GateOutcome::Coalesced;
        }

        let mut guard = ReleaseOnDrop {
            gate: self,
            armed: true,
        };
        let mut runs = 0;
        loop {
            pass().await;
            runs += 1;
            if !self.finish_pass() {
                break;
            }
            tracing::debug!(gate = %self.name, "Rerunning after coalesced trigger");
        }
        guard.armed = false;

        GateOutcome::Completed { runs }
    }
}

/// Resets the gate if a pass is cancelled or panics mid-flight.
struct ReleaseOnDrop<'a> {
    gate: &'a SingleFlightGate,
    armed: bool,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            *self.gate.lock() = GateState::Idle;
        }
    }
}

/// Gates by name.
#[derive(Debug, Default)]
pub struct GateSet {
    gates: Mutex<HashMap<String, Arc<SingleFlightGate>>>,
}

impl GateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gate(&self, name: &str) -> Arc<SingleFlightGate> {
        let mut gates = self.gates.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        gates
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SingleFlightGate::new(name)))
            .clone()
    }

    pub async fn run<F, Fut>(&self, name: &str, policy: IfRunning, pass: F) -> GateOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        self.gate(name).run(policy, pass).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn counting_pass(
        count: Arc<AtomicUsize>,
        release: Arc<Notify>,
    ) -> impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> {
        move || {
            let count = count.clone();
            let release = release.clone();
            Box::pin(async move {
                if count.fetch_add(1, Ordering::SeqCst) == 0 {
                    release.notified().await;
                }
            })
        }
    }

    async fn wait_for_first_pass(count: &AtomicUsize) {
        while count.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_burst_of_triggers_runs_once_more() {
        let gate = Arc::new(SingleFlightGate::new("doUpdates"));
        let count = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let first = tokio::spawn({
            let gate = gate.clone();
            let pass = counting_pass(count.clone(), release.clone());
            async move { gate.run(IfRunning::Reschedule, pass).await }
        });
        wait_for_first_pass(&count).await;
        assert_eq!(gate.state(), GateState::Running);

        for _ in 0..5 {
            let outcome = gate
                .run(IfRunning::Reschedule, counting_pass(count.clone(), release.clone()))
                .await;
            assert_eq!(outcome, GateOutcome::Coalesced);
        }
        assert_eq!(gate.state(), GateState::RunningWithReschedule);

        release.notify_one();
        assert_eq!(first.await.unwrap(), GateOutcome::Completed { runs: 2 });
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[tokio::test]
    async fn test_discard_policy_drops_trigger() {
        let gate = Arc::new(SingleFlightGate::new("poll"));
        let count = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let first = tokio::spawn({
            let gate = gate.clone();
            let pass = counting_pass(count.clone(), release.clone());
            async move { gate.run(IfRunning::Reschedule, pass).await }
        });
        wait_for_first_pass(&count).await;

        let outcome = gate
            .run(IfRunning::Discard, counting_pass(count.clone(), release.clone()))
            .await;
        assert_eq!(outcome, GateOutcome::Coalesced);
        assert_eq!(gate.state(), GateState::Running);

        release.notify_one();
        assert_eq!(first.await.unwrap(), GateOutcome::Completed { runs: 1 });
    }

    #[tokio::test]
    async fn test_idle_gate_runs_immediately() {
        let gate = SingleFlightGate::new("x");
        let count = AtomicUsize::new(0);
        let outcome = gate
            .run(IfRunning::Discard, || {
                count.fetch_add(1, Ordering::SeqCst);
                async {}
            })
            .await;
        assert_eq!(outcome, GateOutcome::Completed { runs: 1 });
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_pass_releases_gate() {
        let gate = SingleFlightGate::new("x");
        let never = Notify::new();
        let pending = gate.run(IfRunning::Reschedule, || never.notified());
        let timed_out =
            tokio::time::timeout(std::time::Duration::from_millis(10), pending).await;
        assert!(timed_out.is_err());
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn test_gate_set_shares_by_name() {
        let set = GateSet::new();
        let a = set.gate("doUpdates");
        let b = set.gate("doUpdates");
        let c = set.gate("other");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.name(), "other");
    }
}
