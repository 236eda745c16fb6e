//! Collector lifecycle state machine.
//!
//! A fixed state set with an adjacency table; transitions are validated and
//! serialised under a short mutex so observers see them in order. Entering
//! REDUCING goes through `try_transition_to_reducing` only, which is the
//! compare-and-set that guarantees two reduces never overlap.

use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    Startup,
    Collecting,
    Reducing,
    Pushing,
    WaitingForKey,
    FreshRestart,
    Shutdown,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MachineState::Startup => "STARTUP",
            MachineState::Collecting => "COLLECTING",
            MachineState::Reducing => "REDUCING",
            MachineState::Pushing => "PUSHING",
            MachineState::WaitingForKey => "WAITING_FOR_KEY",
            MachineState::FreshRestart => "FRESH_RESTART",
            MachineState::Shutdown => "SHUTDOWN",
        };
        f.write_str(s)
    }
}

/// Attempted transition not in the adjacency table (self-transitions
/// included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: MachineState,
    pub to: MachineState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid state transition from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

fn is_valid_transition(from: MachineState, to: MachineState) -> bool {
    use MachineState::*;
    if from == to {
        return false;
    }
    match from {
        Startup => matches!(to, Collecting | Shutdown),
        Collecting => matches!(to, Reducing | Shutdown),
        Reducing => matches!(to, Pushing | Shutdown),
        Pushing => matches!(to, Collecting | WaitingForKey | Shutdown),
        WaitingForKey => matches!(to, FreshRestart | Shutdown),
        FreshRestart => matches!(to, Startup | Shutdown),
        Shutdown => false,
    }
}

type TransitionCallback = Box<dyn Fn(MachineState, MachineState) + Send + Sync>;

struct Inner {
    callback: Option<TransitionCallback>,
    entered_at: Instant,
}

pub struct StateMachine {
    state_tx: watch::Sender<MachineState>,
    // Serialises transitions so callbacks observe them in order
    inner: Mutex<Inner>,
}

impl StateMachine {
    /// Starts in STARTUP.
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(MachineState::Startup);
        Self {
            state_tx,
            inner: Mutex::new(Inner {
                callback: None,
                entered_at: Instant::now(),
            }),
        }
    }

    pub fn current(&self) -> MachineState {
        *self.state_tx.borrow()
    }

    pub fn is_collecting(&self) -> bool {
        self.current() == MachineState::Collecting
    }

    pub fn can_reduce(&self) -> bool {
        self.current() == MachineState::Collecting
    }

    /// Validated transition. Fails without side effects when `to` is not a
    /// listed successor of the current state.
    pub fn transition_to(&self, to: MachineState) -> Result<(), InvalidTransition> {
        let mut inner = self.inner.lock().unwrap();
        let from = self.current();

        if !is_valid_transition(from, to) {
            return Err(InvalidTransition { from, to });
        }

        self.apply_locked(&mut inner, from, to);
        Ok(())
    }

    /// Compare-and-set COLLECTING → REDUCING. The only way into REDUCING;
    /// with concurrent callers exactly one returns true.
    pub fn try_transition_to_reducing(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let from = self.current();
        if from != MachineState::Collecting {
            return false;
        }

        self.apply_locked(&mut inner, from, MachineState::Reducing);
        true
    }

    fn apply_locked(&self, inner: &mut Inner, from: MachineState, to: MachineState) {
        let resided = inner.entered_at.elapsed();
        inner.entered_at = Instant::now();
        self.state_tx.send_replace(to);

        log::info!("🔁 State transition: {} -> {} (was {} for {:?})", from, to, from, resided);

        if let Some(cb) = inner.callback.as_ref() {
            cb(from, to);
        }
    }

    /// Registers a callback invoked synchronously after each successful
    /// transition with (from, to).
    pub fn on_transition(&self, callback: impl Fn(MachineState, MachineState) + Send + Sync + 'static) {
        self.inner.lock().unwrap().callback = Some(Box::new(callback));
    }

    /// Blocks until the machine reaches `target` or `timeout` elapses.
    /// Returns whether the target was reached.
    pub async fn wait_for_state(&self, target: MachineState, timeout: Duration) -> bool {
        let mut rx = self.state_tx.subscribe();
        let reached = match tokio::time::timeout(timeout, rx.wait_for(|s| *s == target)).await {
            Ok(result) => result.is_ok(),
            Err(_) => false,
        };
        reached
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_starts_in_startup() {
        let sm = StateMachine::new();
        assert_eq!(sm.current(), MachineState::Startup);
    }

    #[test]
    fn test_valid_collection_cycle() {
        let sm = StateMachine::new();
        sm.transition_to(MachineState::Collecting).unwrap();
        sm.transition_to(MachineState::Reducing).unwrap();
        sm.transition_to(MachineState::Pushing).unwrap();
        sm.transition_to(MachineState::Collecting).unwrap();
        assert!(sm.is_collecting());
    }

    #[test]
    fn test_key_expiration_cycle() {
        let sm = StateMachine::new();
        for to in [
            MachineState::Collecting,
            MachineState::Reducing,
            MachineState::Pushing,
            MachineState::WaitingForKey,
            MachineState::FreshRestart,
            MachineState::Startup,
            MachineState::Collecting,
        ] {
            sm.transition_to(to).unwrap();
            assert_eq!(sm.current(), to);
        }
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let sm = StateMachine::new();
        let err = sm.transition_to(MachineState::Reducing).unwrap_err();
        assert_eq!(err.from, MachineState::Startup);
        assert_eq!(err.to, MachineState::Reducing);
        assert_eq!(sm.current(), MachineState::Startup, "failed transition must not move state");
    }

    #[test]
    fn test_self_transition_is_rejected() {
        let sm = StateMachine::new();
        sm.transition_to(MachineState::Collecting).unwrap();
        assert!(sm.transition_to(MachineState::Collecting).is_err());
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let sm = StateMachine::new();
        sm.transition_to(MachineState::Shutdown).unwrap();
        for to in [
            MachineState::Startup,
            MachineState::Collecting,
            MachineState::Reducing,
            MachineState::Pushing,
            MachineState::WaitingForKey,
            MachineState::FreshRestart,
        ] {
            assert!(sm.transition_to(to).is_err(), "SHUTDOWN must not leave via {}", to);
        }
    }

    #[test]
    fn test_try_transition_requires_collecting() {
        let sm = StateMachine::new();
        assert!(!sm.try_transition_to_reducing());

        sm.transition_to(MachineState::Collecting).unwrap();
        assert!(sm.try_transition_to_reducing());
        assert_eq!(sm.current(), MachineState::Reducing);

        // Second caller loses
        assert!(!sm.try_transition_to_reducing());
    }

    #[tokio::test]
    async fn test_try_transition_race_has_one_winner() {
        // 100 concurrent callers; exactly one may win the CAS
        let sm = Arc::new(StateMachine::new());
        sm.transition_to(MachineState::Collecting).unwrap();

        let winners = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..100 {
            let sm = sm.clone();
            let winners = winners.clone();
            handles.push(tokio::spawn(async move {
                if sm.try_transition_to_reducing() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
        assert_eq!(sm.current(), MachineState::Reducing);
    }

    #[test]
    fn test_transition_callbacks_fire_in_order() {
        let sm = StateMachine::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        sm.on_transition(move |from, to| {
            seen_cb.lock().unwrap().push((from, to));
        });

        sm.transition_to(MachineState::Collecting).unwrap();
        assert!(sm.try_transition_to_reducing());
        sm.transition_to(MachineState::Pushing).unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (MachineState::Startup, MachineState::Collecting),
                (MachineState::Collecting, MachineState::Reducing),
                (MachineState::Reducing, MachineState::Pushing),
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_for_state_observes_transition() {
        let sm = Arc::new(StateMachine::new());

        let waiter = {
            let sm = sm.clone();
            tokio::spawn(async move {
                sm.wait_for_state(MachineState::Collecting, Duration::from_secs(2)).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        sm.transition_to(MachineState::Collecting).unwrap();

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn test_wait_for_state_times_out() {
        let sm = StateMachine::new();
        let reached = sm
            .wait_for_state(MachineState::Reducing, Duration::from_millis(30))
            .await;
        assert!(!reached);
    }
}
