//! Slot State Machine
//!
//! A slot is one block of samples plus a state tag, guarded by its own
//! mutex and condition variable. States cycle strictly
//! `Empty -> Filled -> Processed -> Empty`; a role waits on the slot until
//! the state it needs comes round, takes the block out, works on it with
//! the lock released, then puts it back and hands the slot to the next role.
//!
//! The lock is only ever held for the state check and the hand-over, so a
//! waiter's deadline covers both the lock and the condition wait.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::engine::Stage;
use crate::error::{Result, RingshiftError};

/// Slot states, in the only order they may occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SlotState {
    /// Ready for the capture stage to fill (initial state)
    #[default]
    Empty,
    /// Holds a captured block, ready for the transform stage
    Filled,
    /// Holds a transformed block, ready for the playback stage
    Processed,
}

impl SlotState {
    /// The state that must follow this one
    pub fn next(self) -> SlotState {
        match self {
            SlotState::Empty => SlotState::Filled,
            SlotState::Filled => SlotState::Processed,
            SlotState::Processed => SlotState::Empty,
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotState::Empty => write!(f, "EMPTY"),
            SlotState::Filled => write!(f, "FILLED"),
            SlotState::Processed => write!(f, "PROCESSED"),
        }
    }
}

// ============================================================================
// Stop Signal
// ============================================================================

/// Pipeline-wide stop flag, remembering which stage failed first
///
/// Checked by every slot wait, so a failing stage can release the others
/// instead of leaving them blocked forever.
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: AtomicBool,
    first_failure: Mutex<Option<Stage>>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag on behalf of `stage`
    ///
    /// Only the first caller is remembered as the failing stage.
    pub fn trigger(&self, stage: Stage) {
        self.first_failure.lock().get_or_insert(stage);
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// The stage whose failure raised the flag
    pub fn first_failure(&self) -> Option<Stage> {
        *self.first_failure.lock()
    }
}

// ============================================================================
// Slot
// ============================================================================

#[derive(Debug)]
struct SlotInner {
    /// Empty while a stage holds the block
    data: Vec<f32>,
    state: SlotState,
    /// A stage has taken the block and not yet handed it back
    claimed: bool,
    /// Completed Empty -> Filled -> Processed -> Empty cycles
    cycles: u64,
}

impl SlotInner {
    fn ready_for(&self, wanted: SlotState) -> bool {
        self.state == wanted && !self.claimed
    }
}

/// One ring element: a block buffer, its state, and its wait primitive
#[derive(Debug)]
pub struct Slot {
    index: usize,
    inner: Mutex<SlotInner>,
    changed: Condvar,
}

impl Slot {
    /// Create an `Empty` slot holding `block_size` zeroed samples
    pub fn new(index: usize, block_size: usize) -> Self {
        Self {
            index,
            inner: Mutex::new(SlotInner {
                data: vec![0.0; block_size],
                state: SlotState::Empty,
                claimed: false,
                cycles: 0,
            }),
            changed: Condvar::new(),
        }
    }

    /// Position of this slot in its ring
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current state (snapshot)
    pub fn state(&self) -> SlotState {
        self.inner.lock().state
    }

    /// Number of full cycles this slot has completed
    pub fn cycles(&self) -> u64 {
        self.inner.lock().cycles
    }

    /// Block until the slot reaches `wanted`, then take the block out
    ///
    /// The predicate is re-checked on every wake-up, so spurious or stale
    /// notifications are harmless. Returns `Stopped` as soon as `stop` is
    /// raised. With a `timeout`, one deadline covers taking the lock and
    /// waiting for the state; once it has passed the wait reports
    /// `Starvation`, even if the state arrived while the lock was retaken.
    pub fn wait_until(
        &self,
        wanted: SlotState,
        stage: Stage,
        stop: &StopSignal,
        timeout: Option<Duration>,
    ) -> Result<SlotGuard<'_>> {
        let blocked = |inner: &mut SlotInner| !inner.ready_for(wanted) && !stop.is_triggered();

        let started = Instant::now();
        // A deadline too far out to represent waits forever
        let deadline = timeout.and_then(|limit| started.checked_add(limit));

        let inner = match deadline {
            None => {
                let mut inner = self.inner.lock();
                self.changed.wait_while(&mut inner, blocked);
                inner
            }
            Some(deadline) => {
                let starved = || RingshiftError::Starvation {
                    stage,
                    slot: self.index,
                    waited_ms: started.elapsed().as_millis() as u64,
                };

                let Some(mut inner) = self.inner.try_lock_until(deadline) else {
                    return Err(if stop.is_triggered() {
                        RingshiftError::Stopped { stage }
                    } else {
                        starved()
                    });
                };
                let waited = self.changed.wait_while_until(&mut inner, blocked, deadline);
                if waited.timed_out() && !stop.is_triggered() {
                    return Err(starved());
                }
                inner
            }
        };

        if stop.is_triggered() {
            return Err(RingshiftError::Stopped { stage });
        }

        Ok(self.claim(inner))
    }

    fn claim(&self, mut inner: MutexGuard<'_, SlotInner>) -> SlotGuard<'_> {
        inner.claimed = true;
        let data = std::mem::take(&mut inner.data);
        SlotGuard {
            slot: self,
            state: inner.state,
            data,
            handed_on: false,
        }
    }

    /// Put the block back, optionally moving to `next`, and wake all waiters
    fn release(&self, data: Vec<f32>, next: Option<SlotState>) {
        {
            let mut inner = self.inner.lock();
            inner.data = data;
            inner.claimed = false;
            if let Some(next) = next {
                inner.state = next;
                if next == SlotState::Empty {
                    inner.cycles += 1;
                }
            }
        }
        self.changed.notify_all();
    }

    /// Wake every waiter without changing state
    ///
    /// Takes the lock first so a waiter between its predicate check and
    /// its wait cannot miss the notification.
    pub fn wake_all(&self) {
        let _inner = self.inner.lock();
        self.changed.notify_all();
    }
}

/// Exclusive ownership of a slot's block in a known state
///
/// The slot's lock is not held; other stages see the slot as claimed until
/// the guard is handed on or dropped. Dropping the guard without calling
/// [`SlotGuard::transition_to`] puts the block back with the state
/// untouched, also when the owning stage unwinds.
pub struct SlotGuard<'a> {
    slot: &'a Slot,
    state: SlotState,
    data: Vec<f32>,
    handed_on: bool,
}

impl<'a> SlotGuard<'a> {
    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn slot_index(&self) -> usize {
        self.slot.index
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Move to `next`, return the block and wake all waiters
    ///
    /// All roles share one condition variable per slot, so every waiter is
    /// woken and each re-checks its own predicate.
    pub fn transition_to(mut self, next: SlotState) -> Result<()> {
        if self.state.next() != next {
            return Err(RingshiftError::InvalidTransition {
                slot: self.slot.index,
                from: self.state,
                to: next,
            });
        }

        self.handed_on = true;
        self.slot.release(std::mem::take(&mut self.data), Some(next));
        Ok(())
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if !self.handed_on {
            self.slot.release(std::mem::take(&mut self.data), None);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    // ------------------------------------------------------------------------
    // State Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_new_slot_is_empty() {
        let slot = Slot::new(0, 8);
        assert_eq!(slot.state(), SlotState::Empty);
        assert_eq!(slot.cycles(), 0);
    }

    #[test]
    fn test_state_cycle_order() {
        assert_eq!(SlotState::Empty.next(), SlotState::Filled);
        assert_eq!(SlotState::Filled.next(), SlotState::Processed);
        assert_eq!(SlotState::Processed.next(), SlotState::Empty);
    }

    #[test]
    fn test_full_cycle_counts() {
        let slot = Slot::new(2, 4);
        let stop = StopSignal::new();

        for (wanted, next, stage) in [
            (SlotState::Empty, SlotState::Filled, Stage::Capture),
            (SlotState::Filled, SlotState::Processed, Stage::Transform),
            (SlotState::Processed, SlotState::Empty, Stage::Playback),
        ] {
            let guard = slot.wait_until(wanted, stage, &stop, None).unwrap();
            assert_eq!(guard.state(), wanted);
            guard.transition_to(next).unwrap();
        }

        assert_eq!(slot.state(), SlotState::Empty);
        assert_eq!(slot.cycles(), 1);
    }

    #[test]
    fn test_skipping_a_state_is_rejected() {
        let slot = Slot::new(1, 4);
        let stop = StopSignal::new();
        let guard = slot
            .wait_until(SlotState::Empty, Stage::Capture, &stop, None)
            .unwrap();

        let err = guard.transition_to(SlotState::Processed).unwrap_err();
        assert!(matches!(
            err,
            RingshiftError::InvalidTransition {
                slot: 1,
                from: SlotState::Empty,
                to: SlotState::Processed
            }
        ));
        assert_eq!(slot.state(), SlotState::Empty);
    }

    #[test]
    fn test_repeating_a_state_is_rejected() {
        let slot = Slot::new(0, 4);
        let stop = StopSignal::new();
        let guard = slot
            .wait_until(SlotState::Empty, Stage::Capture, &stop, None)
            .unwrap();
        assert!(guard.transition_to(SlotState::Empty).is_err());
    }

    #[test]
    fn test_data_written_under_guard_is_visible_to_next_stage() {
        let slot = Slot::new(0, 4);
        let stop = StopSignal::new();

        let mut guard = slot
            .wait_until(SlotState::Empty, Stage::Capture, &stop, None)
            .unwrap();
        guard.data_mut().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        guard.transition_to(SlotState::Filled).unwrap();

        let guard = slot
            .wait_until(SlotState::Filled, Stage::Transform, &stop, None)
            .unwrap();
        assert_eq!(guard.data(), &[1.0, 2.0, 3.0, 4.0]);
    }

    // ------------------------------------------------------------------------
    // Blocking Tests
    // ------------------------------------------------------------------------

    #[test]
    fn test_waiter_blocks_until_transition() {
        let slot = Arc::new(Slot::new(0, 4));
        let stop = Arc::new(StopSignal::new());

        let waiter = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let guard = slot
                    .wait_until(SlotState::Filled, Stage::Transform, &stop, None)
                    .unwrap();
                guard.data()[0]
            })
        };

        thread::sleep(Duration::from_millis(20));
        let mut guard = slot
            .wait_until(SlotState::Empty, Stage::Capture, &stop, None)
            .unwrap();
        guard.data_mut()[0] = 7.0;
        guard.transition_to(SlotState::Filled).unwrap();

        assert_eq!(waiter.join().unwrap(), 7.0);
    }

    #[test]
    fn test_timeout_reports_starvation() {
        let slot = Slot::new(5, 4);
        let stop = StopSignal::new();

        let err = slot
            .wait_until(
                SlotState::Processed,
                Stage::Playback,
                &stop,
                Some(Duration::from_millis(10)),
            )
            .err()
            .unwrap();

        match err {
            RingshiftError::Starvation { stage, slot, waited_ms } => {
                assert_eq!(stage, Stage::Playback);
                assert_eq!(slot, 5);
                assert!(waited_ms >= 10);
            }
            other => panic!("expected starvation, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_releases_waiter() {
        let slot = Arc::new(Slot::new(0, 4));
        let stop = Arc::new(StopSignal::new());

        let waiter = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                slot.wait_until(SlotState::Processed, Stage::Playback, &stop, None)
                    .err()
            })
        };

        thread::sleep(Duration::from_millis(20));
        stop.trigger(Stage::Capture);
        slot.wake_all();

        let err = waiter.join().unwrap().unwrap();
        assert!(matches!(err, RingshiftError::Stopped { stage: Stage::Playback }));
    }

    #[test]
    fn test_deadline_holds_while_block_is_out() {
        let slot = Arc::new(Slot::new(3, 4));
        let stop = Arc::new(StopSignal::new());
        let claimed = Arc::new(std::sync::Barrier::new(2));

        let holder = {
            let slot = Arc::clone(&slot);
            let stop = Arc::clone(&stop);
            let claimed = Arc::clone(&claimed);
            thread::spawn(move || {
                let guard = slot
                    .wait_until(SlotState::Empty, Stage::Capture, &stop, None)
                    .unwrap();
                claimed.wait();
                // A device call that hangs well past the other stage's deadline
                thread::sleep(Duration::from_millis(600));
                guard.transition_to(SlotState::Filled).unwrap();
            })
        };

        claimed.wait();
        let started = Instant::now();
        let err = slot
            .wait_until(
                SlotState::Filled,
                Stage::Transform,
                &stop,
                Some(Duration::from_millis(50)),
            )
            .err()
            .unwrap();
        let returned_after = started.elapsed();

        assert!(matches!(
            err,
            RingshiftError::Starvation {
                stage: Stage::Transform,
                slot: 3,
                ..
            }
        ));
        assert!(
            returned_after < Duration::from_millis(400),
            "waited {:?} on a 50 ms deadline",
            returned_after
        );

        holder.join().unwrap();
        assert_eq!(slot.state(), SlotState::Filled);
    }

    #[test]
    fn test_claimed_slot_is_not_handed_out_twice() {
        let slot = Slot::new(0, 4);
        let stop = StopSignal::new();
        let _held = slot
            .wait_until(SlotState::Empty, Stage::Capture, &stop, None)
            .unwrap();

        let second = slot.wait_until(
            SlotState::Empty,
            Stage::Capture,
            &stop,
            Some(Duration::from_millis(20)),
        );
        assert!(matches!(
            second.err(),
            Some(RingshiftError::Starvation { .. })
        ));
    }

    #[test]
    fn test_dropped_guard_puts_block_back() {
        let slot = Slot::new(0, 4);
        let stop = StopSignal::new();

        let mut guard = slot
            .wait_until(SlotState::Empty, Stage::Capture, &stop, None)
            .unwrap();
        guard.data_mut()[0] = 2.5;
        drop(guard);

        assert_eq!(slot.state(), SlotState::Empty);
        let guard = slot
            .wait_until(SlotState::Empty, Stage::Capture, &stop, None)
            .unwrap();
        assert_eq!(guard.data(), &[2.5, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_stop_signal_keeps_first_failure() {
        let stop = StopSignal::new();
        assert!(!stop.is_triggered());
        assert_eq!(stop.first_failure(), None);

        stop.trigger(Stage::Playback);
        stop.trigger(Stage::Capture);

        assert!(stop.is_triggered());
        assert_eq!(stop.first_failure(), Some(Stage::Playback));
    }
}
