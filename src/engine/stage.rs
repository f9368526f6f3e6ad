//! Pipeline stages
//!
//! The three roles run the same loop: for every block index, take the slot
//! at `index % R`, wait for the state this role consumes, do the role's
//! work on the slot data, and hand the slot on. Only the work differs.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use log::debug;

use crate::engine::ring::Ring;
use crate::engine::slot::{SlotState, StopSignal};
use crate::error::{Result, RingshiftError};

/// One of the three concurrent roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Producer: fills empty slots from the input device
    Capture,
    /// Transformer: processes filled slots in place
    Transform,
    /// Consumer: writes processed slots to the output device
    Playback,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Capture, Stage::Transform, Stage::Playback];

    /// State a slot must be in before this stage may touch it
    pub fn awaits(self) -> SlotState {
        match self {
            Stage::Capture => SlotState::Empty,
            Stage::Transform => SlotState::Filled,
            Stage::Playback => SlotState::Processed,
        }
    }

    /// State this stage leaves the slot in
    pub fn yields(self) -> SlotState {
        self.awaits().next()
    }

    /// Worker thread name
    pub fn thread_name(self) -> &'static str {
        match self {
            Stage::Capture => "ringshift-capture",
            Stage::Transform => "ringshift-transform",
            Stage::Playback => "ringshift-playback",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Capture => write!(f, "capture"),
            Stage::Transform => write!(f, "transform"),
            Stage::Playback => write!(f, "playback"),
        }
    }
}

// ============================================================================
// Progress
// ============================================================================

/// Per-stage completion counters shared by the workers
#[derive(Debug, Default)]
pub struct StageProgress {
    captured: AtomicUsize,
    transformed: AtomicUsize,
    played: AtomicUsize,
    max_lag: AtomicUsize,
}

impl StageProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn counter(&self, stage: Stage) -> &AtomicUsize {
        match stage {
            Stage::Capture => &self.captured,
            Stage::Transform => &self.transformed,
            Stage::Playback => &self.played,
        }
    }

    /// Blocks `stage` has handed on so far
    pub fn completed(&self, stage: Stage) -> usize {
        self.counter(stage).load(Ordering::SeqCst)
    }

    /// Largest number of blocks the capture stage held ahead of playback
    pub fn max_lag(&self) -> usize {
        self.max_lag.load(Ordering::SeqCst)
    }

    fn record_complete(&self, stage: Stage) {
        self.counter(stage).fetch_add(1, Ordering::SeqCst);
    }

    /// Called by capture once it owns the slot for block `index`
    fn record_capture_start(&self, index: usize) {
        let in_flight = index + 1 - self.completed(Stage::Playback);
        self.max_lag.fetch_max(in_flight, Ordering::SeqCst);
    }
}

// ============================================================================
// Worker Loop
// ============================================================================

/// Everything a worker borrows from the driver
pub struct StageContext<'a> {
    pub ring: &'a Ring,
    pub stop: &'a StopSignal,
    pub progress: &'a StageProgress,
    pub total_blocks: usize,
    pub wait_timeout: Option<Duration>,
}

/// Raises the stop signal if the worker unwinds, so the other stages do
/// not wait on a slot that will never move.
struct PanicTripwire<'a> {
    stage: Stage,
    ring: &'a Ring,
    stop: &'a StopSignal,
}

impl Drop for PanicTripwire<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.stop.trigger(self.stage);
            self.ring.wake_all();
        }
    }
}

/// Run `stage` for every block, calling `work(index, data)` on each slot
///
/// On failure the stop signal is raised for `stage` and every slot is
/// woken, then the error is returned. A stage released by someone else's
/// failure returns `Stopped` without raising the signal again.
pub fn run_stage<F>(stage: Stage, ctx: &StageContext<'_>, mut work: F) -> Result<()>
where
    F: FnMut(usize, &mut [f32]) -> Result<()>,
{
    let _tripwire = PanicTripwire {
        stage,
        ring: ctx.ring,
        stop: ctx.stop,
    };

    let result = (0..ctx.total_blocks).try_for_each(|index| {
        let slot = ctx.ring.slot_for(index);
        let mut guard = slot.wait_until(stage.awaits(), stage, ctx.stop, ctx.wait_timeout)?;

        if stage == Stage::Capture {
            ctx.progress.record_capture_start(index);
        }

        work(index, guard.data_mut())?;

        // Counted before the hand-off so the next owner sees it under the lock.
        ctx.progress.record_complete(stage);
        guard.transition_to(stage.yields())
    });

    match result {
        Ok(()) => {
            debug!("{} finished {} blocks", stage, ctx.total_blocks);
            Ok(())
        }
        Err(err @ RingshiftError::Stopped { .. }) => Err(err),
        Err(err) => {
            ctx.stop.trigger(stage);
            ctx.ring.wake_all();
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_handoffs_form_the_slot_cycle() {
        for stage in Stage::ALL {
            assert_eq!(stage.awaits().next(), stage.yields());
        }
        assert_eq!(Stage::Capture.yields(), Stage::Transform.awaits());
        assert_eq!(Stage::Transform.yields(), Stage::Playback.awaits());
        assert_eq!(Stage::Playback.yields(), Stage::Capture.awaits());
    }

    #[test]
    fn test_single_threaded_round_through_ring() {
        let ring = Ring::new(2, 4);
        let stop = StopSignal::new();
        let progress = StageProgress::new();
        let ctx = StageContext {
            ring: &ring,
            stop: &stop,
            progress: &progress,
            total_blocks: 2,
            wait_timeout: None,
        };

        // Depth 2 holds two blocks, so each stage can run to completion in turn.
        run_stage(Stage::Capture, &ctx, |i, data| {
            data.fill(i as f32);
            Ok(())
        })
        .unwrap();
        run_stage(Stage::Transform, &ctx, |_, data| {
            data.iter_mut().for_each(|s| *s *= 10.0);
            Ok(())
        })
        .unwrap();

        let mut seen = Vec::new();
        run_stage(Stage::Playback, &ctx, |_, data| {
            seen.push(data[0]);
            Ok(())
        })
        .unwrap();

        assert_eq!(seen, vec![0.0, 10.0]);
        assert_eq!(progress.completed(Stage::Playback), 2);
        assert_eq!(progress.max_lag(), 2);
    }

    #[test]
    fn test_work_error_raises_stop() {
        let ring = Ring::new(1, 4);
        let stop = StopSignal::new();
        let progress = StageProgress::new();
        let ctx = StageContext {
            ring: &ring,
            stop: &stop,
            progress: &progress,
            total_blocks: 3,
            wait_timeout: None,
        };

        let err = run_stage(Stage::Capture, &ctx, |_, _| {
            Err(RingshiftError::device("input vanished"))
        })
        .unwrap_err();

        assert_eq!(err.error_code(), "DEVICE_FATAL");
        assert_eq!(stop.first_failure(), Some(Stage::Capture));
        assert_eq!(progress.completed(Stage::Capture), 0);
    }
}
