//! Pipeline engine
//!
//! The staged ring-buffer core:
//! - Slot state machine and stop signal
//! - Ring of slots owned by the driver
//! - Stage worker loop shared by capture, transform and playback
//! - Pipeline driver and run report
//! - Single-threaded baseline

pub mod baseline;
pub mod config;
pub mod pipeline;
pub mod ring;
pub mod slot;
pub mod stage;

pub use baseline::run_sequential;
pub use config::{PipelineConfig, PitchShiftParams, RunLength, MAX_WINDOW_SIZE, MIN_WINDOW_SIZE};
pub use pipeline::{Pipeline, PipelineReport};
pub use ring::Ring;
pub use slot::{Slot, SlotGuard, SlotState, StopSignal};
pub use stage::{run_stage, Stage, StageContext, StageProgress};
