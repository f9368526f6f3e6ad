//! Ringshift - Real-Time Staged Audio Pipeline
//!
//! Streams fixed-size blocks of audio from an input device to an output
//! device through three concurrent stages:
//! 1. Capture - reads a block from the input into a free ring slot
//! 2. Transform - processes the filled slot in place (pitch shift by default)
//! 3. Playback - writes the processed slot to the output and frees it
//!
//! # Architecture
//!
//! The stages share a ring of R slots. Each slot carries its own lock,
//! condition variable and state (`EMPTY -> FILLED -> PROCESSED -> EMPTY`),
//! so capture can run at most R blocks ahead of playback.

pub mod cli;
pub mod device;
pub mod dsp;
pub mod engine;
pub mod error;

pub use engine::{Pipeline, PipelineConfig, PipelineReport};
pub use error::{Result, RingshiftError};
