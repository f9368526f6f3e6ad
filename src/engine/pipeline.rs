//! Pipeline driver
//!
//! Owns the ring for one run, launches the capture, transform and playback
//! stages on their own threads, joins them, and reports what happened.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use uuid::Uuid;

use crate::device::{AudioHost, AudioStream, BlockReader, BlockWriter, StreamParams};
use crate::dsp::BlockTransform;
use crate::engine::config::PipelineConfig;
use crate::engine::ring::Ring;
use crate::engine::slot::StopSignal;
use crate::engine::stage::{run_stage, Stage, StageContext, StageProgress};
use crate::error::{Result, RingshiftError};

// ============================================================================
// Report
// ============================================================================

/// Summary of one completed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub transform: String,
    pub total_blocks: usize,
    pub ring_depth: usize,
    pub block_size: usize,
    pub sample_rate: u32,
    pub blocks_captured: usize,
    pub blocks_transformed: usize,
    pub blocks_played: usize,
    /// Most blocks capture was ever ahead of playback
    pub max_lag: usize,
    /// Blocks whose transform took longer than one block period
    pub transform_overruns: usize,
    /// Completed cycles per slot, in ring order
    pub slot_cycles: Vec<u64>,
    pub elapsed_secs: f64,
}

impl PipelineReport {
    /// True when every stage handled every block
    pub fn is_complete(&self) -> bool {
        self.blocks_captured == self.total_blocks
            && self.blocks_transformed == self.total_blocks
            && self.blocks_played == self.total_blocks
    }

    /// Seconds of audio that went through the pipeline
    pub fn audio_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (self.blocks_played * self.block_size) as f64 / self.sample_rate as f64
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Threaded capture -> transform -> playback pipeline
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline, rejecting an invalid configuration up front
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Move the configured number of blocks from `reader` to `writer`
    pub fn run<R, T, W>(&self, reader: &mut R, transform: &mut T, writer: &mut W) -> Result<PipelineReport>
    where
        R: BlockReader,
        T: BlockTransform,
        W: BlockWriter,
    {
        self.run_blocks(self.config.total_blocks(), reader, transform, writer)
    }

    /// Move exactly `total_blocks` blocks; zero returns at once
    ///
    /// Each stage runs on its own named thread. The first stage to fail
    /// stops the other two, and its error is the one returned.
    pub fn run_blocks<R, T, W>(
        &self,
        total_blocks: usize,
        reader: &mut R,
        transform: &mut T,
        writer: &mut W,
    ) -> Result<PipelineReport>
    where
        R: BlockReader,
        T: BlockTransform,
        W: BlockWriter,
    {
        let config = &self.config;
        transform.prepare(config.sample_rate, config.block_size);

        let ring = Ring::new(config.ring_depth, config.block_size);
        let stop = StopSignal::new();
        let progress = StageProgress::new();
        let ctx = StageContext {
            ring: &ring,
            stop: &stop,
            progress: &progress,
            total_blocks,
            wait_timeout: config.wait_timeout(),
        };
        let block_period = config.block_period();
        let overruns = AtomicUsize::new(0);
        let transform_name = transform.display_name().to_string();

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        info!(
            "Starting run {}: {} blocks of {} samples, ring depth {}, transform '{}' ({})",
            run_id,
            total_blocks,
            config.block_size,
            config.ring_depth,
            transform_name,
            transform.transform_type()
        );

        let outcomes = thread::scope(|scope| -> Result<Vec<(Stage, thread::Result<Result<()>>)>> {
            let ctx = &ctx;
            let overruns = &overruns;
            let spawn_failed = |stage: Stage, err: std::io::Error| {
                stop.trigger(stage);
                ring.wake_all();
                RingshiftError::Io(err)
            };

            let capture = thread::Builder::new()
                .name(Stage::Capture.thread_name().to_string())
                .spawn_scoped(scope, move || {
                    run_stage(Stage::Capture, ctx, |_, data| reader.read_block(data))
                })
                .map_err(|err| spawn_failed(Stage::Capture, err))?;

            let transformer = thread::Builder::new()
                .name(Stage::Transform.thread_name().to_string())
                .spawn_scoped(scope, move || {
                    run_stage(Stage::Transform, ctx, |index, data| {
                        let began = Instant::now();
                        transform.process(data);
                        record_overrun(overruns, index, began.elapsed(), block_period);
                        Ok(())
                    })
                })
                .map_err(|err| spawn_failed(Stage::Transform, err))?;

            let playback = thread::Builder::new()
                .name(Stage::Playback.thread_name().to_string())
                .spawn_scoped(scope, move || {
                    run_stage(Stage::Playback, ctx, |_, data| writer.write_block(data))
                })
                .map_err(|err| spawn_failed(Stage::Playback, err))?;

            Ok(vec![
                (Stage::Capture, capture.join()),
                (Stage::Transform, transformer.join()),
                (Stage::Playback, playback.join()),
            ])
        })?;

        let mut failures: Vec<(Stage, RingshiftError)> = outcomes
            .into_iter()
            .filter_map(|(stage, joined)| match joined {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some((stage, err)),
                Err(_) => Some((stage, RingshiftError::WorkerPanicked { stage })),
            })
            .collect();

        if !failures.is_empty() {
            // A panicking stage never reaches its own error path, so the
            // stop signal may name a stage that only saw the fallout.
            let panicked = failures
                .iter()
                .position(|(_, err)| matches!(err, RingshiftError::WorkerPanicked { .. }));
            let root = panicked
                .or_else(|| {
                    stop.first_failure()
                        .and_then(|first| failures.iter().position(|(stage, _)| *stage == first))
                })
                .unwrap_or(0);
            let (stage, err) = failures.swap_remove(root);
            for (other, secondary) in &failures {
                debug!("{} stage also ended: {}", other, secondary);
            }
            error!("Run {} failed in {} stage: {}", run_id, stage, err);
            return Err(err);
        }

        debug_assert!(ring.is_drained(), "slots left mid-cycle after a complete run");

        let report = PipelineReport {
            run_id,
            started_at,
            transform: transform_name,
            total_blocks,
            ring_depth: ring.depth(),
            block_size: ring.block_size(),
            sample_rate: config.sample_rate,
            blocks_captured: progress.completed(Stage::Capture),
            blocks_transformed: progress.completed(Stage::Transform),
            blocks_played: progress.completed(Stage::Playback),
            max_lag: progress.max_lag(),
            transform_overruns: overruns.load(Ordering::SeqCst),
            slot_cycles: ring.cycles(),
            elapsed_secs: clock.elapsed().as_secs_f64(),
        };

        info!(
            "Finished run {}: {} blocks in {:.3}s, max lag {}/{}, {} overruns",
            run_id,
            report.blocks_played,
            report.elapsed_secs,
            report.max_lag,
            report.ring_depth,
            report.transform_overruns
        );
        Ok(report)
    }

    /// Open a stream on `host` and run the pipeline through it
    ///
    /// The stream is always stopped and closed, also when the run fails.
    /// A run failure takes precedence over a teardown failure.
    pub fn run_on_host<H, T>(&self, host: &mut H, transform: &mut T) -> Result<PipelineReport>
    where
        H: AudioHost,
        T: BlockTransform,
    {
        let params = StreamParams::from_config(&self.config);
        let mut stream = host.open_stream(&params)?;
        debug!("Opened stream: {:?}", params);

        if let Err(err) = stream.start() {
            if let Err(close_err) = stream.close() {
                warn!("Failed to close stream after start error: {}", close_err);
            }
            return Err(err);
        }

        let result = {
            let (reader, writer) = stream.split();
            self.run(reader, transform, writer)
        };

        let teardown = stream.stop().and(stream.close());
        debug!("Stream stopped and closed");

        match (result, teardown) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(err)) => Err(err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(teardown_err)) => {
                warn!("Stream teardown also failed: {}", teardown_err);
                Err(err)
            }
        }
    }
}

fn record_overrun(overruns: &AtomicUsize, index: usize, spent: Duration, budget: Duration) {
    if budget.is_zero() || spent <= budget {
        return;
    }
    let previous = overruns.fetch_add(1, Ordering::Relaxed);
    if previous == 0 {
        warn!(
            "Transform overran block {}: {:.2} ms against a {:.2} ms budget",
            index,
            spent.as_secs_f64() * 1000.0,
            budget.as_secs_f64() * 1000.0
        );
    } else {
        debug!("Transform overran block {}", index);
    }
}
