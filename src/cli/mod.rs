//! CLI Module
//!
//! Command-line interface for the ringshift pipeline.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::{PipelineConfig, RunLength};

/// Ringshift - real-time staged pitch-shift pipeline
#[derive(Parser, Debug)]
#[command(name = "ringshift")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pitch-shift a WAV file through the threaded pipeline
    #[command(name = "run")]
    Run(RunArgs),

    /// Same as `run`, but on one thread with no pipelining
    #[command(name = "baseline")]
    Baseline(RunArgs),

    /// Write a sine test tone
    #[command(name = "tone")]
    Tone {
        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Tone frequency in Hz
        #[arg(short, long, default_value_t = 440.0)]
        frequency: f32,

        /// Length in seconds
        #[arg(short, long, default_value_t = 2.0)]
        duration: f32,

        #[arg(long, default_value_t = 44100)]
        sample_rate: u32,

        /// Peak amplitude, 0.0 to 1.0
        #[arg(long, default_value_t = 0.5)]
        amplitude: f32,
    },

    /// Print the resolved configuration as JSON
    #[command(name = "config")]
    Config {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConfigOverrides,
    },
}

/// Arguments shared by `run` and `baseline`
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Input WAV file (mono)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output WAV file
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    /// Pace capture to the sample rate, like a hardware input
    #[arg(long)]
    pub realtime: bool,

    /// Write the run report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Command-line overrides applied on top of the configuration file
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// Pitch ratio (2.0 = octave up)
    #[arg(long)]
    pub ratio: Option<f32>,

    /// Number of ring slots
    #[arg(long)]
    pub ring_depth: Option<usize>,

    /// Samples per block
    #[arg(long)]
    pub block_size: Option<usize>,

    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Run length in seconds
    #[arg(long, conflicts_with = "blocks")]
    pub seconds: Option<f64>,

    /// Run length in blocks
    #[arg(long)]
    pub blocks: Option<usize>,

    /// Slot wait deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

impl ConfigOverrides {
    pub fn apply(&self, mut config: PipelineConfig) -> PipelineConfig {
        if let Some(ratio) = self.ratio {
            config.pitch_shift.ratio = ratio;
        }
        if let Some(depth) = self.ring_depth {
            config.ring_depth = depth;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(secs) = self.seconds {
            config.run_length = RunLength::Seconds(secs);
        }
        if let Some(blocks) = self.blocks {
            config.run_length = RunLength::Blocks(blocks);
        }
        if let Some(timeout) = self.timeout_ms {
            config.starvation_timeout_ms = Some(timeout);
        }
        config
    }

    /// True if the run length was given on the command line
    pub fn sets_run_length(&self) -> bool {
        self.seconds.is_some() || self.blocks.is_some()
    }
}
