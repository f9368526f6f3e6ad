//! Pipeline configuration
//!
//! Everything fixed before a run starts: stream format, ring depth, run
//! length, and the pitch shifter's parameters. Loadable from JSON; any
//! field left out takes its default.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RingshiftError};

/// Smallest FFT frame the pitch shifter accepts
pub const MIN_WINDOW_SIZE: usize = 2;

/// Largest supported FFT frame for the pitch shifter
pub const MAX_WINDOW_SIZE: usize = 8192;

/// How long a run lasts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLength {
    /// Wall-clock duration at the configured sample rate
    Seconds(f64),
    /// Exact number of blocks
    Blocks(usize),
}

impl Default for RunLength {
    fn default() -> Self {
        RunLength::Seconds(60.0)
    }
}

/// Phase vocoder settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PitchShiftParams {
    /// Pitch ratio; 2.0 is one octave up, 0.5 one octave down
    pub ratio: f32,
    /// FFT frame length in samples (power of two)
    pub window_size: usize,
    /// Overlap factor: frames advance by `window_size / oversampling`
    pub oversampling: usize,
}

impl Default for PitchShiftParams {
    fn default() -> Self {
        Self {
            ratio: 2.0,
            window_size: 1024,
            oversampling: 32,
        }
    }
}

/// Configuration for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Samples per block (B)
    pub block_size: usize,
    /// Number of ring slots (R)
    pub ring_depth: usize,
    pub input_channels: u16,
    pub output_channels: u16,
    pub run_length: RunLength,
    /// Longest a stage may wait on one slot; `None` waits forever
    pub starvation_timeout_ms: Option<u64>,
    pub pitch_shift: PitchShiftParams,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 256,
            ring_depth: 10,
            input_channels: 1,
            output_channels: 1,
            run_length: RunLength::default(),
            starvation_timeout_ms: Some(2000),
            pitch_shift: PitchShiftParams::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RingshiftError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Pretty-printed JSON form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_run_length(mut self, run_length: RunLength) -> Self {
        self.run_length = run_length;
        self
    }

    pub fn with_ring_depth(mut self, ring_depth: usize) -> Self {
        self.ring_depth = ring_depth;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_starvation_timeout(mut self, timeout_ms: Option<u64>) -> Self {
        self.starvation_timeout_ms = timeout_ms;
        self
    }

    /// Total blocks the run will move through the ring
    ///
    /// Durations round down to whole blocks.
    pub fn total_blocks(&self) -> usize {
        match self.run_length {
            RunLength::Blocks(blocks) => blocks,
            RunLength::Seconds(secs) => {
                if self.block_size == 0 || !secs.is_finite() || secs <= 0.0 {
                    return 0;
                }
                let samples = (secs * self.sample_rate as f64) as usize;
                samples / self.block_size
            }
        }
    }

    /// Real-time duration of one block
    pub fn block_period(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.block_size as f64 / self.sample_rate as f64)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.starvation_timeout_ms.map(Duration::from_millis)
    }

    /// Check every field before anything is allocated or spawned
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(RingshiftError::invalid_config("sample_rate must be non-zero"));
        }
        if self.block_size == 0 {
            return Err(RingshiftError::invalid_config("block_size must be non-zero"));
        }
        if self.ring_depth == 0 {
            return Err(RingshiftError::invalid_config("ring_depth must be at least 1"));
        }
        if self.input_channels != 1 || self.output_channels != 1 {
            return Err(RingshiftError::invalid_config(format!(
                "only mono streams are supported (got {} in, {} out)",
                self.input_channels, self.output_channels
            )));
        }
        if let RunLength::Seconds(secs) = self.run_length {
            if !secs.is_finite() || secs < 0.0 {
                return Err(RingshiftError::invalid_config(format!(
                    "run duration must be a non-negative number of seconds, got {}",
                    secs
                )));
            }
        }
        if self.total_blocks() == 0 {
            return Err(RingshiftError::invalid_config(
                "run length is shorter than one block",
            ));
        }
        if let Some(timeout) = self.wait_timeout() {
            // Paced downstream stages wait about one block period per block.
            let floor = 2 * self.block_period();
            if timeout <= floor {
                return Err(RingshiftError::invalid_config(format!(
                    "starvation_timeout_ms must be null or longer than two block periods ({:.1} ms), got {}",
                    floor.as_secs_f64() * 1000.0,
                    timeout.as_millis()
                )));
            }
        }
        self.pitch_shift.validate()
    }
}

impl PitchShiftParams {
    /// Check the vocoder parameters; the pitch shifter refuses anything
    /// this rejects
    pub fn validate(&self) -> Result<()> {
        if !self.ratio.is_finite() || self.ratio <= 0.0 {
            return Err(RingshiftError::invalid_config(format!(
                "pitch ratio must be positive, got {}",
                self.ratio
            )));
        }
        if !self.window_size.is_power_of_two()
            || !(MIN_WINDOW_SIZE..=MAX_WINDOW_SIZE).contains(&self.window_size)
        {
            return Err(RingshiftError::invalid_config(format!(
                "pitch window must be a power of two from {} to {}, got {}",
                MIN_WINDOW_SIZE, MAX_WINDOW_SIZE, self.window_size
            )));
        }
        if self.oversampling == 0 || self.window_size % self.oversampling != 0 {
            return Err(RingshiftError::invalid_config(format!(
                "oversampling {} must be non-zero and divide the window size {}",
                self.oversampling, self.window_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_setup() {
        let config = PipelineConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 256);
        assert_eq!(config.ring_depth, 10);
        // 60 s * 44100 / 256, rounded down
        assert_eq!(config.total_blocks(), 10335);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_explicit_block_count() {
        let config = PipelineConfig::default().with_run_length(RunLength::Blocks(5));
        assert_eq!(config.total_blocks(), 5);
    }

    #[test]
    fn test_block_period() {
        let config = PipelineConfig::default();
        let period = config.block_period().as_secs_f64();
        assert!((period - 256.0 / 44100.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_zero_depth() {
        let err = PipelineConfig::default()
            .with_ring_depth(0)
            .validate()
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_rejects_zero_block_size() {
        assert!(PipelineConfig::default()
            .with_block_size(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_rejects_empty_run() {
        let blocks = PipelineConfig::default().with_run_length(RunLength::Blocks(0));
        assert!(blocks.validate().is_err());

        let too_short = PipelineConfig::default().with_run_length(RunLength::Seconds(0.001));
        assert_eq!(too_short.total_blocks(), 0);
        assert!(too_short.validate().is_err());

        let negative = PipelineConfig::default().with_run_length(RunLength::Seconds(-1.0));
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_pitch_params() {
        let mut config = PipelineConfig::default();
        config.pitch_shift.window_size = 1000;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.pitch_shift.oversampling = 3;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.pitch_shift.ratio = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_window_below_two() {
        let mut config = PipelineConfig::default();
        config.pitch_shift.window_size = 1;
        config.pitch_shift.oversampling = 1;
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");

        config.pitch_shift.window_size = MIN_WINDOW_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_must_outlast_block_period() {
        // 256 samples at 8 kHz is a 32 ms block period
        let mut config = PipelineConfig::default().with_run_length(RunLength::Blocks(8));
        config.sample_rate = 8000;

        for too_short in [0, 10, 32, 63] {
            let err = config
                .clone()
                .with_starvation_timeout(Some(too_short))
                .validate()
                .unwrap_err();
            assert_eq!(err.error_code(), "INVALID_CONFIG", "{} ms", too_short);
        }

        assert!(config
            .clone()
            .with_starvation_timeout(Some(65))
            .validate()
            .is_ok());
        assert!(config.with_starvation_timeout(None).validate().is_ok());
    }

    #[test]
    fn test_rejects_stereo() {
        let mut config = PipelineConfig::default();
        config.input_channels = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let json = r#"{ "ring_depth": 4, "run_length": { "blocks": 12 }, "pitch_shift": { "ratio": 0.5 } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.ring_depth, 4);
        assert_eq!(config.total_blocks(), 12);
        assert_eq!(config.pitch_shift.ratio, 0.5);
        assert_eq!(config.pitch_shift.window_size, 1024);
        assert_eq!(config.block_size, 256);
    }

    #[test]
    fn test_null_timeout_disables_deadline() {
        let json = r#"{ "starvation_timeout_ms": null }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.wait_timeout(), None);
    }

    #[test]
    fn test_json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let config = PipelineConfig::default().with_ring_depth(3);
        std::fs::write(&path, config.to_json().unwrap()).unwrap();

        let loaded = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_config_file() {
        let err = PipelineConfig::from_json_file(Path::new("/no/such/config.json")).unwrap_err();
        assert_eq!(err.error_code(), "FILE_NOT_FOUND");
    }
}
