//! WAV file devices
//!
//! Treats a mono WAV file as the capture device and writes playback to a
//! 32-bit float WAV file. With pacing enabled, reads are held back to the
//! block deadline so the pipeline runs against a wall clock the way it
//! would against real hardware.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use hound::{SampleFormat as WavSampleFormat, WavIntoSamples, WavSpec};
use log::debug;

use crate::device::{AudioHost, AudioStream, BlockReader, BlockWriter, StreamParams};
use crate::error::{Result, RingshiftError};

type FileSamples<S> = WavIntoSamples<BufReader<File>, S>;

fn wav_device_error(context: &str, err: hound::Error) -> RingshiftError {
    RingshiftError::Device {
        reason: format!("{}: {}", context, err),
        source: Some(Box::new(err)),
    }
}

// ============================================================================
// Host
// ============================================================================

/// Opens a stream reading one WAV file and writing another
#[derive(Debug, Clone)]
pub struct WavHost {
    input: PathBuf,
    output: PathBuf,
    realtime: bool,
}

impl WavHost {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            realtime: false,
        }
    }

    /// Pace capture to one block per block period
    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

impl AudioHost for WavHost {
    type Stream = WavStream;

    fn open_stream(&mut self, params: &StreamParams) -> Result<WavStream> {
        if params.input_channels != 1 || params.output_channels != 1 {
            return Err(RingshiftError::UnsupportedFormat {
                format: format!(
                    "{} in / {} out channels (only mono supported)",
                    params.input_channels, params.output_channels
                ),
            });
        }

        let reader = WavBlockReader::open(&self.input, params.sample_rate)?;
        let reader = if self.realtime {
            let period =
                Duration::from_secs_f64(params.block_size as f64 / params.sample_rate as f64);
            reader.paced(period)
        } else {
            reader
        };
        let writer = WavBlockWriter::create(&self.output, params.sample_rate)?;

        debug!(
            "Opened WAV stream {} -> {} at {} Hz",
            self.input.display(),
            self.output.display(),
            params.sample_rate
        );

        Ok(WavStream { reader, writer })
    }
}

/// Duplex stream over a WAV input and a WAV output
pub struct WavStream {
    reader: WavBlockReader,
    writer: WavBlockWriter,
}

impl AudioStream for WavStream {
    type Reader = WavBlockReader;
    type Writer = WavBlockWriter;

    fn start(&mut self) -> Result<()> {
        self.reader.restart_clock();
        Ok(())
    }

    fn split(&mut self) -> (&mut WavBlockReader, &mut WavBlockWriter) {
        (&mut self.reader, &mut self.writer)
    }

    fn stop(&mut self) -> Result<()> {
        self.writer.flush()
    }

    fn close(self) -> Result<()> {
        self.writer.finalize()
    }
}

// ============================================================================
// Reader
// ============================================================================

enum SampleStream {
    Float(FileSamples<f32>),
    /// Integer samples with the divisor mapping full scale to 1.0
    Int(FileSamples<i32>, f32),
}

/// Capture half: yields the file's samples, then silence
pub struct WavBlockReader {
    samples: SampleStream,
    exhausted: bool,
    clock: Option<BlockClock>,
}

impl WavBlockReader {
    /// Open a mono WAV file whose rate must equal `sample_rate`
    pub fn open(path: &Path, sample_rate: u32) -> Result<Self> {
        if !path.exists() {
            return Err(RingshiftError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let reader = hound::WavReader::open(path).map_err(|e| RingshiftError::InvalidAudio {
            reason: format!("Failed to open WAV file: {}", e),
            source: Some(Box::new(e)),
        })?;

        let spec = reader.spec();
        if spec.channels != 1 {
            return Err(RingshiftError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono supported)", spec.channels),
            });
        }
        if spec.sample_rate != sample_rate {
            return Err(RingshiftError::invalid_config(format!(
                "input is {} Hz but the stream runs at {} Hz",
                spec.sample_rate, sample_rate
            )));
        }

        let samples = match (spec.sample_format, spec.bits_per_sample) {
            (WavSampleFormat::Float, 32) => SampleStream::Float(reader.into_samples()),
            (WavSampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
                let full_scale = (1u64 << (bits - 1)) as f32;
                SampleStream::Int(reader.into_samples(), full_scale)
            }
            (format, bits) => {
                return Err(RingshiftError::UnsupportedFormat {
                    format: format!("{}-bit {:?} audio", bits, format),
                })
            }
        };

        Ok(Self {
            samples,
            exhausted: false,
            clock: None,
        })
    }

    /// Hold every read back to the next `period` boundary
    pub fn paced(mut self, period: Duration) -> Self {
        self.clock = Some(BlockClock::new(period));
        self
    }

    fn restart_clock(&mut self) {
        if let Some(clock) = self.clock.as_mut() {
            clock.restart();
        }
    }

    fn next_sample(&mut self) -> Result<Option<f32>> {
        let next = match &mut self.samples {
            SampleStream::Float(iter) => iter.next(),
            SampleStream::Int(iter, full_scale) => {
                let full_scale = *full_scale;
                iter.next().map(|s| s.map(|v| v as f32 / full_scale))
            }
        };
        next.transpose()
            .map_err(|e| wav_device_error("Failed to read input sample", e))
    }
}

impl BlockReader for WavBlockReader {
    fn read_block(&mut self, buffer: &mut [f32]) -> Result<()> {
        if let Some(clock) = self.clock.as_mut() {
            clock.wait_for_next();
        }

        for sample in buffer.iter_mut() {
            *sample = if self.exhausted {
                0.0
            } else {
                match self.next_sample()? {
                    Some(value) => value,
                    None => {
                        debug!("WAV input exhausted, padding with silence");
                        self.exhausted = true;
                        0.0
                    }
                }
            };
        }
        Ok(())
    }
}

/// Emulated device clock: one block per period
struct BlockClock {
    period: Duration,
    next_deadline: Option<Instant>,
}

impl BlockClock {
    fn new(period: Duration) -> Self {
        Self {
            period,
            next_deadline: None,
        }
    }

    fn restart(&mut self) {
        self.next_deadline = None;
    }

    fn wait_for_next(&mut self) {
        let now = Instant::now();
        let deadline = *self.next_deadline.get_or_insert(now);
        if deadline > now {
            thread::sleep(deadline - now);
        }
        self.next_deadline = Some(deadline + self.period);
    }
}

// ============================================================================
// Writer
// ============================================================================

/// Playback half: appends blocks to a 32-bit float mono WAV file
pub struct WavBlockWriter {
    writer: hound::WavWriter<BufWriter<File>>,
}

impl WavBlockWriter {
    pub fn create(path: &Path, sample_rate: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 32,
            sample_format: WavSampleFormat::Float,
        };
        let writer = hound::WavWriter::create(path, spec)
            .map_err(|e| wav_device_error("Failed to create output WAV", e))?;
        Ok(Self { writer })
    }

    /// Push buffered samples and update the header
    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| wav_device_error("Failed to flush output WAV", e))
    }

    /// Write the final header; the file is incomplete until this runs
    pub fn finalize(self) -> Result<()> {
        self.writer
            .finalize()
            .map_err(|e| wav_device_error("Failed to finalize output WAV", e))
    }
}

impl BlockWriter for WavBlockWriter {
    fn write_block(&mut self, buffer: &[f32]) -> Result<()> {
        for &sample in buffer {
            self.writer
                .write_sample(sample)
                .map_err(|e| wav_device_error("Failed to write output sample", e))?;
        }
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Write `samples` as a 32-bit float mono WAV file
pub fn write_mono_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let mut writer = WavBlockWriter::create(path, sample_rate)?;
    writer.write_block(samples)?;
    writer.finalize()
}

/// Header facts about a WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    /// Samples per channel
    pub frames: usize,
}

/// Read a WAV file's header without decoding its samples
pub fn probe_wav(path: &Path) -> Result<WavInfo> {
    if !path.exists() {
        return Err(RingshiftError::FileNotFound {
            path: path.display().to_string(),
        });
    }
    let reader = hound::WavReader::open(path).map_err(|e| RingshiftError::InvalidAudio {
        reason: format!("Failed to open WAV file: {}", e),
        source: Some(Box::new(e)),
    })?;
    let spec = reader.spec();
    Ok(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        frames: reader.duration() as usize,
    })
}

/// Read a mono WAV file fully into memory
pub fn read_mono_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let sample_rate = probe_wav(path)?.sample_rate;

    let mut reader = WavBlockReader::open(path, sample_rate)?;
    let mut samples = Vec::new();
    while let Some(sample) = reader.next_sample()? {
        samples.push(sample);
    }
    Ok((samples, sample_rate))
}
