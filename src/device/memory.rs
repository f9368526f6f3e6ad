//! In-memory audio devices
//!
//! Sources and sinks that live entirely in memory. They behave like a
//! device that never drops a block: reads and writes complete immediately.

use std::sync::{Arc, Mutex};

use crate::device::{AudioHost, AudioStream, BlockReader, BlockWriter, StreamParams};
use crate::error::{Result, RingshiftError};

// ============================================================================
// Sources
// ============================================================================

/// Plays back a fixed sample vector, then silence
///
/// A microphone never runs dry, so reading past the end yields zeros
/// rather than an error.
#[derive(Debug, Clone)]
pub struct VecSource {
    samples: Vec<f32>,
    position: usize,
}

impl VecSource {
    pub fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            position: 0,
        }
    }

    /// Samples handed out so far, including padding
    pub fn position(&self) -> usize {
        self.position
    }
}

impl BlockReader for VecSource {
    fn read_block(&mut self, buffer: &mut [f32]) -> Result<()> {
        let start = self.position.min(self.samples.len());
        let available = (self.samples.len() - start).min(buffer.len());
        buffer[..available].copy_from_slice(&self.samples[start..start + available]);
        buffer[available..].fill(0.0);
        self.position += buffer.len();
        Ok(())
    }
}

/// Generate `duration_secs` of a mono sine wave
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> Vec<f32> {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    (0..num_samples)
        .map(|i| (angular_freq * i as f32).sin())
        .collect()
}

// ============================================================================
// Sink
// ============================================================================

/// Records every written block
///
/// Clones share the same recording, so a test can keep one handle while
/// the pipeline writes through another.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    recorded: Arc<Mutex<Vec<f32>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything written so far
    pub fn samples(&self) -> Vec<f32> {
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Recorded samples cut into blocks of `block_size`
    pub fn blocks(&self, block_size: usize) -> Vec<Vec<f32>> {
        self.samples()
            .chunks(block_size)
            .map(<[f32]>::to_vec)
            .collect()
    }
}

impl BlockWriter for RecordingSink {
    fn write_block(&mut self, buffer: &[f32]) -> Result<()> {
        self.recorded
            .lock()
            .map_err(|_| RingshiftError::device("recording buffer poisoned"))?
            .extend_from_slice(buffer);
        Ok(())
    }
}

// ============================================================================
// Host
// ============================================================================

/// Lifecycle calls observed on a [`MemoryStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    Opened,
    Started,
    Stopped,
    Closed,
}

/// Host handing out one in-memory stream built from a reader and writer
pub struct MemoryHost<R, W> {
    parts: Option<(R, W)>,
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl<R: BlockReader, W: BlockWriter> MemoryHost<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            parts: Some((reader, writer)),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Lifecycle calls made on the stream so far
    pub fn events(&self) -> Vec<StreamEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl<R: BlockReader, W: BlockWriter> AudioHost for MemoryHost<R, W> {
    type Stream = MemoryStream<R, W>;

    fn open_stream(&mut self, params: &StreamParams) -> Result<Self::Stream> {
        if params.block_size == 0 {
            return Err(RingshiftError::device("block size must be non-zero"));
        }
        let (reader, writer) = self
            .parts
            .take()
            .ok_or_else(|| RingshiftError::device("memory stream already opened"))?;
        let stream = MemoryStream {
            reader,
            writer,
            events: Arc::clone(&self.events),
        };
        stream.record(StreamEvent::Opened);
        Ok(stream)
    }
}

/// Stream over an in-memory reader and writer
pub struct MemoryStream<R, W> {
    reader: R,
    writer: W,
    events: Arc<Mutex<Vec<StreamEvent>>>,
}

impl<R, W> MemoryStream<R, W> {
    fn record(&self, event: StreamEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl<R: BlockReader, W: BlockWriter> AudioStream for MemoryStream<R, W> {
    type Reader = R;
    type Writer = W;

    fn start(&mut self) -> Result<()> {
        self.record(StreamEvent::Started);
        Ok(())
    }

    fn split(&mut self) -> (&mut R, &mut W) {
        (&mut self.reader, &mut self.writer)
    }

    fn stop(&mut self) -> Result<()> {
        self.record(StreamEvent::Stopped);
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.record(StreamEvent::Closed);
        Ok(())
    }
}
