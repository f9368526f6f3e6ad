//! Audio device capability
//!
//! The pipeline never talks to hardware directly. It needs a host that can
//! open a duplex stream, and a stream that can be started, stopped, closed,
//! and split into a capture half and a playback half so the capture and
//! playback stages each own one.
//!
//! Implementations:
//! - [`memory`] - in-memory sources and sinks for tests and dry runs
//! - [`wav`] - WAV file input and output, optionally paced in real time

pub mod memory;
pub mod wav;

pub use memory::{
    generate_test_tone, MemoryHost, MemoryStream, RecordingSink, StreamEvent, VecSource,
};
pub use wav::{
    probe_wav, read_mono_wav, write_mono_wav, WavBlockReader, WavBlockWriter, WavHost, WavInfo,
    WavStream,
};

use crate::engine::PipelineConfig;
use crate::error::Result;

/// Sample encoding on the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// 32-bit float, nominally in [-1.0, 1.0]
    #[default]
    Float32,
}

/// Parameters for opening a stream
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamParams {
    pub input_channels: u16,
    pub output_channels: u16,
    pub sample_format: SampleFormat,
    pub sample_rate: u32,
    /// Frames per read/write call
    pub block_size: usize,
}

impl StreamParams {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            input_channels: config.input_channels,
            output_channels: config.output_channels,
            sample_format: SampleFormat::Float32,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
        }
    }
}

/// Capture side of a stream
pub trait BlockReader: Send {
    /// Block until `buffer` is completely filled with the next samples
    ///
    /// An error is fatal to the run; there is no retry.
    fn read_block(&mut self, buffer: &mut [f32]) -> Result<()>;
}

/// Playback side of a stream
pub trait BlockWriter: Send {
    /// Block until every sample of `buffer` has been consumed
    fn write_block(&mut self, buffer: &[f32]) -> Result<()>;
}

/// An open duplex stream
pub trait AudioStream {
    type Reader: BlockReader;
    type Writer: BlockWriter;

    fn start(&mut self) -> Result<()>;

    /// Borrow both halves at once, one per stage
    fn split(&mut self) -> (&mut Self::Reader, &mut Self::Writer);

    fn stop(&mut self) -> Result<()>;

    /// Release the stream, flushing anything the device still buffers
    fn close(self) -> Result<()>;
}

/// Something that can open duplex streams
pub trait AudioHost {
    type Stream: AudioStream;

    fn open_stream(&mut self, params: &StreamParams) -> Result<Self::Stream>;
}

impl<R: BlockReader + ?Sized> BlockReader for &mut R {
    fn read_block(&mut self, buffer: &mut [f32]) -> Result<()> {
        (**self).read_block(buffer)
    }
}

impl<W: BlockWriter + ?Sized> BlockWriter for &mut W {
    fn write_block(&mut self, buffer: &[f32]) -> Result<()> {
        (**self).write_block(buffer)
    }
}

impl<R: BlockReader + ?Sized> BlockReader for Box<R> {
    fn read_block(&mut self, buffer: &mut [f32]) -> Result<()> {
        (**self).read_block(buffer)
    }
}

impl<W: BlockWriter + ?Sized> BlockWriter for Box<W> {
    fn write_block(&mut self, buffer: &[f32]) -> Result<()> {
        (**self).write_block(buffer)
    }
}
