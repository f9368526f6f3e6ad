//! Single-threaded reference pipeline
//!
//! Reads, transforms and writes one block at a time on the calling thread.
//! There is no overlap between stages, which makes it a baseline for
//! checking that the threaded pipeline produces the same output.

use std::time::Instant;

use log::{debug, info};

use crate::device::{BlockReader, BlockWriter};
use crate::dsp::BlockTransform;
use crate::error::{Result, RingshiftError};

/// Run `total_blocks` blocks of `block_size` samples sequentially
///
/// The transform works on a separate output buffer so the captured block
/// is never modified. Returns the number of blocks written.
pub fn run_sequential<R, T, W>(
    block_size: usize,
    total_blocks: usize,
    reader: &mut R,
    transform: &mut T,
    writer: &mut W,
) -> Result<usize>
where
    R: BlockReader + ?Sized,
    T: BlockTransform + ?Sized,
    W: BlockWriter + ?Sized,
{
    if block_size == 0 {
        return Err(RingshiftError::invalid_config("block_size must be non-zero"));
    }

    let mut input = vec![0.0f32; block_size];
    let mut output = vec![0.0f32; block_size];
    let clock = Instant::now();

    for index in 0..total_blocks {
        reader.read_block(&mut input)?;
        output.copy_from_slice(&input);
        transform.process(&mut output);
        writer.write_block(&output)?;

        if (index + 1) % 1000 == 0 {
            debug!("Baseline wrote {} of {} blocks", index + 1, total_blocks);
        }
    }

    info!(
        "Baseline finished {} blocks in {:.3}s",
        total_blocks,
        clock.elapsed().as_secs_f64()
    );
    Ok(total_blocks)
}
