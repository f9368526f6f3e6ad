//! Block transform trait
//!
//! The transform stage applies one of these to every block, in place.

/// A per-block signal transformation
///
/// Implementations may keep state between blocks (filter history, FFT
/// frames) but must finish each call within one block period to keep the
/// pipeline from stalling.
pub trait BlockTransform: Send {
    /// Transform `block` in place
    fn process(&mut self, block: &mut [f32]);

    /// Prepare for a stream of `block_size` blocks at `sample_rate`
    fn prepare(&mut self, _sample_rate: u32, _block_size: usize) {}

    /// Clear any internal state
    fn reset(&mut self) {}

    /// Samples of delay the transform adds
    fn latency_samples(&self) -> usize {
        0
    }

    /// Get the transform type identifier
    fn transform_type(&self) -> &'static str;

    /// Get human-readable display name
    fn display_name(&self) -> &str;
}

impl<T: BlockTransform + ?Sized> BlockTransform for Box<T> {
    fn process(&mut self, block: &mut [f32]) {
        (**self).process(block)
    }

    fn prepare(&mut self, sample_rate: u32, block_size: usize) {
        (**self).prepare(sample_rate, block_size)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn latency_samples(&self) -> usize {
        (**self).latency_samples()
    }

    fn transform_type(&self) -> &'static str {
        (**self).transform_type()
    }

    fn display_name(&self) -> &str {
        (**self).display_name()
    }
}

impl<T: BlockTransform + ?Sized> BlockTransform for &mut T {
    fn process(&mut self, block: &mut [f32]) {
        (**self).process(block)
    }

    fn prepare(&mut self, sample_rate: u32, block_size: usize) {
        (**self).prepare(sample_rate, block_size)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn latency_samples(&self) -> usize {
        (**self).latency_samples()
    }

    fn transform_type(&self) -> &'static str {
        (**self).transform_type()
    }

    fn display_name(&self) -> &str {
        (**self).display_name()
    }
}

/// Identity transform
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl BlockTransform for Passthrough {
    fn process(&mut self, _block: &mut [f32]) {}

    fn transform_type(&self) -> &'static str {
        "passthrough"
    }

    fn display_name(&self) -> &str {
        "Passthrough"
    }
}

/// Adapts a closure into a [`BlockTransform`]
pub struct FnTransform<F> {
    name: String,
    func: F,
}

impl<F> FnTransform<F>
where
    F: FnMut(&mut [f32]) + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> BlockTransform for FnTransform<F>
where
    F: FnMut(&mut [f32]) + Send,
{
    fn process(&mut self, block: &mut [f32]) {
        (self.func)(block)
    }

    fn transform_type(&self) -> &'static str {
        "closure"
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}
