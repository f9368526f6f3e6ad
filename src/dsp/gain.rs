//! Gain Transform
//!
//! Volume control with a dB-based interface.

use crate::dsp::BlockTransform;

// ============================================================================
// Constants
// ============================================================================

/// Minimum gain in dB (-96 dB = effectively silent)
const MIN_GAIN_DB: f32 = -96.0;

/// Maximum gain in dB (+24 dB)
const MAX_GAIN_DB: f32 = 24.0;

/// Convert decibels to linear amplitude
#[inline]
fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

// ============================================================================
// Gain
// ============================================================================

/// Simple gain adjustment
///
/// # Parameters
/// - `gain_db`: Gain in decibels (-96 to +24 dB)
#[derive(Debug, Clone)]
pub struct Gain {
    gain_db: f32,
    gain_linear: f32,
}

impl Gain {
    /// Create a new gain transform, clamping `gain_db` to the valid range
    pub fn new(gain_db: f32) -> Self {
        let clamped = gain_db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        Self {
            gain_db: clamped,
            gain_linear: db_to_linear(clamped),
        }
    }

    /// Set the gain in decibels
    pub fn set_gain_db(&mut self, db: f32) {
        self.gain_db = db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
        self.gain_linear = db_to_linear(self.gain_db);
    }

    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    pub fn gain_linear(&self) -> f32 {
        self.gain_linear
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl BlockTransform for Gain {
    fn process(&mut self, block: &mut [f32]) {
        // Unity gain optimization
        if (self.gain_linear - 1.0).abs() < f32::EPSILON {
            return;
        }

        for sample in block.iter_mut() {
            *sample *= self.gain_linear;
        }
    }

    fn transform_type(&self) -> &'static str {
        "gain"
    }

    fn display_name(&self) -> &str {
        "Gain"
    }
}
