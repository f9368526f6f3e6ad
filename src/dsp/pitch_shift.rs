//! Phase vocoder pitch shifter
//!
//! Short-time Fourier analysis with a Hann window, bin-wise frequency
//! estimation from the phase advance between frames, spectral bins moved by
//! the pitch ratio, and overlap-add resynthesis. Works on any block size:
//! input is pushed through a FIFO and a new frame is analysed every
//! `window_size / oversampling` samples, so the shifter delays the signal by
//! `window_size - window_size / oversampling` samples.

use std::f64::consts::{PI, TAU};
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::dsp::BlockTransform;
use crate::engine::config::PitchShiftParams;
use crate::error::{Result, RingshiftError};

/// Pitch shifter holding its analysis state across blocks
pub struct PitchShifter {
    params: PitchShiftParams,
    sample_rate: u32,
    name: String,

    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    window: Vec<f32>,

    in_fifo: Vec<f32>,
    out_fifo: Vec<f32>,
    output_accum: Vec<f32>,
    last_phase: Vec<f64>,
    sum_phase: Vec<f64>,
    ana_magn: Vec<f64>,
    ana_freq: Vec<f64>,
    syn_magn: Vec<f64>,
    syn_freq: Vec<f64>,
    /// Write position in `in_fifo`
    rover: usize,
}

impl PitchShifter {
    pub fn new(params: PitchShiftParams, sample_rate: u32) -> Result<Self> {
        params.validate()?;
        if sample_rate == 0 {
            return Err(RingshiftError::invalid_config("sample_rate must be non-zero"));
        }

        let frame = params.window_size;
        let half = frame / 2;
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(frame);
        let inverse = planner.plan_fft_inverse(frame);
        let scratch_len = forward
            .get_inplace_scratch_len()
            .max(inverse.get_inplace_scratch_len());

        let window = (0..frame)
            .map(|k| (-0.5 * (TAU * k as f64 / frame as f64).cos() + 0.5) as f32)
            .collect();

        let mut shifter = Self {
            params,
            sample_rate,
            name: format!("Pitch Shift x{}", params.ratio),
            forward,
            inverse,
            spectrum: vec![Complex::new(0.0, 0.0); frame],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            window,
            in_fifo: vec![0.0; frame],
            out_fifo: vec![0.0; frame],
            output_accum: vec![0.0; 2 * frame],
            last_phase: vec![0.0; half + 1],
            sum_phase: vec![0.0; half + 1],
            ana_magn: vec![0.0; half + 1],
            ana_freq: vec![0.0; half + 1],
            syn_magn: vec![0.0; half + 1],
            syn_freq: vec![0.0; half + 1],
            rover: 0,
        };
        shifter.reset();
        Ok(shifter)
    }

    pub fn params(&self) -> PitchShiftParams {
        self.params
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn step(&self) -> usize {
        self.params.window_size / self.params.oversampling
    }

    /// Analyse, shift and resynthesise the frame currently in `in_fifo`
    fn process_frame(&mut self) {
        let frame = self.params.window_size;
        let half = frame / 2;
        let step = self.step();
        let osamp = self.params.oversampling as f64;
        let ratio = self.params.ratio as f64;
        let freq_per_bin = self.sample_rate as f64 / frame as f64;
        let expected_advance = TAU * step as f64 / frame as f64;

        for (bin, (&sample, &w)) in self
            .spectrum
            .iter_mut()
            .zip(self.in_fifo.iter().zip(&self.window))
        {
            *bin = Complex::new(sample * w, 0.0);
        }
        self.forward
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        // Analysis: true frequency of each bin from its phase advance.
        for k in 0..=half {
            let re = self.spectrum[k].re as f64;
            let im = self.spectrum[k].im as f64;
            let magnitude = 2.0 * (re * re + im * im).sqrt();
            let phase = im.atan2(re);

            let mut delta = phase - self.last_phase[k];
            self.last_phase[k] = phase;
            delta -= k as f64 * expected_advance;

            let mut wraps = (delta / PI) as i64;
            if wraps >= 0 {
                wraps += wraps & 1;
            } else {
                wraps -= wraps & 1;
            }
            delta -= PI * wraps as f64;

            let deviation = osamp * delta / TAU;
            self.ana_magn[k] = magnitude;
            self.ana_freq[k] = (k as f64 + deviation) * freq_per_bin;
        }

        // Move each bin to its shifted position.
        self.syn_magn.fill(0.0);
        self.syn_freq.fill(0.0);
        for k in 0..=half {
            let target = (k as f64 * ratio) as usize;
            if target <= half {
                self.syn_magn[target] += self.ana_magn[k];
                self.syn_freq[target] = self.ana_freq[k] * ratio;
            }
        }

        // Synthesis: accumulate phase from the shifted frequencies.
        for k in 0..=half {
            let deviation = self.syn_freq[k] / freq_per_bin - k as f64;
            let advance = TAU * deviation / osamp + k as f64 * expected_advance;
            self.sum_phase[k] = (self.sum_phase[k] + advance).rem_euclid(TAU);
            let phase = self.sum_phase[k];
            let magnitude = self.syn_magn[k];
            self.spectrum[k] = Complex::new(
                (magnitude * phase.cos()) as f32,
                (magnitude * phase.sin()) as f32,
            );
        }
        for bin in &mut self.spectrum[half + 1..] {
            *bin = Complex::new(0.0, 0.0);
        }
        self.inverse
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = (half as f64 * osamp) as f32;
        for k in 0..frame {
            self.output_accum[k] += 2.0 * self.window[k] * self.spectrum[k].re / scale;
        }
        self.out_fifo[..step].copy_from_slice(&self.output_accum[..step]);

        self.output_accum.copy_within(step..step + frame, 0);
        self.in_fifo.copy_within(step..frame, 0);
    }
}

impl BlockTransform for PitchShifter {
    fn process(&mut self, block: &mut [f32]) {
        let latency = self.latency_samples();
        for sample in block.iter_mut() {
            self.in_fifo[self.rover] = *sample;
            *sample = self.out_fifo[self.rover - latency];
            self.rover += 1;

            if self.rover >= self.params.window_size {
                self.rover = latency;
                self.process_frame();
            }
        }
    }

    fn prepare(&mut self, sample_rate: u32, _block_size: usize) {
        if sample_rate > 0 && sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.in_fifo.fill(0.0);
        self.out_fifo.fill(0.0);
        self.output_accum.fill(0.0);
        self.last_phase.fill(0.0);
        self.sum_phase.fill(0.0);
        self.ana_magn.fill(0.0);
        self.ana_freq.fill(0.0);
        self.syn_magn.fill(0.0);
        self.syn_freq.fill(0.0);
        self.rover = self.latency_samples();
    }

    fn latency_samples(&self) -> usize {
        self.params.window_size - self.step()
    }

    fn transform_type(&self) -> &'static str {
        "pitch-shift"
    }

    fn display_name(&self) -> &str {
        &self.name
    }
}
