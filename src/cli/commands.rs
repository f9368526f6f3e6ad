//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use anyhow::Context;
use log::{info, warn};

use crate::cli::{ConfigOverrides, RunArgs};
use crate::device::{
    generate_test_tone, probe_wav, write_mono_wav, WavBlockReader, WavBlockWriter, WavHost,
};
use crate::dsp::{BlockTransform, PitchShifter};
use crate::engine::{run_sequential, Pipeline, PipelineConfig, RunLength};

/// Load the configuration file (or defaults) and apply overrides
pub fn resolve_config(
    config_path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> crate::Result<PipelineConfig> {
    let base = match config_path {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };
    Ok(overrides.apply(base))
}

/// Resolve the configuration for processing `args.input`
///
/// Without a configuration file the sample rate follows the input file,
/// and without an explicit run length the run covers the whole file plus
/// the pitch shifter's latency.
pub fn plan_run(args: &RunArgs) -> anyhow::Result<PipelineConfig> {
    let mut config = resolve_config(args.config.as_deref(), &args.overrides)
        .context("failed to resolve configuration")?;
    let info = probe_wav(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;

    if args.config.is_none() && args.overrides.sample_rate.is_none() {
        config.sample_rate = info.sample_rate;
    }
    if args.config.is_none() && !args.overrides.sets_run_length() && config.block_size > 0 {
        let latency =
            PitchShifter::new(config.pitch_shift, config.sample_rate)?.latency_samples();
        let blocks = (info.frames + latency).div_ceil(config.block_size);
        config.run_length = RunLength::Blocks(blocks);
    }

    config.validate()?;
    Ok(config)
}

/// Pitch-shift a WAV file through the threaded pipeline.
pub fn run_pipeline(args: &RunArgs) -> anyhow::Result<()> {
    let config = plan_run(args)?;
    info!(
        "Processing {} -> {} (ratio {})",
        args.input.display(),
        args.output.display(),
        config.pitch_shift.ratio
    );

    let mut shifter = PitchShifter::new(config.pitch_shift, config.sample_rate)?;
    let pipeline = Pipeline::new(config)?;
    let mut host = WavHost::new(&args.input, &args.output).realtime(args.realtime);

    let report = pipeline
        .run_on_host(&mut host, &mut shifter)
        .context("pipeline run failed")?;

    println!("Run {}", report.run_id);
    println!(
        "  Blocks:   {} x {} samples ({:.2}s of audio)",
        report.blocks_played,
        report.block_size,
        report.audio_secs()
    );
    println!("  Elapsed:  {:.3}s", report.elapsed_secs);
    println!("  Max lag:  {} of {} slots", report.max_lag, report.ring_depth);
    if report.transform_overruns > 0 {
        warn!(
            "{} blocks took longer than one block period to transform",
            report.transform_overruns
        );
    }
    println!("  Output:   {}", args.output.display());

    if let Some(path) = &args.report {
        report
            .write_json(path)
            .with_context(|| format!("failed to write report {}", path.display()))?;
        println!("  Report:   {}", path.display());
    }

    Ok(())
}

/// Pitch-shift a WAV file on one thread.
pub fn run_baseline(args: &RunArgs) -> anyhow::Result<()> {
    let config = plan_run(args)?;
    let total_blocks = config.total_blocks();
    info!(
        "Baseline {} -> {} ({} blocks)",
        args.input.display(),
        args.output.display(),
        total_blocks
    );

    let mut shifter = PitchShifter::new(config.pitch_shift, config.sample_rate)?;
    shifter.prepare(config.sample_rate, config.block_size);

    let mut reader = WavBlockReader::open(&args.input, config.sample_rate)?;
    if args.realtime {
        reader = reader.paced(config.block_period());
    }
    let mut writer = WavBlockWriter::create(&args.output, config.sample_rate)?;

    let written = run_sequential(
        config.block_size,
        total_blocks,
        &mut reader,
        &mut shifter,
        &mut writer,
    )?;
    writer.flush()?;
    writer.finalize()?;

    println!(
        "Baseline wrote {} blocks of {} samples to {}",
        written,
        config.block_size,
        args.output.display()
    );
    Ok(())
}

/// Write a sine test tone.
pub fn write_tone(
    output: &Path,
    frequency: f32,
    duration: f32,
    sample_rate: u32,
    amplitude: f32,
) -> anyhow::Result<()> {
    if sample_rate == 0 {
        anyhow::bail!("sample rate must be non-zero");
    }
    let amplitude = amplitude.clamp(0.0, 1.0);
    let samples: Vec<f32> = generate_test_tone(frequency, duration, sample_rate)
        .into_iter()
        .map(|s| s * amplitude)
        .collect();

    write_mono_wav(output, &samples, sample_rate)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Wrote {:.2}s {} Hz tone to {}",
        duration,
        frequency,
        output.display()
    );
    Ok(())
}

/// Print the resolved configuration as JSON.
pub fn print_config(config_path: Option<&Path>, overrides: &ConfigOverrides) -> anyhow::Result<()> {
    let config = resolve_config(config_path, overrides)?;
    if let Err(err) = config.validate() {
        warn!("Configuration is not runnable: {}", err);
    }
    println!("{}", config.to_json()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::read_mono_wav;
    use crate::RingshiftError;
    use std::path::PathBuf;

    fn run_args(input: PathBuf, output: PathBuf) -> RunArgs {
        RunArgs {
            input,
            output,
            config: None,
            overrides: ConfigOverrides::default(),
            realtime: false,
            report: None,
        }
    }

    #[test]
    fn test_plan_follows_input_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_mono_wav(&input, &vec![0.0; 1000], 22050).unwrap();

        let config = plan_run(&run_args(input, dir.path().join("out.wav"))).unwrap();
        assert_eq!(config.sample_rate, 22050);
        // 1000 samples + 992 latency over 256-sample blocks
        assert_eq!(config.total_blocks(), 8);
    }

    #[test]
    fn test_plan_keeps_explicit_length() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        write_mono_wav(&input, &vec![0.0; 1000], 44100).unwrap();

        let mut args = run_args(input, dir.path().join("out.wav"));
        args.overrides.blocks = Some(3);
        assert_eq!(plan_run(&args).unwrap().total_blocks(), 3);
    }

    #[test]
    fn test_plan_reports_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let args = run_args(dir.path().join("missing.wav"), dir.path().join("out.wav"));
        let err = plan_run(&args).unwrap_err();
        let cause = err.downcast_ref::<RingshiftError>().unwrap();
        assert_eq!(cause.error_code(), "FILE_NOT_FOUND");
    }

    #[test]
    fn test_run_and_baseline_agree() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("tone.wav");
        write_tone(&input, 440.0, 0.1, 8000, 0.5).unwrap();

        let mut threaded = run_args(input.clone(), dir.path().join("threaded.wav"));
        threaded.report = Some(dir.path().join("report.json"));
        run_pipeline(&threaded).unwrap();

        let sequential = run_args(input, dir.path().join("sequential.wav"));
        run_baseline(&sequential).unwrap();

        let (a, _) = read_mono_wav(&threaded.output).unwrap();
        let (b, _) = read_mono_wav(&sequential.output).unwrap();
        assert_eq!(a, b);
        assert!(dir.path().join("report.json").exists());
    }
}
