//! WAV Session Tests
//!
//! Runs the pipeline against WAV file devices.

use approx::assert_relative_eq;

use ringshift::device::{generate_test_tone, read_mono_wav, write_mono_wav, WavHost};
use ringshift::dsp::{Gain, Passthrough};
use ringshift::engine::{PipelineConfig, RunLength};
use ringshift::Pipeline;

fn config(blocks: usize) -> PipelineConfig {
    PipelineConfig::default()
        .with_ring_depth(4)
        .with_block_size(128)
        .with_run_length(RunLength::Blocks(blocks))
}

#[test]
fn test_passthrough_copies_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    let tone = generate_test_tone(440.0, 0.1, 44100);
    write_mono_wav(&input, &tone, 44100).unwrap();

    let blocks = tone.len().div_ceil(128);
    let mut host = WavHost::new(&input, &output);
    let report = Pipeline::new(config(blocks))
        .unwrap()
        .run_on_host(&mut host, &mut Passthrough)
        .unwrap();

    let (written, rate) = read_mono_wav(&output).unwrap();
    assert_eq!(rate, 44100);
    assert_eq!(written.len(), blocks * 128);
    assert_eq!(&written[..tone.len()], &tone[..]);
    assert!(written[tone.len()..].iter().all(|&s| s == 0.0));
    assert_eq!(report.blocks_played, blocks);
}

#[test]
fn test_gain_applied_through_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    let output = dir.path().join("out.wav");
    write_mono_wav(&input, &[0.5; 512], 44100).unwrap();

    let mut host = WavHost::new(&input, &output);
    Pipeline::new(config(4))
        .unwrap()
        .run_on_host(&mut host, &mut Gain::new(-6.0206))
        .unwrap();

    let (written, _) = read_mono_wav(&output).unwrap();
    assert_eq!(written.len(), 512);
    for sample in written {
        assert_relative_eq!(sample, 0.25, epsilon = 1e-4);
    }
}

#[test]
fn test_rate_mismatch_fails_before_run() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    write_mono_wav(&input, &[0.0; 256], 48000).unwrap();

    let mut host = WavHost::new(&input, dir.path().join("out.wav"));
    let err = Pipeline::new(config(2))
        .unwrap()
        .run_on_host(&mut host, &mut Passthrough)
        .unwrap_err();

    assert_eq!(err.error_code(), "INVALID_CONFIG");
}

#[test]
fn test_realtime_pacing_takes_wall_clock_time() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.wav");
    write_mono_wav(&input, &[0.1; 1024], 8000).unwrap();

    let mut cfg = config(8);
    cfg.sample_rate = 8000;
    let mut host = WavHost::new(&input, dir.path().join("out.wav")).realtime(true);
    let report = Pipeline::new(cfg)
        .unwrap()
        .run_on_host(&mut host, &mut Passthrough)
        .unwrap();

    // 8 blocks of 128 samples at 8 kHz is 128 ms of audio.
    assert!(report.elapsed_secs >= 0.1, "ran in {}s", report.elapsed_secs);
}
