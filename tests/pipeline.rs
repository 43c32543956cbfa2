mod common;

use std::sync::Arc;
use std::time::Duration;

use common::StubTransport;
use rusty_raman::analysis::SpectrumStats;
use rusty_raman::config::SessionConfig;
use rusty_raman::data::export::write_intensity_csv;
use rusty_raman::data::model::{BitDepth, SensorFrame};
use rusty_raman::link::codec::encode_frame;
use rusty_raman::link::command::EXTENDED_PIXEL_COUNT;
use rusty_raman::link::{AcquisitionConfig, ExtendedTiming, LinkSession};
use rusty_raman::processing::peak::FWHM_PER_SIGMA;
use rusty_raman::processing::{ProcessorConfig, SpectrumProcessor};
use rusty_raman::synth::{FrameRecipe, SimpleRng, SyntheticLine};

const LINE_PIXEL: f64 = 1500.4;
const LINE_SIGMA: f64 = 4.0;

/// Extended readout with one line at processed pixel `LINE_PIXEL`.
fn recipe(with_line: bool) -> FrameRecipe {
    let raw_center = (EXTENDED_PIXEL_COUNT - 1) as f64 - LINE_PIXEL;
    FrameRecipe {
        pixel_count: EXTENDED_PIXEL_COUNT,
        dark_level: 3200.0,
        noise: 3.0,
        shielded: 32,
        lines: if with_line {
            vec![SyntheticLine {
                center: raw_center,
                sigma: LINE_SIGMA,
                amplitude: 1800.0,
            }]
        } else {
            Vec::new()
        },
    }
}

fn extended_config() -> AcquisitionConfig {
    let timing = ExtendedTiming::from_micros(10, 10_000, 1).unwrap();
    AcquisitionConfig::extended(timing).with_timeout(Duration::from_secs(2))
}

#[test]
fn acquired_frame_yields_the_synthetic_line() {
    let mut rng = SimpleRng::new(17);
    let stream = encode_frame(&recipe(true).render(&mut rng), BitDepth::Twelve);

    let mut session = LinkSession::new(StubTransport::chunked(&stream, &[900, 3000]));
    let frame = session.acquire(&extended_config()).unwrap();

    let session_cfg = SessionConfig::default();
    let processor = session_cfg.build_processor(frame.len()).unwrap();
    let spectrum = processor.process(&frame).unwrap();
    assert_eq!(spectrum.len(), EXTENDED_PIXEL_COUNT);

    let fit = session_cfg
        .peak_fitter()
        .fit_dominant(&spectrum.axis().pixel, spectrum.intensity(), 10)
        .expect("line should be fitted");
    assert!((fit.center - LINE_PIXEL).abs() < 0.3, "center {}", fit.center);
    let want = FWHM_PER_SIGMA * LINE_SIGMA;
    assert!((fit.fwhm - want).abs() / want < 0.05, "fwhm {}", fit.fwhm);

    let stats = SpectrumStats::compute(&spectrum);
    let (lo, hi) = stats.wavelength_range.unwrap();
    assert!(lo < 633.0 && hi > 690.0, "wavelengths {lo}..{hi}");
}

#[test]
fn saved_dark_frame_removes_stray_light() {
    let dir = tempfile::tempdir().unwrap();
    let dark_path = dir.path().join("dark_frame.csv");
    let mut rng = SimpleRng::new(5);

    // The line is present with the sample removed too, so it is stray light.
    let mut cfg = SessionConfig::default();
    let bare = cfg.build_processor(EXTENDED_PIXEL_COUNT).unwrap();
    let dark_raw = SensorFrame::from_samples(recipe(true).render(&mut rng), BitDepth::Twelve);
    let dark = bare.dark_reference(&dark_raw.to_f64(), BitDepth::Twelve).unwrap();
    write_intensity_csv(&dark_path, dark.values()).unwrap();

    cfg.processing.dark_frame = Some(dark_path);
    let processor = cfg.build_processor(EXTENDED_PIXEL_COUNT).unwrap();
    assert!(processor.dark_frame().is_some());

    let sample_raw = SensorFrame::from_samples(recipe(true).render(&mut rng), BitDepth::Twelve);
    let uncorrected = SpectrumStats::compute(&bare.process(&sample_raw).unwrap());
    let corrected = SpectrumStats::compute(&processor.process(&sample_raw).unwrap());
    assert!(uncorrected.max > 1500.0, "max {}", uncorrected.max);
    assert!(corrected.max < 60.0, "max {}", corrected.max);
}

#[test]
fn saved_dark_frame_cancels_the_same_frame_with_smoothing_on() {
    let dir = tempfile::tempdir().unwrap();
    let dark_path = dir.path().join("dark_frame.csv");
    let mut rng = SimpleRng::new(11);

    let mut cfg = SessionConfig::default();
    cfg.processing.stages = Some(ProcessorConfig {
        baseline_window: Some(201),
        smoothing_sigma: Some(6.0),
        ..ProcessorConfig::extended()
    });
    let bare = cfg.build_processor(EXTENDED_PIXEL_COUNT).unwrap();
    let raw = SensorFrame::from_samples(recipe(true).render(&mut rng), BitDepth::Twelve);
    let dark = bare.dark_reference(&raw.to_f64(), raw.bit_depth()).unwrap();
    write_intensity_csv(&dark_path, dark.values()).unwrap();

    cfg.processing.dark_frame = Some(dark_path);
    let processor = cfg.build_processor(EXTENDED_PIXEL_COUNT).unwrap();
    let corrected = processor.process(&raw).unwrap();
    let worst = corrected.intensity().iter().fold(0.0f64, |m, v| m.max(v.abs()));
    assert!(worst < 1e-9, "residual {worst}");
}

#[test]
fn processing_is_idempotent() {
    let mut rng = SimpleRng::new(9);
    let frame = SensorFrame::from_samples(recipe(true).render(&mut rng), BitDepth::Twelve);
    let axis = Arc::new(SessionConfig::default().spectral_axis(frame.len()).unwrap());

    let mut config = ProcessorConfig::extended();
    config.baseline_window = Some(201);
    config.smoothing_sigma = Some(2.0);
    let processor = SpectrumProcessor::new(config, axis);

    let first = processor.process(&frame).unwrap();
    let second = processor.process(&frame).unwrap();
    assert_eq!(first, second);
}
