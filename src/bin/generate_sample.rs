use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use rusty_raman::data::export::write_intensity_csv;
use rusty_raman::data::model::{BitDepth, SensorFrame, SpectralAxis};
use rusty_raman::link::codec::encode_frame;
use rusty_raman::link::command::EXTENDED_PIXEL_COUNT;
use rusty_raman::processing::{ProcessorConfig, SpectrumProcessor};
use rusty_raman::synth::{FrameRecipe, SimpleRng, SyntheticLine};

/// Write a synthetic extended-protocol frame and a matching dark frame.
#[derive(Parser)]
#[command(name = "generate_sample")]
struct Args {
    /// Raw byte dump, as the board would send it
    #[arg(long, default_value = "sample_frame.bin")]
    frame: PathBuf,

    /// Dark-frame CSV
    #[arg(long, default_value = "dark_frame.csv")]
    dark: PathBuf,

    #[arg(long, default_value = "42")]
    seed: u64,
}

const DARK_LEVEL: f64 = 3200.0;
const READ_NOISE: f64 = 4.0;
const SHIELDED: usize = 32;

/// Raw pixel for a processed pixel; the extended readout arrives reversed.
fn raw_pixel(processed: f64) -> f64 {
    (EXTENDED_PIXEL_COUNT - 1) as f64 - processed
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let mut rng = SimpleRng::new(args.seed);

    // Laser line near pixel 9 plus a few Raman bands to the red.
    let lines = [(9.25, 2.5, 2200.0), (420.0, 4.0, 900.0), (1250.0, 5.0, 600.0), (2100.0, 6.0, 350.0)]
        .into_iter()
        .map(|(center, sigma, amplitude)| SyntheticLine {
            center: raw_pixel(center),
            sigma,
            amplitude,
        })
        .collect();

    let sample = FrameRecipe {
        pixel_count: EXTENDED_PIXEL_COUNT,
        dark_level: DARK_LEVEL,
        noise: READ_NOISE,
        shielded: SHIELDED,
        lines,
    };
    let dark = FrameRecipe {
        lines: Vec::new(),
        ..sample.clone()
    };

    let samples = sample.render(&mut rng);
    let bytes = encode_frame(&samples, BitDepth::Twelve);
    std::fs::write(&args.frame, &bytes)
        .with_context(|| format!("writing {}", args.frame.display()))?;

    let dark_frame = SensorFrame::from_samples(dark.render(&mut rng), BitDepth::Twelve);
    let processor = SpectrumProcessor::new(
        ProcessorConfig::extended(),
        Arc::new(SpectralAxis::uncalibrated(EXTENDED_PIXEL_COUNT)),
    );
    let dark_reference = processor.dark_reference(&dark_frame.to_f64(), dark_frame.bit_depth())?;
    write_intensity_csv(&args.dark, dark_reference.values())?;

    println!(
        "Wrote {} bytes to {} and a {}-pixel dark frame to {}",
        bytes.len(),
        args.frame.display(),
        dark_reference.len(),
        args.dark.display()
    );
    Ok(())
}
