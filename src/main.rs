use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use serde::Serialize;

use rusty_raman::analysis::{normalize, transmittance, SpectrumStats};
use rusty_raman::calibration::{laser_wavenumber, wavelength_to_wavenumber, CalibrationModel};
use rusty_raman::config::SessionConfig;
use rusty_raman::data::export::{write_intensity_csv, write_spectrum_csv, write_transmittance_csv};
use rusty_raman::data::loader::{load_intensity_csv, load_raw_frame};
use rusty_raman::data::model::{PeakFit, ProcessedSpectrum};
use rusty_raman::link::codec::decode_frame_tolerant;
use rusty_raman::link::{LinkSession, SerialTransport};

#[derive(Parser)]
#[command(name = "rusty-raman")]
#[command(about = "TCD1304 linear CCD acquisition and Raman processing", long_about = None)]
struct Cli {
    /// Session config (TOML). Bench defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire, process and fit one spectrum
    Acquire {
        /// Serial port, overriding the config
        #[arg(long)]
        port: Option<String>,

        /// Frames averaged on the host
        #[arg(long)]
        frames: Option<usize>,

        /// Write the spectrum CSV here
        #[arg(long)]
        output: Option<PathBuf>,

        /// Save the frame as a dark reference, taken before dark subtraction
        #[arg(long)]
        save_dark: Option<PathBuf>,
    },

    /// Step through integration bytes (simple protocol only)
    Sweep {
        #[arg(long)]
        port: Option<String>,

        #[arg(long, default_value = "0xB0", value_parser = parse_byte)]
        start: u8,

        #[arg(long, default_value = "0xD6", value_parser = parse_byte)]
        end: u8,

        /// Frames averaged per setting
        #[arg(long, default_value = "1")]
        averages: usize,

        #[arg(long, default_value = "500")]
        pause_ms: u64,
    },

    /// Process a raw byte dump captured from the device
    Process {
        raw: PathBuf,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Print the fitted calibration as JSON
    Calibrate,

    /// Divide a sample spectrum by a reference spectrum
    Transmittance {
        sample: PathBuf,
        reference: PathBuf,

        /// Min-max scale the transmittance to [0, 1]
        #[arg(long)]
        normalize: bool,

        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("'{s}' is not a byte: {e}"))
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)?,
        None => SessionConfig::default(),
    };

    match cli.command {
        Commands::Acquire {
            port,
            frames,
            output,
            save_dark,
        } => acquire(&config, port, frames, output, save_dark),
        Commands::Sweep {
            port,
            start,
            end,
            averages,
            pause_ms,
        } => sweep(&config, port, start, end, averages, pause_ms),
        Commands::Process { raw, output } => process(&config, &raw, output),
        Commands::Calibrate => calibrate(&config),
        Commands::Transmittance {
            sample,
            reference,
            normalize,
            output,
        } => transmittance_cmd(&sample, &reference, normalize, output),
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct PeakReport {
    #[serde(flatten)]
    fit: PeakFit,
    wavelength: Option<f64>,
    raman_shift: Option<f64>,
}

#[derive(Serialize)]
struct SpectrumReport {
    stats: SpectrumStats,
    peak: Option<PeakReport>,
}

fn report(config: &SessionConfig, spectrum: &ProcessedSpectrum) -> Result<SpectrumReport> {
    let fitter = config.peak_fitter();
    let fit = fitter.fit_dominant(
        &spectrum.axis().pixel,
        spectrum.intensity(),
        config.peak.half_window,
    );
    let model = config.calibration_model()?;
    let laser = laser_wavenumber(config.calibration.laser_nm);
    let peak = fit.map(|fit| {
        let wavelength = model.map(|m| m.pixel_to_wavelength(fit.center));
        PeakReport {
            fit,
            wavelength,
            raman_shift: wavelength.map(|wl| wavelength_to_wavenumber(wl, laser)),
        }
    });
    if peak.is_none() {
        info!("No credible peak in spectrum");
    }
    Ok(SpectrumReport {
        stats: SpectrumStats::compute(spectrum),
        peak,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn write_spectrum(path: &Path, spectrum: &ProcessedSpectrum) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_spectrum_csv(BufWriter::new(file), spectrum)?;
    info!("Spectrum written to {}", path.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn open_session(config: &SessionConfig, port: Option<String>) -> Result<LinkSession<SerialTransport>> {
    let port = port.unwrap_or_else(|| config.link.port.clone());
    let transport = SerialTransport::open(&port, config.link.baud_rate)?;
    Ok(LinkSession::new(transport))
}

fn acquire(
    config: &SessionConfig,
    port: Option<String>,
    frames: Option<usize>,
    output: Option<PathBuf>,
    save_dark: Option<PathBuf>,
) -> Result<()> {
    let acq = config.acquisition_config()?;
    let processor = config.build_processor(acq.pixel_count())?;

    let mut session = open_session(config, port)?;
    let frames = frames.unwrap_or(config.acquisition.frames);
    let raw = session.acquire_averaged(&acq, frames)?;

    let spectrum = processor.process_values(&raw, acq.bit_depth())?;
    if let Some(path) = &output {
        write_spectrum(path, &spectrum)?;
    }
    if let Some(path) = &save_dark {
        let dark = processor.dark_reference(&raw, acq.bit_depth())?;
        write_intensity_csv(path, dark.values())?;
        info!("Dark frame saved to {}", path.display());
    }
    print_json(&report(config, &spectrum)?)
}

#[derive(Serialize)]
struct SweepLine {
    integration: String,
    max: f64,
    mean: f64,
}

fn sweep(
    config: &SessionConfig,
    port: Option<String>,
    start: u8,
    end: u8,
    averages: usize,
    pause_ms: u64,
) -> Result<()> {
    if start > end {
        bail!("sweep start 0x{start:02X} is past end 0x{end:02X}");
    }
    let template = config.acquisition_config()?;
    // fail on an extended-protocol config before touching the port
    template.with_integration(start)?;
    let mut session = open_session(config, port)?;
    let results = session.sweep_integration(
        &template,
        start..=end,
        averages,
        Duration::from_millis(pause_ms),
    )?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (integration, frame) in results {
        let mean = frame.iter().sum::<f64>() / frame.len().max(1) as f64;
        let max = frame.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let line = SweepLine {
            integration: format!("0x{integration:02X}"),
            max,
            mean,
        };
        serde_json::to_writer(&mut out, &line)?;
        writeln!(out)?;
    }
    Ok(())
}

fn process(config: &SessionConfig, raw_path: &Path, output: Option<PathBuf>) -> Result<()> {
    let acq = config.acquisition_config()?;
    let bytes = load_raw_frame(raw_path)?;
    let frame = decode_frame_tolerant(&bytes, acq.bit_depth(), acq.expected_bytes());
    info!(
        "Decoded {} {} samples from {}",
        frame.len(),
        acq.bit_depth(),
        raw_path.display()
    );

    let processor = config.build_processor(frame.len())?;
    let spectrum = processor.process(&frame)?;
    if let Some(path) = &output {
        write_spectrum(path, &spectrum)?;
    }
    print_json(&report(config, &spectrum)?)
}

#[derive(Serialize)]
struct CalibrationReport {
    #[serde(flatten)]
    model: CalibrationModel,
    laser_nm: f64,
    laser_wavenumber: f64,
    points: usize,
}

fn calibrate(config: &SessionConfig) -> Result<()> {
    let Some(model) = config.calibration_model()? else {
        bail!("no calibration points configured");
    };
    print_json(&CalibrationReport {
        model,
        laser_nm: config.calibration.laser_nm,
        laser_wavenumber: laser_wavenumber(config.calibration.laser_nm),
        points: config.calibration.points.len(),
    })
}

fn transmittance_cmd(
    sample: &Path,
    reference: &Path,
    scale: bool,
    output: Option<PathBuf>,
) -> Result<()> {
    let s = load_intensity_csv(sample)?;
    let r = load_intensity_csv(reference)?;
    let mut t = transmittance(&s, &r)?;
    if scale {
        t = normalize(&t);
    }
    match output {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
            write_transmittance_csv(BufWriter::new(file), &s, &r, &t)?;
            info!("Transmittance written to {}", path.display());
        }
        None => write_transmittance_csv(io::stdout().lock(), &s, &r, &t)?,
    }
    Ok(())
}
