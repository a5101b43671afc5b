//! Command line driver for batch calibration

use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{info, warn};
use nalgebra::Vector3;
use trical::{Calibrator, protocol};

use crate::plot;

/// Calibrate raw tri-axial sensor readings read from stdin
#[derive(Debug, Clone, Parser)]
#[command(name = "trical", version, about)]
pub struct Cli {
    /// Expected magnitude of the field at the sensor
    #[arg(allow_negative_numbers = true)]
    pub field_norm: f64,

    /// Standard deviation of the per-axis measurement noise
    #[arg(allow_negative_numbers = true)]
    pub noise: f64,

    /// Write an SVG plot of the raw and calibrated samples to FILE
    #[arg(long, value_name = "FILE")]
    pub plot: Option<PathBuf>,

    /// Do not print the calibration summary to stderr
    #[arg(long)]
    pub no_summary: bool,
}

/// Counters for one batch run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    /// Records calibrated and written
    pub records: usize,
    /// Records that were not three numbers
    pub skipped: usize,
    /// Records the filter could not use
    pub degenerate: usize,
}

/// Update and calibrate every record of `input`
///
/// Calibrated records go to `output`, the calibration summary to `summary`.
pub fn run<R, W, E>(cli: &Cli, input: R, mut output: W, mut summary: E) -> anyhow::Result<RunStats>
where
    R: Read,
    W: Write,
    E: Write,
{
    let mut calibrator = Calibrator::new(cli.field_norm, cli.noise)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut stats = RunStats::default();
    let mut samples: Vec<(Vector3<f64>, Vector3<f64>)> = Vec::new();
    let mut line = String::new();

    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("failed to read record {}", index + 1))?;
        let raw = match protocol::parse_fields(record.iter()) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("skipping record {}: {}", index + 1, err);
                stats.skipped += 1;
                continue;
            }
        };

        if !calibrator.update(raw).is_accepted() {
            stats.degenerate += 1;
        }
        let calibrated = calibrator.calibrate(raw);

        line.clear();
        protocol::write_record(&mut line, &calibrated)?;
        writeln!(output, "{}", line).context("failed to write calibrated record")?;
        stats.records += 1;

        if cli.plot.is_some() {
            samples.push((raw, calibrated));
        }
    }
    output.flush()?;

    info!(
        "processed {} records ({} skipped, {} degenerate)",
        stats.records, stats.skipped, stats.degenerate
    );

    if !cli.no_summary {
        let mut text = String::new();
        protocol::write_summary(&mut text, &calibrator.estimate())?;
        summary
            .write_all(text.as_bytes())
            .and_then(|()| summary.flush())
            .context("failed to write calibration summary")?;
    }

    if let Some(path) = &cli.plot {
        plot::render(path, &samples, cli.field_norm)
            .with_context(|| format!("failed to write plot to {}", path.display()))?;
        info!("plot written to {}", path.display());
    }

    Ok(stats)
}
