//! `trical` - calibrate a stream of raw tri-axial readings
//!
//! Reads `x,y,z` records from stdin, feeds each one to the estimator and writes
//! the calibrated record to stdout. The final calibration summary goes to
//! stderr.
//!
//! ```text
//! trical 1.0 0.000001 < raw.csv > calibrated.csv
//! trical 48.5 0.2 --plot calibration.svg < raw.csv
//! ```

mod cli;
mod plot;

use std::io;

use clap::Parser;

use crate::cli::Cli;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let stdin = io::stdin();
    let stdout = io::stdout();
    let stderr = io::stderr();

    cli::run(&cli, stdin.lock(), stdout.lock(), stderr.lock())?;
    Ok(())
}
