//! Line protocol for batch calibration
//!
//! Input records are three comma-separated numbers per line. Output records
//! use the same shape with 7 fractional digits, and a run ends with a summary
//! block printing the bias vector and the scale matrix in `10.7` fixed-width
//! fields. Non-finite values are spelled `nan`, `inf` and `-inf`, as C's `%f`
//! prints them. Formatting writes into any [`core::fmt::Write`], so it works
//! without an allocator.

use core::fmt::{self, Write};

use nalgebra::Vector3;

use crate::error::ProtocolError;
use crate::types::Estimate;

/// First line of the summary block
pub const SUMMARY_HEADER: &str = "################# CALIBRATION #################";

/// Fixed-point value that prints non-finite numbers in lower case
///
/// Width and precision of the format spec are honoured; non-finite values are
/// right-aligned in the field like numbers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fixed(pub f64);

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.0;
        if value.is_finite() {
            return fmt::Display::fmt(&value, f);
        }

        let text = if value.is_nan() {
            "nan"
        } else if value > 0.0 {
            "inf"
        } else {
            "-inf"
        };
        match f.width() {
            Some(width) => write!(f, "{:>width$}", text, width = width),
            None => f.write_str(text),
        }
    }
}

/// Parse one `x,y,z` record
///
/// Surrounding whitespace (including the line terminator) is ignored, as is
/// whitespace around each value.
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use trical::protocol::parse_record;
///
/// assert_eq!(parse_record(" 1.5, -2,3e-1\r\n"), Ok(Vector3::new(1.5, -2.0, 0.3)));
/// assert!(parse_record("1.0,2.0").is_err());
/// ```
pub fn parse_record(line: &str) -> Result<Vector3<f64>, ProtocolError> {
    parse_fields(line.trim().split(','))
}

/// Parse a record that has already been split into fields
pub fn parse_fields<'a, I>(fields: I) -> Result<Vector3<f64>, ProtocolError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut values = [0.0; 3];
    let mut count = 0;

    for (index, field) in fields.into_iter().enumerate() {
        if index < values.len() {
            values[index] = field
                .trim()
                .parse()
                .map_err(|source| ProtocolError::InvalidNumber { index, source })?;
        }
        count += 1;
    }

    if count != values.len() {
        return Err(ProtocolError::FieldCount(count));
    }
    Ok(Vector3::from(values))
}

/// Write a calibrated record, without line terminator
///
/// # Example
/// ```
/// use nalgebra::Vector3;
/// use trical::protocol::write_record;
///
/// let mut line = String::new();
/// write_record(&mut line, &Vector3::new(1.0, -0.5, 0.25)).unwrap();
/// assert_eq!(line, "1.0000000,-0.5000000,0.2500000");
/// ```
pub fn write_record<W: Write>(out: &mut W, record: &Vector3<f64>) -> fmt::Result {
    write!(
        out,
        "{:.7},{:.7},{:.7}",
        Fixed(record.x),
        Fixed(record.y),
        Fixed(record.z)
    )
}

/// Write the human-readable calibration summary, one line per row
pub fn write_summary<W: Write>(out: &mut W, estimate: &Estimate) -> fmt::Result {
    let b = &estimate.bias;
    let d = &estimate.scale;

    writeln!(out, "{}", SUMMARY_HEADER)?;
    writeln!(
        out,
        " b = [{:10.7}, {:10.7}, {:10.7}]",
        Fixed(b.x),
        Fixed(b.y),
        Fixed(b.z)
    )?;
    for row in 0..3 {
        let prefix = if row == 0 { " D = [ [" } else { "       [" };
        let suffix = if row == 2 { " ] ]" } else { " ]" };
        writeln!(
            out,
            "{} {:10.7}, {:10.7}, {:10.7}{}",
            prefix,
            Fixed(d[(row, 0)]),
            Fixed(d[(row, 1)]),
            Fixed(d[(row, 2)]),
            suffix
        )?;
    }
    Ok(())
}
