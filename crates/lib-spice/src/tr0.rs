//! Fixed-width ASCII transient output decoding.
//!
//! The format carries a header of `v(name)` probe lines followed by a stream
//! of 11-character numeric fields. Line breaks in the data section are not
//! significant: every data line is joined into one stream before it is cut
//! into fields, so rows may wrap across lines freely.
//!
//! Fields may use a Fortran-style `D` exponent. A row whose first column is
//! at or above `1e20` is the simulator's end marker and is dropped.

use crate::error::{SpiceError, SpiceResult};
use lib_types::{Trace, WaveformSet};
use std::path::Path;

/// Width of one numeric field.
pub const FIELD_WIDTH: usize = 11;

/// Rows whose time column reaches this are end markers.
pub const END_SENTINEL: f64 = 1e20;

/// Footer marker; lines containing it carry no data.
const FOOTER_MARKER: &str = "$&%#";

fn is_header(line: &str) -> bool {
    line.trim_start()
        .get(..2)
        .is_some_and(|p| p.eq_ignore_ascii_case("v("))
}

/// Signal names from every header line, in order.
fn header_names(text: &str) -> Vec<String> {
    text.lines()
        .filter(|l| is_header(l))
        .flat_map(str::split_whitespace)
        .map(|token| {
            let inner = token
                .get(..2)
                .filter(|p| p.eq_ignore_ascii_case("v("))
                .map_or(token, |_| &token[2..]);
            inner.trim_end_matches(')').to_string()
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Numeric fields from the data section, unparseable fields skipped.
fn data_values(text: &str) -> Vec<f64> {
    let stream: String = text
        .lines()
        .map(|l| l.trim_end_matches('\r'))
        .filter(|l| {
            !l.trim().is_empty()
                && !l.trim_start().starts_with('*')
                && !l.contains(FOOTER_MARKER)
                && !is_header(l)
        })
        .collect();

    let mut values = Vec::with_capacity(stream.len() / FIELD_WIDTH);
    for (i, chunk) in stream.as_bytes().chunks(FIELD_WIDTH).enumerate() {
        let field = String::from_utf8_lossy(chunk).replace('D', "E").replace('d', "e");
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        match field.parse::<f64>() {
            Ok(v) => values.push(v),
            Err(_) => tracing::warn!("Skipping unparseable waveform field {} '{}'", i, field),
        }
    }
    values
}

/// Decode transient output text.
///
/// Row width is the number of header names. Signal `i` takes column `i`;
/// column 0 doubles as the shared time axis.
pub fn decode_waveform(text: &str) -> SpiceResult<WaveformSet> {
    let names = header_names(text);
    if names.is_empty() {
        return Err(SpiceError::format("transient", "no v(...) header line"));
    }

    let values = data_values(text);
    if values.is_empty() {
        return Err(SpiceError::format("transient", "no numeric data"));
    }

    let width = names.len();
    let dropped = values.len() % width;
    if dropped > 0 {
        tracing::debug!("Dropping {} trailing fields of an incomplete row", dropped);
    }

    let rows: Vec<&[f64]> = values
        .chunks_exact(width)
        .filter(|row| row[0] < END_SENTINEL)
        .collect();

    let time: Vec<f64> = rows.iter().map(|row| row[0]).collect();
    let traces = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Trace {
            name,
            values: rows.iter().map(|row| row[i]).collect(),
        })
        .collect();

    WaveformSet::new(time, traces)
        .ok_or_else(|| SpiceError::format("transient", "trace length mismatch"))
}

/// Read and decode a transient output file.
pub fn decode_waveform_file(path: &Path) -> SpiceResult<WaveformSet> {
    let bytes = std::fs::read(path).map_err(|e| SpiceError::io(path, e))?;
    let set = decode_waveform(&String::from_utf8_lossy(&bytes))?;
    tracing::info!(
        "Decoded {} signals x {} samples from {:?}",
        set.signal_count(),
        set.len(),
        path
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_width(row: &str, width: usize) -> String {
        format!("{:<width$.width$}", row, width = width)
    }

    #[test]
    fn test_sentinel_row_dropped() {
        let row = "0.0000E+00 1.0000E+00 1.0000E+31";
        let text = format!(
            "v(IN) v(OUT)\n{}\n{}\n",
            fixed_width(row, 22),
            fixed_width("1.0000E+31 0.0000E+00", 22)
        );

        let set = decode_waveform(&text).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["IN", "OUT"]);
        let (time, out) = set.get("OUT").unwrap();
        assert_eq!(time, &[0.0]);
        assert_eq!(out, &[1.0]);
    }

    #[test]
    fn test_wrapped_rows_and_d_exponent() {
        // Three columns wrapped two fields per line, with a comment and footer.
        let text = "\
* transient output
V(a) v(b)
v(c)
 0.0000D+00 1.0000D+00
 2.0000D+00 1.0000D-09
 1.5000D+00 2.5000D+00
 1.0000E+30 0.0000E+00
 0.0000E+00
$&%# end
";
        let set = decode_waveform(text).unwrap();
        assert_eq!(set.signal_count(), 3);
        assert_eq!(set.len(), 2);
        assert_eq!(set.time, vec![0.0, 1e-9]);

        let (_, c) = set.get("c").unwrap();
        assert!((c[0] - 2.0).abs() < 1e-12);
        assert!((c[1] - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_bad_fields_skipped() {
        let text = "v(x) v(y)\n 1.0000E+00 garbage!!! 2.0000E+00 3.0000E+00 4.0000E+00\n";
        let set = decode_waveform(text).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.time, vec![1.0, 3.0]);
    }

    #[test]
    fn test_format_errors() {
        assert!(matches!(
            decode_waveform(" 1.0000E+00 2.0000E+00\n"),
            Err(SpiceError::Format { .. })
        ));
        assert!(matches!(
            decode_waveform("v(a) v(b)\n* only a comment\n"),
            Err(SpiceError::Format { .. })
        ));
    }

    #[test]
    fn test_decode_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.tr0");
        std::fs::write(&path, "v(t) v(o)\r\n 0.0000E+00 5.0000E-01\r\n").unwrap();

        let set = decode_waveform_file(&path).unwrap();
        assert_eq!(set.value_at("o", 0.0), Some(0.5));
        assert!(matches!(
            decode_waveform_file(&dir.path().join("missing.tr0")),
            Err(SpiceError::Io { .. })
        ));
    }
}
