//! Numeric table extraction from `.ibis` model-description text.
//!
//! The extractor does not understand IBIS semantics. It walks the file once
//! with a three-state machine and lifts out every block of numbers found
//! under a plottable keyword ([Pullup], [Rising Waveform], ...), together
//! with the `key=value` parameters that precede the block and the name of
//! the enclosing [Model].
//!
//! A single keyword occurrence can yield several records: a change in column
//! count or an interrupting non-numeric line starts a new block.

use crate::error::{ParseError, ParseResult};
use lib_types::{is_number, parse_number};
use ndarray::Array2;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Keywords whose numeric blocks are extracted, in normalized form.
pub const PLOTTABLE_SECTIONS: &[&str] = &[
    "pullup",
    "pulldown",
    "power_clamp",
    "gnd_clamp",
    "rising_waveform",
    "falling_waveform",
    "composite_current",
    "isso_pu",
    "isso_pd",
];

const MIN_ROW_TOKENS: usize = 2;
const MAX_ROW_TOKENS: usize = 8;

/// One contiguous numeric block.
#[derive(Clone, Debug, Serialize)]
pub struct TableRecord {
    /// 1-based position in extraction order.
    pub index: usize,

    /// Keyword as written, without brackets.
    pub section_raw: String,

    /// Keyword lowercased with spaces and hyphens mapped to underscores.
    pub section: String,

    /// Name from the most recent [Model] keyword, if any.
    pub model: Option<String>,

    /// Parameters declared between the keyword and its first block.
    pub params: BTreeMap<String, String>,

    /// Row-major values; `NA` cells are not-a-number.
    pub data: Array2<f64>,

    /// First and last line of the block, 1-based.
    pub line_start: usize,
    pub line_end: usize,
}

impl TableRecord {
    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    /// Column `i` as an owned vector, for plotting/export.
    pub fn column(&self, i: usize) -> Option<Vec<f64>> {
        (i < self.ncols()).then(|| self.data.column(i).to_vec())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Seeking,
    Params,
    Data,
}

/// A bracketed keyword line: `[Rising Waveform]  trailing text`.
struct Header<'a> {
    raw: &'a str,
    normalized: String,
    trailing: &'a str,
}

impl<'a> Header<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let rest = line.strip_prefix('[')?;
        let (raw, trailing) = rest.split_once(']')?;
        let raw = raw.trim();
        Some(Self {
            raw,
            normalized: normalize_section(raw),
            trailing: trailing.trim(),
        })
    }
}

/// `"Rising Waveform"` -> `"rising_waveform"`.
pub fn normalize_section(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

fn is_skippable(line: &str) -> bool {
    line.is_empty() || line.starts_with('|')
}

/// Between two and eight whitespace-separated tokens, all numeric.
pub fn is_numeric_row(line: &str) -> bool {
    let count = line.split_whitespace().count();
    (MIN_ROW_TOKENS..=MAX_ROW_TOKENS).contains(&count) && line.split_whitespace().all(is_number)
}

fn collect_params(line: &str, params: &mut BTreeMap<String, String>) {
    // "R_fixture = 50" and "R_fixture=50" are the same parameter.
    let mut collapsed = line.to_string();
    while collapsed.contains(" =") || collapsed.contains("= ") {
        collapsed = collapsed.replace(" =", "=").replace("= ", "=");
    }

    for token in collapsed.split_whitespace() {
        match token.split_once('=') {
            Some((key, value)) if !key.is_empty() => {
                params.insert(key.to_string(), value.to_string());
            }
            Some(_) => {}
            None => {
                params.insert(token.to_string(), String::new());
            }
        }
    }
}

/// Scan model-description text and return every numeric block in order.
pub fn extract_tables(text: &str) -> ParseResult<Vec<TableRecord>> {
    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    let mut records = Vec::new();

    let mut state = State::Seeking;
    let mut cursor = 0;
    let mut model: Option<String> = None;
    let mut section: Option<(String, String)> = None;
    let mut params = BTreeMap::new();

    while cursor < lines.len() {
        let line = lines[cursor];
        if is_skippable(line) {
            cursor += 1;
            continue;
        }

        match state {
            State::Seeking => {
                if let Some(header) = Header::parse(line) {
                    if header.normalized == "model" {
                        model = (!header.trailing.is_empty()).then(|| header.trailing.to_string());
                    } else if PLOTTABLE_SECTIONS.contains(&header.normalized.as_str()) {
                        section = Some((header.raw.to_string(), header.normalized));
                        params.clear();
                        state = State::Params;
                    }
                }
                cursor += 1;
            }

            State::Params => {
                if Header::parse(line).is_some() || is_numeric_row(line) {
                    state = State::Data;
                    continue;
                }
                collect_params(line, &mut params);
                cursor += 1;
            }

            State::Data => {
                if Header::parse(line).is_some() {
                    state = State::Seeking;
                    continue;
                }
                if !is_numeric_row(line) {
                    cursor += 1;
                    continue;
                }

                let start = cursor;
                let width = line.split_whitespace().count();
                let mut values = Vec::new();
                while cursor < lines.len()
                    && is_numeric_row(lines[cursor])
                    && lines[cursor].split_whitespace().count() == width
                {
                    for token in lines[cursor].split_whitespace() {
                        values.push(parse_number(token)?);
                    }
                    cursor += 1;
                }

                let rows = values.len() / width;
                let data = Array2::from_shape_vec((rows, width), values)
                    .map_err(|e| ParseError::format("IBIS", start + 1, e.to_string()))?;

                let (section_raw, section_name) = section.clone().unwrap_or_default();
                tracing::debug!(
                    "Table {} [{}] model {:?}: {}x{} at lines {}-{}",
                    records.len() + 1,
                    section_raw,
                    model,
                    rows,
                    width,
                    start + 1,
                    cursor
                );

                records.push(TableRecord {
                    index: records.len() + 1,
                    section_raw,
                    section: section_name,
                    model: model.clone(),
                    params: params.clone(),
                    data,
                    line_start: start + 1,
                    line_end: cursor,
                });
            }
        }
    }

    Ok(records)
}

/// Read a file and extract its tables.
pub fn extract_tables_from_path(path: &Path) -> ParseResult<Vec<TableRecord>> {
    let text = std::fs::read_to_string(path).map_err(|e| ParseError::io(path, e))?;
    let records = extract_tables(&text)?;
    tracing::info!("Extracted {} tables from {:?}", records.len(), path);
    Ok(records)
}

/// Parse a selection like `"1, 3-5 7"` into 1-based indices within `[1, max]`.
///
/// Ranges are clamped, single indices outside the bounds and malformed
/// tokens are dropped, and the first occurrence of each index wins.
pub fn select_indices(text: &str, max: usize) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for token in text.split(|c: char| c == ',' || c.is_whitespace()) {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }

        let range = match token.split_once('-') {
            Some((lo, hi)) => match (lo.trim().parse::<usize>(), hi.trim().parse::<usize>()) {
                (Ok(lo), Ok(hi)) => lo.max(1)..=hi.min(max),
                _ => continue,
            },
            None => match token.parse::<usize>() {
                Ok(i) if (1..=max).contains(&i) => i..=i,
                _ => continue,
            },
        };

        for i in range {
            if seen.insert(i) {
                selected.push(i);
            }
        }
    }

    selected
}
