//! Transient waveform sets.
//!
//! A [`WaveformSet`] is what one simulator run produces: several named
//! signals sampled on one shared, not necessarily uniform, time vector.
//!
//! # Sample Semantics
//!
//! For a set with `N` samples, `time[i]` is the instant at which every
//! signal's `values[i]` was measured. Interpolation between samples is
//! linear; queries outside the time span clamp to the first/last sample.

use serde::{Deserialize, Serialize};

/// One named signal in a [`WaveformSet`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    /// Signal name as it appeared in the simulator header.
    pub name: String,

    /// Sample values, one per entry of the shared time vector.
    pub values: Vec<f64>,
}

/// Named signals sharing one time vector and one sample count.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveformSet {
    /// Shared time vector in seconds.
    pub time: Vec<f64>,

    /// Signals in header order.
    pub traces: Vec<Trace>,
}

impl WaveformSet {
    /// Build a set, checking that every trace matches the time vector length.
    pub fn new(time: Vec<f64>, traces: Vec<Trace>) -> Option<Self> {
        if traces.iter().any(|t| t.values.len() != time.len()) {
            return None;
        }
        Some(Self { time, traces })
    }

    /// Number of samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.time.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Number of signals.
    #[inline]
    pub fn signal_count(&self) -> usize {
        self.traces.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.traces.iter().map(|t| t.name.as_str())
    }

    /// (time, values) for a signal, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<(&[f64], &[f64])> {
        self.traces
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| (self.time.as_slice(), t.values.as_slice()))
    }

    /// Iterate (name, time, values) in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64], &[f64])> {
        self.traces
            .iter()
            .map(|t| (t.name.as_str(), self.time.as_slice(), t.values.as_slice()))
    }

    /// Time span covered by the samples.
    pub fn duration(&self) -> f64 {
        match (self.time.first(), self.time.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Interpolate a signal's value at an arbitrary time.
    pub fn value_at(&self, name: &str, t: f64) -> Option<f64> {
        let (time, values) = self.get(name)?;
        if time.is_empty() {
            return None;
        }

        // Index of the first sample strictly after t.
        let upper = time.partition_point(|&x| x <= t);
        if upper == 0 {
            return values.first().copied();
        }
        if upper >= time.len() {
            return values.last().copied();
        }

        let lower = upper - 1;
        let span = time[upper] - time[lower];
        if span <= 0.0 {
            return Some(values[lower]);
        }
        let frac = (t - time[lower]) / span;
        Some(values[lower] * (1.0 - frac) + values[upper] * frac)
    }

    /// (min, max) of a signal, ignoring not-a-number samples.
    pub fn range_of(&self, name: &str) -> Option<(f64, f64)> {
        let (_, values) = self.get(name)?;
        values
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}
