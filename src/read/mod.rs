//! Readers of beamformer records.
//!
//! Each reader makes a single forward pass over its stream, yielding
//! [`Sample`]s lazily. The first error ends the sequence.

mod error;
pub mod raw;
pub mod text;
#[cfg(test)]
mod tests;

pub use error::{MalformedRecordError, ReadError};
pub use raw::{RawBeamReader, RawLayout, SampleSize};
pub use text::TextRecordReader;

use std::path::Path;

use crate::{ObsContext, Sample};

/// All supported beamformer record formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordInputType {
    /// GMRT beamformer output; time-major spectra of fixed-width samples.
    RawBeam,

    /// Whitespace-separated "timestamp channel power" lines.
    Text,
}

impl RecordInputType {
    /// Guess the input type from a file's extension. Text records must have a
    /// "txt", "csv" or "tsv" extension; everything else is treated as raw
    /// beam data, which commonly has no meaningful extension at all.
    pub fn from_path(path: &Path) -> RecordInputType {
        match path
            .extension()
            .and_then(|os_str| os_str.to_str())
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("txt" | "csv" | "tsv") => RecordInputType::Text,
            _ => RecordInputType::RawBeam,
        }
    }
}

impl std::str::FromStr for RecordInputType {
    type Err = String;

    fn from_str(s: &str) -> Result<RecordInputType, String> {
        match s.to_lowercase().as_str() {
            "raw" | "rawbeam" | "raw_beam" => Ok(RecordInputType::RawBeam),
            "text" | "txt" => Ok(RecordInputType::Text),
            _ => Err(s.to_string()),
        }
    }
}

pub trait RecordRead: Iterator<Item = Result<Sample, ReadError>> {
    fn get_obs_context(&self) -> &ObsContext;

    fn get_input_type(&self) -> RecordInputType;
}

/// Tracks the latest timestamp seen on every channel so that records can be
/// validated as they stream past.
pub(crate) struct ChannelOrder {
    latest: Vec<f64>,
}

impl ChannelOrder {
    pub(crate) fn new(num_chans: usize) -> ChannelOrder {
        ChannelOrder {
            latest: vec![f64::NEG_INFINITY; num_chans],
        }
    }

    /// Check that `sample` refers to a known channel, has finite values and
    /// doesn't go backwards in time on that channel.
    pub(crate) fn check(&mut self, offset: u64, sample: &Sample) -> Result<(), MalformedRecordError> {
        check_finite(offset, sample)?;
        let num_chans = self.latest.len();
        let prev = self.latest.get_mut(sample.channel).ok_or(
            MalformedRecordError::ChannelOutOfRange {
                offset,
                chan: sample.channel,
                num_chans,
            },
        )?;
        if sample.timestamp < *prev {
            return Err(MalformedRecordError::NonMonotonic {
                offset,
                chan: sample.channel,
                prev: *prev,
                this: sample.timestamp,
            });
        }
        *prev = sample.timestamp;
        Ok(())
    }
}

/// NaN is the gap sentinel, so measured values must be finite.
pub(crate) fn check_finite(offset: u64, sample: &Sample) -> Result<(), MalformedRecordError> {
    if !sample.timestamp.is_finite() {
        return Err(MalformedRecordError::NonFiniteTimestamp {
            offset,
            timestamp: sample.timestamp,
        });
    }
    if !sample.power.is_finite() {
        return Err(MalformedRecordError::NonFinitePower {
            offset,
            chan: sample.channel,
            power: sample.power,
        });
    }
    Ok(())
}
