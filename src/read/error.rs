//! Errors associated with reading beamformer records.

use thiserror::Error;

/// A record in the input stream could not be turned into a valid
/// [`crate::Sample`]. `offset` is where the record starts: a byte offset for
/// raw beam data, a line number for text records.
#[derive(Error, Debug)]
pub enum MalformedRecordError {
    #[error("Record at offset {offset} has channel index {chan}, but there are only {num_chans} channels")]
    ChannelOutOfRange {
        offset: u64,
        chan: usize,
        num_chans: usize,
    },

    #[error("Record at offset {offset} on channel {chan} has timestamp {this}s, which is earlier than the previous timestamp on that channel ({prev}s)")]
    NonMonotonic {
        offset: u64,
        chan: usize,
        prev: f64,
        this: f64,
    },

    #[error("Record at offset {offset} has a non-finite timestamp ({timestamp})")]
    NonFiniteTimestamp { offset: u64, timestamp: f64 },

    #[error("Record at offset {offset} on channel {chan} has a non-finite power ({power})")]
    NonFinitePower { offset: u64, chan: usize, power: f64 },

    #[error("Record at offset {offset} couldn't be binned: {source}")]
    Unbinnable {
        offset: u64,
        #[source]
        source: crate::grid::GridError,
    },

    #[error("Couldn't parse record at offset {offset}: '{line}'")]
    Unparsable { offset: u64, line: String },

    #[error("Spectrum at offset {offset} is truncated; expected {expected} bytes but only {got} remain")]
    Truncated {
        offset: u64,
        expected: usize,
        got: usize,
    },
}

impl MalformedRecordError {
    /// Where the offending record starts in the input.
    pub fn offset(&self) -> u64 {
        match self {
            MalformedRecordError::ChannelOutOfRange { offset, .. }
            | MalformedRecordError::NonMonotonic { offset, .. }
            | MalformedRecordError::NonFiniteTimestamp { offset, .. }
            | MalformedRecordError::NonFinitePower { offset, .. }
            | MalformedRecordError::Unbinnable { offset, .. }
            | MalformedRecordError::Unparsable { offset, .. }
            | MalformedRecordError::Truncated { offset, .. } => *offset,
        }
    }
}

#[derive(Error, Debug)]
pub enum ReadError {
    #[error(transparent)]
    Malformed(#[from] MalformedRecordError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
