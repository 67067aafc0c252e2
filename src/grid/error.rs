//! Errors associated with binning samples.

use thiserror::Error;

/// A sample could not be added to the grid. The grid is unchanged.
#[derive(Error, Debug, PartialEq)]
pub enum GridError {
    #[error("Sample has channel index {chan}, but there are only {num_chans} channels")]
    ChannelOutOfRange { chan: usize, num_chans: usize },

    #[error("Sample has a non-finite timestamp ({0})")]
    NonFiniteTimestamp(f64),

    #[error("Sample has a non-finite power ({0})")]
    NonFinitePower(f64),

    #[error("Sample at {timestamp}s would be in time bin {time_bin}, but the grid is limited to {max_time_bins} time bins")]
    TooManyTimeBins {
        timestamp: f64,
        time_bin: f64,
        max_time_bins: usize,
    },

    #[error("Time bin {time_bin} of channel {chan} already holds the maximum of {max} samples")]
    CountOverflow {
        time_bin: usize,
        chan: usize,
        max: u32,
    },
}
