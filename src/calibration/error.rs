//! Errors associated with calibration tables and normalisation.

use thiserror::Error;

/// The calibration table can't be used on the data at all. A table that only
/// covers some of the data's channels is not an error; the other channels are
/// flagged as uncalibrated instead.
#[derive(Error, Debug)]
pub enum CalibrationMismatchError {
    #[error("The calibration table has no channels")]
    EmptyTable,

    #[error("None of the calibration table's channels ({first}..={last}) overlap with the data's channels (0..{num_chans})")]
    NoOverlap {
        first: usize,
        last: usize,
        num_chans: usize,
    },
}

#[derive(Error, Debug)]
pub enum NormaliseError {
    #[error("This grid has already been normalised; normalising it again would correct it twice")]
    AlreadyNormalised,

    #[error(transparent)]
    Mismatch(#[from] CalibrationMismatchError),
}

#[derive(Error, Debug)]
pub enum CalibrationReadError {
    #[error("Couldn't parse line {line_number} of calibration file {file}: '{line}'")]
    Parse {
        file: String,
        line_number: usize,
        line: String,
    },

    #[error("Calibration file {file} lists channel {chan} more than once")]
    DuplicateChannel { file: String, chan: usize },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
