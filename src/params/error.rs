use std::path::PathBuf;

use thiserror::Error;

/// The pipeline's parameters are unusable. These are all detected before any
/// data is read.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("The time resolution must be a positive number of seconds, but got {0}")]
    BadTimeRes(f64),

    #[error("The sampling interval must be a positive number of seconds, but got {0}")]
    BadSamplingInterval(f64),

    #[error("The number of channels cannot be 0")]
    NoChannels,

    #[error("The number of polarisations cannot be 0")]
    NoPols,

    #[error("Polarisation {pol} was requested, but the data only has {num_pols} polarisations")]
    PolOutOfRange { pol: usize, num_pols: usize },

    #[error("Samples of {0} bytes are not supported; the sample size must be 1, 2 or 4 bytes")]
    BadSampleSize(usize),

    #[error("The bandwidth must be a non-zero, finite number of MHz, but got {0}")]
    BadBandwidth(f64),

    #[error("The {what} must be a finite number of seconds, but got {value}")]
    NonFiniteTime { what: &'static str, value: f64 },

    #[error("The maximum number of time bins must be at least 1 and small enough to index every cell, but got {0}")]
    BadMaxTimeBins(usize),

    #[error("The end time ({end}s) must be after the start time ({start}s)")]
    EndBeforeStart { start: f64, end: f64 },

    #[error("The bandshape smoothing window must have at least 1 channel")]
    ZeroSmoothingWindow,

    #[error("No {0} was supplied")]
    Missing(&'static str),

    #[error("'{got}' is not a valid {what}")]
    InvalidChoice { what: &'static str, got: String },

    #[error("A calibration file and a self-derived bandpass were both requested; use only one")]
    ConflictingCalibration,

    #[error("Input file {0} does not exist")]
    InputDoesNotExist(PathBuf),

    #[error("Cannot write a dynamic spectrum to {0}; supported extensions are .fits and .json")]
    UnsupportedOutput(PathBuf),
}

/// Problems with an argument file.
#[derive(Error, Debug)]
pub enum ParamsError {
    #[error("Argument file '{0}' doesn't have a recognised file extension\nValid extensions are: toml, json")]
    UnrecognisedArgFileExt(String),

    #[error("Couldn't decode toml structure from {file}:\n{err}")]
    TomlDecode { file: String, err: String },

    #[error("Couldn't decode json structure from {file}:\n{err}")]
    JsonDecode { file: String, err: String },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
