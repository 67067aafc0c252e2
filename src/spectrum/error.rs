//! Errors associated with writing and reading dynamic spectra.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// The parts of a dynamic spectrum don't agree on its dimensions.
#[derive(Error, Debug)]
#[error("The dynamic spectrum has {actual} {thing}, but {expected} were expected")]
pub struct ShapeMismatch {
    pub thing: &'static str,
    pub expected: usize,
    pub actual: usize,
}

#[derive(Error, Debug)]
pub enum SpectrumWriteError {
    #[error("Refusing to export a grid that hasn't been through normalisation")]
    NotNormalised,

    #[error(transparent)]
    Shape(#[from] ShapeMismatch),

    #[error("Time bin {time_bin}, channel {chan} has {count} samples; FITS counts can't exceed {}", i32::MAX)]
    CountTooLarge {
        time_bin: usize,
        chan: usize,
        count: u32,
    },

    #[error("Cannot write a dynamic spectrum to {0}; supported extensions are .fits and .json")]
    UnsupportedOutput(PathBuf),

    #[error("Couldn't write the {key} key: its value contains a NUL byte")]
    BadKeyValue { key: &'static str },

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    Fitsio(#[from] fitsio::errors::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SpectrumReadError {
    #[error("Cannot read a dynamic spectrum from {0}; supported extensions are .fits and .json")]
    UnsupportedFormat(PathBuf),

    #[error("{0} doesn't list any channel frequencies")]
    NoChannels(PathBuf),

    #[error(transparent)]
    Shape(#[from] ShapeMismatch),

    #[error(transparent)]
    Fits(#[from] FitsError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum FitsError {
    /// Error when opening a fits file.
    #[error(
        "{source_file}:{source_line}:{source_column}: Couldn't open {fits_filename}: {fits_error}"
    )]
    Open {
        fits_error: Box<fitsio::errors::Error>,
        fits_filename: Box<Path>,
        source_file: &'static str,
        source_line: u32,
        source_column: u32,
    },

    /// A key that couldn't be found in a fits header.
    #[error("{source_file}:{source_line}:{source_column}: {fits_filename} HDU {hdu_num}: Couldn't find key {key}")]
    MissingKey {
        key: Box<str>,
        fits_filename: Box<Path>,
        hdu_num: usize,
        source_file: &'static str,
        source_line: u32,
        source_column: u32,
    },

    /// A HDU that couldn't be used as an image.
    #[error("{source_file}:{source_line}:{source_column}: {fits_filename} HDU {hdu_num}: Tried to use as an image, but not an image")]
    NotImage {
        fits_filename: Box<Path>,
        hdu_num: usize,
        source_file: &'static str,
        source_line: u32,
        source_column: u32,
    },

    /// Failure to read a long string.
    #[error("{source_file}:{source_line}:{source_column}: {fits_filename} HDU {hdu_num}: Couldn't read a long string from {key}")]
    LongString {
        key: Box<str>,
        fits_filename: Box<Path>,
        hdu_num: usize,
        source_file: &'static str,
        source_line: u32,
        source_column: u32,
    },

    /// A generic error associated with the fitsio crate.
    #[error(
        "{source_file}:{source_line}:{source_column}: {fits_filename} HDU '{hdu_description}': {fits_error}"
    )]
    Fitsio {
        fits_error: Box<fitsio::errors::Error>,
        fits_filename: Box<Path>,
        hdu_description: Box<str>,
        source_file: &'static str,
        source_line: u32,
        source_column: u32,
    },

    /// An error associated with parsing a string into another type.
    #[error("{source_file}:{source_line}:{source_column}: Couldn't parse {key} in {fits_filename} HDU {hdu_num}")]
    Parse {
        key: Box<str>,
        fits_filename: Box<Path>,
        hdu_num: usize,
        source_file: &'static str,
        source_line: u32,
        source_column: u32,
    },
}
