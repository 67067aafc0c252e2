//! All errors that the binaries can report.

use thiserror::Error;

#[cfg(feature = "plotting")]
use crate::plot::PlotError;
use crate::{
    params::{ConfigurationError, ParamsError},
    pipeline::PipelineError,
    read::ReadError,
    spectrum::SpectrumReadError,
};

#[derive(Error, Debug)]
pub enum DsError {
    #[cfg(not(feature = "plotting"))]
    #[error("{} was not compiled with the \"plotting\" feature.\nYou need to compile it from source with this feature to plot dynamic spectra.", env!("CARGO_PKG_NAME"))]
    NoPlottingFeature,

    #[error("No dynamic spectrum files supplied!")]
    NoInputs,

    #[error("An output file was given, but there are {0} inputs; outputs can only be named for a single input")]
    AmbiguousOutput(usize),

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    SpectrumRead(#[from] SpectrumReadError),

    #[cfg(feature = "plotting")]
    #[error(transparent)]
    Plot(#[from] PlotError),
}
