use thiserror::Error;

use super::{PipelineState, Stage};
use crate::{
    calibration::{CalibrationReadError, NormaliseError},
    params::ConfigurationError,
    read::ReadError,
    spectrum::SpectrumWriteError,
};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Cannot run the {stage} stage while the pipeline is {state}")]
    OutOfOrder { stage: Stage, state: PipelineState },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    CalibrationRead(#[from] CalibrationReadError),

    #[error(transparent)]
    Normalise(#[from] NormaliseError),

    #[error(transparent)]
    SpectrumWrite(#[from] SpectrumWriteError),

    #[error("Couldn't write the bandshape: {0}")]
    Bandshape(#[from] std::io::Error),
}
