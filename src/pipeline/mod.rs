//! Drive a single observation from beamformer records to a written dynamic
//! spectrum.
//!
//! The stages must run in order: [`Pipeline::read`], [`Pipeline::assemble`],
//! [`Pipeline::normalise`] and [`Pipeline::export`]. The pipeline's state is
//! the most recent stage to have been entered. A failing stage, or a stage
//! called out of order, leaves the pipeline [`PipelineState::Failed`] and no
//! further stages can run.

mod error;
#[cfg(test)]
mod tests;

pub use error::PipelineError;

use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::{
    calibration::{normalise, skip_normalisation, Bandshape, CalibrationTable},
    grid::{Grid, GridAssembler},
    params::{CalibrationSource, ConfigurationError, MakeDsParams},
    read::{check_finite, MalformedRecordError, ReadError},
    spectrum::DynamicSpectrum,
    ObsContext, Sample,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reading,
    Assembling,
    Normalising,
    Exporting,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Stage::Reading => "reading",
                Stage::Assembling => "assembling",
                Stage::Normalising => "normalising",
                Stage::Exporting => "exporting",
            }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Reading,
    Assembling,
    Normalising,
    Exported,
    Failed { stage: Stage },
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineState::Idle => write!(f, "idle"),
            PipelineState::Reading => write!(f, "reading"),
            PipelineState::Assembling => write!(f, "assembling"),
            PipelineState::Normalising => write!(f, "normalising"),
            PipelineState::Exported => write!(f, "exported"),
            PipelineState::Failed { stage } => write!(f, "failed while {stage}"),
        }
    }
}

pub struct Pipeline {
    state: PipelineState,

    obs_context: ObsContext,

    /// Present until the grid is assembled.
    assembler: Option<GridAssembler>,

    /// Present between assembling and exporting.
    grid: Option<Grid>,

    /// Whether each channel was calibrated. Filled in by normalisation.
    calibrated: Vec<bool>,

    spectrum: Option<DynamicSpectrum>,
}

impl Pipeline {
    pub fn new(
        obs_context: ObsContext,
        time_res: f64,
        start_time: f64,
        end_time: Option<f64>,
    ) -> Result<Pipeline, ConfigurationError> {
        let mut assembler = GridAssembler::new(obs_context.num_chans, time_res, start_time)?;
        if let Some(end_time) = end_time {
            assembler = assembler.with_end_time(end_time)?;
        }
        Ok(Pipeline::with_assembler(obs_context, assembler))
    }

    fn with_assembler(obs_context: ObsContext, assembler: GridAssembler) -> Pipeline {
        Pipeline {
            state: PipelineState::Idle,
            obs_context,
            assembler: Some(assembler),
            grid: None,
            calibrated: vec![],
            spectrum: None,
        }
    }

    pub fn from_params(params: &MakeDsParams) -> Result<Pipeline, ConfigurationError> {
        let mut pipeline = Pipeline::new(
            params.obs_context.clone(),
            params.time_res,
            params.start_time,
            params.end_time,
        )?;
        if let Some(max_time_bins) = params.max_time_bins {
            pipeline.assembler = match pipeline.assembler.take() {
                Some(a) => Some(a.with_max_time_bins(max_time_bins)?),
                None => None,
            };
        }
        Ok(pipeline)
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn obs_context(&self) -> &ObsContext {
        &self.obs_context
    }

    /// The grid, once it has been assembled and until it's exported.
    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    /// The dynamic spectrum, once it has been exported.
    pub fn spectrum(&self) -> Option<&DynamicSpectrum> {
        self.spectrum.as_ref()
    }

    /// Record that `stage` failed. A pipeline that has already failed keeps
    /// its original failure.
    fn fail(&mut self, stage: Stage) {
        if !matches!(self.state, PipelineState::Failed { .. }) {
            self.state = PipelineState::Failed { stage };
        }
    }

    /// Check that `stage` may run now, i.e. that the pipeline is in the
    /// `required` state.
    fn begin(&mut self, stage: Stage, required: PipelineState) -> Result<(), PipelineError> {
        if self.state == required {
            debug!("Pipeline stage: {stage}");
            Ok(())
        } else {
            Err(self.out_of_order(stage))
        }
    }

    fn out_of_order(&mut self, stage: Stage) -> PipelineError {
        let state = self.state;
        self.fail(stage);
        PipelineError::OutOfOrder { stage, state }
    }

    /// Mark `stage` as failed if `result` is an error.
    fn track<T, E: Into<PipelineError>>(
        &mut self,
        stage: Stage,
        result: Result<T, E>,
    ) -> Result<T, PipelineError> {
        result.map_err(|e| {
            self.fail(stage);
            e.into()
        })
    }

    /// Consume every sample. Returns the number of samples read, including
    /// those outside the configured time range.
    pub fn read<I>(&mut self, samples: I) -> Result<u64, PipelineError>
    where
        I: IntoIterator<Item = Result<Sample, ReadError>>,
    {
        self.begin(Stage::Reading, PipelineState::Idle)?;
        let mut assembler = match self.assembler.take() {
            Some(a) => a,
            None => return Err(self.out_of_order(Stage::Reading)),
        };
        self.state = PipelineState::Reading;

        let num_chans = self.obs_context.num_chans;
        let mut num_read = 0;
        for sample in samples {
            let sample = self.track(Stage::Reading, sample)?;
            if let Err(e) = check_finite(num_read, &sample) {
                return self.track(Stage::Reading, Err(ReadError::from(e)));
            }
            if sample.channel >= num_chans {
                let e = MalformedRecordError::ChannelOutOfRange {
                    offset: num_read,
                    chan: sample.channel,
                    num_chans,
                };
                return self.track(Stage::Reading, Err(ReadError::from(e)));
            }
            if let Err(source) = assembler.add(&sample) {
                let e = MalformedRecordError::Unbinnable {
                    offset: num_read,
                    source,
                };
                return self.track(Stage::Reading, Err(ReadError::from(e)));
            }
            num_read += 1;
        }

        info!(
            "Read {num_read} samples ({} outside the requested time range)",
            assembler.num_skipped()
        );
        self.assembler = Some(assembler);
        Ok(num_read)
    }

    /// Turn the accumulated samples into a grid.
    pub fn assemble(&mut self) -> Result<&Grid, PipelineError> {
        self.begin(Stage::Assembling, PipelineState::Reading)?;
        let assembler = match self.assembler.take() {
            Some(a) => a,
            None => return Err(self.out_of_order(Stage::Assembling)),
        };
        let grid = assembler.finalise();
        let num_gaps = grid.counts().iter().filter(|&&c| c == 0).count();
        info!(
            "Dynamic spectrum has {} time bins and {} channels ({num_gaps} empty cells)",
            grid.num_times(),
            grid.num_chans()
        );
        if grid.num_times() == 0 {
            warn!("No samples landed in the dynamic spectrum");
        }
        self.state = PipelineState::Assembling;
        Ok(self.grid.insert(grid))
    }

    /// Write the assembled grid's bandshape, smoothed with a running median of
    /// `window` channels. This must happen before normalisation; failures
    /// count against the normalising stage.
    pub fn write_bandshape(&mut self, file: &Path, window: usize) -> Result<(), PipelineError> {
        if self.state != PipelineState::Assembling {
            return Err(self.out_of_order(Stage::Normalising));
        }
        let bandshape = match self.grid.as_ref() {
            Some(grid) => Bandshape::new(grid, window),
            None => return Err(self.out_of_order(Stage::Normalising)),
        };
        let bandshape = self.track(Stage::Normalising, bandshape)?;
        let result = bandshape.write(file);
        self.track(Stage::Normalising, result)?;
        info!("Bandshape written to {}", file.display());
        Ok(())
    }

    /// Apply calibration to the grid. Returns whether each channel was
    /// calibrated.
    pub fn normalise(&mut self, source: &CalibrationSource) -> Result<&[bool], PipelineError> {
        self.begin(Stage::Normalising, PipelineState::Assembling)?;
        let result = match self.grid.as_mut() {
            Some(grid) => normalise_grid(grid, source),
            None => return Err(self.out_of_order(Stage::Normalising)),
        };
        let calibrated = self.track(Stage::Normalising, result)?;
        info!(
            "{} of {} channels calibrated",
            calibrated.iter().filter(|&&c| c).count(),
            calibrated.len()
        );
        self.calibrated = calibrated;
        self.state = PipelineState::Normalising;
        Ok(&self.calibrated)
    }

    /// Freeze the normalised grid into a dynamic spectrum and write it to each
    /// of `outputs`.
    pub fn export(&mut self, outputs: &[PathBuf]) -> Result<&DynamicSpectrum, PipelineError> {
        self.begin(Stage::Exporting, PipelineState::Normalising)?;
        let grid = match self.grid.take() {
            Some(grid) => grid,
            None => return Err(self.out_of_order(Stage::Exporting)),
        };
        let calibrated = std::mem::take(&mut self.calibrated);
        let result = DynamicSpectrum::from_grid(grid, &self.obs_context, calibrated);
        let ds = self.track(Stage::Exporting, result)?;
        for (i, output) in outputs.iter().enumerate() {
            if let Err(e) = ds.write(output) {
                remove_outputs(&outputs[..=i]);
                return self.track(Stage::Exporting, Err(e));
            }
        }
        self.state = PipelineState::Exported;
        Ok(self.spectrum.insert(ds))
    }

    /// Run every stage with the supplied parameters.
    pub fn run<I>(
        &mut self,
        samples: I,
        params: &MakeDsParams,
    ) -> Result<&DynamicSpectrum, PipelineError>
    where
        I: IntoIterator<Item = Result<Sample, ReadError>>,
    {
        self.read(samples)?;
        self.assemble()?;
        if let Some(bandshape_output) = params.bandshape_output.as_deref() {
            self.write_bandshape(bandshape_output, params.smoothing_window)?;
        }
        self.normalise(&params.calibration)?;
        self.export(&params.outputs)
    }
}

fn normalise_grid(grid: &mut Grid, source: &CalibrationSource) -> Result<Vec<bool>, PipelineError> {
    let calibrated = match source {
        CalibrationSource::None => {
            info!("No calibration requested; all channels are uncalibrated");
            skip_normalisation(grid)?
        }
        CalibrationSource::File { file, format } => {
            let table = CalibrationTable::read(file, *format)?;
            normalise(grid, &table)?
        }
        CalibrationSource::SelfBandpass { window } => {
            let (table, _) = CalibrationTable::from_bandshape(grid, *window)?;
            normalise(grid, &table)?
        }
    };
    Ok(calibrated)
}

/// Remove the outputs of a failed export, including any partially-written
/// file.
fn remove_outputs(outputs: &[PathBuf]) {
    for output in outputs {
        match std::fs::remove_file(output) {
            Ok(()) => debug!("Removed partial output {}", output.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
            Err(e) => warn!("Couldn't remove partial output {}: {e}", output.display()),
        }
    }
}
