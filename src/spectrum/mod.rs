//! Exporting and importing dynamic spectra.
//!
//! A [`DynamicSpectrum`] is a normalised grid frozen together with everything
//! needed to interpret it: the time axis (`start_time + time_res * bin`), the
//! channel frequencies and which channels were calibrated.

mod error;
mod fits;
mod json;
#[cfg(test)]
mod tests;

pub use error::{FitsError, ShapeMismatch, SpectrumReadError, SpectrumWriteError};

use std::path::Path;

use hifitime::Epoch;
use log::info;
use ndarray::prelude::*;
use vec1::Vec1;

use crate::{grid::Grid, ObsContext};

/// All supported dynamic spectrum formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsOutputType {
    Fits,
    Json,
}

impl DsOutputType {
    /// Determine the format from a file's extension.
    pub fn from_path(path: &Path) -> Option<DsOutputType> {
        match path
            .extension()
            .and_then(|os_str| os_str.to_str())
            .map(|s| s.to_lowercase())
            .as_deref()
        {
            Some("fits") => Some(DsOutputType::Fits),
            Some("json") => Some(DsOutputType::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DynamicSpectrum {
    obs_id: String,

    /// The leading edge of the first time bin \[seconds since the start of the
    /// observation\].
    start_time: f64,

    /// \[seconds\]
    time_res: f64,

    /// \[MHz\]
    chan_freqs: Vec1<f64>,

    /// [time][chan]. Gaps are NaN.
    power: Array2<f64>,

    /// [time][chan]. A count of 0 is a gap.
    counts: Array2<u32>,

    calibrated: Vec<bool>,

    obs_start: Option<Epoch>,
}

impl DynamicSpectrum {
    /// Freeze a normalised grid. `calibrated` has a flag for every channel.
    pub fn from_grid(
        grid: Grid,
        obs_context: &ObsContext,
        calibrated: Vec<bool>,
    ) -> Result<DynamicSpectrum, SpectrumWriteError> {
        if !grid.is_normalised() {
            return Err(SpectrumWriteError::NotNormalised);
        }
        let start_time = grid.start_time();
        let time_res = grid.time_res();
        let (power, counts) = grid.into_parts();
        let ds = DynamicSpectrum {
            obs_id: obs_context.obs_id.clone(),
            start_time,
            time_res,
            chan_freqs: obs_context.chan_freqs.clone(),
            power,
            counts,
            calibrated,
            obs_start: obs_context.obs_start,
        };
        ds.validate()?;
        Ok(ds)
    }

    /// Check that every part of the spectrum agrees on the number of channels.
    fn validate(&self) -> Result<(), ShapeMismatch> {
        let num_chans = self.power.len_of(Axis(1));
        if self.counts.dim() != self.power.dim() {
            return Err(ShapeMismatch {
                thing: "sample counts",
                expected: self.power.len(),
                actual: self.counts.len(),
            });
        }
        if self.chan_freqs.len() != num_chans {
            return Err(ShapeMismatch {
                thing: "channel frequencies",
                expected: num_chans,
                actual: self.chan_freqs.len(),
            });
        }
        if self.calibrated.len() != num_chans {
            return Err(ShapeMismatch {
                thing: "calibration flags",
                expected: num_chans,
                actual: self.calibrated.len(),
            });
        }
        Ok(())
    }

    /// Write the spectrum to a file. The format is determined by the file's
    /// extension; see [`DsOutputType`]. Existing files are replaced.
    pub fn write<P: AsRef<Path>>(&self, file: P) -> Result<(), SpectrumWriteError> {
        let file = file.as_ref();
        self.validate()?;
        match DsOutputType::from_path(file) {
            Some(DsOutputType::Fits) => fits::write(self, file)?,
            Some(DsOutputType::Json) => json::write(self, file)?,
            None => return Err(SpectrumWriteError::UnsupportedOutput(file.to_path_buf())),
        }
        info!("Dynamic spectrum written to {}", file.display());
        Ok(())
    }

    /// Read a spectrum written by [`DynamicSpectrum::write`].
    pub fn read<P: AsRef<Path>>(file: P) -> Result<DynamicSpectrum, SpectrumReadError> {
        let file = file.as_ref();
        match DsOutputType::from_path(file) {
            Some(DsOutputType::Fits) => fits::read(file),
            Some(DsOutputType::Json) => json::read(file),
            None => Err(SpectrumReadError::UnsupportedFormat(file.to_path_buf())),
        }
    }

    pub fn obs_id(&self) -> &str {
        &self.obs_id
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn time_res(&self) -> f64 {
        self.time_res
    }

    pub fn chan_freqs(&self) -> &[f64] {
        self.chan_freqs.as_slice()
    }

    pub fn obs_start(&self) -> Option<Epoch> {
        self.obs_start
    }

    pub fn num_times(&self) -> usize {
        self.power.len_of(Axis(0))
    }

    pub fn num_chans(&self) -> usize {
        self.power.len_of(Axis(1))
    }

    /// [time][chan]. Gaps are NaN.
    pub fn power(&self) -> ArrayView2<f64> {
        self.power.view()
    }

    pub fn counts(&self) -> ArrayView2<u32> {
        self.counts.view()
    }

    /// Whether each channel was calibrated.
    pub fn calibrated(&self) -> &[bool] {
        &self.calibrated
    }

    /// The leading edge of every time bin \[seconds\].
    pub fn bin_times(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.num_times(), |i| {
            self.start_time + i as f64 * self.time_res
        })
    }

    pub fn is_gap(&self, time_bin: usize, chan: usize) -> bool {
        self.counts[(time_bin, chan)] == 0
    }

    /// The mean power of each channel over time, ignoring gaps. Channels
    /// without any data are NaN.
    pub fn time_averaged_spectrum(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.num_chans(), |chan| {
            let (sum, n) = self
                .power
                .column(chan)
                .iter()
                .zip(self.counts.column(chan))
                .filter(|(_, c)| **c > 0)
                .fold((0.0, 0usize), |(sum, n), (p, _)| (sum + p, n + 1));
            if n == 0 {
                f64::NAN
            } else {
                sum / n as f64
            }
        })
    }
}
