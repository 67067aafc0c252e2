//! Binning of samples into a regular time-frequency grid.

mod error;

pub use error::GridError;

use log::{debug, trace};
use ndarray::prelude::*;

use crate::{params::ConfigurationError, Sample};

/// The value of a grid cell that received no samples. This is distinct from a
/// measured power of zero; test for gaps with `is_nan` or with the sample
/// counts, never by comparing against this value.
pub const GAP: f64 = f64::NAN;

/// The default limit on the number of cells (time bins x channels) in a grid.
pub const DEFAULT_MAX_CELLS: usize = 1 << 28;

/// The most samples a single cell can hold. Counts are stored as 32-bit signed
/// integers in FITS.
pub const MAX_SAMPLES_PER_CELL: u32 = i32::MAX as u32;

/// Accumulates samples into time bins of a fixed width.
///
/// A sample's time bin is `floor((timestamp - start_time) / time_res)`. The
/// grid grows as later samples arrive, so the number of time bins doesn't need
/// to be known ahead of time. It can't grow beyond `max_time_bins`; by default
/// that is [`DEFAULT_MAX_CELLS`] divided by the number of channels.
#[derive(Debug)]
pub struct GridAssembler {
    num_chans: usize,

    /// The leading edge of the first time bin \[seconds\].
    start_time: f64,

    /// Samples at or after this time \[seconds\] are skipped.
    end_time: Option<f64>,

    /// The width of a time bin \[seconds\].
    time_res: f64,

    max_time_bins: usize,

    /// Summed power. [time][chan], flattened.
    sums: Vec<f64>,

    /// Samples per cell. [time][chan], flattened.
    counts: Vec<u32>,

    num_accepted: u64,

    num_skipped: u64,
}

impl GridAssembler {
    pub fn new(
        num_chans: usize,
        time_res: f64,
        start_time: f64,
    ) -> Result<GridAssembler, ConfigurationError> {
        if !(time_res.is_finite() && time_res > 0.0) {
            return Err(ConfigurationError::BadTimeRes(time_res));
        }
        if num_chans == 0 {
            return Err(ConfigurationError::NoChannels);
        }
        if !start_time.is_finite() {
            return Err(ConfigurationError::NonFiniteTime {
                what: "start time",
                value: start_time,
            });
        }
        Ok(GridAssembler {
            num_chans,
            start_time,
            end_time: None,
            time_res,
            max_time_bins: (DEFAULT_MAX_CELLS / num_chans).max(1),
            sums: vec![],
            counts: vec![],
            num_accepted: 0,
            num_skipped: 0,
        })
    }

    /// Ignore samples at or after `end_time`.
    pub fn with_end_time(mut self, end_time: f64) -> Result<GridAssembler, ConfigurationError> {
        if !end_time.is_finite() {
            return Err(ConfigurationError::NonFiniteTime {
                what: "end time",
                value: end_time,
            });
        }
        if end_time <= self.start_time {
            return Err(ConfigurationError::EndBeforeStart {
                start: self.start_time,
                end: end_time,
            });
        }
        self.end_time = Some(end_time);
        Ok(self)
    }

    /// Limit the grid to `max_time_bins` time bins.
    pub fn with_max_time_bins(
        mut self,
        max_time_bins: usize,
    ) -> Result<GridAssembler, ConfigurationError> {
        if max_time_bins == 0 || max_time_bins.checked_mul(self.num_chans).is_none() {
            return Err(ConfigurationError::BadMaxTimeBins(max_time_bins));
        }
        self.max_time_bins = max_time_bins;
        Ok(self)
    }

    pub fn max_time_bins(&self) -> usize {
        self.max_time_bins
    }

    /// Add a sample to the grid. Samples outside the configured time range are
    /// skipped and counted. A sample that can't be binned is rejected and the
    /// grid is left unchanged.
    pub fn add(&mut self, sample: &Sample) -> Result<(), GridError> {
        if sample.channel >= self.num_chans {
            return Err(GridError::ChannelOutOfRange {
                chan: sample.channel,
                num_chans: self.num_chans,
            });
        }
        if !sample.timestamp.is_finite() {
            return Err(GridError::NonFiniteTimestamp(sample.timestamp));
        }
        if !sample.power.is_finite() {
            return Err(GridError::NonFinitePower(sample.power));
        }

        let before_start = sample.timestamp < self.start_time;
        let after_end = self.end_time.map(|e| sample.timestamp >= e).unwrap_or(false);
        if before_start || after_end {
            trace!("Skipping sample at {}s", sample.timestamp);
            self.num_skipped += 1;
            return Ok(());
        }

        // Bound the bin while it's still a float; the cast is then exact and
        // `(time_bin + 1) * num_chans` can't overflow.
        let bin = ((sample.timestamp - self.start_time) / self.time_res).floor();
        if !(bin < self.max_time_bins as f64) {
            return Err(GridError::TooManyTimeBins {
                timestamp: sample.timestamp,
                time_bin: bin,
                max_time_bins: self.max_time_bins,
            });
        }
        let time_bin = bin as usize;

        let i = time_bin * self.num_chans + sample.channel;
        if self.counts.get(i).copied().unwrap_or(0) >= MAX_SAMPLES_PER_CELL {
            return Err(GridError::CountOverflow {
                time_bin,
                chan: sample.channel,
                max: MAX_SAMPLES_PER_CELL,
            });
        }

        let num_time_bins = self.counts.len() / self.num_chans;
        if time_bin >= num_time_bins {
            let new_len = (time_bin + 1) * self.num_chans;
            self.sums.resize(new_len, 0.0);
            self.counts.resize(new_len, 0);
        }
        self.sums[i] += sample.power;
        self.counts[i] += 1;
        self.num_accepted += 1;
        Ok(())
    }

    /// The number of samples that landed in the grid.
    pub fn num_accepted(&self) -> u64 {
        self.num_accepted
    }

    /// The number of samples outside the configured time range.
    pub fn num_skipped(&self) -> u64 {
        self.num_skipped
    }

    /// Turn the accumulated sums into mean powers. Cells without any samples
    /// become [`GAP`]s.
    pub fn finalise(self) -> Grid {
        let num_times = self.counts.len() / self.num_chans;
        let shape = (num_times, self.num_chans);
        // The lengths always match the shape; the vectors only ever grow by
        // whole time bins.
        let counts = Array2::from_shape_vec(shape, self.counts)
            .expect("counts are a whole number of time bins");
        let sums = Array2::from_shape_vec(shape, self.sums)
            .expect("sums are a whole number of time bins");
        let mut power = sums;
        power.zip_mut_with(&counts, |p, &c| {
            *p = if c == 0 { GAP } else { *p / f64::from(c) };
        });

        let num_gaps = counts.iter().filter(|&&c| c == 0).count();
        debug!(
            "Assembled a grid of {num_times} time bins x {} channels ({} samples, {num_gaps} empty cells, {} samples skipped)",
            self.num_chans, self.num_accepted, self.num_skipped
        );

        Grid {
            power,
            counts,
            start_time: self.start_time,
            time_res: self.time_res,
            normalised: false,
        }
    }
}

/// Mean power per (time bin, channel) cell.
#[derive(Debug, Clone)]
pub struct Grid {
    /// [time][chan]. Cells without data are [`GAP`].
    power: Array2<f64>,

    /// The number of samples averaged into each cell. [time][chan]
    counts: Array2<u32>,

    start_time: f64,

    time_res: f64,

    /// Has calibration been applied to this grid?
    normalised: bool,
}

impl Grid {
    pub fn num_times(&self) -> usize {
        self.power.len_of(Axis(0))
    }

    pub fn num_chans(&self) -> usize {
        self.power.len_of(Axis(1))
    }

    /// The leading edge of the first time bin \[seconds since the start of the
    /// observation\].
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// The width of each time bin \[seconds\].
    pub fn time_res(&self) -> f64 {
        self.time_res
    }

    /// The leading edge of every time bin \[seconds\].
    pub fn bin_times(&self) -> Array1<f64> {
        Array1::from_shape_fn(self.num_times(), |i| {
            self.start_time + i as f64 * self.time_res
        })
    }

    /// Mean powers, [time][chan]. Gaps are NaN.
    pub fn power(&self) -> ArrayView2<f64> {
        self.power.view()
    }

    /// Sample counts, [time][chan]. A count of 0 is a gap.
    pub fn counts(&self) -> ArrayView2<u32> {
        self.counts.view()
    }

    /// The power in a cell, or `None` if the cell is a gap.
    ///
    /// # Panics
    ///
    /// If the indices are out of bounds.
    pub fn get(&self, time_bin: usize, chan: usize) -> Option<f64> {
        if self.counts[(time_bin, chan)] == 0 {
            None
        } else {
            Some(self.power[(time_bin, chan)])
        }
    }

    pub fn is_gap(&self, time_bin: usize, chan: usize) -> bool {
        self.counts[(time_bin, chan)] == 0
    }

    pub fn is_normalised(&self) -> bool {
        self.normalised
    }

    /// The time-averaged power of each channel, ignoring gaps. Channels without
    /// any data are NaN.
    pub fn channel_means(&self) -> Array1<f64> {
        let mut means = Array1::from_elem(self.num_chans(), f64::NAN);
        for (chan, mean) in means.iter_mut().enumerate() {
            let (sum, n) = self
                .power
                .column(chan)
                .iter()
                .zip(self.counts.column(chan))
                .filter(|(_, c)| **c > 0)
                .fold((0.0, 0usize), |(sum, n), (p, _)| (sum + p, n + 1));
            if n > 0 {
                *mean = sum / n as f64;
            }
        }
        means
    }

    /// Mutable access to the powers of a channel, paired with the sample
    /// counts so that gaps can be skipped.
    pub(crate) fn channel_mut(&mut self, chan: usize) -> (ArrayViewMut1<f64>, ArrayView1<u32>) {
        (self.power.column_mut(chan), self.counts.column(chan))
    }

    pub(crate) fn mark_normalised(&mut self) {
        self.normalised = true;
    }

    /// Split the grid into its powers and counts.
    pub(crate) fn into_parts(self) -> (Array2<f64>, Array2<u32>) {
        (self.power, self.counts)
    }
}
