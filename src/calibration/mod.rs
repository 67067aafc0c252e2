//! Bandpass and gain calibration of a time-frequency grid.
//!
//! Each calibrated channel has its powers replaced with `(power - offset) /
//! gain`. Calibration tables can be read from a file or derived from the data
//! itself by smoothing its time-averaged bandshape.

mod error;

pub use error::{CalibrationMismatchError, CalibrationReadError, NormaliseError};

use std::{
    collections::{BTreeMap, HashSet},
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
};

use log::{debug, trace, warn};
use ndarray::prelude::*;

use crate::{grid::Grid, params::ConfigurationError};

/// The correction for a single channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelCalibration {
    pub gain: f64,
    pub bandpass_offset: f64,
}

/// All supported calibration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationFormat {
    /// Lines of "channel gain offset".
    Gains,

    /// gptool's bandshape.dat; lines of "channel value", where the value is
    /// the gain and any further columns are ignored. A value of 0 marks a
    /// channel as unusable.
    Bandshape,
}

impl std::str::FromStr for CalibrationFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<CalibrationFormat, String> {
        match s.to_lowercase().as_str() {
            "gains" | "gain" => Ok(CalibrationFormat::Gains),
            "bandshape" => Ok(CalibrationFormat::Bandshape),
            _ => Err(s.to_string()),
        }
    }
}

/// Per-channel calibration, keyed by channel index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    entries: BTreeMap<usize, ChannelCalibration>,
}

impl CalibrationTable {
    pub fn new() -> CalibrationTable {
        CalibrationTable::default()
    }

    /// Add or replace the calibration of a channel.
    pub fn insert(&mut self, chan: usize, gain: f64, bandpass_offset: f64) {
        self.entries.insert(
            chan,
            ChannelCalibration {
                gain,
                bandpass_offset,
            },
        );
    }

    pub fn get(&self, chan: usize) -> Option<&ChannelCalibration> {
        self.entries.get(&chan)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The lowest and highest channel in the table.
    pub fn channel_bounds(&self) -> Option<(usize, usize)> {
        let first = self.entries.keys().next()?;
        let last = self.entries.keys().next_back()?;
        Some((*first, *last))
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ChannelCalibration)> {
        self.entries.iter().map(|(&c, cal)| (c, cal))
    }

    /// Read a calibration table from a file.
    pub fn read<P: AsRef<Path>>(
        file: P,
        format: CalibrationFormat,
    ) -> Result<CalibrationTable, CalibrationReadError> {
        let file = file.as_ref();
        debug!("Reading {format:?} calibration from {}", file.display());
        let reader = BufReader::new(File::open(file)?);
        CalibrationTable::parse(reader, format, &file.display().to_string())
    }

    /// Parse a calibration table from a stream. `name` is only used in error
    /// messages.
    pub fn parse<R: BufRead>(
        reader: R,
        format: CalibrationFormat,
        name: &str,
    ) -> Result<CalibrationTable, CalibrationReadError> {
        let mut table = CalibrationTable::new();
        // Includes channels left out of the table.
        let mut seen = HashSet::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parse_error = || CalibrationReadError::Parse {
                file: name.to_string(),
                line_number: i + 1,
                line: trimmed.to_string(),
            };

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            let (chan, cal) = match (format, fields.as_slice()) {
                (CalibrationFormat::Gains, [chan, gain, offset]) => (
                    chan.parse::<usize>().map_err(|_| parse_error())?,
                    Some(ChannelCalibration {
                        gain: gain.parse().map_err(|_| parse_error())?,
                        bandpass_offset: offset.parse().map_err(|_| parse_error())?,
                    }),
                ),
                (CalibrationFormat::Bandshape, [chan, value, ..]) => {
                    let chan = chan.parse::<usize>().map_err(|_| parse_error())?;
                    let value: f64 = value.parse().map_err(|_| parse_error())?;
                    if value == 0.0 {
                        trace!("Channel {chan} has no bandshape; leaving it out");
                        (chan, None)
                    } else {
                        (
                            chan,
                            Some(ChannelCalibration {
                                gain: value,
                                bandpass_offset: 0.0,
                            }),
                        )
                    }
                }
                _ => return Err(parse_error()),
            };

            if !seen.insert(chan) {
                return Err(CalibrationReadError::DuplicateChannel {
                    file: name.to_string(),
                    chan,
                });
            }
            if let Some(cal) = cal {
                table.entries.insert(chan, cal);
            }
        }
        debug!("Calibration table has {} channels", table.len());
        Ok(table)
    }

    /// Derive a calibration table from the data's own bandshape.
    ///
    /// Each channel's time-averaged power is smoothed across channels with a
    /// running median of `window` channels; the smoothed value becomes the
    /// channel's gain. Channels whose smoothed bandshape is zero or undefined
    /// are left out.
    pub fn from_bandshape(
        grid: &Grid,
        window: usize,
    ) -> Result<(CalibrationTable, Bandshape), ConfigurationError> {
        let bandshape = Bandshape::new(grid, window)?;
        let mut table = CalibrationTable::new();
        for (chan, &smooth) in bandshape.smooth.iter().enumerate() {
            if smooth.is_finite() && smooth != 0.0 {
                table.insert(chan, smooth, 0.0);
            }
        }
        debug!(
            "Derived calibration for {} of {} channels from the bandshape",
            table.len(),
            grid.num_chans()
        );
        Ok((table, bandshape))
    }
}

/// The time-averaged power of every channel, before and after smoothing across
/// channels.
#[derive(Debug, Clone)]
pub struct Bandshape {
    pub mean: Array1<f64>,
    pub smooth: Array1<f64>,
}

impl Bandshape {
    pub fn new(grid: &Grid, window: usize) -> Result<Bandshape, ConfigurationError> {
        if window == 0 {
            return Err(ConfigurationError::ZeroSmoothingWindow);
        }
        let mean = grid.channel_means();
        let smooth = running_median(mean.view(), window);
        Ok(Bandshape { mean, smooth })
    }

    /// Write the bandshape as text, one channel per line.
    pub fn write<P: AsRef<Path>>(&self, file: P) -> Result<(), std::io::Error> {
        let mut f = std::io::BufWriter::new(File::create(file)?);
        writeln!(f, "# chan smooth_bshape mean_bshape")?;
        for (chan, (smooth, mean)) in self.smooth.iter().zip(self.mean.iter()).enumerate() {
            writeln!(f, "{chan} {smooth} {mean}")?;
        }
        f.flush()
    }
}

/// Median-filter `values` with a window of exactly `window` elements, from
/// `window / 2` before each element up to (but not including) `window -
/// window / 2` after it. For an even window that is `[i - w/2, i + w/2)`, as
/// gptool does. The window is truncated at the edges and NaNs are ignored; if
/// a window holds no numbers, the result is NaN. For an even number of values
/// the upper median is used.
pub(crate) fn running_median(values: ArrayView1<f64>, window: usize) -> Array1<f64> {
    let n = values.len();
    let before = window / 2;
    let after = window - before;
    let mut scratch = Vec::with_capacity(window);
    Array1::from_shape_fn(n, |i| {
        let lo = i.saturating_sub(before);
        let hi = (i + after).min(n);
        scratch.clear();
        scratch.extend(values.slice(s![lo..hi]).iter().copied().filter(|v| !v.is_nan()));
        if scratch.is_empty() {
            return f64::NAN;
        }
        scratch.sort_unstable_by(|a, b| a.total_cmp(b));
        scratch[scratch.len() / 2]
    })
}

/// Apply `table` to `grid` in place.
///
/// Returns whether each channel was calibrated. Channels without an entry, or
/// whose entry has a zero or non-finite gain, are left untouched. Gaps stay
/// gaps.
///
/// A grid can only be normalised once; further attempts return
/// [`NormaliseError::AlreadyNormalised`] and leave the grid unchanged. If none
/// of the table's channels are in the grid, the grid is also left unchanged.
pub fn normalise(grid: &mut Grid, table: &CalibrationTable) -> Result<Vec<bool>, NormaliseError> {
    if grid.is_normalised() {
        return Err(NormaliseError::AlreadyNormalised);
    }

    let num_chans = grid.num_chans();
    let (first, last) = table
        .channel_bounds()
        .ok_or(CalibrationMismatchError::EmptyTable)?;
    if first >= num_chans {
        return Err(NormaliseError::from(CalibrationMismatchError::NoOverlap {
            first,
            last,
            num_chans,
        }));
    }
    if last >= num_chans {
        debug!(
            "Ignoring calibration for channels {}..={last}; the data only has {num_chans} channels",
            num_chans
        );
    }

    let mut calibrated = vec![false; num_chans];
    for (chan, cal) in table.iter().take_while(|(chan, _)| *chan < num_chans) {
        if !(cal.gain.is_finite() && cal.gain != 0.0 && cal.bandpass_offset.is_finite()) {
            warn!(
                "Channel {chan} has an unusable calibration (gain {}, offset {}); leaving it uncalibrated",
                cal.gain, cal.bandpass_offset
            );
            continue;
        }

        let (mut power, counts) = grid.channel_mut(chan);
        power.zip_mut_with(&counts, |p, &c| {
            if c > 0 {
                *p = (*p - cal.bandpass_offset) / cal.gain;
            }
        });
        calibrated[chan] = true;
    }
    grid.mark_normalised();

    let num_calibrated = calibrated.iter().filter(|&&c| c).count();
    if num_calibrated < num_chans {
        warn!(
            "{} of {num_chans} channels are uncalibrated",
            num_chans - num_calibrated
        );
    }
    Ok(calibrated)
}

/// Mark a grid as having been through normalisation without any calibration;
/// every channel is flagged as uncalibrated.
pub fn skip_normalisation(grid: &mut Grid) -> Result<Vec<bool>, NormaliseError> {
    if grid.is_normalised() {
        return Err(NormaliseError::AlreadyNormalised);
    }
    grid.mark_normalised();
    Ok(vec![false; grid.num_chans()])
}
