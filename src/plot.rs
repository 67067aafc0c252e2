//! Plot dynamic spectra.
//!
//! The plot has two panels: a waterfall of power against time and frequency,
//! with gaps drawn in grey, and beneath it the time-averaged spectrum.

use std::path::Path;

use itertools::{Itertools, MinMaxResult};
use log::{debug, warn};
use plotters::prelude::*;
use thiserror::Error;

use crate::spectrum::DynamicSpectrum;

/// The number of X pixels on the plots.
const X_PIXELS: u32 = 2400;
/// The number of Y pixels on the plots.
const Y_PIXELS: u32 = 1800;

const GAP_COLOUR: RGBColor = RGBColor(220, 220, 220);

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Cannot plot a dynamic spectrum without any time bins")]
    Empty,

    #[error("Error when drawing the waterfall: {0}")]
    Waterfall(String),

    #[error("Error when drawing the time-averaged spectrum: {0}")]
    Spectrum(String),

    #[error("Error from the plotters library: {0}")]
    Plotters(Box<dyn std::error::Error>),
}

/// Limits on the colour scale of the waterfall. Unset limits come from the
/// data.
#[derive(Debug, Clone, Copy, Default)]
pub struct PowerRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// Plot `ds` to a PNG file at `output`.
pub fn plot_dynamic_spectrum(
    ds: &DynamicSpectrum,
    output: &Path,
    title: &str,
    range: PowerRange,
) -> Result<(), PlotError> {
    if ds.num_times() == 0 {
        return Err(PlotError::Empty);
    }
    let (min_power, max_power) = colour_scale(ds, range);
    debug!("Colour scale for {}: {min_power} to {max_power}", output.display());

    let root_area = BitMapBackend::new(output, (X_PIXELS, Y_PIXELS)).into_drawing_area();
    root_area
        .fill(&WHITE)
        .map_err(|e| PlotError::Plotters(Box::new(e)))?;
    let root_area = root_area
        .titled(title, ("sans-serif", 50).into_font())
        .map_err(|e| PlotError::Plotters(Box::new(e)))?;
    let (waterfall_area, spectrum_area) = root_area.split_vertically((Y_PIXELS * 2 / 3) as i32);

    let (freq_lo, freq_hi, chan_width) = frequency_extent(ds.chan_freqs());
    let time_lo = ds.start_time();
    let time_hi = ds.start_time() + ds.num_times() as f64 * ds.time_res();

    let mut waterfall = ChartBuilder::on(&waterfall_area)
        .margin(20)
        .x_label_area_size(70)
        .y_label_area_size(110)
        .build_cartesian_2d(time_lo..time_hi, freq_lo..freq_hi)
        .map_err(|e| PlotError::Waterfall(e.to_string()))?;
    waterfall
        .configure_mesh()
        .disable_mesh()
        .x_desc("Time [s]")
        .y_desc("Frequency [MHz]")
        .label_style(("sans-serif", 30))
        .draw()
        .map_err(|e| PlotError::Waterfall(e.to_string()))?;

    let bin_times = ds.bin_times();
    let power = ds.power();
    waterfall
        .draw_series(
            bin_times
                .iter()
                .enumerate()
                .cartesian_product(ds.chan_freqs().iter().enumerate())
                .map(|((i_time, &t), (i_chan, &f))| {
                    let style = if ds.is_gap(i_time, i_chan) {
                        GAP_COLOUR.filled()
                    } else {
                        power_colour(power[(i_time, i_chan)], min_power, max_power).filled()
                    };
                    Rectangle::new(
                        [
                            (t, f - chan_width / 2.0),
                            (t + ds.time_res(), f + chan_width / 2.0),
                        ],
                        style,
                    )
                }),
        )
        .map_err(|e| PlotError::Waterfall(e.to_string()))?;

    let spectrum = ds.time_averaged_spectrum();
    let points: Vec<(f64, f64)> = ds
        .chan_freqs()
        .iter()
        .copied()
        .zip(spectrum.iter().copied())
        .filter(|(_, p)| p.is_finite())
        .sorted_by(|a, b| a.0.total_cmp(&b.0))
        .collect();
    let (spec_lo, spec_hi) = match padded_minmax(points.iter().map(|(_, p)| *p)) {
        Some(r) => r,
        None => {
            warn!("Every channel is empty; not drawing the time-averaged spectrum");
            root_area
                .present()
                .map_err(|e| PlotError::Plotters(Box::new(e)))?;
            return Ok(());
        }
    };

    let mut spectrum_chart = ChartBuilder::on(&spectrum_area)
        .margin(20)
        .x_label_area_size(70)
        .y_label_area_size(110)
        .build_cartesian_2d(freq_lo..freq_hi, spec_lo..spec_hi)
        .map_err(|e| PlotError::Spectrum(e.to_string()))?;
    spectrum_chart
        .configure_mesh()
        .x_desc("Frequency [MHz]")
        .y_desc("Mean power")
        .label_style(("sans-serif", 30))
        .draw()
        .map_err(|e| PlotError::Spectrum(e.to_string()))?;
    spectrum_chart
        .draw_series(LineSeries::new(points, BLACK.stroke_width(2)))
        .map_err(|e| PlotError::Spectrum(e.to_string()))?;

    root_area
        .present()
        .map_err(|e| PlotError::Plotters(Box::new(e)))?;
    Ok(())
}

/// The colour scale limits. Limits that aren't supplied come from the finite
/// powers in the spectrum.
fn colour_scale(ds: &DynamicSpectrum, range: PowerRange) -> (f64, f64) {
    let (data_min, data_max) =
        padded_minmax(ds.power().iter().copied().filter(|p| p.is_finite())).unwrap_or((0.0, 1.0));
    let min = range.min.unwrap_or(data_min);
    let max = range.max.unwrap_or(data_max);
    if max > min {
        (min, max)
    } else {
        warn!("The colour scale's maximum ({max}) isn't above its minimum ({min}); widening it");
        (min, min + 1.0)
    }
}

/// The smallest and largest values, pulled apart if they're equal.
fn padded_minmax<I: Iterator<Item = f64>>(values: I) -> Option<(f64, f64)> {
    match values.minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::NoElements => None,
        MinMaxResult::OneElement(v) => Some((v - 0.5, v + 0.5)),
        MinMaxResult::MinMax(lo, hi) if lo == hi => Some((lo - 0.5, hi + 0.5)),
        MinMaxResult::MinMax(lo, hi) => Some((lo, hi)),
    }
}

/// The lowest and highest edges of the band and the width of a channel
/// \[MHz\].
fn frequency_extent(chan_freqs: &[f64]) -> (f64, f64, f64) {
    let (lo, hi) = match chan_freqs.iter().copied().minmax_by(|a, b| a.total_cmp(b)) {
        MinMaxResult::NoElements => (0.0, 0.0),
        MinMaxResult::OneElement(f) => (f, f),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    };
    let chan_width = if chan_freqs.len() > 1 && hi > lo {
        (hi - lo) / (chan_freqs.len() - 1) as f64
    } else {
        1.0
    };
    (lo - chan_width / 2.0, hi + chan_width / 2.0, chan_width)
}

/// Map a power onto a blue (low) to red (high) colour.
fn power_colour(power: f64, min: f64, max: f64) -> HSLColor {
    let v = ((power - min) / (max - min)).clamp(0.0, 1.0);
    HSLColor(240.0 / 360.0 * (1.0 - v), 0.9, 0.5)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_frequency_extent() {
        let (lo, hi, width) = frequency_extent(&[475.0, 425.0, 375.0, 325.0]);
        assert_abs_diff_eq!(width, 50.0);
        assert_abs_diff_eq!(lo, 300.0);
        assert_abs_diff_eq!(hi, 500.0);

        let (lo, hi, width) = frequency_extent(&[400.0]);
        assert_abs_diff_eq!(width, 1.0);
        assert_abs_diff_eq!(lo, 399.5);
        assert_abs_diff_eq!(hi, 400.5);
    }

    #[test]
    fn test_padded_minmax() {
        assert_eq!(padded_minmax(std::iter::empty::<f64>()), None);
        assert_eq!(padded_minmax([3.0].into_iter()), Some((2.5, 3.5)));
        assert_eq!(padded_minmax([2.0, 2.0].into_iter()), Some((1.5, 2.5)));
        assert_eq!(padded_minmax([5.0, -1.0, 2.0].into_iter()), Some((-1.0, 5.0)));
    }

    #[test]
    fn test_power_colour_is_clamped() {
        let low = power_colour(-10.0, 0.0, 1.0);
        let high = power_colour(10.0, 0.0, 1.0);
        assert_abs_diff_eq!(low.0, 240.0 / 360.0);
        assert_abs_diff_eq!(high.0, 0.0);
    }
}
