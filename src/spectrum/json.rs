//! Dynamic spectra as JSON.
//!
//! Rows of the "power" and "counts" arrays are time bins. Gaps are `null`.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

use hifitime::Epoch;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use vec1::Vec1;

use super::{DynamicSpectrum, ShapeMismatch, SpectrumReadError, SpectrumWriteError};

#[derive(Serialize, Deserialize)]
struct DynamicSpectrumJson {
    obs_id: String,

    /// \[seconds\]
    start_time: f64,

    /// \[seconds\]
    time_res: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    mjd_obs: Option<f64>,

    #[serde(default)]
    software: Option<String>,

    /// \[MHz\]
    frequencies: Vec<f64>,

    calibrated: Vec<bool>,

    power: Vec<Vec<Option<f64>>>,

    counts: Vec<Vec<u32>>,
}

pub(super) fn write(ds: &DynamicSpectrum, file: &Path) -> Result<(), SpectrumWriteError> {
    let json = DynamicSpectrumJson {
        obs_id: ds.obs_id.clone(),
        start_time: ds.start_time,
        time_res: ds.time_res,
        mjd_obs: ds.obs_start.map(|e| e.to_mjd_utc_days()),
        software: Some(format!(
            "Created by {} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        )),
        frequencies: ds.chan_freqs.to_vec(),
        calibrated: ds.calibrated.clone(),
        power: ds
            .power
            .outer_iter()
            .zip(ds.counts.outer_iter())
            .map(|(power, counts)| {
                power
                    .iter()
                    .zip(counts.iter())
                    .map(|(&p, &c)| if c == 0 { None } else { Some(p) })
                    .collect()
            })
            .collect(),
        counts: ds.counts.outer_iter().map(|row| row.to_vec()).collect(),
    };

    let mut writer = BufWriter::new(File::create(file)?);
    serde_json::to_writer(&mut writer, &json)?;
    writer.flush()?;
    Ok(())
}

pub(super) fn read(file: &Path) -> Result<DynamicSpectrum, SpectrumReadError> {
    let json: DynamicSpectrumJson = serde_json::from_reader(BufReader::new(File::open(file)?))?;
    let chan_freqs = Vec1::try_from_vec(json.frequencies)
        .map_err(|_| SpectrumReadError::NoChannels(file.to_path_buf()))?;
    let num_chans = chan_freqs.len();
    let num_times = json.power.len();

    if json.counts.len() != num_times {
        return Err(ShapeMismatch {
            thing: "rows of sample counts",
            expected: num_times,
            actual: json.counts.len(),
        }
        .into());
    }
    for (power, counts) in json.power.iter().zip(json.counts.iter()) {
        for (thing, len) in [("powers in a row", power.len()), ("counts in a row", counts.len())] {
            if len != num_chans {
                return Err(ShapeMismatch {
                    thing,
                    expected: num_chans,
                    actual: len,
                }
                .into());
            }
        }
    }

    let counts = Array2::from_shape_fn((num_times, num_chans), |(t, c)| json.counts[t][c]);
    let power = Array2::from_shape_fn((num_times, num_chans), |(t, c)| {
        match (json.power[t][c], counts[(t, c)]) {
            (Some(p), n) if n > 0 => p,
            _ => crate::grid::GAP,
        }
    });

    let ds = DynamicSpectrum {
        obs_id: json.obs_id,
        start_time: json.start_time,
        time_res: json.time_res,
        chan_freqs,
        power,
        counts,
        calibrated: json.calibrated,
        obs_start: json.mjd_obs.map(Epoch::from_mjd_utc),
    };
    ds.validate()?;
    Ok(ds)
}
