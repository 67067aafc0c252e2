//! Build dynamic spectra from uGMRT beamformer data.
//!
//! Beamformer records are read ([read]), binned into a time-frequency grid
//! ([grid]), corrected for the bandpass ([calibration]) and written out as a
//! self-describing dynamic spectrum ([spectrum]). [pipeline] drives these
//! stages for a single observation.

pub mod calibration;
mod error;
pub mod grid;
mod logging;
pub mod params;
pub mod pipeline;
#[cfg(feature = "plotting")]
pub mod plot;
pub mod read;
pub mod spectrum;

pub use error::DsError;
pub use logging::setup_logging;

use hifitime::Epoch;
use vec1::Vec1;

/// A single power measurement from the beamformer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Seconds since the start of the observation.
    pub timestamp: f64,

    /// The index of the frequency channel this sample belongs to.
    pub channel: usize,

    pub power: f64,
}

impl Sample {
    pub fn new(timestamp: f64, channel: usize, power: f64) -> Sample {
        Sample {
            timestamp,
            channel,
            power,
        }
    }
}

/// Which side of the local oscillator the band sits on. This determines
/// whether frequencies increase or decrease with channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sideband {
    /// The first channel has the lowest frequency.
    Upper,

    /// The first channel has the highest frequency.
    Lower,
}

impl std::str::FromStr for Sideband {
    type Err = String;

    fn from_str(s: &str) -> Result<Sideband, String> {
        match s.to_lowercase().as_str() {
            "upper" | "usb" | "1" => Ok(Sideband::Upper),
            "lower" | "lsb" | "0" => Ok(Sideband::Lower),
            _ => Err(s.to_string()),
        }
    }
}

/// Observation metadata known before any samples are read.
#[derive(Debug, Clone)]
pub struct ObsContext {
    /// The observation identifier. Usually the raw file's name.
    pub obs_id: String,

    /// The number of frequency channels in the data.
    pub num_chans: usize,

    /// The native time resolution of the data \[seconds\], if the input format
    /// has one.
    pub sampling_interval: Option<f64>,

    /// The centre frequency of every channel \[MHz\], indexed by channel.
    pub chan_freqs: Vec1<f64>,

    /// The absolute start time of the observation, if known.
    pub obs_start: Option<Epoch>,
}

/// Get the centre frequencies \[MHz\] of all channels in a band.
///
/// The channel width is `bandwidth / num_chans`. With an upper sideband the
/// first channel is the lowest in frequency; with a lower sideband it's the
/// highest.
pub fn channel_frequencies(
    lowest_freq: f64,
    bandwidth: f64,
    num_chans: usize,
    sideband: Sideband,
) -> Vec<f64> {
    let chan_width = bandwidth / num_chans as f64;
    (0..num_chans)
        .map(|i| {
            let j = match sideband {
                Sideband::Upper => i,
                Sideband::Lower => num_chans - 1 - i,
            };
            lowest_freq + (j as f64 + 0.5) * chan_width
        })
        .collect()
}
