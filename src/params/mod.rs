//! User arguments and the validated parameters derived from them.
//!
//! Arguments can come from the command line, an argument file (toml or json),
//! or both; command-line arguments take precedence. Everything is validated in
//! [`MakeDsArgs::into_params`] before any data is read.

mod error;

pub use error::{ConfigurationError, ParamsError};

use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use clap::Parser;
use hifitime::Epoch;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;
use serde::{Deserialize, Serialize};
use vec1::Vec1;

use crate::{
    calibration::CalibrationFormat,
    channel_frequencies,
    read::{RawBeamReader, RawLayout, ReadError, RecordInputType, RecordRead, TextRecordReader},
    spectrum::DsOutputType,
    ObsContext, Sideband,
};

/// The default number of bytes per raw sample.
pub const DEFAULT_SAMPLE_SIZE: usize = 2;

/// The default number of channels in the bandshape smoothing window.
pub const DEFAULT_SMOOTHING_WINDOW: usize = 20;

// Arguments that are exposed to users. All arguments except bools should be
// optional, so that an argument file can fill them in.
#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub struct MakeDsArgs {
    /// The beamformer data to read. This is either raw GMRT beam data, or
    /// text with a "timestamp channel power" record per line.
    #[clap(name = "DATA", parse(from_os_str), help_heading = "INPUT FILES")]
    pub data: Option<PathBuf>,

    /// The format of the input data; "raw" or "text". If not given, files
    /// with a "txt", "csv" or "tsv" extension are read as text and everything
    /// else as raw beam data.
    #[clap(long, help_heading = "INPUT FILES")]
    pub input_format: Option<String>,

    /// A per-channel calibration table to apply to the dynamic spectrum.
    #[clap(short, long, parse(from_os_str), help_heading = "INPUT FILES")]
    pub calibration: Option<PathBuf>,

    /// The format of the calibration table; "gains" (lines of "channel gain
    /// offset") or "bandshape" (gptool's bandshape.dat). Default: gains
    #[clap(long, help_heading = "INPUT FILES")]
    pub calibration_format: Option<String>,

    /// Paths to the dynamic spectrum outputs. Supported formats are .fits and
    /// .json.
    #[clap(short, long, multiple_values(true), help_heading = "OUTPUT FILES")]
    pub outputs: Option<Vec<PathBuf>>,

    /// Write the time-averaged and smoothed bandshape to this text file.
    #[clap(long, parse(from_os_str), help_heading = "OUTPUT FILES")]
    pub bandshape_output: Option<PathBuf>,

    /// The number of frequency channels in the data.
    #[clap(short, long, help_heading = "OBSERVATION")]
    pub num_chans: Option<usize>,

    /// The frequency of the lower edge of the band [MHz].
    #[clap(long, help_heading = "OBSERVATION")]
    pub lowest_freq: Option<f64>,

    /// The width of the band [MHz].
    #[clap(long, help_heading = "OBSERVATION")]
    pub bandwidth: Option<f64>,

    /// Which sideband the data is in; "upper" or "lower". With the lower
    /// sideband, the first channel has the highest frequency. Default: upper
    #[clap(long, help_heading = "OBSERVATION")]
    pub sideband: Option<String>,

    /// An identifier for the observation. Default: the input file's name
    #[clap(long, help_heading = "OBSERVATION")]
    pub obs_id: Option<String>,

    /// The MJD (UTC) of the first sample. Only used as metadata.
    #[clap(long, help_heading = "OBSERVATION")]
    pub mjd_start: Option<f64>,

    /// The time between consecutive raw spectra [seconds]. Required for raw
    /// beam data.
    #[clap(long, help_heading = "RAW BEAM DATA")]
    pub sampling_interval: Option<f64>,

    /// The number of bytes per raw sample; 1, 2 or 4. Default: 2
    #[clap(long, help_heading = "RAW BEAM DATA")]
    pub sample_size: Option<usize>,

    /// The number of polarisations per channel; 1 for total intensity data
    /// and 4 for full-polar data. Default: 1
    #[clap(long, help_heading = "RAW BEAM DATA")]
    pub num_pols: Option<usize>,

    /// The polarisation to use, counting from 0. Default: 0
    #[clap(long, help_heading = "RAW BEAM DATA")]
    pub pol: Option<usize>,

    /// The width of each time bin in the dynamic spectrum [seconds].
    #[clap(short, long, help_heading = "GRIDDING")]
    pub time_res: Option<f64>,

    /// Ignore samples before this time [seconds since the start of the
    /// observation]. The first time bin starts here. Default: 0
    #[clap(long, help_heading = "GRIDDING")]
    pub start_time: Option<f64>,

    /// Ignore samples at or after this time [seconds since the start of the
    /// observation].
    #[clap(long, help_heading = "GRIDDING")]
    pub end_time: Option<f64>,

    /// Refuse to build a dynamic spectrum with more than this many time bins.
    /// Default: enough for 2^28 cells
    #[clap(long, help_heading = "GRIDDING")]
    pub max_time_bins: Option<usize>,

    /// Calibrate with the data's own bandshape, smoothed across channels.
    /// Can't be used with --calibration.
    #[clap(long, help_heading = "CALIBRATION")]
    #[serde(default)]
    pub self_bandpass: bool,

    /// The number of channels in the running median that smooths the
    /// bandshape. Default: 20
    #[clap(long, help_heading = "CALIBRATION")]
    pub smoothing_window: Option<usize>,
}

impl MakeDsArgs {
    /// Both command-line and file arguments overlap in terms of what is
    /// available; this function consolidates everything that was specified
    /// into a single struct. Where applicable, it will prefer CLI parameters
    /// over those in the file.
    pub fn merge<P: AsRef<Path>>(self, arg_file: P) -> Result<MakeDsArgs, ParamsError> {
        let arg_file = arg_file.as_ref();
        debug!("Attempting to parse argument file {} ...", arg_file.display());

        let file_args: MakeDsArgs = {
            let extension = arg_file
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase());
            let mut contents = String::new();
            match extension.as_deref() {
                Some("toml") => {
                    debug!("Parsing toml file...");
                    File::open(arg_file)?.read_to_string(&mut contents)?;
                    toml::from_str(&contents).map_err(|e| ParamsError::TomlDecode {
                        file: arg_file.display().to_string(),
                        err: e.to_string(),
                    })?
                }

                Some("json") => {
                    debug!("Parsing json file...");
                    File::open(arg_file)?.read_to_string(&mut contents)?;
                    serde_json::from_str(&contents).map_err(|e| ParamsError::JsonDecode {
                        file: arg_file.display().to_string(),
                        err: e.to_string(),
                    })?
                }

                _ => {
                    return Err(ParamsError::UnrecognisedArgFileExt(
                        arg_file.display().to_string(),
                    ))
                }
            }
        };

        // Ensure all of the file args are accounted for by pattern matching.
        let MakeDsArgs {
            data,
            input_format,
            calibration,
            calibration_format,
            outputs,
            bandshape_output,
            num_chans,
            lowest_freq,
            bandwidth,
            sideband,
            obs_id,
            mjd_start,
            sampling_interval,
            sample_size,
            num_pols,
            pol,
            time_res,
            start_time,
            end_time,
            max_time_bins,
            self_bandpass,
            smoothing_window,
        } = file_args;
        // Merge all the arguments, preferring the CLI args when available.
        Ok(MakeDsArgs {
            data: self.data.or(data),
            input_format: self.input_format.or(input_format),
            calibration: self.calibration.or(calibration),
            calibration_format: self.calibration_format.or(calibration_format),
            outputs: self.outputs.or(outputs),
            bandshape_output: self.bandshape_output.or(bandshape_output),
            num_chans: self.num_chans.or(num_chans),
            lowest_freq: self.lowest_freq.or(lowest_freq),
            bandwidth: self.bandwidth.or(bandwidth),
            sideband: self.sideband.or(sideband),
            obs_id: self.obs_id.or(obs_id),
            mjd_start: self.mjd_start.or(mjd_start),
            sampling_interval: self.sampling_interval.or(sampling_interval),
            sample_size: self.sample_size.or(sample_size),
            num_pols: self.num_pols.or(num_pols),
            pol: self.pol.or(pol),
            time_res: self.time_res.or(time_res),
            start_time: self.start_time.or(start_time),
            end_time: self.end_time.or(end_time),
            max_time_bins: self.max_time_bins.or(max_time_bins),
            self_bandpass: self.self_bandpass || self_bandpass,
            smoothing_window: self.smoothing_window.or(smoothing_window),
        })
    }

    /// Validate the arguments and turn them into parameters. The only I/O
    /// done here is checking that input files exist.
    pub fn into_params(self) -> Result<MakeDsParams, ConfigurationError> {
        let MakeDsArgs {
            data,
            input_format,
            calibration,
            calibration_format,
            outputs,
            bandshape_output,
            num_chans,
            lowest_freq,
            bandwidth,
            sideband,
            obs_id,
            mjd_start,
            sampling_interval,
            sample_size,
            num_pols,
            pol,
            time_res,
            start_time,
            end_time,
            max_time_bins,
            self_bandpass,
            smoothing_window,
        } = self;

        let data = data.ok_or(ConfigurationError::Missing("input data file"))?;
        if !data.exists() {
            return Err(ConfigurationError::InputDoesNotExist(data));
        }
        let input_type = match input_format {
            Some(f) => f
                .parse::<RecordInputType>()
                .map_err(|got| ConfigurationError::InvalidChoice {
                    what: "input format",
                    got,
                })?,
            None => RecordInputType::from_path(&data),
        };

        let num_chans = num_chans.ok_or(ConfigurationError::Missing("number of channels"))?;
        if num_chans == 0 {
            return Err(ConfigurationError::NoChannels);
        }
        let lowest_freq = lowest_freq.ok_or(ConfigurationError::Missing("lowest frequency"))?;
        if !lowest_freq.is_finite() {
            return Err(ConfigurationError::InvalidChoice {
                what: "lowest frequency",
                got: lowest_freq.to_string(),
            });
        }
        let bandwidth = bandwidth.ok_or(ConfigurationError::Missing("bandwidth"))?;
        if !(bandwidth.is_finite() && bandwidth != 0.0) {
            return Err(ConfigurationError::BadBandwidth(bandwidth));
        }
        let sideband = match sideband {
            Some(s) => s
                .parse::<Sideband>()
                .map_err(|got| ConfigurationError::InvalidChoice {
                    what: "sideband",
                    got,
                })?,
            None => Sideband::Upper,
        };

        let raw_layout = match input_type {
            RecordInputType::RawBeam => Some(RawLayout::new(
                num_pols.unwrap_or(1),
                pol.unwrap_or(0),
                sample_size.unwrap_or(DEFAULT_SAMPLE_SIZE),
                sampling_interval.ok_or(ConfigurationError::Missing("sampling interval"))?,
            )?),
            RecordInputType::Text => None,
        };

        let time_res = time_res.ok_or(ConfigurationError::Missing("time resolution"))?;
        if !(time_res.is_finite() && time_res > 0.0) {
            return Err(ConfigurationError::BadTimeRes(time_res));
        }
        let start_time = start_time.unwrap_or(0.0);
        if !start_time.is_finite() {
            return Err(ConfigurationError::NonFiniteTime {
                what: "start time",
                value: start_time,
            });
        }
        if let Some(end_time) = end_time {
            if !end_time.is_finite() {
                return Err(ConfigurationError::NonFiniteTime {
                    what: "end time",
                    value: end_time,
                });
            }
            if end_time <= start_time {
                return Err(ConfigurationError::EndBeforeStart {
                    start: start_time,
                    end: end_time,
                });
            }
        }

        if let Some(max) = max_time_bins {
            if max == 0 || max.checked_mul(num_chans).is_none() {
                return Err(ConfigurationError::BadMaxTimeBins(max));
            }
        }

        let smoothing_window = smoothing_window.unwrap_or(DEFAULT_SMOOTHING_WINDOW);
        if smoothing_window == 0 {
            return Err(ConfigurationError::ZeroSmoothingWindow);
        }
        let calibration = match (calibration, self_bandpass) {
            (Some(_), true) => return Err(ConfigurationError::ConflictingCalibration),
            (Some(file), false) => {
                if !file.exists() {
                    return Err(ConfigurationError::InputDoesNotExist(file));
                }
                let format = match calibration_format {
                    Some(f) => f.parse::<CalibrationFormat>().map_err(|got| {
                        ConfigurationError::InvalidChoice {
                            what: "calibration format",
                            got,
                        }
                    })?,
                    None => CalibrationFormat::Gains,
                };
                CalibrationSource::File { file, format }
            }
            (None, true) => CalibrationSource::SelfBandpass {
                window: smoothing_window,
            },
            (None, false) => CalibrationSource::None,
        };

        let outputs = outputs
            .and_then(|v| Vec1::try_from_vec(v).ok())
            .ok_or(ConfigurationError::Missing("output file"))?;
        for output in &outputs {
            if DsOutputType::from_path(output).is_none() {
                return Err(ConfigurationError::UnsupportedOutput(output.clone()));
            }
        }

        let obs_id = obs_id.unwrap_or_else(|| {
            data.file_name()
                .map(|f| f.to_string_lossy().to_string())
                .unwrap_or_else(|| data.display().to_string())
        });
        let chan_freqs = Vec1::try_from_vec(channel_frequencies(
            lowest_freq,
            bandwidth,
            num_chans,
            sideband,
        ))
        .map_err(|_| ConfigurationError::NoChannels)?;
        let obs_context = ObsContext {
            obs_id,
            num_chans,
            sampling_interval: raw_layout.map(|l| l.sampling_interval),
            chan_freqs,
            obs_start: mjd_start.map(Epoch::from_mjd_utc),
        };

        Ok(MakeDsParams {
            data,
            input_type,
            raw_layout,
            obs_context,
            time_res,
            start_time,
            end_time,
            max_time_bins,
            calibration,
            smoothing_window,
            bandshape_output,
            outputs,
        })
    }
}

/// Where the per-channel calibration comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationSource {
    /// Don't calibrate; every channel is flagged as uncalibrated.
    None,

    /// Read a calibration table.
    File {
        file: PathBuf,
        format: CalibrationFormat,
    },

    /// Use the data's bandshape, smoothed with a running median of `window`
    /// channels.
    SelfBandpass { window: usize },
}

/// Validated parameters for building a dynamic spectrum.
#[derive(Debug, Clone)]
pub struct MakeDsParams {
    pub data: PathBuf,

    pub input_type: RecordInputType,

    /// Only present for raw beam data.
    pub raw_layout: Option<RawLayout>,

    pub obs_context: ObsContext,

    pub time_res: f64,

    pub start_time: f64,

    pub end_time: Option<f64>,

    /// The grid's limit on time bins, if not the default.
    pub max_time_bins: Option<usize>,

    pub calibration: CalibrationSource,

    pub smoothing_window: usize,

    pub bandshape_output: Option<PathBuf>,

    pub outputs: Vec1<PathBuf>,
}

impl MakeDsParams {
    /// Open the input data. For raw beam data, progress is reported in bytes
    /// read unless `progress_bar` is false.
    pub fn open_reader(&self, progress_bar: bool) -> Result<Box<dyn RecordRead>, ReadError> {
        let file = File::open(&self.data)?;
        match (self.input_type, self.raw_layout) {
            (RecordInputType::RawBeam, Some(layout)) => {
                let num_bytes = file.metadata()?.len();
                let pb = ProgressBar::with_draw_target(
                    Some(num_bytes),
                    if progress_bar {
                        ProgressDrawTarget::stdout()
                    } else {
                        ProgressDrawTarget::hidden()
                    },
                )
                .with_style(
                    ProgressStyle::default_bar()
                        .template("{msg:17}: [{wide_bar:.blue}] {bytes}/{total_bytes} ({elapsed_precise}<{eta_precise})")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                )
                .with_message("Reading");
                Ok(Box::new(
                    RawBeamReader::new(file, layout, self.obs_context.clone())
                        .with_progress_bar(pb),
                ))
            }
            _ => Ok(Box::new(TextRecordReader::new(
                std::io::BufReader::new(file),
                self.obs_context.clone(),
            ))),
        }
    }
}
