//! Raw GMRT beamformer output.
//!
//! The data is a sequence of spectra with no header. Each spectrum holds
//! every channel in order, and each channel holds `num_pols` values. For
//! full-polar data the four values per channel are interleaved:
//!
//! T1_C1_P T1_C1_Q T1_C1_R T1_C1_S T1_C2_P ... T1_CN_S T2_C1_P ...
//!
//! Total-intensity data is unsigned; polar data is signed.

use std::io::{BufReader, ErrorKind, Read};

use byteorder::{ByteOrder, LittleEndian};
use indicatif::ProgressBar;
use log::{debug, trace};

use super::{ChannelOrder, MalformedRecordError, ReadError, RecordInputType, RecordRead};
use crate::{params::ConfigurationError, ObsContext, Sample};

/// The width of a single raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleSize {
    One,
    Two,
    Four,
}

impl SampleSize {
    pub fn new(num_bytes: usize) -> Result<SampleSize, ConfigurationError> {
        match num_bytes {
            1 => Ok(SampleSize::One),
            2 => Ok(SampleSize::Two),
            4 => Ok(SampleSize::Four),
            _ => Err(ConfigurationError::BadSampleSize(num_bytes)),
        }
    }

    pub fn num_bytes(self) -> usize {
        match self {
            SampleSize::One => 1,
            SampleSize::Two => 2,
            SampleSize::Four => 4,
        }
    }
}

/// How values are packed into a raw beam file.
#[derive(Debug, Clone, Copy)]
pub struct RawLayout {
    /// The number of polarisation values per channel. Usually 1 (total
    /// intensity) or 4 (full polar).
    pub num_pols: usize,

    /// The polarisation to read.
    pub pol: usize,

    pub sample_size: SampleSize,

    /// The time between consecutive spectra \[seconds\].
    pub sampling_interval: f64,
}

impl RawLayout {
    pub fn new(
        num_pols: usize,
        pol: usize,
        sample_size_bytes: usize,
        sampling_interval: f64,
    ) -> Result<RawLayout, ConfigurationError> {
        if num_pols == 0 {
            return Err(ConfigurationError::NoPols);
        }
        if pol >= num_pols {
            return Err(ConfigurationError::PolOutOfRange { pol, num_pols });
        }
        if !(sampling_interval.is_finite() && sampling_interval > 0.0) {
            return Err(ConfigurationError::BadSamplingInterval(sampling_interval));
        }
        Ok(RawLayout {
            num_pols,
            pol,
            sample_size: SampleSize::new(sample_size_bytes)?,
            sampling_interval,
        })
    }

    /// Polar data is written as signed integers.
    fn is_signed(&self) -> bool {
        self.num_pols > 1
    }

    /// The number of bytes in a single spectrum for `num_chans` channels.
    pub fn spectrum_bytes(&self, num_chans: usize) -> usize {
        num_chans * self.num_pols * self.sample_size.num_bytes()
    }
}

pub struct RawBeamReader<R: Read> {
    obs_context: ObsContext,

    layout: RawLayout,

    stream: BufReader<R>,

    /// The current spectrum.
    buffer: Vec<u8>,

    /// The index of the current spectrum.
    spectrum_index: u64,

    /// Has any spectrum been read into the buffer yet?
    loaded: bool,

    /// The next channel to emit from the current spectrum. If this is equal to
    /// the number of channels, a new spectrum needs to be read.
    next_chan: usize,

    order: ChannelOrder,

    /// Set when the stream is exhausted or an error has been emitted.
    done: bool,

    progress_bar: Option<ProgressBar>,
}

impl<R: Read> RawBeamReader<R> {
    pub fn new(stream: R, layout: RawLayout, obs_context: ObsContext) -> RawBeamReader<R> {
        let num_chans = obs_context.num_chans;
        let spectrum_bytes = layout.spectrum_bytes(num_chans);
        debug!("Raw beam layout: {layout:?}");
        debug!("Bytes per spectrum: {spectrum_bytes}");
        let obs_context = ObsContext {
            sampling_interval: Some(layout.sampling_interval),
            ..obs_context
        };
        RawBeamReader {
            obs_context,
            layout,
            stream: BufReader::new(stream),
            buffer: vec![0; spectrum_bytes],
            spectrum_index: 0,
            loaded: false,
            next_chan: num_chans,
            order: ChannelOrder::new(num_chans),
            done: false,
            progress_bar: None,
        }
    }

    /// Increment the supplied progress bar by the number of bytes read.
    pub fn with_progress_bar(mut self, progress_bar: ProgressBar) -> RawBeamReader<R> {
        self.progress_bar = Some(progress_bar);
        self
    }

    /// The byte offset of the current spectrum.
    fn offset(&self) -> u64 {
        self.spectrum_index * self.buffer.len() as u64
    }

    /// Read the next spectrum into the buffer. Returns `Ok(false)` when the
    /// stream ended cleanly on a spectrum boundary.
    fn read_spectrum(&mut self) -> Result<bool, ReadError> {
        let mut filled = 0;
        while filled < self.buffer.len() {
            match self.stream.read(&mut self.buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(ReadError::from(e)),
            }
        }
        if let Some(progress_bar) = self.progress_bar.as_ref() {
            progress_bar.inc(filled as u64);
        }

        match filled {
            0 => Ok(false),
            n if n == self.buffer.len() => Ok(true),
            got => Err(ReadError::from(MalformedRecordError::Truncated {
                offset: self.offset(),
                expected: self.buffer.len(),
                got,
            })),
        }
    }

    /// Decode the power of the selected polarisation of a channel in the
    /// current spectrum.
    fn decode(&self, chan: usize) -> f64 {
        let width = self.layout.sample_size.num_bytes();
        let start = (chan * self.layout.num_pols + self.layout.pol) * width;
        let bytes = &self.buffer[start..start + width];
        match (self.layout.sample_size, self.layout.is_signed()) {
            (SampleSize::One, false) => f64::from(bytes[0]),
            (SampleSize::One, true) => f64::from(bytes[0] as i8),
            (SampleSize::Two, false) => f64::from(LittleEndian::read_u16(bytes)),
            (SampleSize::Two, true) => f64::from(LittleEndian::read_i16(bytes)),
            (SampleSize::Four, _) => f64::from(LittleEndian::read_f32(bytes)),
        }
    }
}

impl<R: Read> Iterator for RawBeamReader<R> {
    type Item = Result<Sample, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.next_chan == self.obs_context.num_chans {
            if self.loaded {
                self.spectrum_index += 1;
            }
            match self.read_spectrum() {
                Ok(true) => {
                    trace!("Read spectrum {}", self.spectrum_index);
                    self.loaded = true;
                    self.next_chan = 0;
                }
                Ok(false) => {
                    debug!("Read {} spectra", self.spectrum_index);
                    self.done = true;
                    if let Some(progress_bar) = self.progress_bar.as_ref() {
                        progress_bar.abandon_with_message("Finished reading");
                    }
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }

        let chan = self.next_chan;
        self.next_chan += 1;
        let sample = Sample {
            timestamp: self.spectrum_index as f64 * self.layout.sampling_interval,
            channel: chan,
            power: self.decode(chan),
        };
        let offset = self.offset();
        match self.order.check(offset, &sample) {
            Ok(()) => Some(Ok(sample)),
            Err(e) => {
                self.done = true;
                Some(Err(ReadError::from(e)))
            }
        }
    }
}

impl<R: Read> RecordRead for RawBeamReader<R> {
    fn get_obs_context(&self) -> &ObsContext {
        &self.obs_context
    }

    fn get_input_type(&self) -> RecordInputType {
        RecordInputType::RawBeam
    }
}
