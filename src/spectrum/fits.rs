//! Dynamic spectra as FITS files.
//!
//! The primary HDU carries the metadata as keys. Powers are in the "DYNSPEC"
//! image (floats, NaN gaps) and sample counts in the "COUNTS" image; both are
//! [time][chan]. The "CHANNELS" table lists each channel's frequency \[MHz\]
//! and whether it was calibrated.

use std::{
    ffi::{CStr, CString},
    fmt::Display,
    path::Path,
    ptr,
};

use fitsio::{
    errors::check_status as fits_check_status,
    hdu::{DescribesHdu, FitsHdu, HduInfo},
    images::{ImageDescription, ImageType},
    tables::{ColumnDataType, ColumnDescription},
    FitsFile,
};
use hifitime::Epoch;
use log::trace;
use ndarray::prelude::*;
use vec1::Vec1;

use super::{DynamicSpectrum, FitsError, ShapeMismatch, SpectrumReadError, SpectrumWriteError};

pub(super) fn write(ds: &DynamicSpectrum, file: &Path) -> Result<(), SpectrumWriteError> {
    let (num_times, num_chans) = ds.power.dim();
    let counts = ds
        .counts
        .indexed_iter()
        .map(|((time_bin, chan), &count)| {
            i32::try_from(count).map_err(|_| SpectrumWriteError::CountTooLarge {
                time_bin,
                chan,
                count,
            })
        })
        .collect::<Result<Vec<i32>, _>>()?;

    if file.exists() {
        std::fs::remove_file(file)?;
    }
    let mut fptr = FitsFile::create(file).open()?;
    let hdu = fits_open_hdu(&mut fptr, 0)?;

    // Signal that we're using long strings.
    let mut status = 0;
    unsafe {
        // ffplsw = fits_write_key_longwarn
        fitsio_sys::ffplsw(fptr.as_raw(), &mut status);
    }
    fits_check_status(status)?;

    // Observation IDs are usually file names, which can be longer than a
    // normal FITS key allows.
    fits_write_key_long_string(&mut fptr, "OBSID", &ds.obs_id)?;
    hdu.write_key(&mut fptr, "START_T", ds.start_time)?;
    hdu.write_key(&mut fptr, "TIME_RES", ds.time_res)?;
    hdu.write_key(&mut fptr, "NTIMES", num_times as i64)?;
    hdu.write_key(&mut fptr, "NCHANS", num_chans as i64)?;
    if let Some(obs_start) = ds.obs_start {
        hdu.write_key(&mut fptr, "MJD_OBS", obs_start.to_mjd_utc_days())?;
    }
    hdu.write_key(
        &mut fptr,
        "SOFTWARE",
        format!(
            "Created by {} v{}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        ),
    )?;

    let dim = [num_times, num_chans];
    let hdu = fptr.create_image(
        "DYNSPEC",
        &ImageDescription {
            data_type: ImageType::Float,
            dimensions: &dim,
        },
    )?;
    if num_times > 0 {
        let power: Vec<f32> = ds.power.iter().map(|&p| p as f32).collect();
        hdu.write_image(&mut fptr, &power)?;
    }

    let hdu = fptr.create_image(
        "COUNTS",
        &ImageDescription {
            data_type: ImageType::Long,
            dimensions: &dim,
        },
    )?;
    if num_times > 0 {
        hdu.write_image(&mut fptr, &counts)?;
    }

    let freq_col = ColumnDescription::new("Freq")
        .with_type(ColumnDataType::Double)
        .create()?;
    let calibrated_col = ColumnDescription::new("Calibrated")
        .with_type(ColumnDataType::Int)
        .create()?;
    let hdu = fptr.create_table("CHANNELS", &[freq_col, calibrated_col])?;
    hdu.write_col(&mut fptr, "Freq", ds.chan_freqs.as_slice())?;
    hdu.write_col(
        &mut fptr,
        "Calibrated",
        &ds.calibrated
            .iter()
            .map(|&c| i32::from(c))
            .collect::<Vec<i32>>(),
    )?;

    trace!("Wrote {num_times}x{num_chans} dynamic spectrum to {}", file.display());
    Ok(())
}

pub(super) fn read(file: &Path) -> Result<DynamicSpectrum, SpectrumReadError> {
    let mut fptr = fits_open(file)?;
    let hdu = fits_open_hdu(&mut fptr, 0)?;
    let obs_id = fits_get_optional_key_long_string(&mut fptr, &hdu, "OBSID")?.unwrap_or_default();
    let start_time: f64 = fits_get_required_key(&mut fptr, &hdu, "START_T")?;
    let time_res: f64 = fits_get_required_key(&mut fptr, &hdu, "TIME_RES")?;
    let num_times: usize = fits_get_required_key(&mut fptr, &hdu, "NTIMES")?;
    let num_chans: usize = fits_get_required_key(&mut fptr, &hdu, "NCHANS")?;
    let obs_start = fits_get_optional_key::<f64>(&mut fptr, &hdu, "MJD_OBS")?.map(Epoch::from_mjd_utc);
    let expected = num_times * num_chans;

    let hdu = fits_open_hdu(&mut fptr, "DYNSPEC")?;
    let power: Vec<f32> = if expected == 0 {
        vec![]
    } else {
        fits_get_image(&mut fptr, &hdu)?
    };
    if power.len() != expected {
        return Err(ShapeMismatch {
            thing: "powers",
            expected,
            actual: power.len(),
        }
        .into());
    }

    let hdu = fits_open_hdu(&mut fptr, "COUNTS")?;
    let counts: Vec<i32> = if expected == 0 {
        vec![]
    } else {
        fits_get_image(&mut fptr, &hdu)?
    };
    if counts.len() != expected {
        return Err(ShapeMismatch {
            thing: "sample counts",
            expected,
            actual: counts.len(),
        }
        .into());
    }

    let hdu = fits_open_hdu(&mut fptr, "CHANNELS")?;
    let freqs: Vec<f64> = fits_get_col(&mut fptr, &hdu, "Freq")?;
    let calibrated: Vec<i32> = fits_get_col(&mut fptr, &hdu, "Calibrated")?;
    let chan_freqs =
        Vec1::try_from_vec(freqs).map_err(|_| SpectrumReadError::NoChannels(file.to_path_buf()))?;

    let mut power = Array2::from_shape_fn((num_times, num_chans), |(t, c)| {
        f64::from(power[t * num_chans + c])
    });
    let counts = Array2::from_shape_fn((num_times, num_chans), |(t, c)| {
        counts[t * num_chans + c].max(0) as u32
    });
    power.zip_mut_with(&counts, |p, &c| {
        if c == 0 {
            *p = crate::grid::GAP;
        }
    });

    let ds = DynamicSpectrum {
        obs_id,
        start_time,
        time_res,
        chan_freqs,
        power,
        counts,
        calibrated: calibrated.into_iter().map(|c| c != 0).collect(),
        obs_start,
    };
    ds.validate()?;
    Ok(ds)
}

/// Open a fits file.
#[track_caller]
pub(crate) fn fits_open<P: AsRef<Path>>(file: P) -> Result<FitsFile, FitsError> {
    FitsFile::open(file.as_ref()).map_err(|e| {
        let caller = std::panic::Location::caller();
        FitsError::Open {
            fits_error: Box::new(e),
            fits_filename: file.as_ref().to_path_buf().into_boxed_path(),
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        }
    })
}

/// Open a fits file's HDU.
#[track_caller]
pub(crate) fn fits_open_hdu<T: DescribesHdu + Display + Copy>(
    fits_fptr: &mut FitsFile,
    hdu_description: T,
) -> Result<FitsHdu, FitsError> {
    fits_fptr.hdu(hdu_description).map_err(|e| {
        let caller = std::panic::Location::caller();
        FitsError::Fitsio {
            fits_error: Box::new(e),
            fits_filename: fits_fptr.filename.clone().into_boxed_path(),
            hdu_description: format!("{hdu_description}").into_boxed_str(),
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        }
    })
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword that may
/// or may not exist, pull out the value of the keyword, parsing it into the
/// desired type.
#[track_caller]
pub(crate) fn fits_get_optional_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<T>, FitsError> {
    let caller = std::panic::Location::caller();
    let unparsed_value: String = match hdu.read_key(fits_fptr, keyword) {
        Ok(key_value) => key_value,
        Err(fitsio::errors::Error::Fits(fe)) if matches!(fe.status, 202 | 204) => return Ok(None),
        Err(e) => {
            return Err(FitsError::Fitsio {
                fits_error: Box::new(e),
                fits_filename: fits_fptr.filename.clone().into_boxed_path(),
                hdu_description: format!("{}", hdu.number + 1).into_boxed_str(),
                source_file: caller.file(),
                source_line: caller.line(),
                source_column: caller.column(),
            })
        }
    };

    match unparsed_value.trim().parse() {
        Ok(parsed_value) => Ok(Some(parsed_value)),
        Err(_) => Err(FitsError::Parse {
            key: keyword.to_string().into_boxed_str(),
            fits_filename: fits_fptr.filename.clone().into_boxed_path(),
            hdu_num: hdu.number + 1,
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        }),
    }
}

/// Given a FITS file pointer, a HDU that belongs to it, and a keyword, pull out
/// the value of the keyword, parsing it into the desired type.
#[track_caller]
pub(crate) fn fits_get_required_key<T: std::str::FromStr>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<T, FitsError> {
    match fits_get_optional_key(fits_fptr, hdu, keyword)? {
        Some(value) => Ok(value),
        None => {
            let caller = std::panic::Location::caller();
            Err(FitsError::MissingKey {
                key: keyword.to_string().into_boxed_str(),
                fits_filename: fits_fptr.filename.clone().into_boxed_path(),
                hdu_num: hdu.number + 1,
                source_file: caller.file(),
                source_line: caller.line(),
                source_column: caller.column(),
            })
        }
    }
}

/// Get a column from a fits file's HDU.
#[track_caller]
pub(crate) fn fits_get_col<T: fitsio::tables::ReadsCol>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Vec<T>, FitsError> {
    hdu.read_col(fits_fptr, keyword).map_err(|e| {
        let caller = std::panic::Location::caller();
        FitsError::Fitsio {
            fits_error: Box::new(e),
            fits_filename: fits_fptr.filename.clone().into_boxed_path(),
            hdu_description: format!("{}", hdu.number + 1).into_boxed_str(),
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        }
    })
}

/// Given a FITS file pointer and a HDU, read the associated image.
#[track_caller]
pub(crate) fn fits_get_image<T: fitsio::images::ReadImage>(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
) -> Result<T, FitsError> {
    let caller = std::panic::Location::caller();
    match &hdu.info {
        HduInfo::ImageInfo { .. } => hdu.read_image(fits_fptr).map_err(|e| FitsError::Fitsio {
            fits_error: Box::new(e),
            fits_filename: fits_fptr.filename.clone().into_boxed_path(),
            hdu_description: format!("{}", hdu.number + 1).into_boxed_str(),
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        }),
        _ => Err(FitsError::NotImage {
            fits_filename: fits_fptr.filename.clone().into_boxed_path(),
            hdu_num: hdu.number + 1,
            source_file: caller.file(),
            source_line: caller.line(),
            source_column: caller.column(),
        }),
    }
}

/// Write a string key to the current HDU, using FITS's CONTINUE mechanism if
/// the string is too long for a single card.
fn fits_write_key_long_string(
    fits_fptr: &mut FitsFile,
    keyword: &'static str,
    value: &str,
) -> Result<(), SpectrumWriteError> {
    let key_name =
        CString::new(keyword).map_err(|_| SpectrumWriteError::BadKeyValue { key: keyword })?;
    let value = CString::new(value).map_err(|_| SpectrumWriteError::BadKeyValue { key: keyword })?;
    let mut status = 0;
    unsafe {
        // ffpkls = fits_write_key_longstr
        fitsio_sys::ffpkls(
            fits_fptr.as_raw(), /* I - FITS file pointer        */
            key_name.as_ptr(),  /* I - name of keyword to write */
            value.as_ptr(),     /* I - keyword value            */
            ptr::null(),        /* I - keyword comment          */
            &mut status,        /* IO - error status            */
        );
    }
    fits_check_status(status)?;
    Ok(())
}

/// Given a FITS file pointer, and a keyword to a long string keyword that may
/// or may not exist, pull out the long string of the keyword. This deals with
/// FITSs CONTINUE mechanism by calling a low level fits function.
#[track_caller]
pub(crate) fn fits_get_optional_key_long_string(
    fits_fptr: &mut FitsFile,
    hdu: &FitsHdu,
    keyword: &str,
) -> Result<Option<String>, FitsError> {
    let caller = std::panic::Location::caller();
    let fits_filename = fits_fptr.filename.clone();
    let long_string_error = || FitsError::LongString {
        key: keyword.to_string().into_boxed_str(),
        fits_filename: fits_filename.clone().into_boxed_path(),
        hdu_num: hdu.number + 1,
        source_file: caller.file(),
        source_line: caller.line(),
        source_column: caller.column(),
    };
    let keyword_ffi = CString::new(keyword).map_err(|_| long_string_error())?;

    let mut status = 0;
    let mut long_string_ptr = ptr::null_mut();
    unsafe {
        // ffgkls = fits_read_key_longstr
        fitsio_sys::ffgkls(
            fits_fptr.as_raw(),
            keyword_ffi.as_ptr(),
            &mut long_string_ptr,
            ptr::null_mut(),
            &mut status,
        );
    }
    match status {
        0 => {
            let long_string = unsafe {
                let s = CStr::from_ptr(long_string_ptr)
                    .to_str()
                    .map(|s| s.to_string());
                // Free the cfitsio-allocated string. The status code passed
                // isn't useful.
                // fffree = fits_free_memory
                fitsio_sys::fffree(long_string_ptr.cast(), &mut 0);
                s
            };
            long_string.map(Some).map_err(|_| long_string_error())
        }
        202 | 204 => Ok(None),
        _ => Err(long_string_error()),
    }
}
