use approx::assert_abs_diff_eq;
use tempfile::TempDir;
use vec1::Vec1;

use super::*;
use crate::{
    calibration::{normalise, skip_normalisation, CalibrationTable},
    grid::GridAssembler,
    Sample,
};

fn obs_context(num_chans: usize) -> ObsContext {
    ObsContext {
        obs_id: "J1752-2806_PA.raw.0".to_string(),
        num_chans,
        sampling_interval: Some(0.5),
        chan_freqs: Vec1::try_from_vec((0..num_chans).map(|i| 550.0 - i as f64 * 0.5).collect())
            .unwrap(),
        obs_start: Some(Epoch::from_mjd_utc(60000.25)),
    }
}

/// 2 channels, 2 time bins, with a gap in bin 1 of channel 1. Channel 0 is
/// calibrated with a gain of 2.
fn scenario_spectrum() -> DynamicSpectrum {
    let mut assembler = GridAssembler::new(2, 1.0, 0.0).unwrap();
    for s in [
        Sample::new(0.2, 0, 10.0),
        Sample::new(0.3, 1, 20.0),
        Sample::new(1.1, 0, 30.0),
    ] {
        assembler.add(&s).unwrap();
    }
    let mut grid = assembler.finalise();
    let mut table = CalibrationTable::new();
    table.insert(0, 2.0, 0.0);
    let calibrated = normalise(&mut grid, &table).unwrap();
    DynamicSpectrum::from_grid(grid, &obs_context(2), calibrated).unwrap()
}

fn assert_scenario(ds: &DynamicSpectrum) {
    assert_eq!(ds.obs_id(), "J1752-2806_PA.raw.0");
    assert_eq!(ds.num_times(), 2);
    assert_eq!(ds.num_chans(), 2);
    assert_abs_diff_eq!(ds.start_time(), 0.0);
    assert_abs_diff_eq!(ds.time_res(), 1.0);
    assert_eq!(ds.chan_freqs().len(), 2);
    assert_abs_diff_eq!(ds.chan_freqs()[1], 549.5);
    assert_eq!(ds.calibrated(), &[true, false]);
    assert_abs_diff_eq!(ds.power()[(0, 0)], 5.0);
    assert_abs_diff_eq!(ds.power()[(0, 1)], 20.0);
    assert_abs_diff_eq!(ds.power()[(1, 0)], 15.0);
    // The gap survives; it doesn't turn into a zero.
    assert!(ds.is_gap(1, 1));
    assert!(ds.power()[(1, 1)].is_nan());
    assert_eq!(ds.counts()[(1, 1)], 0);
    assert_eq!(ds.counts()[(0, 0)], 1);
    let mjd = ds.obs_start().unwrap().to_mjd_utc_days();
    assert_abs_diff_eq!(mjd, 60000.25, epsilon = 1e-6);
}

#[test]
fn test_from_grid() {
    let ds = scenario_spectrum();
    assert_scenario(&ds);
    assert_eq!(ds.bin_times().to_vec(), vec![0.0, 1.0]);
}

#[test]
fn test_from_grid_rejects_mismatched_lengths() {
    let grid = || {
        let mut assembler = GridAssembler::new(2, 1.0, 0.0).unwrap();
        assembler.add(&Sample::new(0.0, 0, 1.0)).unwrap();
        let mut grid = assembler.finalise();
        skip_normalisation(&mut grid).unwrap();
        grid
    };

    // Three frequencies for two channels.
    assert!(matches!(
        DynamicSpectrum::from_grid(grid(), &obs_context(3), vec![false, false]),
        Err(SpectrumWriteError::Shape(ShapeMismatch {
            thing: "channel frequencies",
            expected: 2,
            actual: 3
        }))
    ));
    assert!(matches!(
        DynamicSpectrum::from_grid(grid(), &obs_context(2), vec![false]),
        Err(SpectrumWriteError::Shape(ShapeMismatch {
            thing: "calibration flags",
            ..
        }))
    ));
}

#[test]
fn test_from_grid_requires_normalisation() {
    let assembler = GridAssembler::new(2, 1.0, 0.0).unwrap();
    let grid = assembler.finalise();
    assert!(matches!(
        DynamicSpectrum::from_grid(grid, &obs_context(2), vec![false, false]),
        Err(SpectrumWriteError::NotNormalised)
    ));
}

#[test]
fn test_fits_round_trip_keeps_gaps() {
    let tmp_dir = TempDir::new().unwrap();
    let file = tmp_dir.path().join("ds.fits");
    let ds = scenario_spectrum();
    ds.write(&file).unwrap();
    let read = DynamicSpectrum::read(&file).unwrap();
    assert_scenario(&read);

    // Writing again replaces the file.
    ds.write(&file).unwrap();
    assert!(DynamicSpectrum::read(&file).is_ok());
}

#[test]
fn test_fits_rejects_counts_beyond_i32() {
    let tmp_dir = TempDir::new().unwrap();
    let file = tmp_dir.path().join("ds.fits");
    let mut ds = scenario_spectrum();
    ds.counts[(1, 0)] = i32::MAX as u32 + 1;
    assert!(matches!(
        ds.write(&file),
        Err(SpectrumWriteError::CountTooLarge {
            time_bin: 1,
            chan: 0,
            count
        }) if count == i32::MAX as u32 + 1
    ));
    assert!(!file.exists());

    // JSON has no such limit.
    let file = tmp_dir.path().join("ds.json");
    ds.write(&file).unwrap();
    assert_eq!(
        DynamicSpectrum::read(&file).unwrap().counts()[(1, 0)],
        i32::MAX as u32 + 1
    );
}

#[test]
fn test_json_round_trip_keeps_gaps() {
    let tmp_dir = TempDir::new().unwrap();
    let file = tmp_dir.path().join("ds.json");
    scenario_spectrum().write(&file).unwrap();

    // Gaps are written as nulls.
    let contents = std::fs::read_to_string(&file).unwrap();
    let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
    assert!(value["power"][1][1].is_null());
    assert_eq!(value["power"][0][0], serde_json::json!(5.0));

    let read = DynamicSpectrum::read(&file).unwrap();
    assert_scenario(&read);
}

#[test]
fn test_empty_spectrum_round_trip() {
    let tmp_dir = TempDir::new().unwrap();
    let mut grid = GridAssembler::new(2, 1.0, 0.0).unwrap().finalise();
    skip_normalisation(&mut grid).unwrap();
    let mut context = obs_context(2);
    context.obs_start = None;
    let ds = DynamicSpectrum::from_grid(grid, &context, vec![false, false]).unwrap();

    for name in ["empty.fits", "empty.json"] {
        let file = tmp_dir.path().join(name);
        ds.write(&file).unwrap();
        let read = DynamicSpectrum::read(&file).unwrap();
        assert_eq!(read.num_times(), 0);
        assert_eq!(read.num_chans(), 2);
        assert!(read.obs_start().is_none());
    }
}

#[test]
fn test_unsupported_extensions() {
    let tmp_dir = TempDir::new().unwrap();
    let file = tmp_dir.path().join("ds.png");
    assert!(matches!(
        scenario_spectrum().write(&file),
        Err(SpectrumWriteError::UnsupportedOutput(_))
    ));
    assert!(!file.exists());
    assert!(matches!(
        DynamicSpectrum::read(&file),
        Err(SpectrumReadError::UnsupportedFormat(_))
    ));
}

#[test]
fn test_malformed_json_is_rejected() {
    let tmp_dir = TempDir::new().unwrap();
    let file = tmp_dir.path().join("bad.json");
    std::fs::write(
        &file,
        r#"{"obs_id": "x", "start_time": 0.0, "time_res": 1.0, "frequencies": [1.0, 2.0],
            "calibrated": [true, true], "power": [[1.0]], "counts": [[1]]}"#,
    )
    .unwrap();
    assert!(matches!(
        DynamicSpectrum::read(&file),
        Err(SpectrumReadError::Shape(_))
    ));

    std::fs::write(
        &file,
        r#"{"obs_id": "x", "start_time": 0.0, "time_res": 1.0, "frequencies": [],
            "calibrated": [], "power": [], "counts": []}"#,
    )
    .unwrap();
    assert!(matches!(
        DynamicSpectrum::read(&file),
        Err(SpectrumReadError::NoChannels(_))
    ));
}

#[test]
fn test_output_type_from_path() {
    assert_eq!(
        DsOutputType::from_path(Path::new("a/b.FITS")),
        Some(DsOutputType::Fits)
    );
    assert_eq!(
        DsOutputType::from_path(Path::new("b.json")),
        Some(DsOutputType::Json)
    );
    assert_eq!(DsOutputType::from_path(Path::new("b.fits.gz")), None);
}

#[test]
fn test_time_averaged_spectrum() {
    let ds = scenario_spectrum();
    let spectrum = ds.time_averaged_spectrum();
    assert_abs_diff_eq!(spectrum[0], 10.0);
    assert_abs_diff_eq!(spectrum[1], 20.0);
}
