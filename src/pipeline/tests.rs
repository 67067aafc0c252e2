use approx::assert_abs_diff_eq;
use tempfile::TempDir;
use vec1::Vec1;

use super::*;
use crate::{
    calibration::{CalibrationFormat, NormaliseError},
    grid::GridError,
};

fn obs_context(num_chans: usize) -> ObsContext {
    ObsContext {
        obs_id: "test".to_string(),
        num_chans,
        sampling_interval: None,
        chan_freqs: Vec1::try_from_vec((0..num_chans).map(|i| 300.0 + i as f64).collect())
            .unwrap(),
        obs_start: None,
    }
}

fn scenario_samples() -> Vec<Result<Sample, ReadError>> {
    vec![
        Ok(Sample::new(0.2, 0, 10.0)),
        Ok(Sample::new(0.3, 1, 20.0)),
        Ok(Sample::new(1.1, 0, 30.0)),
    ]
}

fn write_gains(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let file = dir.path().join(name);
    std::fs::write(&file, contents).unwrap();
    file
}

#[test]
fn test_stages_in_order() {
    let dir = TempDir::new().unwrap();
    let gains = write_gains(&dir, "gains.txt", "0 2.0 0.0\n");
    let output = dir.path().join("ds.fits");

    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 0.0, None).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Idle);

    assert_eq!(pipeline.read(scenario_samples()).unwrap(), 3);
    assert_eq!(pipeline.state(), PipelineState::Reading);

    let grid = pipeline.assemble().unwrap();
    assert_eq!(grid.num_times(), 2);
    assert_eq!(pipeline.state(), PipelineState::Assembling);

    let calibrated = pipeline
        .normalise(&CalibrationSource::File {
            file: gains,
            format: CalibrationFormat::Gains,
        })
        .unwrap();
    assert_eq!(calibrated, &[true, false]);
    assert_eq!(pipeline.state(), PipelineState::Normalising);
    assert_abs_diff_eq!(pipeline.grid().unwrap().get(0, 0).unwrap(), 5.0);

    let ds = pipeline.export(&[output.clone()]).unwrap();
    assert_abs_diff_eq!(ds.power()[(0, 0)], 5.0);
    assert!(ds.is_gap(1, 1));
    assert_eq!(pipeline.state(), PipelineState::Exported);
    assert!(pipeline.grid().is_none());
    assert!(pipeline.spectrum().is_some());
    assert!(output.exists());
}

#[test]
fn test_out_of_order_stage_fails_pipeline() {
    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 0.0, None).unwrap();
    let result = pipeline.normalise(&CalibrationSource::None);
    assert!(matches!(
        result,
        Err(PipelineError::OutOfOrder {
            stage: Stage::Normalising,
            state: PipelineState::Idle
        })
    ));
    assert_eq!(
        pipeline.state(),
        PipelineState::Failed {
            stage: Stage::Normalising
        }
    );

    // Nothing can run after a failure, and the original failure is kept.
    assert!(matches!(
        pipeline.read(scenario_samples()),
        Err(PipelineError::OutOfOrder { .. })
    ));
    assert_eq!(
        pipeline.state(),
        PipelineState::Failed {
            stage: Stage::Normalising
        }
    );
}

#[test]
fn test_stages_cannot_repeat() {
    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 0.0, None).unwrap();
    pipeline.read(scenario_samples()).unwrap();
    pipeline.assemble().unwrap();
    pipeline.normalise(&CalibrationSource::None).unwrap();
    assert!(matches!(
        pipeline.normalise(&CalibrationSource::None),
        Err(PipelineError::OutOfOrder {
            stage: Stage::Normalising,
            state: PipelineState::Normalising
        })
    ));
    assert!(matches!(
        pipeline.state(),
        PipelineState::Failed { .. }
    ));
}

#[test]
fn test_read_failure() {
    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 0.0, None).unwrap();
    let samples = vec![
        Ok(Sample::new(0.0, 0, 1.0)),
        Err(ReadError::from(MalformedRecordError::NonMonotonic {
            offset: 2,
            chan: 0,
            prev: 1.0,
            this: 0.5,
        })),
        Ok(Sample::new(2.0, 0, 1.0)),
    ];
    match pipeline.read(samples) {
        Err(PipelineError::Read(ReadError::Malformed(e))) => assert_eq!(e.offset(), 2),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("expected a failure"),
    }
    assert_eq!(
        pipeline.state(),
        PipelineState::Failed {
            stage: Stage::Reading
        }
    );
    assert!(pipeline.assemble().is_err());
}

#[test]
fn test_samples_beyond_the_channel_count_are_rejected() {
    let mut pipeline = Pipeline::new(obs_context(1), 1.0, 0.0, None).unwrap();
    let result = pipeline.read(vec![Ok(Sample::new(0.0, 0, 1.0)), Ok(Sample::new(0.0, 1, 1.0))]);
    assert!(matches!(
        result,
        Err(PipelineError::Read(ReadError::Malformed(
            MalformedRecordError::ChannelOutOfRange {
                offset: 1,
                chan: 1,
                num_chans: 1
            }
        )))
    ));
}

#[test]
fn test_unbinnable_samples_fail_reading() {
    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 0.0, None).unwrap();
    let result = pipeline.read(vec![
        Ok(Sample::new(0.0, 0, 1.0)),
        Ok(Sample::new(1e20, 0, 1.0)),
    ]);
    match result {
        Err(PipelineError::Read(ReadError::Malformed(MalformedRecordError::Unbinnable {
            offset,
            source: GridError::TooManyTimeBins { .. },
        }))) => assert_eq!(offset, 1),
        other => panic!("Expected an unbinnable sample, got {other:?}"),
    }
    assert_eq!(
        pipeline.state(),
        PipelineState::Failed {
            stage: Stage::Reading
        }
    );
}

#[test]
fn test_non_finite_power_fails_reading() {
    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 0.0, None).unwrap();
    let result = pipeline.read(vec![
        Ok(Sample::new(0.0, 0, 1.0)),
        Ok(Sample::new(0.0, 1, 2.0)),
        Ok(Sample::new(0.5, 1, f64::NAN)),
    ]);
    assert!(matches!(
        result,
        Err(PipelineError::Read(ReadError::Malformed(
            MalformedRecordError::NonFinitePower {
                offset: 2,
                chan: 1,
                ..
            }
        )))
    ));
}

#[test]
fn test_max_time_bins_from_params() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("records.txt");
    std::fs::write(&data, "0.0 0 1.0\n").unwrap();
    let params = crate::params::MakeDsArgs {
        data: Some(data),
        outputs: Some(vec![dir.path().join("ds.json")]),
        num_chans: Some(2),
        lowest_freq: Some(300.0),
        bandwidth: Some(2.0),
        time_res: Some(1.0),
        max_time_bins: Some(2),
        ..Default::default()
    }
    .into_params()
    .unwrap();
    let mut pipeline = Pipeline::from_params(&params).unwrap();
    assert!(pipeline.read(vec![Ok(Sample::new(1.5, 0, 1.0))]).is_ok());

    let mut pipeline = Pipeline::from_params(&params).unwrap();
    assert!(pipeline.read(vec![Ok(Sample::new(2.5, 0, 1.0))]).is_err());
}

#[test]
fn test_failed_export_removes_earlier_outputs() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("ds.fits");
    let second = dir.path().join("no_such_dir").join("ds.json");

    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 0.0, None).unwrap();
    pipeline.read(scenario_samples()).unwrap();
    pipeline.assemble().unwrap();
    pipeline.normalise(&CalibrationSource::None).unwrap();
    assert!(matches!(
        pipeline.export(&[first.clone(), second.clone()]),
        Err(PipelineError::SpectrumWrite(_))
    ));
    assert_eq!(
        pipeline.state(),
        PipelineState::Failed {
            stage: Stage::Exporting
        }
    );
    assert!(!first.exists());
    assert!(!second.exists());
}

#[test]
fn test_calibration_mismatch_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let gains = write_gains(
        &dir,
        "gains.txt",
        "5 1.0 0.0\n6 1.0 0.0\n7 1.0 0.0\n8 1.0 0.0\n9 1.0 0.0\n",
    );
    let output = dir.path().join("ds.fits");

    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 0.0, None).unwrap();
    pipeline.read(scenario_samples()).unwrap();
    pipeline.assemble().unwrap();
    let result = pipeline.normalise(&CalibrationSource::File {
        file: gains,
        format: CalibrationFormat::Gains,
    });
    assert!(matches!(
        result,
        Err(PipelineError::Normalise(NormaliseError::Mismatch(_)))
    ));
    assert_eq!(
        pipeline.state(),
        PipelineState::Failed {
            stage: Stage::Normalising
        }
    );
    assert!(pipeline.export(&[output.clone()]).is_err());
    assert!(!output.exists());
}

#[test]
fn test_self_bandpass_and_bandshape_output() {
    let dir = TempDir::new().unwrap();
    let bandshape = dir.path().join("bandshape.txt");
    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 0.0, None).unwrap();
    pipeline.read(scenario_samples()).unwrap();
    pipeline.assemble().unwrap();
    pipeline.write_bandshape(&bandshape, 1).unwrap();
    let calibrated = pipeline
        .normalise(&CalibrationSource::SelfBandpass { window: 1 })
        .unwrap();
    assert_eq!(calibrated, &[true, true]);
    let grid = pipeline.grid().unwrap();
    // Channel 0's mean is 20.
    assert_abs_diff_eq!(grid.get(0, 0).unwrap(), 0.5);
    assert_abs_diff_eq!(grid.get(1, 0).unwrap(), 1.5);
    assert_abs_diff_eq!(grid.get(0, 1).unwrap(), 1.0);
    assert!(grid.is_gap(1, 1));

    let contents = std::fs::read_to_string(&bandshape).unwrap();
    assert_eq!(contents.lines().count(), 3);

    // The bandshape can only be written before normalisation.
    assert!(pipeline.write_bandshape(&bandshape, 1).is_err());
}

#[test]
fn test_time_range() {
    let mut pipeline = Pipeline::new(obs_context(2), 1.0, 1.0, Some(2.0)).unwrap();
    assert_eq!(pipeline.read(scenario_samples()).unwrap(), 3);
    let grid = pipeline.assemble().unwrap();
    assert_eq!(grid.num_times(), 1);
    assert_abs_diff_eq!(grid.get(0, 0).unwrap(), 30.0);
    assert!(grid.is_gap(0, 1));

    assert!(matches!(
        Pipeline::new(obs_context(2), 0.0, 0.0, None),
        Err(ConfigurationError::BadTimeRes(_))
    ));
}

#[test]
fn test_state_display() {
    assert_eq!(PipelineState::Idle.to_string(), "idle");
    assert_eq!(
        PipelineState::Failed {
            stage: Stage::Exporting
        }
        .to_string(),
        "failed while exporting"
    );
}
