use std::io::Cursor;
use std::path::PathBuf;

use approx::assert_abs_diff_eq;
use vec1::vec1;

use super::*;
use crate::params::ConfigurationError;

fn obs_context(num_chans: usize) -> ObsContext {
    ObsContext {
        obs_id: "test".to_string(),
        num_chans,
        sampling_interval: None,
        chan_freqs: vec1::Vec1::try_from_vec((0..num_chans).map(|i| 300.0 + i as f64).collect())
            .unwrap(),
        obs_start: None,
    }
}

fn collect<I: Iterator<Item = Result<Sample, ReadError>>>(reader: I) -> Vec<Sample> {
    reader.map(|r| r.unwrap()).collect()
}

#[test]
fn test_text_reader() {
    let input = "# timestamp chan power\n0.2 0 10.0\n\n0.3 1 20.0\n1.1,0,30.0\n";
    let samples = collect(TextRecordReader::new(Cursor::new(input), obs_context(2)));
    assert_eq!(
        samples,
        vec![
            Sample::new(0.2, 0, 10.0),
            Sample::new(0.3, 1, 20.0),
            Sample::new(1.1, 0, 30.0),
        ]
    );
}

#[test]
fn test_text_reader_channel_out_of_range() {
    let input = "0.0 0 1.0\n0.0 2 1.0\n0.1 0 1.0\n";
    let mut reader = TextRecordReader::new(Cursor::new(input), obs_context(2));
    assert!(reader.next().unwrap().is_ok());
    match reader.next() {
        Some(Err(ReadError::Malformed(e))) => {
            assert!(matches!(
                e,
                MalformedRecordError::ChannelOutOfRange {
                    chan: 2,
                    num_chans: 2,
                    ..
                }
            ));
            assert_eq!(e.offset(), 2);
        }
        other => panic!("Expected an out-of-range error, got {other:?}"),
    }
    // Errors are fatal; nothing more comes out.
    assert!(reader.next().is_none());
}

#[test]
fn test_text_reader_non_monotonic() {
    // Channel 1 going backwards is fine as long as channel 1 itself is
    // ordered; channel 0 going backwards is not.
    let input = "1.0 0 1.0\n0.5 1 1.0\n0.9 0 1.0\n";
    let mut reader = TextRecordReader::new(Cursor::new(input), obs_context(2));
    assert!(reader.next().unwrap().is_ok());
    assert!(reader.next().unwrap().is_ok());
    match reader.next() {
        Some(Err(ReadError::Malformed(e))) => {
            assert_eq!(e.offset(), 3);
            match e {
                MalformedRecordError::NonMonotonic {
                    chan, prev, this, ..
                } => {
                    assert_eq!(chan, 0);
                    assert_abs_diff_eq!(prev, 1.0);
                    assert_abs_diff_eq!(this, 0.9);
                }
                _ => panic!("Expected a non-monotonic error"),
            }
        }
        other => panic!("Expected a non-monotonic error, got {other:?}"),
    }
    assert!(reader.next().is_none());
}

#[test]
fn test_text_reader_repeated_timestamps_are_allowed() {
    let input = "1.0 0 1.0\n1.0 0 2.0\n";
    let samples = collect(TextRecordReader::new(Cursor::new(input), obs_context(1)));
    assert_eq!(samples.len(), 2);
}

#[test]
fn test_text_reader_unparsable() {
    for input in ["0.0 0\n", "0.0 zero 1.0\n", "0.0 0 1.0 4.0\n", "0.0 -1 1.0\n"] {
        let mut reader = TextRecordReader::new(Cursor::new(input), obs_context(2));
        match reader.next() {
            Some(Err(ReadError::Malformed(MalformedRecordError::Unparsable { offset, .. }))) => {
                assert_eq!(offset, 1)
            }
            other => panic!("Expected a parse error for {input:?}, got {other:?}"),
        }
    }
}

#[test]
fn test_text_reader_non_finite_timestamp() {
    let mut reader = TextRecordReader::new(Cursor::new("inf 0 1.0\n"), obs_context(1));
    assert!(matches!(
        reader.next(),
        Some(Err(ReadError::Malformed(
            MalformedRecordError::NonFiniteTimestamp { offset: 1, .. }
        )))
    ));
}

#[test]
fn test_raw_reader_u16() {
    // 2 channels, 3 spectra.
    let values: [u16; 6] = [1, 2, 3, 4, 500, 60000];
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let layout = RawLayout::new(1, 0, 2, 0.5).unwrap();
    let reader = RawBeamReader::new(Cursor::new(bytes), layout, obs_context(2));
    assert_eq!(reader.get_input_type(), RecordInputType::RawBeam);
    assert_eq!(reader.get_obs_context().sampling_interval, Some(0.5));
    let samples = collect(reader);
    assert_eq!(
        samples,
        vec![
            Sample::new(0.0, 0, 1.0),
            Sample::new(0.0, 1, 2.0),
            Sample::new(0.5, 0, 3.0),
            Sample::new(0.5, 1, 4.0),
            Sample::new(1.0, 0, 500.0),
            Sample::new(1.0, 1, 60000.0),
        ]
    );
}

#[test]
fn test_raw_reader_polar_i16() {
    // 2 channels, 4 pols, 1 spectrum. Read the third polarisation.
    let values: [i16; 8] = [1, 2, -3, 4, 5, 6, 7, 8];
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let layout = RawLayout::new(4, 2, 2, 1.0).unwrap();
    let samples = collect(RawBeamReader::new(
        Cursor::new(bytes),
        layout,
        obs_context(2),
    ));
    assert_eq!(
        samples,
        vec![Sample::new(0.0, 0, -3.0), Sample::new(0.0, 1, 7.0)]
    );
}

#[test]
fn test_raw_reader_bytes() {
    let bytes = vec![0, 255, 128];
    let layout = RawLayout::new(1, 0, 1, 1.0).unwrap();
    let powers: Vec<f64> = collect(RawBeamReader::new(
        Cursor::new(bytes),
        layout,
        obs_context(1),
    ))
    .into_iter()
    .map(|s| s.power)
    .collect();
    assert_eq!(powers, vec![0.0, 255.0, 128.0]);

    // Polar bytes are signed.
    let bytes = vec![255, 1];
    let layout = RawLayout::new(2, 0, 1, 1.0).unwrap();
    let powers: Vec<f64> = collect(RawBeamReader::new(
        Cursor::new(bytes),
        layout,
        obs_context(1),
    ))
    .into_iter()
    .map(|s| s.power)
    .collect();
    assert_eq!(powers, vec![-1.0]);
}

#[test]
fn test_raw_reader_f32() {
    let values: [f32; 3] = [0.25, -1.5, 0.0];
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let layout = RawLayout::new(1, 0, 4, 0.1).unwrap();
    let samples = collect(RawBeamReader::new(
        Cursor::new(bytes),
        layout,
        obs_context(3),
    ));
    assert_eq!(samples.len(), 3);
    for (sample, expected) in samples.iter().zip([0.25, -1.5, 0.0]) {
        assert_abs_diff_eq!(sample.power, expected);
        assert_abs_diff_eq!(sample.timestamp, 0.0);
    }
}

#[test]
fn test_text_reader_non_finite_power() {
    for power in ["nan", "inf", "-inf"] {
        let input = format!("0.0 0 1.0\n0.5 1 {power}\n1.0 0 2.0\n");
        let mut reader = TextRecordReader::new(Cursor::new(input), obs_context(2));
        assert!(reader.next().unwrap().is_ok());
        match reader.next() {
            Some(Err(ReadError::Malformed(MalformedRecordError::NonFinitePower {
                offset,
                chan,
                ..
            }))) => {
                assert_eq!(offset, 2);
                assert_eq!(chan, 1);
            }
            other => panic!("Expected a non-finite power error, got {other:?}"),
        }
        assert!(reader.next().is_none());
    }
}

#[test]
fn test_raw_reader_non_finite_power() {
    // Two spectra of 2 channels; the second channel of the second spectrum
    // is NaN.
    let values: [f32; 4] = [1.0, 2.0, 3.0, f32::NAN];
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    let layout = RawLayout::new(1, 0, 4, 0.1).unwrap();
    let mut reader = RawBeamReader::new(Cursor::new(bytes), layout, obs_context(2));
    for _ in 0..3 {
        assert!(reader.next().unwrap().is_ok());
    }
    match reader.next() {
        Some(Err(ReadError::Malformed(MalformedRecordError::NonFinitePower {
            offset,
            chan,
            power,
        }))) => {
            assert_eq!(offset, 8);
            assert_eq!(chan, 1);
            assert!(power.is_nan());
        }
        other => panic!("Expected a non-finite power error, got {other:?}"),
    }
    assert!(reader.next().is_none());
}

#[test]
fn test_raw_reader_truncated() {
    // 2 channels of u16 is 4 bytes per spectrum; 6 bytes is 1.5 spectra.
    let bytes = vec![1, 0, 2, 0, 3, 0];
    let layout = RawLayout::new(1, 0, 2, 1.0).unwrap();
    let mut reader = RawBeamReader::new(Cursor::new(bytes), layout, obs_context(2));
    assert!(reader.next().unwrap().is_ok());
    assert!(reader.next().unwrap().is_ok());
    match reader.next() {
        Some(Err(ReadError::Malformed(MalformedRecordError::Truncated {
            offset,
            expected,
            got,
        }))) => {
            assert_eq!(offset, 4);
            assert_eq!(expected, 4);
            assert_eq!(got, 2);
        }
        other => panic!("Expected a truncation error, got {other:?}"),
    }
    assert!(reader.next().is_none());
}

#[test]
fn test_raw_reader_empty() {
    let layout = RawLayout::new(1, 0, 2, 1.0).unwrap();
    let mut reader = RawBeamReader::new(Cursor::new(vec![]), layout, obs_context(2));
    assert!(reader.next().is_none());
}

#[test]
fn test_raw_layout_validation() {
    assert!(matches!(
        RawLayout::new(1, 0, 3, 1.0),
        Err(ConfigurationError::BadSampleSize(3))
    ));
    assert!(matches!(
        RawLayout::new(4, 4, 2, 1.0),
        Err(ConfigurationError::PolOutOfRange {
            pol: 4,
            num_pols: 4
        })
    ));
    assert!(matches!(
        RawLayout::new(0, 0, 2, 1.0),
        Err(ConfigurationError::NoPols)
    ));
    assert!(matches!(
        RawLayout::new(1, 0, 2, 0.0),
        Err(ConfigurationError::BadSamplingInterval(_))
    ));
    assert_eq!(RawLayout::new(4, 0, 2, 1.0).unwrap().spectrum_bytes(10), 80);
}

#[test]
fn test_input_type_from_path() {
    assert_eq!(
        RecordInputType::from_path(&PathBuf::from("records.txt")),
        RecordInputType::Text
    );
    assert_eq!(
        RecordInputType::from_path(&PathBuf::from("records.CSV")),
        RecordInputType::Text
    );
    assert_eq!(
        RecordInputType::from_path(&PathBuf::from("J1752-2806_PA.raw.0")),
        RecordInputType::RawBeam
    );
    assert_eq!(
        RecordInputType::from_path(&PathBuf::from("no_extension")),
        RecordInputType::RawBeam
    );
    assert_eq!("text".parse(), Ok(RecordInputType::Text));
}

#[test]
fn test_obs_context_frequencies_are_kept() {
    let ctx = obs_context(2);
    let reader = TextRecordReader::new(Cursor::new(""), ctx);
    assert_eq!(reader.get_obs_context().chan_freqs, vec1![300.0, 301.0]);
}
