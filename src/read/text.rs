//! Plain-text beamformer records.
//!
//! Each line holds one record: "timestamp channel power", separated by
//! whitespace or commas. Blank lines and lines starting with '#' are ignored.
//! Record offsets are 1-based line numbers.

use std::io::{BufRead, Lines};

use log::debug;

use super::{ChannelOrder, MalformedRecordError, ReadError, RecordInputType, RecordRead};
use crate::{ObsContext, Sample};

pub struct TextRecordReader<R: BufRead> {
    obs_context: ObsContext,

    lines: Lines<R>,

    /// The number of the most recently read line.
    line_number: u64,

    order: ChannelOrder,

    num_records: u64,

    done: bool,
}

impl<R: BufRead> TextRecordReader<R> {
    pub fn new(stream: R, obs_context: ObsContext) -> TextRecordReader<R> {
        let order = ChannelOrder::new(obs_context.num_chans);
        TextRecordReader {
            obs_context,
            lines: stream.lines(),
            line_number: 0,
            order,
            num_records: 0,
            done: false,
        }
    }
}

fn parse_record(line: &str) -> Option<Sample> {
    let mut fields = line
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|f| !f.is_empty());
    let timestamp = fields.next()?.parse().ok()?;
    let channel = fields.next()?.parse().ok()?;
    let power = fields.next()?.parse().ok()?;
    // Trailing fields mean we've misunderstood the format.
    if fields.next().is_some() {
        return None;
    }
    Some(Sample {
        timestamp,
        channel,
        power,
    })
}

impl<R: BufRead> Iterator for TextRecordReader<R> {
    type Item = Result<Sample, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                None => {
                    debug!(
                        "Read {} records from {} lines",
                        self.num_records, self.line_number
                    );
                    self.done = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(ReadError::from(e)));
                }
                Some(Ok(line)) => line,
            };
            self.line_number += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let result = parse_record(trimmed)
                .ok_or_else(|| MalformedRecordError::Unparsable {
                    offset: self.line_number,
                    line: trimmed.to_string(),
                })
                .and_then(|sample| {
                    self.order.check(self.line_number, &sample)?;
                    Ok(sample)
                });
            return match result {
                Ok(sample) => {
                    self.num_records += 1;
                    Some(Ok(sample))
                }
                Err(e) => {
                    self.done = true;
                    Some(Err(ReadError::from(e)))
                }
            };
        }
    }
}

impl<R: BufRead> RecordRead for TextRecordReader<R> {
    fn get_obs_context(&self) -> &ObsContext {
        &self.obs_context
    }

    fn get_input_type(&self) -> RecordInputType {
        RecordInputType::Text
    }
}
