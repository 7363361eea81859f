// Copyright 2022 Matthew Ingwersen.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you
// may not use this file except in compliance with the License. You may
// obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or
// implied. See the License for the specific language governing
// permissions and limitations under the License.

//! Conversion of RIPE Atlas DNS measurement results to packed records.
//!
//! A feed is either a JSON array of result objects (the format of the
//! Atlas result download) or a sequence of JSON documents, usually one
//! per line (the format of the streaming API). Each result object
//! carries a `prb_id` and either a `resultset` array or the fields of a
//! single result at the top level. Every usable result becomes one
//! [`Record`]: a DNS message decoded from `result.abuf`, or the
//! compact JSON text of `error` as an error report.

use std::net::IpAddr;

use log::{debug, warn};
use serde_json::{Deserializer, Value};

use crate::record::{Record, RecordWriter};

/// Counts of what [`convert`] did with a feed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FeedSummary {
    /// Result objects seen, including skipped ones.
    pub measurements: usize,

    /// Records written.
    pub records: usize,

    /// Results without an address, or with neither a message nor an
    /// error.
    pub skipped: usize,

    /// JSON documents or result objects that could not be used at all.
    pub malformed: usize,
}

/// Converts the results in `input` to records appended to `writer`.
/// Unusable parts of the feed are logged and skipped.
///
/// When a JSON array does not parse as a whole, its elements are read
/// one by one, so that a damaged or truncated download still yields
/// the results before the damage.
pub fn convert(input: &[u8], writer: &mut RecordWriter) -> FeedSummary {
    let mut summary = FeedSummary::default();
    let mut offset = 0;
    while offset < input.len() {
        let mut stream = Deserializer::from_slice(&input[offset..]).into_iter::<Value>();
        let error = loop {
            match stream.next() {
                Some(Ok(Value::Array(elements))) => {
                    for element in &elements {
                        convert_measurement(element, writer, &mut summary);
                    }
                }
                Some(Ok(value)) => convert_measurement(&value, writer, &mut summary),
                Some(Err(err)) => break Some(err),
                None => break None,
            }
        };
        let error = match error {
            Some(error) => error,
            None => break,
        };

        let position = offset + stream.byte_offset();
        match input.get(position) {
            Some(b',') | Some(b']') => offset = position + 1,
            Some(b'[') => {
                debug!("Reading the array at offset {} element by element: {}.", position, error);
                offset = position + 1;
            }
            _ => {
                warn!("Skipping malformed JSON at offset {}: {}.", position, error);
                summary.malformed += 1;
                match resume_offset(input, position) {
                    Some(resume) => offset = resume,
                    None => break,
                }
            }
        }
    }
    summary
}

/// Returns where to continue after a malformed value starting at
/// `position`: the next result object in the same array, or the next
/// line, whichever comes first.
fn resume_offset(input: &[u8], position: usize) -> Option<usize> {
    let rest = input.get(position..)?;
    let next_element = rest
        .windows(3)
        .position(|window| window == b"},{")
        .map(|i| position + i + 2);
    let next_line = rest.iter().position(|&c| c == b'\n').map(|i| position + i + 1);
    next_element.into_iter().chain(next_line).min()
}

fn convert_measurement(measurement: &Value, writer: &mut RecordWriter, summary: &mut FeedSummary) {
    summary.measurements += 1;
    let probe_id = match measurement
        .get("prb_id")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
    {
        Some(probe_id) => probe_id,
        None => {
            warn!("Skipping result without a valid probe id.");
            summary.malformed += 1;
            return;
        }
    };

    match measurement.get("resultset") {
        Some(Value::Array(results)) => {
            for result in results {
                convert_result(result, probe_id, writer, summary);
            }
        }
        Some(_) => {
            warn!("Skipping result of probe {}: resultset is not an array.", probe_id);
            summary.malformed += 1;
        }
        None => convert_result(measurement, probe_id, writer, summary),
    }
}

fn convert_result(result: &Value, probe_id: u32, writer: &mut RecordWriter, summary: &mut FeedSummary) {
    let address = match result_address(result) {
        Some(address) => address,
        None => {
            debug!("Skipping result of probe {} without an address.", probe_id);
            summary.skipped += 1;
            return;
        }
    };
    let time = result
        .get("time")
        .and_then(Value::as_u64)
        .and_then(|time| u32::try_from(time).ok())
        .unwrap_or(0);
    let rtt = result
        .pointer("/result/rt")
        .and_then(Value::as_f64)
        .map_or(Record::NO_RTT, |rt| rt as f32);

    let pushed = if let Some(abuf) = result.pointer("/result/abuf").and_then(Value::as_str) {
        writer.push_base64(&Record {
            time,
            rtt,
            probe_id,
            address,
            is_error: false,
            payload: abuf.as_bytes(),
        })
    } else if let Some(error) = result.get("error") {
        let text = error.to_string();
        writer.push(&Record {
            time,
            rtt,
            probe_id,
            address,
            is_error: true,
            payload: text.as_bytes(),
        })
    } else {
        debug!("Skipping result of probe {} without message or error.", probe_id);
        summary.skipped += 1;
        return;
    };

    match pushed {
        Ok(()) => summary.records += 1,
        Err(err) => {
            warn!("Skipping result of probe {} at {}: {}.", probe_id, time, err);
            summary.skipped += 1;
        }
    }
}

/// Returns the queried address: `dst_addr`, or `dst_name` when that is
/// an address literal.
fn result_address(result: &Value) -> Option<IpAddr> {
    ["dst_addr", "dst_name"]
        .iter()
        .filter_map(|key| result.get(key).and_then(Value::as_str))
        .find_map(|text| text.parse().ok())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Records;

    // A NOERROR response header with no records: 1234 8180 0000 0000
    // 0000 0000.
    const ABUF: &str = "EjSBgAAAAAAAAAAA";

    fn records(writer: &RecordWriter) -> Vec<Record<'_>> {
        Records::new(writer.as_slice()).collect()
    }

    #[test]
    fn convert_reads_resultsets() {
        let feed = format!(
            r#"[{{"prb_id":4711,"msm_id":8310237,"resultset":[
                {{"time":1500000000,"dst_addr":"192.0.2.53","result":{{"rt":12.5,"abuf":"{0}"}}}},
                {{"time":1500000001,"dst_addr":"2001:db8::53","error":{{"timeout":5000}}}},
                {{"time":1500000002,"dst_name":"resolver.example","result":{{"abuf":"{0}"}}}},
                {{"time":1500000003,"dst_addr":"192.0.2.53"}}
            ]}}]"#,
            ABUF
        );
        let mut writer = RecordWriter::new();
        let summary = convert(feed.as_bytes(), &mut writer);
        assert_eq!(
            summary,
            FeedSummary {
                measurements: 1,
                records: 2,
                skipped: 2,
                malformed: 0,
            }
        );

        let records = records(&writer);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].time, 1_500_000_000);
        assert_eq!(records[0].rtt, 12.5);
        assert_eq!(records[0].probe_id, 4711);
        assert!(!records[0].is_error);
        assert_eq!(records[0].payload, b"\x12\x34\x81\x80\0\0\0\0\0\0\0\0");
        assert_eq!(records[1].address, "2001:db8::53".parse::<IpAddr>().unwrap());
        assert_eq!(records[1].rtt, Record::NO_RTT);
        assert!(records[1].is_error);
        assert_eq!(records[1].payload, br#"{"timeout":5000}"#);
    }

    #[test]
    fn convert_reads_single_results_per_line() {
        let feed = format!(
            "{{\"prb_id\":1,\"time\":10,\"dst_addr\":\"192.0.2.1\",\"result\":{{\"abuf\":\"{0}\"}}}}\n\
             {{\"prb_id\":2,\"time\":20,\"dst_name\":\"192.0.2.2\",\"result\":{{\"abuf\":\"{0}\"}}}}\n",
            ABUF
        );
        let mut writer = RecordWriter::new();
        let summary = convert(feed.as_bytes(), &mut writer);
        assert_eq!(summary.records, 2);
        let records = records(&writer);
        assert_eq!(records[0].probe_id, 1);
        assert_eq!(records[1].probe_id, 2);
        assert_eq!(records[1].address, "192.0.2.2".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn convert_skips_malformed_lines() {
        let feed = format!(
            "{{\"prb_id\":1,\"time\":10,\"dst_addr\":\"192.0.2.1\",\"result\":{{\"abuf\":\"{0}\"}}}}\n\
             {{\"prb_id\":2,\"time\":\n\
             {{\"time\":30,\"dst_addr\":\"192.0.2.3\",\"result\":{{\"abuf\":\"{0}\"}}}}\n\
             {{\"prb_id\":4,\"time\":40,\"dst_addr\":\"192.0.2.4\",\"result\":{{\"abuf\":\"{0}\"}}}}\n",
            ABUF
        );
        let mut writer = RecordWriter::new();
        let summary = convert(feed.as_bytes(), &mut writer);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.malformed, 2);
        let times: Vec<u32> = records(&writer).iter().map(|r| r.time).collect();
        assert_eq!(times, [10, 40]);
    }

    #[test]
    fn convert_skips_damaged_array_elements() {
        let feed = format!(
            "[{{\"prb_id\":1,\"time\":10,\"dst_addr\":\"192.0.2.1\",\"result\":{{\"abuf\":\"{0}\"}}}},\
             {{\"prb_id\":2,\"time\":}},\
             {{\"prb_id\":3,\"time\":30,\"dst_addr\":\"192.0.2.3\",\"result\":{{\"abuf\":\"{0}\"}}}}]",
            ABUF
        );
        let mut writer = RecordWriter::new();
        let summary = convert(feed.as_bytes(), &mut writer);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.malformed, 1);
        let probes: Vec<u32> = records(&writer).iter().map(|r| r.probe_id).collect();
        assert_eq!(probes, [1, 3]);
    }

    #[test]
    fn convert_keeps_results_before_truncation() {
        let feed = format!(
            "[{{\"prb_id\":1,\"time\":10,\"dst_addr\":\"192.0.2.1\",\"result\":{{\"abuf\":\"{}\"}}}},{{\"prb_",
            ABUF
        );
        let mut writer = RecordWriter::new();
        let summary = convert(feed.as_bytes(), &mut writer);
        assert_eq!(summary.records, 1);
        assert_eq!(summary.malformed, 1);
        assert_eq!(records(&writer)[0].time, 10);
    }
}
