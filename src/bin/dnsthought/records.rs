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

//! Implements the `convert`, `dump`, and `sort` commands, which work on
//! packed record files.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::net::{Ipv4Addr, Ipv6Addr};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{info, warn};

use dnsthought::feed;
use dnsthought::message::DisplayName;
use dnsthought::record::{self, Record, RecordWriter, Records};
use dnsthought::rr::Type;
use dnsthought::util::format_timestamp;

use crate::args::{ConvertArgs, DumpArgs, SortArgs};
use crate::output;

/// Converts each JSON file to `<file>.dnst`.
pub fn convert(args: ConvertArgs) -> Result<()> {
    for input in &args.inputs {
        let json =
            fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
        if json.is_empty() {
            warn!("{} has no content; skipping it.", input.display());
            continue;
        }
        let mut writer = RecordWriter::new();
        let summary = feed::convert(&json, &mut writer);
        let output = output::with_suffix(input, ".dnst");
        output::write_file(&output, |w| w.write_all(writer.as_slice()))?;
        info!(
            "Converted {}: {} records from {} results ({} skipped, {} malformed).",
            input.display(),
            summary.records,
            summary.measurements,
            summary.skipped,
            summary.malformed,
        );
    }
    Ok(())
}

/// Prints one line per record.
pub fn dump(args: DumpArgs) -> Result<()> {
    let buffer =
        fs::read(&args.input).with_context(|| format!("failed to read {}", args.input.display()))?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for record in Records::new(&buffer) {
        write!(
            out,
            "{}\t{}\t{}\t{}\t",
            format_timestamp(record.time),
            record.rtt,
            record.probe_id,
            record.address,
        )?;
        if args.base64 {
            writeln!(out, "{}", STANDARD.encode(record.payload))?;
        } else {
            writeln!(out, "{}", summarize(&record))?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Describes a record's payload: the error text of an error report, or
/// the RCODE and answer of a DNS message.
fn summarize(record: &Record) -> String {
    if record.is_error {
        return format!("error {}", String::from_utf8_lossy(record.payload));
    }
    let message = match record.message() {
        Some(message) => message,
        None => return String::from("malformed message"),
    };
    let mut summary = format!("{} an={}", message.rcode(), message.ancount());
    if let Some(answer) = message.answer() {
        summary.push_str(&format!(" {} {}", DisplayName(answer.name()), answer.rr_type()));
        for rr in answer.rrs() {
            match (answer.rr_type(), rr.rdata()) {
                (Type::A, &[a, b, c, d]) => summary.push_str(&format!(" {}", Ipv4Addr::new(a, b, c, d))),
                (Type::AAAA, rdata) if rdata.len() == 16 => {
                    let mut octets = [0; 16];
                    octets.copy_from_slice(rdata);
                    summary.push_str(&format!(" {}", Ipv6Addr::from(octets)));
                }
                (_, rdata) => summary.push_str(&format!(" ({} octets)", rdata.len())),
            }
        }
    } else if let Some(question) = message.first() {
        summary.push_str(&format!(" no answer for {}", question.rr_type()));
    }
    summary
}

/// Sorts a record file by time, replacing it only if it was out of
/// order.
pub fn sort(args: SortArgs) -> Result<()> {
    let buffer =
        fs::read(&args.input).with_context(|| format!("failed to read {}", args.input.display()))?;
    match record::sort_by_time(&buffer) {
        Some(sorted) => {
            output::write_file(&args.input, |w| w.write_all(&sorted))?;
            info!("Sorted {}.", args.input.display());
        }
        None => info!("{} is already sorted.", args.input.display()),
    }
    Ok(())
}
