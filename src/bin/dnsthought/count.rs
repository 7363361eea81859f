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

//! Implements the `count` and `qnamemin` commands.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::info;

use dnsthought::aggregate::{self, QnameminSummary, ReportSettings};
use dnsthought::asn::AsnTables;
use dnsthought::capability::{decode_snapshot, ResolverAccumulator};

use crate::args::{CountArgs, QnameminArgs};
use crate::config::ReportConfig;

/// Appends the reports on the day before the snapshot's date to the
/// report files below the output directory.
pub fn count(args: CountArgs, config: &ReportConfig) -> Result<()> {
    let (day, tables, mut accumulators) = load(&args.snapshot, &args.asn_table)?;

    fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    let settings = ReportSettings::from(config);
    let summary = aggregate::write_reports(&mut accumulators, &tables, day, &settings, &args.out_dir)
        .context("failed to write the reports")?;
    info!(
        "Reported on {} resolvers in {} ASNs ({} with reports of their own).",
        summary.resolvers, summary.asns, summary.asn_selections,
    );
    Ok(())
}

/// Prints the QNAME minimization summary of the day before the
/// snapshot's date, followed by the top ASNs of all resolvers and of
/// the minimizing ones.
pub fn qnamemin(args: QnameminArgs) -> Result<()> {
    let (day, tables, mut accumulators) = load(&args.snapshot, &args.asn_table)?;
    let summary = QnameminSummary::count(&mut accumulators, &tables, day);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    summary.write_row(&mut out)?;
    QnameminSummary::write_top_asns(&summary.all, &mut out)?;
    QnameminSummary::write_top_asns(&summary.minimizing, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Loads the snapshot and the ASN table, returning them with the day
/// to report on.
fn load(snapshot: &Path, asn_table: &Path) -> Result<(NaiveDate, AsnTables, Vec<ResolverAccumulator>)> {
    let day = aggregate::report_day(snapshot).ok_or_else(|| {
        anyhow!(
            "cannot tell the day of {} (expected a name like YYYY-MM-DD.res)",
            snapshot.display(),
        )
    })?;

    let table_text = fs::read_to_string(asn_table)
        .with_context(|| format!("failed to read {}", asn_table.display()))?;
    let tables = AsnTables::load(&table_text)
        .with_context(|| format!("failed to load {}", asn_table.display()))?;

    let octets = fs::read(snapshot).with_context(|| format!("failed to read {}", snapshot.display()))?;
    let accumulators =
        decode_snapshot(&octets).with_context(|| format!("failed to load {}", snapshot.display()))?;
    info!(
        "Loaded {} resolvers; reporting on {}.",
        accumulators.len(),
        day,
    );
    Ok((day, tables, accumulators))
}
