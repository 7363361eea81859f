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

//! Implements the `track` command.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use log::{info, warn};

use dnsthought::capability::{
    write_log_header, AccumulatorStore, RunSummary, Tracker, TrackerSettings,
};
use dnsthought::record::{DailySource, Merge};
use dnsthought::util::day_start;

use crate::args::TrackArgs;
use crate::config::TrackingConfig;
use crate::output;

const SECONDS_PER_DAY: u32 = 86_400;

/// Runs the measurements' records from the start day up to the stop day
/// through the accumulators of `<start>.res`, writing `<stop>.res` and,
/// unless quiet, the resolver log `<stop>.csv`.
pub fn track(args: TrackArgs, config: &TrackingConfig) -> Result<()> {
    let (start, stop) = (args.start.0, args.stop.0);
    if start >= stop {
        return Err(anyhow!("the start day {} is not before the stop day {}", start, stop));
    }
    let start_time = day_start(start).ok_or_else(|| anyhow!("{} is out of range", start))?;
    let forget_before = start_time.saturating_sub(config.forget_days.saturating_mul(SECONDS_PER_DAY));

    let store = load_snapshot(&snapshot_path(start), forget_before)?;
    info!("{} resolvers at start.", store.len());

    let sources = args
        .msm_dirs
        .iter()
        .map(|dir| {
            DailySource::open(dir, start, stop)
                .with_context(|| format!("failed to open measurement {}", dir.display()))
        })
        .collect::<Result<Vec<_>>>()?;
    let mut merge = Merge::new(sources);

    let settings = TrackerSettings::from(config);
    let log_path = PathBuf::from(format!("{}.csv", stop));
    let log_tmp_path = output::tmp_path(&log_path);
    let log = if args.quiet {
        None
    } else {
        Some(create_log(&log_tmp_path)?)
    };

    let tracker = Tracker::new(store, settings, log);
    let (summary, store) = match run_tracker(tracker, &mut merge) {
        Ok(finished) => finished,
        Err(err) => {
            let _ = fs::remove_file(&log_tmp_path);
            return Err(err).context("failed to write the resolver log");
        }
    };
    if !args.quiet {
        fs::rename(&log_tmp_path, &log_path)
            .with_context(|| format!("failed to write {}", log_path.display()))?;
    }
    info!(
        "Processed {} records ({} from unknown measurements, {} discarded).",
        summary.records, summary.unknown, summary.discarded,
    );

    output::write_file(&snapshot_path(stop), |w| store.write_to(w))?;
    info!("{} resolvers at exit.", store.len());
    Ok(())
}

/// Returns the path of the snapshot taken at the start of `day`.
fn snapshot_path(day: NaiveDate) -> PathBuf {
    PathBuf::from(format!("{}.res", day))
}

/// Loads a snapshot, or starts from scratch if it does not exist.
fn load_snapshot(path: &Path, forget_before: u32) -> Result<AccumulatorStore> {
    match fs::read(path) {
        Ok(octets) => AccumulatorStore::from_snapshot(&octets, forget_before)
            .with_context(|| format!("failed to load {}", path.display())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            warn!("{} does not exist; starting without resolvers.", path.display());
            Ok(AccumulatorStore::new())
        }
        Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
    }
}

fn run_tracker<W: io::Write>(
    mut tracker: Tracker<W>,
    merge: &mut Merge,
) -> io::Result<(RunSummary, AccumulatorStore)> {
    let summary = tracker.run(merge)?;
    Ok((summary, tracker.finish()?))
}

fn create_log(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    write_log_header(&mut writer)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(writer)
}
