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

//! Reading records from the daily files of measurement directories,
//! and merging several such sources by time.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::{debug, warn};

use super::{decode_one, Error, Record, HEADER_SIZE};

////////////////////////////////////////////////////////////////////////
// DAILY SOURCES                                                      //
////////////////////////////////////////////////////////////////////////

/// The records of one measurement over a range of days.
///
/// A measurement directory is named after the numeric measurement ID
/// and holds one file of packed records per UTC day, named
/// `YYYY-MM-DD.dnst`. Days run from the start date (inclusive) to the
/// stop date (exclusive). Missing days are skipped silently. A record
/// with an unknown address family cannot be sized, so it ends the day
/// it is found in; the file and offset are logged at warn level.
#[derive(Debug)]
pub struct DailySource {
    dir: PathBuf,
    path: PathBuf,
    msm_id: u32,
    next_day: NaiveDate,
    stop: NaiveDate,
    buffer: Vec<u8>,
    offset: usize,
}

impl DailySource {
    /// Opens the source and loads the first day that has records.
    pub fn open(dir: impl Into<PathBuf>, start: NaiveDate, stop: NaiveDate) -> Result<Self, SourceError> {
        let dir = dir.into();
        let msm_id = measurement_id(&dir)?;
        if !dir.is_dir() {
            return Err(SourceError::NotADirectory(dir));
        }
        let mut source = Self {
            path: PathBuf::new(),
            dir,
            msm_id,
            next_day: start,
            stop,
            buffer: Vec::new(),
            offset: 0,
        };
        source.load_next_day();
        Ok(source)
    }

    /// Returns the measurement ID of this source.
    pub fn msm_id(&self) -> u32 {
        self.msm_id
    }

    /// Returns the current record, or [`None`] if the source is
    /// exhausted.
    pub fn current(&self) -> Option<Record<'_>> {
        decode_one(&self.buffer, self.offset)
            .ok()
            .map(|(record, _)| record)
    }

    /// Moves to the next record, moving on to the following days as
    /// needed.
    pub fn advance(&mut self) {
        self.offset = match decode_one(&self.buffer, self.offset) {
            Ok((_, next)) => next,
            Err(_) => self.buffer.len(),
        };
        if !self.has_current() {
            self.load_next_day();
        }
    }

    /// Returns whether a record can be decoded at the current offset.
    fn has_current(&self) -> bool {
        match decode_one(&self.buffer, self.offset) {
            Ok(_) => true,
            Err(err @ Error::UnknownFamily(_)) => {
                warn!(
                    "Skipping the rest of {} from offset {}: {}",
                    self.path.display(),
                    self.offset,
                    err
                );
                false
            }
            Err(_) => false,
        }
    }

    fn load_next_day(&mut self) {
        self.buffer.clear();
        self.offset = 0;
        while self.next_day < self.stop {
            let day = self.next_day;
            self.next_day = day.succ_opt().unwrap_or(self.stop);
            let path = daily_path(&self.dir, day);
            match fs::read(&path) {
                Ok(buffer) if buffer.len() < HEADER_SIZE => {
                    warn!("{} is too short to hold a record", path.display());
                }
                Ok(buffer) => {
                    debug!("Reading {} ({} octets)", path.display(), buffer.len());
                    self.buffer = buffer;
                    self.path = path;
                    if self.has_current() {
                        return;
                    }
                    self.buffer.clear();
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => (),
                Err(err) => warn!("Could not read {}: {}", path.display(), err),
            }
        }
    }
}

/// Returns the path of the file holding a measurement's records for
/// `day`.
pub fn daily_path(dir: &Path, day: NaiveDate) -> PathBuf {
    dir.join(format!("{}.dnst", day.format("%Y-%m-%d")))
}

fn measurement_id(dir: &Path) -> Result<u32, SourceError> {
    dir.file_name()
        .and_then(|name| name.to_str())
        .and_then(|name| name.parse().ok())
        .ok_or_else(|| SourceError::NotAMeasurementDir(dir.to_owned()))
}

////////////////////////////////////////////////////////////////////////
// K-WAY MERGE                                                        //
////////////////////////////////////////////////////////////////////////

/// Merges several [`DailySource`]s into one stream ordered by time.
///
/// Each call to [`Merge::next`] returns the record with the smallest
/// time among the sources' current records (the earliest source wins
/// ties), along with the measurement ID of its source. The source that
/// provided it is advanced at the following call, so the returned
/// record can borrow from it.
#[derive(Debug)]
pub struct Merge {
    sources: Vec<DailySource>,
    returned: Option<usize>,
}

impl Merge {
    pub fn new(sources: Vec<DailySource>) -> Self {
        Self {
            sources,
            returned: None,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<(u32, Record<'_>)> {
        if let Some(index) = self.returned.take() {
            self.sources[index].advance();
        }
        let mut earliest: Option<(usize, u32)> = None;
        for (index, source) in self.sources.iter().enumerate() {
            if let Some(record) = source.current() {
                if earliest.map_or(true, |(_, time)| record.time < time) {
                    earliest = Some((index, record.time));
                }
            }
        }
        let (index, _) = earliest?;
        self.returned = Some(index);
        let source = &self.sources[index];
        source.current().map(|record| (source.msm_id(), record))
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a [`DailySource`] could not be opened.
#[derive(Debug)]
pub enum SourceError {
    NotAMeasurementDir(PathBuf),
    NotADirectory(PathBuf),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::NotAMeasurementDir(path) => write!(
                f,
                "{} is not named after a measurement ID",
                path.display()
            ),
            Self::NotADirectory(path) => write!(f, "{} is not a directory", path.display()),
        }
    }
}

impl std::error::Error for SourceError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
