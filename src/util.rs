// Copyright 2021 Matthew Ingwersen.
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

//! Small utilities shared across the crate.

use chrono::{DateTime, NaiveDate};

/// Returns the mnemonic paired with `value` in `table`.
pub(crate) fn mnemonic_of<T: Copy + Eq>(table: &[(T, &'static str)], value: T) -> Option<&'static str> {
    table
        .iter()
        .find(|(candidate, _)| *candidate == value)
        .map(|(_, mnemonic)| *mnemonic)
}

/// Parses a mnemonic from `table`, ignoring ASCII case, or the generic
/// RFC 3597 form: `prefix` followed by a decimal 16-bit value.
pub(crate) fn parse_mnemonic<T: Copy + From<u16>>(
    table: &[(T, &'static str)],
    prefix: &str,
    text: &str,
) -> Result<T, &'static str> {
    if let Some((value, _)) = table
        .iter()
        .find(|(_, mnemonic)| mnemonic.eq_ignore_ascii_case(text))
    {
        return Ok(*value);
    }
    match text.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => text[prefix.len()..]
            .parse::<u16>()
            .map(T::from)
            .or(Err("value is not a valid unsigned 16-bit integer")),
        _ => Err("unknown mnemonic"),
    }
}

/// Returns the UTC calendar date of a timestamp in seconds since the
/// epoch.
pub fn utc_date(time: u32) -> Option<NaiveDate> {
    DateTime::from_timestamp(i64::from(time), 0).map(|datetime| datetime.date_naive())
}

/// Returns the timestamp of the first second of a UTC day, if it fits
/// in 32 bits.
pub fn day_start(day: NaiveDate) -> Option<u32> {
    let datetime = day.and_hms_opt(0, 0, 0)?.and_utc();
    u32::try_from(datetime.timestamp()).ok()
}

/// Formats a timestamp in seconds since the epoch as an ISO 8601 UTC
/// date and time, e.g. `2018-06-01T12:00:00Z`.
pub fn format_timestamp(time: u32) -> String {
    match DateTime::from_timestamp(i64::from(time), 0) {
        Some(datetime) => datetime.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        None => time.to_string(),
    }
}
