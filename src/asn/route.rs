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

//! Parsing of routing announcements and of saved range tables.

use std::fmt;
use std::net::IpAddr;

use super::range::{Range, RangeKey};

/// A route (or saved range) for one of the two address families.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Route {
    V4(Range<u32>),
    V6(Range<u128>),
}

/// Parses a `prefix<TAB>mask<TAB>asn` routing announcement. The range
/// covers the `2^(bits - mask)` addresses starting at the prefix
/// address, saturating at the top of the address space (whose last
/// address is left out; see [`RangeKey::prefix_end`]). Only the
/// leading digits of the ASN field are used, so for multi-origin
/// announcements (`64500_64501`, `64500,64501`) the first origin wins.
pub fn parse_route(line: &str, line_number: usize) -> Result<Route, ParseError> {
    let error = |kind| ParseError {
        line: line_number,
        kind,
    };
    let mut fields = line.split('\t');
    let (prefix, mask, asn) = match (fields.next(), fields.next(), fields.next()) {
        (Some(prefix), Some(mask), Some(asn)) => (prefix.trim(), mask.trim(), asn.trim()),
        _ => return Err(error(ParseErrorKind::MissingField)),
    };

    let mask: u32 = mask.parse().or(Err(error(ParseErrorKind::InvalidMask)))?;
    let digits_end = asn
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(asn.len());
    let asn: i32 = asn[..digits_end]
        .parse()
        .or(Err(error(ParseErrorKind::InvalidAsn)))?;

    let address: IpAddr = prefix
        .parse()
        .or(Err(error(ParseErrorKind::InvalidAddress)))?;
    match address {
        IpAddr::V4(address) => {
            let from = u32::from(address);
            let till = from
                .prefix_end(mask)
                .ok_or(error(ParseErrorKind::InvalidMask))?;
            Ok(Route::V4(Range::new(from, till, asn)))
        }
        IpAddr::V6(address) => {
            let from = u128::from(address);
            let till = from
                .prefix_end(mask)
                .ok_or(error(ParseErrorKind::InvalidMask))?;
            Ok(Route::V6(Range::new(from, till, asn)))
        }
    }
}

/// Parses a line of a saved range table: `v4` or `v6`, then the start
/// and end keys in hexadecimal and the ASN, separated by tabs.
pub(super) fn parse_table_line(line: &str, line_number: usize) -> Result<Route, ParseError> {
    let error = |kind| ParseError {
        line: line_number,
        kind,
    };
    let fields: Vec<&str> = line.split('\t').map(str::trim).collect();
    if fields.len() != 4 {
        return Err(error(ParseErrorKind::MissingField));
    }
    let asn: i32 = fields[3].parse().or(Err(error(ParseErrorKind::InvalidAsn)))?;
    match fields[0] {
        "v4" => Ok(Route::V4(parse_range(&fields[1..3], asn).ok_or(error(ParseErrorKind::InvalidKey))?)),
        "v6" => Ok(Route::V6(parse_range(&fields[1..3], asn).ok_or(error(ParseErrorKind::InvalidKey))?)),
        _ => Err(error(ParseErrorKind::InvalidFamily)),
    }
}

fn parse_range<K: RangeKey>(keys: &[&str], asn: i32) -> Option<Range<K>> {
    Some(Range::new(K::from_hex(keys[0])?, K::from_hex(keys[1])?, asn))
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a line of a route or range table file could
/// not be parsed.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct ParseError {
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ParseErrorKind {
    MissingField,
    InvalidAddress,
    InvalidMask,
    InvalidAsn,
    InvalidFamily,
    InvalidKey,
    Unordered,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::MissingField => f.write_str("missing field"),
            Self::InvalidAddress => f.write_str("invalid prefix address"),
            Self::InvalidMask => f.write_str("invalid mask length"),
            Self::InvalidAsn => f.write_str("invalid ASN"),
            Self::InvalidFamily => f.write_str("address family is neither v4 nor v6"),
            Self::InvalidKey => f.write_str("invalid hexadecimal key"),
            Self::Unordered => f.write_str("range is out of order or overlaps its predecessor"),
        }
    }
}

impl std::error::Error for ParseError {}
