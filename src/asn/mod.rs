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

//! Address-to-ASN lookup tables.
//!
//! Tables are built offline from routing announcements (one
//! `prefix<TAB>mask<TAB>asn` line per route, as published by
//! RouteViews' prefix-to-AS data sets) and saved in a simple text
//! format that is loaded for lookups.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use log::{debug, warn};

mod range;
mod route;

pub use range::{InsertError, Range, RangeKey, RangeTable};
pub use route::{parse_route, ParseError, ParseErrorKind, Route};

/// The IPv4 and IPv6 range tables.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AsnTables {
    pub v4: RangeTable<u32>,
    pub v6: RangeTable<u128>,
}

impl AsnTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds tables from routing announcements. Malformed lines and
    /// routes that cannot be inserted are skipped with a warning; the
    /// number of skipped lines is returned with the tables.
    pub fn from_routes(text: &str) -> (Self, usize) {
        let mut tables = Self::new();
        let mut skipped = 0;
        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            let result = match parse_route(line, line_number) {
                Ok(route) => tables.insert(route).map_err(|err| err.to_string()),
                Err(err) => Err(err.to_string()),
            };
            if let Err(err) = result {
                warn!("Skipping route on line {}: {}", line_number, err);
                skipped += 1;
            }
        }
        debug!(
            "Built {} IPv4 and {} IPv6 ranges",
            tables.v4.len(),
            tables.v6.len()
        );
        (tables, skipped)
    }

    /// Inserts a route into the table for its address family.
    pub fn insert(&mut self, route: Route) -> Result<(), InsertError> {
        match route {
            Route::V4(range) => self.v4.insert(range),
            Route::V6(range) => self.v6.insert(range),
        }
    }

    /// Returns the ASN owning `address`, or 0 if it is unknown.
    /// IPv4-mapped IPv6 addresses are looked up in the IPv4 table.
    pub fn lookup(&self, address: IpAddr) -> i32 {
        match address {
            IpAddr::V4(address) => self.lookup_v4(address),
            IpAddr::V6(address) => self.lookup_v6(address),
        }
    }

    pub fn lookup_v4(&self, address: Ipv4Addr) -> i32 {
        self.v4.lookup(u32::from(address))
    }

    pub fn lookup_v6(&self, address: Ipv6Addr) -> i32 {
        match address.to_ipv4_mapped() {
            Some(address) => self.lookup_v4(address),
            None => self.v6.lookup(u128::from(address)),
        }
    }

    /// Writes the tables in the format read by [`AsnTables::load`]:
    /// one `v4` or `v6` line per range, holding the hexadecimal start
    /// and end keys and the ASN, separated by tabs.
    pub fn write_to(&self, writer: &mut impl io::Write) -> io::Result<()> {
        for range in self.v4.ranges() {
            writeln!(writer, "v4\t{:08x}\t{:08x}\t{}", range.from, range.till, range.asn)?;
        }
        for range in self.v6.ranges() {
            writeln!(writer, "v6\t{:032x}\t{:032x}\t{}", range.from, range.till, range.asn)?;
        }
        Ok(())
    }

    /// Loads tables written by [`AsnTables::write_to`]. The ranges of
    /// each family must be sorted, disjoint, and coalesced.
    pub fn load(text: &str) -> Result<Self, ParseError> {
        let mut v4 = Vec::new();
        let mut v4_lines = Vec::new();
        let mut v6 = Vec::new();
        let mut v6_lines = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            if line.trim().is_empty() {
                continue;
            }
            match route::parse_table_line(line, line_number)? {
                Route::V4(range) => {
                    v4.push(range);
                    v4_lines.push(line_number);
                }
                Route::V6(range) => {
                    v6.push(range);
                    v6_lines.push(line_number);
                }
            }
        }
        let unordered = |lines: &[usize], index: usize| ParseError {
            line: lines[index],
            kind: ParseErrorKind::Unordered,
        };
        let v4 = RangeTable::from_sorted(v4).map_err(|index| unordered(&v4_lines, index))?;
        let v6 = RangeTable::from_sorted(v6).map_err(|index| unordered(&v6_lines, index))?;
        Ok(Self { v4, v6 })
    }
}

#[cfg(test)]
mod tests {
    use lazy_static::lazy_static;

    use super::*;

    const ROUTES: &str = "\
1.0.0.0\t24\t13335
10.0.0.0\t8\t64500
10.1.0.0\t16\t64501
10.1.0.0\t24\t64500
2001:db8::\t32\t64510
2001:db8:1::\t48\t64511_64512
bogus line
192.0.2.0\t33\t1
";

    lazy_static! {
        static ref TABLES: (AsnTables, usize) = AsnTables::from_routes(ROUTES);
    }

    fn lookup(address: &str) -> i32 {
        TABLES.0.lookup(address.parse().unwrap())
    }

    #[test]
    fn from_routes_works() {
        assert_eq!(TABLES.1, 2);
        assert_eq!(lookup("1.0.0.1"), 13335);
        assert_eq!(lookup("1.0.1.1"), 0);
        assert_eq!(lookup("10.2.3.4"), 64500);
        assert_eq!(lookup("10.1.0.9"), 64500);
        assert_eq!(lookup("10.1.2.3"), 64501);
        assert_eq!(lookup("2001:db8:2::1"), 64510);
        assert_eq!(lookup("2001:db8:1::1"), 64511);
        assert_eq!(lookup("2001:db9::1"), 0);
    }

    #[test]
    fn top_address_is_outside_every_range() {
        let routes = "255.0.0.0\t8\t64520\n255.255.255.255\t32\t64521\nffff::\t16\t64522\n";
        let (tables, skipped) = AsnTables::from_routes(routes);
        assert_eq!(skipped, 1);
        assert_eq!(tables.lookup("255.255.255.254".parse().unwrap()), 64520);
        assert_eq!(tables.lookup("255.255.255.255".parse().unwrap()), 0);
        assert_eq!(tables.lookup("ffff::1".parse().unwrap()), 64522);
        assert_eq!(tables.lookup(IpAddr::V6(Ipv6Addr::from(u128::MAX))), 0);
    }

    #[test]
    fn lookup_maps_ipv4_in_ipv6() {
        assert_eq!(lookup("::ffff:10.2.3.4"), 64500);
        assert_eq!(lookup("::ffff:192.0.2.1"), 0);
    }

    #[test]
    fn load_reads_written_tables() {
        let mut written = Vec::new();
        TABLES.0.write_to(&mut written).unwrap();
        let text = String::from_utf8(written).unwrap();
        assert!(text.starts_with("v4\t01000000\t01000100\t13335\n"));
        assert_eq!(AsnTables::load(&text).unwrap(), TABLES.0);
    }

    #[test]
    fn load_rejects_unordered_tables() {
        let text = "v4\t00000010\t00000020\t1\nv4\t00000000\t00000010\t2\n";
        assert_eq!(
            AsnTables::load(text),
            Err(ParseError {
                line: 2,
                kind: ParseErrorKind::Unordered
            })
        );
    }
}
