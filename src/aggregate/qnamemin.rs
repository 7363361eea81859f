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

//! The daily QNAME minimization summary.
//!
//! This looks at the same accumulators as the capability reports (the
//! ones updated on the reported day) from the angle of a single
//! capability: how many resolvers are known to minimize or not, and
//! how many probes see only minimizing resolvers.

use std::collections::BTreeMap;
use std::io;

use chrono::NaiveDate;

use super::{AsnCache, CapCounter};
use crate::asn::AsnTables;
use crate::capability::{Capability, ResolverAccumulator};

/// The number of ASNs listed by [`QnameminSummary::write_top_asns`].
pub const TOP_ASNS: usize = 20;

/// QNAME minimization counts for one day.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct QnameminSummary {
    pub day: NaiveDate,

    /// Counts over all resolvers.
    pub all: CapCounter,

    /// Counts over the resolvers known to minimize or not.
    pub known: CapCounter,

    /// Counts over the resolvers known to minimize.
    pub minimizing: CapCounter,

    /// Resolvers of probes with at least one minimizing resolver.
    pub resolvers_of_minimizing_probes: usize,

    /// Probes whose resolvers all minimize, and their resolvers.
    pub minimizing_only_probes: usize,
    pub minimizing_only_resolvers: usize,
}

impl QnameminSummary {
    /// Counts the accumulators updated on `day`. Accumulators must be
    /// in key order, as they are in a snapshot.
    pub fn count(accumulators: &mut [ResolverAccumulator], tables: &AsnTables, day: NaiveDate) -> Self {
        let mut cache = AsnCache::new();
        let mut summary = Self {
            day,
            all: CapCounter::new(),
            known: CapCounter::new(),
            minimizing: CapCounter::new(),
            resolvers_of_minimizing_probes: 0,
            minimizing_only_probes: 0,
            minimizing_only_resolvers: 0,
        };

        // Per probe: (resolvers, minimizing resolvers).
        let mut probes: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
        for acc in accumulators.iter_mut().filter(|acc| acc.updated_on(day)) {
            let asn = cache.resolve(acc, tables);
            summary.all.count(acc, asn);
            let per_probe = probes.entry(acc.key.probe_id).or_insert((0, 0));
            per_probe.0 += 1;
            match acc.qnamemin {
                Capability::Does => {
                    summary.known.count(acc, asn);
                    summary.minimizing.count(acc, asn);
                    per_probe.1 += 1;
                }
                Capability::DoesNot => summary.known.count(acc, asn),
                Capability::Unknown | Capability::Broken => (),
            }
        }

        for &(resolvers, minimizing) in probes.values().filter(|(_, minimizing)| *minimizing > 0) {
            summary.resolvers_of_minimizing_probes += resolvers;
            if minimizing == resolvers {
                summary.minimizing_only_probes += 1;
                summary.minimizing_only_resolvers += resolvers;
            }
        }
        summary
    }

    /// Returns the share of minimizing resolvers among the resolvers
    /// of probes that have at least one, or 0 if there are none.
    pub fn minimizing_share(&self) -> f64 {
        if self.resolvers_of_minimizing_probes == 0 {
            0.0
        } else {
            self.minimizing.n_resolvers as f64 / self.resolvers_of_minimizing_probes as f64
        }
    }

    /// Writes the summary as one CSV row: the day, the resolvers and
    /// probes known to minimize or not, those known to minimize, the
    /// share of minimizing resolvers on probes that have one, and the
    /// resolvers and probes that only see minimizing resolvers.
    pub fn write_row(&self, writer: &mut impl io::Write) -> io::Result<()> {
        writeln!(
            writer,
            "{},{},{},{},{},{:.6},{},{}",
            self.day.format("%Y-%m-%d"),
            self.known.n_resolvers,
            self.known.n_probes,
            self.minimizing.n_resolvers,
            self.minimizing.n_probes,
            self.minimizing_share(),
            self.minimizing_only_resolvers,
            self.minimizing_only_probes,
        )
    }

    /// Lists the [`TOP_ASNS`] ASNs with the most resolvers in
    /// `counter`.
    pub fn write_top_asns(counter: &CapCounter, writer: &mut impl io::Write) -> io::Result<()> {
        for (asn, count) in counter.ranked_asns().into_iter().take(TOP_ASNS) {
            writeln!(writer, "ASN {:6}, count: {:5}", asn, count)?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::capability::{AccumulatorStore, ResolverKey};

    lazy_static::lazy_static! {
        static ref TABLES: AsnTables = AsnTables::from_routes(
            "192.0.2.0\t24\t64496\n198.51.100.0\t24\t64497\n",
        )
        .0;
    }

    // 2018-06-01T12:00:00Z
    const JUNE_1: u32 = 1_527_854_400;

    fn acc(probe_id: u32, last_octet: u8, qnamemin: Capability, whoami: Ipv4Addr) -> ResolverAccumulator {
        let address = Ipv4Addr::new(10, 0, 0, last_octet);
        let mut acc = ResolverAccumulator::new(ResolverKey::new(probe_id, address.into()));
        acc.updated = JUNE_1;
        acc.qnamemin = qnamemin;
        acc.whoami_a = whoami;
        acc
    }

    /// Round-trips the accumulators through a snapshot, which puts
    /// them in key order.
    fn snapshot(accumulators: Vec<ResolverAccumulator>) -> Vec<ResolverAccumulator> {
        let mut store = AccumulatorStore::new();
        for acc in accumulators {
            let key = acc.key;
            *store.entry(key) = acc;
        }
        let mut octets = Vec::new();
        store.write_to(&mut octets).unwrap();
        crate::capability::decode_snapshot(&octets).unwrap()
    }

    fn summary() -> QnameminSummary {
        let a = Ipv4Addr::new(192, 0, 2, 1);
        let b = Ipv4Addr::new(198, 51, 100, 1);
        let mut stale = acc(5, 1, Capability::Does, a);
        stale.updated = JUNE_1 - 86_400;
        let mut accumulators = snapshot(vec![
            // Probe 1 sees only minimizing resolvers.
            acc(1, 1, Capability::Does, a),
            acc(1, 2, Capability::Does, a),
            // Probe 2 sees one of each, plus an unknown one.
            acc(2, 1, Capability::Does, b),
            acc(2, 2, Capability::DoesNot, a),
            acc(2, 3, Capability::Unknown, a),
            // Probe 3 sees no minimizing resolver.
            acc(3, 1, Capability::DoesNot, b),
            acc(4, 1, Capability::Broken, Ipv4Addr::UNSPECIFIED),
            stale,
        ]);
        QnameminSummary::count(&mut accumulators, &TABLES, NaiveDate::from_ymd_opt(2018, 6, 1).unwrap())
    }

    #[test]
    fn count_works() {
        let summary = summary();
        assert_eq!(summary.all.n_resolvers, 7);
        assert_eq!(summary.all.n_probes, 4);
        assert_eq!((summary.known.n_resolvers, summary.known.n_probes), (5, 3));
        assert_eq!((summary.minimizing.n_resolvers, summary.minimizing.n_probes), (3, 2));
        assert_eq!(summary.resolvers_of_minimizing_probes, 5);
        assert_eq!(summary.minimizing_only_probes, 1);
        assert_eq!(summary.minimizing_only_resolvers, 2);
    }

    #[test]
    fn write_row_works() {
        let mut row = Vec::new();
        summary().write_row(&mut row).unwrap();
        assert_eq!(String::from_utf8(row).unwrap(), "2018-06-01,5,3,3,2,0.600000,2,1\n");
    }

    #[test]
    fn write_top_asns_works() {
        let summary = summary();
        let mut listing = Vec::new();
        QnameminSummary::write_top_asns(&summary.all, &mut listing).unwrap();
        assert_eq!(
            String::from_utf8(listing).unwrap(),
            "ASN  64496, count:     4\nASN  64497, count:     2\nASN     -1, count:     1\n"
        );

        let mut listing = Vec::new();
        QnameminSummary::write_top_asns(&summary.minimizing, &mut listing).unwrap();
        assert_eq!(
            String::from_utf8(listing).unwrap(),
            "ASN  64496, count:     2\nASN  64497, count:     1\n"
        );
    }

    #[test]
    fn empty_day_has_zero_share() {
        let summary = QnameminSummary::count(&mut [], &TABLES, NaiveDate::from_ymd_opt(2018, 6, 1).unwrap());
        assert_eq!(summary.minimizing_share(), 0.0);
        assert_eq!(summary.all.n_resolvers, 0);
    }
}
