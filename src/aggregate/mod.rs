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

//! Aggregation of accumulator snapshots into capability reports.
//!
//! A report covers the accumulators of one snapshot that were last
//! updated on the day before the snapshot's date, so that a snapshot
//! taken at the end of each day reports that day's resolvers. Counts
//! are kept in a [`Selection`] tree over all resolvers and in a
//! shallower tree for each of the ASNs with the most resolvers.

use std::io;
use std::path::Path;

use chrono::NaiveDate;
use log::{debug, info};

use crate::asn::AsnTables;
use crate::capability::ResolverAccumulator;

mod counter;
mod descriptor;
mod qnamemin;
mod selection;

pub use counter::{AsnBand, CapCounter};
pub use descriptor::{Descriptor, DESCRIPTORS, N_DESCRIPTORS};
pub use qnamemin::{QnameminSummary, TOP_ASNS};
pub use selection::{Selection, REPORT_FILE_NAME};

////////////////////////////////////////////////////////////////////////
// SETTINGS                                                           //
////////////////////////////////////////////////////////////////////////

/// Parameters of the reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReportSettings {
    /// The number of most common ECS masks listed.
    pub top_ecs_masks: usize,

    /// The number of ASN bands listed.
    pub top_asn_bands: usize,

    /// Bands with more ASNs than this are summarized.
    pub asn_band_listing: usize,

    /// The number of ASNs that get a tree of their own.
    pub asn_selections: usize,

    /// The depth of the tree over all resolvers. Per-ASN trees have
    /// depth 1.
    pub selection_depth: usize,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            top_ecs_masks: 10,
            top_asn_bands: 100,
            asn_band_listing: 20,
            asn_selections: 50,
            selection_depth: 2,
        }
    }
}

////////////////////////////////////////////////////////////////////////
// ASN RESOLUTION                                                     //
////////////////////////////////////////////////////////////////////////

/// Returns the ASN of the resolver behind an accumulator, judged by
/// the addresses the resolver was seen querying from: the first of
/// the whoami TXT, A and AAAA addresses that maps to an ASN. Returns
/// -1 if none does.
pub fn resolver_asn(acc: &ResolverAccumulator, tables: &AsnTables) -> i32 {
    let candidates = [
        (!acc.whoami_g.is_unspecified()).then(|| tables.lookup_v4(acc.whoami_g)),
        (!acc.whoami_a.is_unspecified()).then(|| tables.lookup_v4(acc.whoami_a)),
        (!acc.whoami_6.is_unspecified()).then(|| tables.lookup_v6(acc.whoami_6)),
    ];
    candidates
        .into_iter()
        .flatten()
        .find(|&asn| asn != 0)
        .unwrap_or(-1)
}

/// Memoizes [`resolver_asn`] through the accumulators'
/// `asn_cache_index`.
#[derive(Clone, Debug, Default)]
pub struct AsnCache {
    asns: Vec<i32>,
}

impl AsnCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.asns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.asns.is_empty()
    }

    /// Returns the ASN of the accumulator's resolver, looking it up
    /// and recording it in the cache the first time.
    pub fn resolve(&mut self, acc: &mut ResolverAccumulator, tables: &AsnTables) -> i32 {
        if let Some(index) = (acc.asn_cache_index as usize).checked_sub(1) {
            if let Some(&asn) = self.asns.get(index) {
                return asn;
            }
        }
        let asn = resolver_asn(acc, tables);
        self.asns.push(asn);
        acc.asn_cache_index = self.asns.len() as u32;
        asn
    }
}

////////////////////////////////////////////////////////////////////////
// REPORTS                                                            //
////////////////////////////////////////////////////////////////////////

/// Returns the day reported on for a snapshot named `YYYY-MM-DD.res`:
/// the day before the date in the name.
pub fn report_day(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let date = name.strip_suffix(".res")?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?.pred_opt()
}

/// What [`write_reports`] did.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReportSummary {
    /// Accumulators updated on the reported day.
    pub resolvers: usize,

    /// Distinct ASNs among them, counting -1 for "unknown".
    pub asns: usize,

    /// ASNs that got a tree of their own.
    pub asn_selections: usize,
}

/// Counts the accumulators updated on `day` and appends the reports
/// below `out_dir`: the full tree at the top, and the tree of each of
/// the top ASNs in `AS<n>` subdirectories.
pub fn write_reports(
    accumulators: &mut [ResolverAccumulator],
    tables: &AsnTables,
    day: NaiveDate,
    settings: &ReportSettings,
    out_dir: &Path,
) -> io::Result<ReportSummary> {
    let mut cache = AsnCache::new();
    let mut root = Selection::new(settings.selection_depth);
    debug!("Counting into {} selections.", root.size());
    for acc in accumulators.iter_mut().filter(|acc| acc.updated_on(day)) {
        let asn = cache.resolve(acc, tables);
        root.count(acc, asn);
    }
    root.report(out_dir, settings)?;

    let counter = root.counter();
    info!(
        "Counted {} resolvers of {} probes in {} ASNs.",
        counter.n_resolvers,
        counter.n_probes,
        counter.n_asns(),
    );
    let mut per_asn: Vec<(i32, Selection)> = counter
        .ranked_asns()
        .into_iter()
        .take(settings.asn_selections)
        .map(|(asn, _)| (asn, Selection::new(1)))
        .collect();
    for acc in accumulators.iter_mut().filter(|acc| acc.updated_on(day)) {
        let asn = cache.resolve(acc, tables);
        if let Some((_, selection)) = per_asn.iter_mut().find(|(top, _)| *top == asn) {
            selection.count(acc, asn);
        }
    }
    for (asn, selection) in &per_asn {
        selection.report(&out_dir.join(format!("AS{}", asn)), settings)?;
    }

    Ok(ReportSummary {
        resolvers: counter.n_resolvers,
        asns: counter.n_asns(),
        asn_selections: per_asn.len(),
    })
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Capability, ResolverKey};
    use std::fs;
    use std::net::Ipv4Addr;

    lazy_static::lazy_static! {
        static ref TABLES: AsnTables = AsnTables::from_routes(
            "192.0.2.0\t24\t64496\n\
             198.51.100.0\t24\t64497\n\
             2001:db8::\t32\t64498\n",
        )
        .0;
    }

    // 2018-06-01T12:00:00Z
    const JUNE_1: u32 = 1_527_854_400;

    fn acc(probe_id: u32, updated: u32) -> ResolverAccumulator {
        let mut acc = ResolverAccumulator::new(ResolverKey::new(probe_id, "10.0.0.1".parse().unwrap()));
        acc.updated = updated;
        acc
    }

    #[test]
    fn resolver_asn_prefers_txt_then_a_then_aaaa() {
        let mut acc = acc(1, 0);
        assert_eq!(resolver_asn(&acc, &TABLES), -1);
        acc.whoami_6 = "2001:db8::1".parse().unwrap();
        assert_eq!(resolver_asn(&acc, &TABLES), 64498);
        acc.whoami_a = Ipv4Addr::new(198, 51, 100, 1);
        assert_eq!(resolver_asn(&acc, &TABLES), 64497);
        acc.whoami_g = Ipv4Addr::new(192, 0, 2, 1);
        assert_eq!(resolver_asn(&acc, &TABLES), 64496);

        // Addresses outside every table fall through.
        acc.whoami_g = Ipv4Addr::new(203, 0, 113, 1);
        assert_eq!(resolver_asn(&acc, &TABLES), 64497);
    }

    #[test]
    fn cache_remembers_lookups() {
        let mut cache = AsnCache::new();
        let mut first = acc(1, 0);
        first.whoami_a = Ipv4Addr::new(192, 0, 2, 1);
        assert_eq!(cache.resolve(&mut first, &TABLES), 64496);
        assert_eq!(first.asn_cache_index, 1);

        // The cached value wins over the current addresses.
        first.whoami_a = Ipv4Addr::new(198, 51, 100, 1);
        assert_eq!(cache.resolve(&mut first, &TABLES), 64496);

        let mut second = acc(2, 0);
        assert_eq!(cache.resolve(&mut second, &TABLES), -1);
        assert_eq!(cache.len(), 2);

        // Indices from another run are looked up again.
        let mut stale = acc(3, 0);
        stale.asn_cache_index = 99;
        assert_eq!(cache.resolve(&mut stale, &TABLES), -1);
        assert_eq!(stale.asn_cache_index, 3);
    }

    #[test]
    fn report_day_is_the_day_before() {
        assert_eq!(
            report_day(Path::new("results/2018-06-02.res")),
            NaiveDate::from_ymd_opt(2018, 6, 1)
        );
        assert_eq!(
            report_day(Path::new("2018-03-01.res")),
            NaiveDate::from_ymd_opt(2018, 2, 28)
        );
        assert_eq!(report_day(Path::new("2018-06-02.csv")), None);
        assert_eq!(report_day(Path::new("yesterday.res")), None);
    }

    #[test]
    fn reports_cover_one_day_and_top_asns() {
        let out = std::env::temp_dir().join(format!("dnsthought-reports-{}", std::process::id()));
        let _ = fs::remove_dir_all(&out);

        let mut accumulators = vec![acc(1, JUNE_1), acc(2, JUNE_1 + 60), acc(3, JUNE_1 + 86_400)];
        accumulators[0].whoami_a = Ipv4Addr::new(192, 0, 2, 1);
        accumulators[0].tcp_ipv4 = Capability::CAN;
        accumulators[1].whoami_a = Ipv4Addr::new(192, 0, 2, 2);

        let settings = ReportSettings {
            selection_depth: 1,
            ..ReportSettings::default()
        };
        let day = NaiveDate::from_ymd_opt(2018, 6, 1).unwrap();
        let summary = write_reports(&mut accumulators, &TABLES, day, &settings, &out).unwrap();
        assert_eq!(
            summary,
            ReportSummary {
                resolvers: 2,
                asns: 1,
                asn_selections: 1,
            }
        );
        assert_eq!(accumulators[2].asn_cache_index, 0);

        let report = fs::read_to_string(out.join("can_tcp").join(REPORT_FILE_NAME)).unwrap();
        let row = report.lines().nth(1).unwrap();
        assert!(row.starts_with("2018-06-01T12:00:00Z,1,1,"));
        let per_asn = fs::read_to_string(out.join("AS64496").join(REPORT_FILE_NAME)).unwrap();
        assert!(per_asn.lines().nth(1).unwrap().starts_with("2018-06-01T12:01:00Z,2,2,"));
        fs::remove_dir_all(&out).unwrap();
    }
}
