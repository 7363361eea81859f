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

//! Implementation of [`CapCounter`] and its report rows.

use std::collections::BTreeMap;
use std::io;

use super::descriptor::{DESCRIPTORS, N_DESCRIPTORS};
use super::ReportSettings;
use crate::capability::{Capability, ResolverAccumulator};
use crate::util::format_timestamp;

/// Capability counts over a set of accumulators.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CapCounter {
    pub n_resolvers: usize,
    pub n_probes: usize,
    prev_probe_id: Option<u32>,

    /// The newest update among the counted accumulators.
    pub updated: u32,

    values: [[usize; 4]; N_DESCRIPTORS],
    asns: BTreeMap<i32, usize>,
    ecs_masks: BTreeMap<u8, usize>,
}

/// ASNs that were counted equally often.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AsnBand {
    /// The count of each ASN in the band.
    pub count: usize,
    pub asns: Vec<i32>,
}

impl AsnBand {
    pub fn total(&self) -> usize {
        self.count * self.asns.len()
    }
}

impl CapCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts an accumulator whose resolver belongs to `asn`.
    /// Accumulators must be counted in key order for the probe count
    /// to be right.
    pub fn count(&mut self, acc: &ResolverAccumulator, asn: i32) {
        self.n_resolvers += 1;
        if self.prev_probe_id != Some(acc.key.probe_id) {
            self.prev_probe_id = Some(acc.key.probe_id);
            self.n_probes += 1;
        }
        self.updated = self.updated.max(acc.updated);
        for (counts, descriptor) in self.values.iter_mut().zip(&DESCRIPTORS) {
            counts[(descriptor.get)(acc).index()] += 1;
        }
        *self.asns.entry(asn).or_insert(0) += 1;
        if acc.ecs_mask != 0 {
            *self.ecs_masks.entry(acc.ecs_mask).or_insert(0) += 1;
        }
    }

    /// Returns how many accumulators had `value` for the capability
    /// with index `descriptor`.
    pub fn value_count(&self, descriptor: usize, value: Capability) -> usize {
        self.values[descriptor][value.index()]
    }

    pub fn asn_count(&self, asn: i32) -> usize {
        self.asns.get(&asn).copied().unwrap_or(0)
    }

    pub fn n_asns(&self) -> usize {
        self.asns.len()
    }

    /// Returns the ASNs by descending count, then ascending number.
    pub fn ranked_asns(&self) -> Vec<(i32, usize)> {
        let mut ranked: Vec<_> = self.asns.iter().map(|(&asn, &count)| (asn, count)).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }

    /// Returns the ECS masks by descending count, then ascending mask.
    pub fn ranked_ecs_masks(&self) -> Vec<(u8, usize)> {
        let mut ranked: Vec<_> = self
            .ecs_masks
            .iter()
            .map(|(&mask, &count)| (mask, count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }

    /// Groups the ranked ASNs into bands of equal count.
    pub fn asn_bands(&self) -> Vec<AsnBand> {
        let mut bands: Vec<AsnBand> = Vec::new();
        for (asn, count) in self.ranked_asns() {
            match bands.last_mut() {
                Some(band) if band.count == count => band.asns.push(asn),
                _ => bands.push(AsnBand {
                    count,
                    asns: vec![asn],
                }),
            }
        }
        bands
    }

    /// Writes the CSV header matching [`CapCounter::write_row`].
    pub fn write_header(writer: &mut impl io::Write, settings: &ReportSettings) -> io::Result<()> {
        write!(writer, "\"datetime\",\"# resolvers\",\"# probes\"")?;
        for descriptor in &DESCRIPTORS {
            for name in descriptor.values {
                write!(writer, ",\"{}\"", name)?;
            }
        }
        for n in 1..=settings.top_ecs_masks {
            write!(writer, ",\"ECS mask #{0}\",\"ECS mask #{0} count\"", n)?;
        }
        write!(writer, ",\"Remaining ECS mask count\"")?;
        for n in 1..=settings.top_asn_bands {
            write!(writer, ",\"band #{0} total\",\"band #{0} ASNs\"", n)?;
        }
        writeln!(writer, ",\"Remaining ASNs count\"")
    }

    /// Writes the counts as one CSV row.
    ///
    /// After the per-value counts come the most common ECS masks and
    /// the most common bands of ASNs, each padded to the configured
    /// number of columns and followed by the count of what didn't fit.
    /// Bands with more ASNs than `asn_band_listing` are summarized
    /// instead of listed.
    pub fn write_row(&self, writer: &mut impl io::Write, settings: &ReportSettings) -> io::Result<()> {
        write!(
            writer,
            "{},{},{}",
            format_timestamp(self.updated),
            self.n_resolvers,
            self.n_probes
        )?;
        for (counts, descriptor) in self.values.iter().zip(&DESCRIPTORS) {
            for value in descriptor.known_values() {
                write!(writer, ",{}", counts[value.index()])?;
            }
        }

        let masks = self.ranked_ecs_masks();
        for n in 0..settings.top_ecs_masks {
            match masks.get(n) {
                Some((mask, count)) => write!(writer, ",{},{}", mask, count)?,
                None => write!(writer, ",0,0")?,
            }
        }
        let remaining: usize = masks.iter().skip(settings.top_ecs_masks).map(|(_, count)| count).sum();
        write!(writer, ",{}", remaining)?;

        let bands = self.asn_bands();
        for n in 0..settings.top_asn_bands {
            match bands.get(n) {
                Some(band) if band.asns.len() > settings.asn_band_listing => write!(
                    writer,
                    ",{},\"in {} ASNs ({})\"",
                    band.total(),
                    band.asns.len(),
                    band.count
                )?,
                Some(band) => {
                    let listing: Vec<_> = band.asns.iter().map(|asn| format!("AS{}", asn)).collect();
                    write!(writer, ",{},\"{}\"", band.total(), listing.join(","))?;
                }
                None => write!(writer, ",0,\"\"")?,
            }
        }
        let remaining: usize = bands.iter().skip(settings.top_asn_bands).map(AsnBand::total).sum();
        writeln!(writer, ",{}", remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::ResolverKey;

    fn acc(probe_id: u32, updated: u32, ecs_mask: u8) -> ResolverAccumulator {
        let mut acc = ResolverAccumulator::new(ResolverKey::new(probe_id, "192.0.2.1".parse().unwrap()));
        acc.updated = updated;
        acc.ecs_mask = ecs_mask;
        acc
    }

    fn small_settings() -> ReportSettings {
        ReportSettings {
            top_ecs_masks: 2,
            top_asn_bands: 2,
            asn_band_listing: 2,
            ..ReportSettings::default()
        }
    }

    #[test]
    fn counts_resolvers_probes_and_values() {
        let mut counter = CapCounter::new();
        let mut first = acc(1, 100, 24);
        first.tcp_ipv4 = Capability::CAN;
        counter.count(&first, 64496);
        counter.count(&acc(1, 300, 0), 64496);
        counter.count(&acc(2, 200, 24), -1);

        assert_eq!(counter.n_resolvers, 3);
        assert_eq!(counter.n_probes, 2);
        assert_eq!(counter.updated, 300);
        assert_eq!(counter.value_count(1, Capability::CAN), 1);
        assert_eq!(counter.value_count(1, Capability::Unknown), 2);
        assert_eq!(counter.value_count(3, Capability::Does), 2);
        assert_eq!(counter.asn_count(64496), 2);
        assert_eq!(counter.asn_count(-1), 1);
        assert_eq!(counter.ranked_ecs_masks(), [(24, 2)]);
    }

    #[test]
    fn asns_are_banded_by_count() {
        let mut counter = CapCounter::new();
        for (asn, times) in [(3, 2), (1, 2), (2, 5), (4, 1)] {
            for _ in 0..times {
                counter.count(&acc(1, 0, 0), asn);
            }
        }
        assert_eq!(counter.ranked_asns(), [(2, 5), (1, 2), (3, 2), (4, 1)]);
        let bands = counter.asn_bands();
        assert_eq!(bands.len(), 3);
        assert_eq!(bands[1].asns, [1, 3]);
        assert_eq!(bands[1].total(), 4);
    }

    #[test]
    fn rows_match_the_header() {
        let settings = ReportSettings::default();
        let mut header = Vec::new();
        CapCounter::write_header(&mut header, &settings).unwrap();
        let mut row = Vec::new();
        CapCounter::new().write_row(&mut row, &settings).unwrap();
        let header = String::from_utf8(header).unwrap();
        let row = String::from_utf8(row).unwrap();
        assert_eq!(header.split(',').count(), row.split(',').count());
        assert!(row.starts_with("1970-01-01T00:00:00Z,0,0,"));
    }

    #[test]
    fn rows_summarize_large_bands_and_remainders() {
        let mut counter = CapCounter::new();
        for (probe_id, mask) in [(1, 24), (2, 24), (3, 20), (4, 16)] {
            counter.count(&acc(probe_id, 0, mask), 64496);
        }
        for asn in [64500, 64501, 64502] {
            counter.count(&acc(5, 0, 0), asn);
        }
        counter.count(&acc(6, 0, 0), 64999);

        let mut row = Vec::new();
        counter.write_row(&mut row, &small_settings()).unwrap();
        let row = String::from_utf8(row).unwrap();
        // Skip the timestamp, resolver and probe counts and the
        // per-value counts.
        let tail = row.splitn(3 + 4 + 2 * 4 + 3 * 14 + 1, ',').last().unwrap();
        assert_eq!(
            tail,
            "24,2,16,1,1,4,\"AS64496\",4,\"in 4 ASNs (1)\",0\n"
        );
    }
}
