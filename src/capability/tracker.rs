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

//! Implementation of [`Tracker`] and the resolver log.

use std::collections::BTreeSet;
use std::io;

use log::{debug, trace, warn};

use super::{
    AccumulatorStore, Capability, Error, Probe, ResolverAccumulator, ResolverKey, Result,
    DNSKEY_ALGORITHM_NAMES, DS_DIGEST_NAMES,
};
use crate::record::{Merge, Record};
use crate::util::format_timestamp;

////////////////////////////////////////////////////////////////////////
// TRACKER                                                            //
////////////////////////////////////////////////////////////////////////

/// Parameters for [`Tracker`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TrackerSettings {
    /// An accumulator is written to the resolver log when its last
    /// update is more than this many seconds after the last time it
    /// was written.
    pub log_interval: u32,

    /// Records more than this many seconds older than an accumulator's
    /// last update are reported as a [`Error::BackwardTimeJump`].
    pub max_backward_jump: u32,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            log_interval: 3600,
            max_backward_jump: 3600,
        }
    }
}

/// Applies records to the accumulators of an [`AccumulatorStore`],
/// optionally writing the resolver log to `W`.
#[derive(Debug)]
pub struct Tracker<W> {
    store: AccumulatorStore,
    settings: TrackerSettings,
    log: Option<W>,
}

/// Counts of what happened during [`Tracker::run`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    pub records: usize,
    pub unknown: usize,
    pub discarded: usize,
}

impl<W: io::Write> Tracker<W> {
    /// Creates a tracker. The log header is not written; see
    /// [`write_log_header`].
    pub fn new(store: AccumulatorStore, settings: TrackerSettings, log: Option<W>) -> Self {
        Self {
            store,
            settings,
            log,
        }
    }

    pub fn store(&self) -> &AccumulatorStore {
        &self.store
    }

    /// Applies one record from the measurement with ID `msm_id`.
    ///
    /// Records older than the accumulator's last update are never
    /// applied; when they are too far behind, this is reported as an
    /// error. Error reports and payloads that are not DNS messages
    /// carry no evidence but still count as updates.
    pub fn process(&mut self, msm_id: u32, record: &Record) -> Result<()> {
        let probe = Probe::from_msm_id(msm_id).ok_or(Error::UnknownMeasurementId(msm_id))?;
        let key = ResolverKey::new(record.probe_id, record.address);
        let acc = self.store.entry(key);

        if acc.updated != 0 && record.time < acc.updated {
            let behind = acc.updated - record.time;
            if behind > self.settings.max_backward_jump {
                return Err(Error::BackwardTimeJump {
                    key,
                    time: record.time,
                    last_updated: acc.updated,
                });
            }
            trace!(
                "Ignoring record for {} from {}: {} seconds behind its last update.",
                key,
                msm_id,
                behind,
            );
            return Ok(());
        }

        if record.is_error {
            trace!(
                "Error report for {} from {}: {}",
                key,
                msm_id,
                String::from_utf8_lossy(record.payload),
            );
        } else if let Some(message) = record.message() {
            probe.apply(acc, message);
        } else {
            debug!("Record for {} from {} is not a DNS message.", key, msm_id);
        }

        if acc.updated == 0 {
            acc.updated = record.time;
            acc.logged = record.time;
        } else if record.time > acc.updated {
            acc.updated = record.time;
        }
        if acc.updated - acc.logged > self.settings.log_interval {
            if let Some(ref mut log) = self.log {
                write_log_row(log, acc)?;
            }
            acc.logged = record.time;
        }
        Ok(())
    }

    /// Applies every record from `merge`. Unknown measurement IDs are
    /// reported once each and backward time jumps each time; failing to
    /// write the log is fatal.
    pub fn run(&mut self, merge: &mut Merge) -> io::Result<RunSummary> {
        let mut summary = RunSummary::default();
        let mut unknown = BTreeSet::new();
        while let Some((msm_id, record)) = merge.next() {
            summary.records += 1;
            match self.process(msm_id, &record) {
                Ok(()) => (),
                Err(Error::UnknownMeasurementId(id)) => {
                    summary.unknown += 1;
                    if unknown.insert(id) {
                        warn!("Unknown measurement ID {}; its records are ignored.", id);
                    }
                }
                Err(err @ Error::BackwardTimeJump { .. }) => {
                    summary.discarded += 1;
                    warn!("{}", err);
                }
                Err(Error::Io(err)) => return Err(err),
            }
        }
        Ok(summary)
    }

    /// Flushes the log and returns the accumulators.
    pub fn finish(mut self) -> io::Result<AccumulatorStore> {
        if let Some(ref mut log) = self.log {
            log.flush()?;
        }
        Ok(self.store)
    }
}

////////////////////////////////////////////////////////////////////////
// RESOLVER LOG                                                       //
////////////////////////////////////////////////////////////////////////

/// Writes the CSV header of the resolver log.
pub fn write_log_header(writer: &mut impl io::Write) -> io::Result<()> {
    write!(
        writer,
        "\"datetime\",\"probe ID\",\"probe resolver\"\
         ,\"o-o.myaddr.l.google.com TXT\",\"whoami.akamai.net A\"\
         ,\"ripe-hackathon6.nlnetlabs.nl AAAA\",\"can_ipv6\"\
         ,\"can_tcp\",\"can_tcp6\",\"ecs_mask\",\"ecs_mask6\",\"does_ecs\"\
         ,\"does_qnamemin\",\"doesnt_qnamemin\"",
    )?;
    for index in 0..4 {
        write!(writer, ",\"hijacked #{}\"", index)?;
    }
    write!(
        writer,
        ",\"does_nxdomain\",\"doesnt_nxdomain\"\
         ,\"has_ta_19036\",\"hasnt_ta_19036\"\
         ,\"has_ta_20326\",\"hasnt_ta_20326\"",
    )?;
    for name in DNSKEY_ALGORITHM_NAMES.iter().chain(&DS_DIGEST_NAMES) {
        write!(
            writer,
            ",\"can_{0}\",\"cannot_{0}\",\"broken_{0}\"",
            name
        )?;
    }
    writeln!(writer)
}

/// Writes one row of the resolver log.
pub fn write_log_row(writer: &mut impl io::Write, acc: &ResolverAccumulator) -> io::Result<()> {
    write!(
        writer,
        "{},{},{}",
        format_timestamp(acc.updated),
        acc.key.probe_id,
        acc.key.ip(),
    )?;
    for address in [acc.whoami_g, acc.whoami_a] {
        write_address(writer, address.is_unspecified(), address)?;
    }
    write_address(writer, acc.whoami_6.is_unspecified(), acc.whoami_6)?;
    write!(
        writer,
        ",{},{},{},{},{},{}",
        u8::from(!acc.whoami_6.is_unspecified()),
        u8::from(acc.tcp_ipv4),
        u8::from(acc.tcp_ipv6),
        acc.ecs_mask,
        acc.ecs_mask6,
        u8::from(acc.ecs_mask != 0 || acc.ecs_mask6 != 0),
    )?;
    write_flags(writer, acc.qnamemin, &[Capability::Does, Capability::DoesNot])?;
    for address in acc.hijacked {
        write_address(writer, address.is_unspecified(), address)?;
    }
    for capability in [acc.nxdomain, acc.has_ta_19036, acc.has_ta_20326] {
        write_flags(writer, capability, &[Capability::Does, Capability::DoesNot])?;
    }
    for capability in acc.dnskey_alg.iter().chain(&acc.ds_alg) {
        write_flags(
            writer,
            *capability,
            &[Capability::Does, Capability::DoesNot, Capability::Broken],
        )?;
    }
    writeln!(writer)
}

fn write_address(
    writer: &mut impl io::Write,
    unspecified: bool,
    address: impl std::fmt::Display,
) -> io::Result<()> {
    if unspecified {
        write!(writer, ",NULL")
    } else {
        write!(writer, ",{}", address)
    }
}

/// Writes a 0/1 column per value in `values`.
fn write_flags(
    writer: &mut impl io::Write,
    capability: Capability,
    values: &[Capability],
) -> io::Result<()> {
    for value in values {
        write!(writer, ",{}", u8::from(capability == *value))?;
    }
    Ok(())
}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::testing::MessageBuilder;
    use crate::rr::Type;
    use std::net::{IpAddr, Ipv4Addr};

    const TCP4: u32 = 8310360;

    lazy_static::lazy_static! {
        static ref RESOLVER: IpAddr = "192.0.2.1".parse().unwrap();
        static ref TCP_ANSWER: Vec<u8> = {
            let name = "1.1.tc.ripe-hackathon4.nlnetlabs.nl.";
            MessageBuilder::new(name, Type::A)
                .answer(name, Type::A, &[198, 51, 100, 53])
                .build()
        };
    }

    fn record(time: u32, payload: &[u8]) -> Record<'_> {
        Record {
            time,
            rtt: 12.5,
            probe_id: 1,
            address: *RESOLVER,
            is_error: false,
            payload,
        }
    }

    fn tracker() -> Tracker<Vec<u8>> {
        Tracker::new(
            AccumulatorStore::new(),
            TrackerSettings::default(),
            Some(Vec::new()),
        )
    }

    fn key() -> ResolverKey {
        ResolverKey::new(1, *RESOLVER)
    }

    #[test]
    fn stale_records_are_discarded() {
        let mut tracker = tracker();
        tracker.process(TCP4, &record(1000, b"")).unwrap();
        let before = tracker.store().get(&key()).cloned().unwrap();
        assert_eq!(before.updated, 1000);

        tracker.process(TCP4, &record(100, &TCP_ANSWER)).unwrap();
        assert_eq!(tracker.store().get(&key()), Some(&before));

        tracker.process(TCP4, &record(3950, &TCP_ANSWER)).unwrap();
        let after = tracker.store().get(&key()).unwrap();
        assert_eq!(after.updated, 3950);
        assert_eq!(after.tcp_ipv4, Capability::CAN);
    }

    #[test]
    fn large_backward_jumps_are_errors() {
        let mut tracker = tracker();
        tracker.process(TCP4, &record(10_000, &TCP_ANSWER)).unwrap();
        match tracker.process(TCP4, &record(5_000, &TCP_ANSWER)) {
            Err(Error::BackwardTimeJump {
                time, last_updated, ..
            }) => assert_eq!((time, last_updated), (5_000, 10_000)),
            other => panic!("unexpected result: {:?}", other),
        }
        tracker.process(TCP4, &record(10_000, &TCP_ANSWER)).unwrap();
    }

    #[test]
    fn unknown_measurements_create_nothing() {
        let mut tracker = tracker();
        assert!(matches!(
            tracker.process(1, &record(1000, &TCP_ANSWER)),
            Err(Error::UnknownMeasurementId(1))
        ));
        assert!(tracker.store().is_empty());
    }

    #[test]
    fn error_reports_only_update_time() {
        let mut tracker = tracker();
        let mut report = record(2000, b"{\"timeout\": 5000}");
        report.is_error = true;
        tracker.process(TCP4, &report).unwrap();
        let acc = tracker.store().get(&key()).unwrap();
        assert_eq!((acc.updated, acc.tcp_ipv4), (2000, Capability::Unknown));
    }

    #[test]
    fn accumulators_are_logged_after_the_interval() {
        let mut tracker = tracker();
        tracker.process(TCP4, &record(1000, &TCP_ANSWER)).unwrap();
        tracker.process(TCP4, &record(4600, &TCP_ANSWER)).unwrap();
        assert!(tracker.log.as_ref().unwrap().is_empty());
        tracker.process(TCP4, &record(5000, &TCP_ANSWER)).unwrap();
        assert_eq!(tracker.store().get(&key()).unwrap().logged, 5000);

        let log = String::from_utf8(tracker.log.take().unwrap()).unwrap();
        let fields: Vec<_> = log.trim_end().split(',').collect();
        assert_eq!(
            &fields[..8],
            &[
                "1970-01-01T01:23:20Z",
                "1",
                "192.0.2.1",
                "NULL",
                "198.51.100.53",
                "NULL",
                "0",
                "1"
            ]
        );
        assert_eq!(fields.len(), 3 + 3 + 1 + 2 + 3 + 2 + 4 + 6 + 14 * 3);
    }

    #[test]
    fn log_header_matches_rows() {
        let mut header = Vec::new();
        write_log_header(&mut header).unwrap();
        let mut row = Vec::new();
        let mut acc = ResolverAccumulator::new(key());
        acc.hijacked[0] = Ipv4Addr::new(203, 0, 113, 1);
        write_log_row(&mut row, &acc).unwrap();
        let header = String::from_utf8(header).unwrap();
        let row = String::from_utf8(row).unwrap();
        assert_eq!(header.split(',').count(), row.split(',').count());
        assert!(row.contains(",203.0.113.1,NULL,NULL,NULL,"));
    }
}
