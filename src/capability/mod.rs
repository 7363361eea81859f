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

//! Per-resolver capability tracking.
//!
//! Every measurement queries a resolver from a probe for a name
//! designed to reveal one behavior (DNSSEC validation of a given
//! algorithm, TCP fallback, QNAME minimization and so on). The results
//! for one (probe, resolver) pair are folded into a
//! [`ResolverAccumulator`], which records what has been learned about
//! that resolver so far. [`Tracker`] drives this over a stream of
//! packed records and writes the periodic resolver log.

use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv6Addr};

mod accumulator;
mod dispatch;
pub mod extract;
mod store;
mod tracker;

pub use accumulator::{
    DualSignal, ResolverAccumulator, DNSKEY_ALGORITHM_NAMES, DS_DIGEST_NAMES, SNAPSHOT_SIZE,
};
pub use dispatch::Probe;
pub use store::{decode_snapshot, AccumulatorStore, SnapshotError};
pub use tracker::{write_log_header, write_log_row, RunSummary, Tracker, TrackerSettings};

////////////////////////////////////////////////////////////////////////
// CAPABILITY VALUES                                                  //
////////////////////////////////////////////////////////////////////////

/// What is known about one capability of a resolver.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u8)]
pub enum Capability {
    /// Nothing has been observed yet.
    #[default]
    Unknown = 0,
    Does = 1,
    DoesNot = 2,

    /// The observations contradict each other.
    Broken = 3,
}

impl Capability {
    pub const CAN: Self = Self::Does;
    pub const CANNOT: Self = Self::DoesNot;

    /// All values, in the order of their numeric representation.
    pub const ALL: [Self; 4] = [Self::Unknown, Self::Does, Self::DoesNot, Self::Broken];

    /// Returns the value as an index in `0..4`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

impl From<u8> for Capability {
    /// Converts from the numeric representation. Only the low two bits
    /// are significant.
    fn from(value: u8) -> Self {
        Self::ALL[usize::from(value & 0b11)]
    }
}

impl From<Capability> for u8 {
    fn from(capability: Capability) -> Self {
        capability as u8
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            Self::Unknown => "unknown",
            Self::Does => "does",
            Self::DoesNot => "does not",
            Self::Broken => "broken",
        };
        f.write_str(text)
    }
}

////////////////////////////////////////////////////////////////////////
// RESOLVER KEYS                                                      //
////////////////////////////////////////////////////////////////////////

/// Identifies a resolver as seen from one probe. IPv4 addresses are
/// stored IPv4-mapped, so keys of both families order together.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ResolverKey {
    pub probe_id: u32,
    pub address: [u8; 16],
}

impl ResolverKey {
    pub fn new(probe_id: u32, address: IpAddr) -> Self {
        let address = match address {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        Self {
            probe_id,
            address: address.octets(),
        }
    }

    /// Returns the resolver address, unmapping IPv4 addresses.
    pub fn ip(&self) -> IpAddr {
        let v6 = Ipv6Addr::from(self.address);
        match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        }
    }
}

impl fmt::Display for ResolverKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}_{}", self.probe_id, self.ip())
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a record could not be applied to an
/// accumulator.
#[derive(Debug)]
pub enum Error {
    /// No extractor is known for the measurement.
    UnknownMeasurementId(u32),

    /// The record is too far behind the accumulator's last update.
    BackwardTimeJump {
        key: ResolverKey,
        time: u32,
        last_updated: u32,
    },

    /// The resolver log could not be written.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::UnknownMeasurementId(id) => write!(f, "unknown measurement ID {}", id),
            Self::BackwardTimeJump {
                key,
                time,
                last_updated,
            } => write!(
                f,
                "discarding record for {} at {}: {} seconds behind its last update",
                key,
                time,
                last_updated - time,
            ),
            Self::Io(err) => write!(f, "failed to write the resolver log: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

/// The type returned by fallible tracking operations.
pub type Result<T> = std::result::Result<T, Error>;

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////
