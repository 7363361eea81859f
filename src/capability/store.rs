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

//! Implementation of [`AccumulatorStore`] and the snapshot file format.

use std::collections::btree_map::{BTreeMap, Entry};
use std::fmt;
use std::io;

use log::debug;

use super::{ResolverAccumulator, ResolverKey, SNAPSHOT_SIZE};

/// The accumulators of one processing run, ordered by key.
#[derive(Clone, Debug, Default)]
pub struct AccumulatorStore {
    accumulators: BTreeMap<ResolverKey, ResolverAccumulator>,
}

impl AccumulatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a snapshot, dropping accumulators last updated before
    /// `forget_before`. ASN cache indices are reset, since the cache
    /// they pointed into is gone.
    pub fn from_snapshot(octets: &[u8], forget_before: u32) -> Result<Self, SnapshotError> {
        let mut store = Self::new();
        let mut forgotten = 0;
        for mut acc in decode_snapshot(octets)? {
            if acc.updated < forget_before {
                forgotten += 1;
                continue;
            }
            acc.asn_cache_index = 0;
            store.accumulators.insert(acc.key, acc);
        }
        debug!(
            "Loaded {} resolvers from the snapshot; forgot {} last updated before {}.",
            store.len(),
            forgotten,
            forget_before,
        );
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.accumulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulators.is_empty()
    }

    pub fn get(&self, key: &ResolverKey) -> Option<&ResolverAccumulator> {
        self.accumulators.get(key)
    }

    /// Returns the accumulator for `key`, creating an empty one if
    /// there is none yet.
    pub fn entry(&mut self, key: ResolverKey) -> &mut ResolverAccumulator {
        match self.accumulators.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(ResolverAccumulator::new(key)),
        }
    }

    /// Iterates over the accumulators in key order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolverAccumulator> {
        self.accumulators.values()
    }

    /// Writes the snapshot of all accumulators in key order.
    pub fn write_to(&self, writer: &mut impl io::Write) -> io::Result<()> {
        for acc in self.iter() {
            writer.write_all(&acc.to_bytes())?;
        }
        Ok(())
    }
}

/// Decodes every accumulator in a snapshot, in file order.
pub fn decode_snapshot(octets: &[u8]) -> Result<Vec<ResolverAccumulator>, SnapshotError> {
    if octets.len() % SNAPSHOT_SIZE != 0 {
        return Err(SnapshotError::PartialRecord {
            length: octets.len(),
        });
    }
    Ok(octets
        .chunks_exact(SNAPSHOT_SIZE)
        .filter_map(|chunk| <&[u8; SNAPSHOT_SIZE]>::try_from(chunk).ok())
        .map(ResolverAccumulator::from_bytes)
        .collect())
}

/// An error signaling that a snapshot is malformed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SnapshotError {
    /// The length is not a multiple of the accumulator size.
    PartialRecord { length: usize },
}

impl fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::PartialRecord { length } => write!(
                f,
                "snapshot length {} is not a multiple of {}",
                length, SNAPSHOT_SIZE
            ),
        }
    }
}

impl std::error::Error for SnapshotError {}
