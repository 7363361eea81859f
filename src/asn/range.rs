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

//! Implementation of [`RangeTable`], an ordered table of disjoint
//! address ranges mapping to ASNs.

use std::fmt;

////////////////////////////////////////////////////////////////////////
// KEYS                                                               //
////////////////////////////////////////////////////////////////////////

/// An integer type addresses are mapped to for range lookups: [`u32`]
/// for IPv4 and [`u128`] for IPv6.
pub trait RangeKey: Copy + Ord + fmt::Debug + fmt::LowerHex {
    /// The number of bits in the key.
    const BITS: u32;

    /// The largest key.
    const MAX: Self;

    /// Returns the end of the prefix of length `mask` starting at
    /// `self`, or [`None`] if `mask` is longer than the key. The end
    /// saturates at [`RangeKey::MAX`]. Since ranges are half-open,
    /// [`RangeKey::MAX`] itself is never covered, and a host route for
    /// it comes out empty.
    fn prefix_end(self, mask: u32) -> Option<Self>;

    /// Parses a key written in hexadecimal.
    fn from_hex(text: &str) -> Option<Self>;
}

macro_rules! impl_range_key {
    ($t:ty) => {
        impl RangeKey for $t {
            const BITS: u32 = <$t>::BITS;
            const MAX: Self = <$t>::MAX;

            fn prefix_end(self, mask: u32) -> Option<Self> {
                if mask > Self::BITS {
                    None
                } else {
                    let size = (1 as $t).checked_shl(Self::BITS - mask);
                    Some(size.and_then(|size| self.checked_add(size)).unwrap_or(Self::MAX))
                }
            }

            fn from_hex(text: &str) -> Option<Self> {
                <$t>::from_str_radix(text, 16).ok()
            }
        }
    };
}

impl_range_key!(u32);
impl_range_key!(u128);

////////////////////////////////////////////////////////////////////////
// RANGES                                                             //
////////////////////////////////////////////////////////////////////////

/// A half-open range of keys, `[from, till)`, owned by an ASN.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Range<K> {
    pub from: K,
    pub till: K,
    pub asn: i32,
}

impl<K: RangeKey> Range<K> {
    pub fn new(from: K, till: K, asn: i32) -> Self {
        Self { from, till, asn }
    }

    pub fn contains(&self, key: K) -> bool {
        self.from <= key && key < self.till
    }
}

impl<K: RangeKey> fmt::Display for Range<K> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:x}-{:x} AS{}", self.from, self.till, self.asn)
    }
}

////////////////////////////////////////////////////////////////////////
// RANGE TABLE                                                        //
////////////////////////////////////////////////////////////////////////

/// An ordered table of ranges.
///
/// The ranges are kept sorted and pairwise disjoint, and two ranges
/// that abut each other never have the same ASN. Lookups are a binary
/// search. The table is built with [`RangeTable::insert`], where a new
/// range takes precedence over the parts of an existing range it
/// overlaps; this way, when routes are inserted with less specific
/// prefixes first, more specific routes carve their owners out of the
/// covering ranges.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RangeTable<K> {
    ranges: Vec<Range<K>>,
}

impl<K: RangeKey> RangeTable<K> {
    pub fn new() -> Self {
        Self { ranges: Vec::new() }
    }

    /// Creates a table from ranges that are already sorted, disjoint,
    /// and coalesced. Returns the index of the first offending range
    /// otherwise.
    pub fn from_sorted(ranges: Vec<Range<K>>) -> Result<Self, usize> {
        for (index, range) in ranges.iter().enumerate() {
            if range.from >= range.till {
                return Err(index);
            }
            if index > 0 {
                let prev = &ranges[index - 1];
                if prev.till > range.from || (prev.till == range.from && prev.asn == range.asn) {
                    return Err(index);
                }
            }
        }
        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[Range<K>] {
        &self.ranges
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Returns the ASN owning `key`, or 0 if no range contains it.
    pub fn lookup(&self, key: K) -> i32 {
        let index = self.ranges.partition_point(|range| range.from <= key);
        match index.checked_sub(1).map(|index| &self.ranges[index]) {
            Some(range) if key < range.till => range.asn,
            _ => 0,
        }
    }

    /// Narrows down the position of `key` among the ranges' start
    /// keys. This returns `(i, i)` when `key` is at or before the start
    /// of the first range, at or after the start of the last range, or
    /// equal to the start of range `i`. Otherwise `key` lies strictly
    /// between the starts of ranges `lo` and `hi = lo + 1`, and
    /// `(lo, hi)` is returned. The table must not be empty.
    pub fn bracket(&self, key: K) -> (usize, usize) {
        let ranges = &self.ranges;
        let mut lo = 0;
        let mut hi = ranges.len() - 1;
        while hi > lo {
            if key <= ranges[lo].from {
                return (lo, lo);
            }
            if key >= ranges[hi].from {
                return (hi, hi);
            }
            let i = (lo + hi) / 2;
            if key == ranges[i].from {
                return (i, i);
            } else if key > ranges[i].from {
                if lo == i {
                    break;
                }
                lo = i;
            } else {
                if hi == i {
                    break;
                }
                hi = i;
            }
        }
        (lo.min(hi), lo.max(hi))
    }

    /// Inserts a range. Where the new range overlaps an existing range
    /// with a different ASN, the existing range is split and the new
    /// range takes over the overlapped part.
    ///
    /// A new range may overlap at most one existing range, and must
    /// start inside it if it does. One that overlaps the start of a
    /// range is refused with [`InsertError::Overlap`], leaving the table
    /// unchanged.
    pub fn insert(&mut self, new: Range<K>) -> Result<(), InsertError> {
        if new.from >= new.till {
            return Err(InsertError::Empty);
        }
        if self.ranges.is_empty() {
            self.ranges.push(new);
            return Ok(());
        }

        let (lo, _) = self.bracket(new.from);
        let existing = self.ranges[lo];
        if new.from < existing.from {
            // Before the first range.
            if new.till > existing.from {
                return Err(InsertError::Overlap);
            }
            self.ranges.insert(0, new);
            self.coalesce();
            return Ok(());
        }

        // The new range starts in or after `existing`; it must end
        // before the next range does.
        let limit = self.ranges.get(lo + 1).map(|next| next.from);
        if new.till > existing.till && limit.map_or(false, |limit| new.till > limit) {
            return Err(InsertError::Overlap);
        }

        if new.from == existing.from {
            if new.till < existing.till {
                // Same start, shorter: split off the left part.
                if new.asn != existing.asn {
                    self.ranges[lo].from = new.till;
                    self.ranges.insert(lo, new);
                }
            } else {
                // Same start, at least as long: take over.
                self.ranges[lo] = new;
            }
        } else if new.from < existing.till {
            if new.till < existing.till {
                // Strictly inside: three-way split.
                if new.asn != existing.asn {
                    self.ranges[lo].till = new.from;
                    self.ranges.insert(lo + 1, new);
                    self.ranges.insert(
                        lo + 2,
                        Range::new(new.till, existing.till, existing.asn),
                    );
                }
            } else if new.asn == existing.asn {
                self.ranges[lo].till = new.till;
            } else {
                // Ends at or after the end: two-way split.
                self.ranges[lo].till = new.from;
                self.ranges.insert(lo + 1, new);
            }
        } else if new.from == existing.till && new.asn == existing.asn {
            self.ranges[lo].till = new.till;
        } else {
            self.ranges.insert(lo + 1, new);
        }

        self.coalesce();
        Ok(())
    }

    /// Merges abutting ranges with the same ASN.
    fn coalesce(&mut self) {
        self.ranges.dedup_by(|next, prev| {
            if prev.till == next.from && prev.asn == next.asn {
                prev.till = next.till;
                true
            } else {
                false
            }
        });
    }
}

////////////////////////////////////////////////////////////////////////
// ERRORS                                                             //
////////////////////////////////////////////////////////////////////////

/// An error signaling that a range could not be inserted.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum InsertError {
    /// The range contains no keys.
    Empty,

    /// The range overlaps the start of an existing range.
    Overlap,
}

impl fmt::Display for InsertError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Empty => f.write_str("range is empty"),
            Self::Overlap => f.write_str("range overlaps the start of an existing range"),
        }
    }
}

impl std::error::Error for InsertError {}

////////////////////////////////////////////////////////////////////////
// TESTS                                                              //
////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    fn table(ranges: &[(u32, u32, i32)]) -> RangeTable<u32> {
        let mut table = RangeTable::new();
        for &(from, till, asn) in ranges {
            table.insert(Range::new(from, till, asn)).unwrap();
        }
        table
    }

    fn triples(table: &RangeTable<u32>) -> Vec<(u32, u32, i32)> {
        table
            .ranges()
            .iter()
            .map(|range| (range.from, range.till, range.asn))
            .collect()
    }

    fn check_invariant<K: RangeKey>(table: &RangeTable<K>) {
        for range in table.ranges() {
            assert!(range.from < range.till);
        }
        for pair in table.ranges().windows(2) {
            assert!(pair[0].till <= pair[1].from);
            assert!(pair[0].till < pair[1].from || pair[0].asn != pair[1].asn);
        }
    }

    #[test]
    fn lookup_works() {
        let table = table(&[(0, 100, 1), (100, 200, 2)]);
        assert_eq!(table.lookup(50), 1);
        assert_eq!(table.lookup(150), 2);
        assert_eq!(table.lookup(250), 0);
        assert_eq!(table.lookup(100), 2);
        assert_eq!(RangeTable::<u32>::new().lookup(5), 0);
    }

    #[test]
    fn bracket_works() {
        let table = table(&[(10, 20, 1), (30, 40, 2), (50, 60, 3), (70, 80, 4)]);
        assert_eq!(table.bracket(5), (0, 0));
        assert_eq!(table.bracket(10), (0, 0));
        assert_eq!(table.bracket(35), (1, 2));
        assert_eq!(table.bracket(50), (2, 2));
        assert_eq!(table.bracket(55), (2, 3));
        assert_eq!(table.bracket(90), (3, 3));
    }

    #[test]
    fn insert_splits_left() {
        let table = table(&[(0, 100, 1), (0, 40, 2)]);
        assert_eq!(triples(&table), vec![(0, 40, 2), (40, 100, 1)]);
    }

    #[test]
    fn insert_replaces_exact_match() {
        let table = table(&[(0, 100, 1), (100, 200, 3), (0, 100, 2)]);
        assert_eq!(triples(&table), vec![(0, 100, 2), (100, 200, 3)]);
    }

    #[test]
    fn insert_splits_three_ways() {
        let table = table(&[(0, 100, 1), (40, 60, 2)]);
        assert_eq!(triples(&table), vec![(0, 40, 1), (40, 60, 2), (60, 100, 1)]);
    }

    #[test]
    fn insert_splits_right() {
        let table = table(&[(0, 100, 1), (60, 100, 2)]);
        assert_eq!(triples(&table), vec![(0, 60, 1), (60, 100, 2)]);
    }

    #[test]
    fn insert_extends_and_appends() {
        let table = table(&[(0, 100, 1), (100, 200, 1), (200, 300, 2), (400, 500, 2)]);
        assert_eq!(triples(&table), vec![(0, 200, 1), (200, 300, 2), (400, 500, 2)]);
    }

    #[test]
    fn insert_same_owner_is_noop() {
        let table = table(&[(0, 100, 1), (0, 50, 1), (20, 30, 1), (50, 100, 1)]);
        assert_eq!(triples(&table), vec![(0, 100, 1)]);
    }

    #[test]
    fn insert_into_straddled_range() {
        let table = table(&[(0, 100, 1), (200, 300, 2), (400, 500, 3), (210, 220, 4)]);
        assert_eq!(
            triples(&table),
            vec![(0, 100, 1), (200, 210, 2), (210, 220, 4), (220, 300, 2), (400, 500, 3)]
        );
    }

    #[test]
    fn insert_fills_gaps_and_coalesces() {
        let table = table(&[(200, 300, 1), (0, 100, 1), (100, 200, 1)]);
        assert_eq!(triples(&table), vec![(0, 300, 1)]);
    }

    #[test]
    fn insert_refuses_bad_ranges() {
        let mut table = table(&[(100, 200, 1), (300, 400, 2)]);
        let before = table.clone();
        assert_eq!(table.insert(Range::new(50, 150, 3)), Err(InsertError::Overlap));
        assert_eq!(table.insert(Range::new(150, 350, 3)), Err(InsertError::Overlap));
        assert_eq!(table.insert(Range::new(250, 250, 3)), Err(InsertError::Empty));
        assert_eq!(table, before);
    }

    #[test]
    fn insert_matches_painting_model() {
        const SPACE: usize = 256;
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let mut table = RangeTable::<u32>::new();
            let mut model = [0i32; SPACE];
            for _ in 0..100 {
                let from = rng.gen_range(0..SPACE as u32);
                let till = rng.gen_range(from + 1..=SPACE as u32);
                let asn = rng.gen_range(1..4);
                if table.insert(Range::new(from, till, asn)).is_ok() {
                    for owner in &mut model[from as usize..till as usize] {
                        *owner = asn;
                    }
                }
                check_invariant(&table);
            }
            for (key, owner) in model.iter().enumerate() {
                assert_eq!(table.lookup(key as u32), *owner);
            }
        }
    }

    #[test]
    fn prefix_end_saturates() {
        assert_eq!(0x0a00_0000u32.prefix_end(8), Some(0x0b00_0000));
        assert_eq!(0xff00_0000u32.prefix_end(8), Some(u32::MAX));
        assert_eq!(0u32.prefix_end(0), Some(u32::MAX));
        assert_eq!(0u32.prefix_end(33), None);
        assert_eq!(1u128.prefix_end(128), Some(2));
        assert_eq!(0u128.prefix_end(0), Some(u128::MAX));
    }

    #[test]
    fn from_sorted_validates() {
        let ranges = vec![Range::new(0u32, 10, 1), Range::new(10, 20, 2)];
        assert!(RangeTable::from_sorted(ranges).is_ok());
        let ranges = vec![Range::new(0u32, 10, 1), Range::new(10, 20, 1)];
        assert_eq!(RangeTable::from_sorted(ranges), Err(1));
        let ranges = vec![Range::new(0u32, 10, 1), Range::new(5, 20, 2)];
        assert_eq!(RangeTable::from_sorted(ranges), Err(1));
    }
}
