use core::cmp::Ordering;

use super::{record::AllocationRecord, table::AllocationTable};

/// Maps a heap address to the base of the allocation that owns it.
///
/// When ranges overlap the record that comes first in the allocation log
/// wins. Every implementation must follow that order.
pub trait OwnerLookup {
    fn find_owner(&self, address: u64) -> Option<u64>;
}

impl<L: OwnerLookup + ?Sized> OwnerLookup for &L {
    #[inline]
    fn find_owner(&self, address: u64) -> Option<u64> {
        (**self).find_owner(address)
    }
}

impl OwnerLookup for AllocationTable {
    #[inline]
    fn find_owner(&self, address: u64) -> Option<u64> {
        self.records().iter().find(|r| r.contains(address)).map(|r| r.base)
    }
}

struct Interval {
    base: u64,
    end: u64,
    order: usize,
}

impl PartialEq for Interval {
    fn eq(&self, other: &Interval) -> bool {
        self.base == other.base && self.order == other.order
    }
}

impl Eq for Interval {}

impl Ord for Interval {
    fn cmp(&self, other: &Interval) -> Ordering {
        self.base.cmp(&other.base).then(self.order.cmp(&other.order))
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Interval) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Allocations sorted by base with the running maximum of their inclusive
/// ends, so a lookup only walks the intervals that can still reach the point.
#[derive(Default)]
pub struct IntervalIndex {
    intervals: Vec<Interval>,
    reach: Vec<u64>,
}

impl IntervalIndex {
    pub fn new(table: &AllocationTable) -> Self {
        table.records().iter().copied().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }
}

impl FromIterator<AllocationRecord> for IntervalIndex {
    fn from_iter<T: IntoIterator<Item = AllocationRecord>>(iter: T) -> Self {
        let mut intervals = iter
            .into_iter()
            .enumerate()
            .map(|(order, r)| Interval { base: r.base, end: r.end(), order })
            .collect::<Vec<_>>();
        intervals.sort_unstable();
        let reach = intervals
            .iter()
            .scan(0, |max, i| {
                *max = i.end.max(*max);
                Some(*max)
            })
            .collect();
        log::debug!("interval index over {} allocations", intervals.len());
        Self { intervals, reach }
    }
}

impl OwnerLookup for IntervalIndex {
    fn find_owner(&self, address: u64) -> Option<u64> {
        let idx = self.intervals.partition_point(|i| i.base <= address);
        self.intervals[..idx]
            .iter()
            .zip(&self.reach[..idx])
            .rev()
            .take_while(|&(_, &reach)| reach >= address)
            .filter(|(i, _)| i.end >= address)
            .min_by_key(|(i, _)| i.order)
            .map(|(i, _)| i.base)
    }
}

#[cfg(test)]
fn table(records: &[(u64, u64)]) -> AllocationTable {
    AllocationTable::from_records(records.iter().map(|&(base, size)| AllocationRecord { base, size }))
}

#[test]
fn test_find_owner_containment() {
    let table = table(&[(4199, 16), (0x2000, 0x100), (0x3000, 0)]);
    let index = IntervalIndex::new(&table);
    for lookup in [&table as &dyn OwnerLookup, &index] {
        assert_eq!(lookup.find_owner(4199), Some(4199));
        assert_eq!(lookup.find_owner(0x1070), Some(4199));
        assert_eq!(lookup.find_owner(4215), Some(4199));
        assert_eq!(lookup.find_owner(4216), None);
        assert_eq!(lookup.find_owner(0x20ff), Some(0x2000));
        assert_eq!(lookup.find_owner(0x2100), Some(0x2000));
        assert_eq!(lookup.find_owner(0x3000), Some(0x3000));
        assert_eq!(lookup.find_owner(0x3001), None);
        assert_eq!(lookup.find_owner(0), None);
        assert_eq!(lookup.find_owner(0x99999), None);
    }
}

#[test]
fn test_find_owner_first_match() {
    // contiguous chunks share the boundary byte, a reused base appears twice
    let table = table(&[(0x1010, 0x10), (0x1000, 0x10), (0x1000, 0x40), (0x0f00, 0x1000)]);
    let index = IntervalIndex::new(&table);
    for lookup in [&table as &dyn OwnerLookup, &index] {
        assert_eq!(lookup.find_owner(0x1010), Some(0x1010));
        assert_eq!(lookup.find_owner(0x1008), Some(0x1000));
        assert_eq!(lookup.find_owner(0x1030), Some(0x1000));
        assert_eq!(lookup.find_owner(0x1800), Some(0x0f00));
        assert_eq!(lookup.find_owner(0x0f00), Some(0x0f00));
    }
}

#[test]
fn test_index_agrees_with_linear_scan() {
    let mut records = Vec::new();
    let mut seed = 0x2545f4914f6cdd1du64;
    for _ in 0..200 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        records.push((0x1000 + (seed % 0x800), seed % 0x40));
    }
    let table = table(&records);
    let index = IntervalIndex::new(&table);
    assert_eq!(index.len(), table.len());
    for address in 0x0ff0..0x1900 {
        assert_eq!(index.find_owner(address), table.find_owner(address), "address {address:#x}");
    }
}

#[test]
fn test_empty_index() {
    let index = IntervalIndex::new(&AllocationTable::default());
    assert!(index.is_empty());
    assert_eq!(index.find_owner(0x1000), None);
}
