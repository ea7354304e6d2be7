use std::io::BufRead;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};

use super::{
    error::{LogKind, ParseError, ParseReason, Result},
    lookup::OwnerLookup,
    record::{decode_scan, decode_scan_range, is_comment, log_lines, GraphEdge, HeapBounds, ScanEntry},
    ParseMode,
};

/// Edges of one scan log, in scan order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanGraph {
    pub edges: Vec<GraphEdge>,
    pub bounds: Option<HeapBounds>,
}

pub struct Resolver<L> {
    lookup: L,
}

impl<L: OwnerLookup> Resolver<L> {
    pub fn new(lookup: L) -> Self {
        Self { lookup }
    }

    /// Owning base of `address`, or the address itself when it lies outside
    /// every allocation.
    #[inline]
    pub fn resolve(&self, address: u64) -> u64 {
        self.lookup.find_owner(address).unwrap_or(address)
    }

    #[inline]
    pub fn edge(&self, ScanEntry { address, value }: ScanEntry) -> GraphEdge {
        let from = self.resolve(address);
        log::trace!("{address:#x} -> {value:#x} anchored at {from:#x}");
        GraphEdge { from, to: value }
    }

    /// Lazily resolve `lines`. Stops after the first malformed line.
    pub fn edges<I, S>(&self, lines: I) -> Edges<'_, L, I::IntoIter>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Edges { resolver: self, lines: lines.into_iter().enumerate(), done: false }
    }

    pub fn resolve_all<R: BufRead>(&self, reader: R, mode: ParseMode) -> Result<ScanGraph> {
        let (entries, bounds) = read_scan(reader, mode)?;
        let edges = entries.into_iter().map(|e| self.edge(e)).collect();
        Ok(ScanGraph { edges, bounds })
    }
}

impl<L: OwnerLookup + Sync> Resolver<L> {
    /// Same output as [`Resolver::resolve_all`]; lookups run on the current
    /// rayon pool and are collected back in scan order.
    pub fn resolve_all_parallel<R: BufRead>(&self, reader: R, mode: ParseMode) -> Result<ScanGraph> {
        let (entries, bounds) = read_scan(reader, mode)?;
        let edges = entries.par_iter().map(|&e| self.edge(e)).collect();
        Ok(ScanGraph { edges, bounds })
    }
}

pub struct Edges<'a, L, I> {
    resolver: &'a Resolver<L>,
    lines: core::iter::Enumerate<I>,
    done: bool,
}

impl<L, I, S> Iterator for Edges<'_, L, I>
where
    L: OwnerLookup,
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    type Item = Result<GraphEdge>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        for (idx, line) in self.lines.by_ref() {
            let line = line.as_ref();
            match decode_scan(line) {
                Ok(Some(entry)) => return Some(Ok(self.resolver.edge(entry))),
                Ok(None) => continue,
                Err(reason) => {
                    self.done = true;
                    let err = ParseError { log: LogKind::Scan, line: idx + 1, content: line.to_string(), reason };
                    return Some(Err(err.into()));
                }
            }
        }
        None
    }
}

fn read_scan<R: BufRead>(reader: R, mode: ParseMode) -> Result<(Vec<ScanEntry>, Option<HeapBounds>)> {
    let mut entries = Vec::new();
    let mut bounds = None;
    for (idx, line) in log_lines(reader).enumerate() {
        let line = match line? {
            Ok(line) => line,
            Err(content) => {
                let reason = ParseReason::InvalidUtf8;
                mode.reject(ParseError { log: LogKind::Scan, line: idx + 1, content, reason })?;
                continue;
            }
        };
        if is_comment(line.trim_start()) {
            if let Some(range) = decode_scan_range(line.trim()) {
                log::debug!("scan range {:#x}-{:#x}", range.start, range.end);
                bounds = Some(range);
            }
            continue;
        }
        match decode_scan(&line) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(reason) => mode.reject(ParseError { log: LogKind::Scan, line: idx + 1, content: line, reason })?,
        }
    }
    log::debug!("{} scan entries", entries.len());
    Ok((entries, bounds))
}

#[cfg(test)]
use super::{lookup::IntervalIndex, record::AllocationRecord, table::AllocationTable};

#[cfg(test)]
const SCAN_LOG: &str = "\
# Scanning heap range: 0x1000 to 0x3000
0x1070 -> 0x20
0x99999 -> 0x1
0x1069 -> 0x1080
0x1070 -> 0x20

0x1090 -> 0x1069
";

#[cfg(test)]
fn sample_table() -> AllocationTable {
    AllocationTable::from_records([
        AllocationRecord { base: 4199, size: 16 },
        AllocationRecord { base: 0x1080, size: 32 },
    ])
}

#[test]
fn test_resolve_anchor() {
    let table = sample_table();
    let resolver = Resolver::new(&table);
    assert_eq!(resolver.resolve(0x1070), 0x1067);
    assert_eq!(resolver.resolve(0x99999), 0x99999);
    assert_eq!(resolver.edge(ScanEntry { address: 0x1070, value: 0x20 }), GraphEdge { from: 4199, to: 0x20 });
}

#[test]
fn test_resolve_all_keeps_order_and_duplicates() {
    let table = sample_table();
    let graph = Resolver::new(&table).resolve_all(SCAN_LOG.as_bytes(), ParseMode::Strict).unwrap();
    assert_eq!(graph.bounds, Some(HeapBounds { start: 0x1000, end: 0x3000 }));
    assert_eq!(
        graph.edges,
        [
            GraphEdge { from: 0x1067, to: 0x20 },
            GraphEdge { from: 0x99999, to: 0x1 },
            GraphEdge { from: 0x1067, to: 0x1080 },
            GraphEdge { from: 0x1067, to: 0x20 },
            GraphEdge { from: 0x1080, to: 0x1069 },
        ]
    );
}

#[test]
fn test_lazy_edges_match_resolve_all() {
    let table = sample_table();
    let resolver = Resolver::new(IntervalIndex::new(&table));
    let lazy = resolver.edges(SCAN_LOG.lines()).collect::<Result<Vec<_>>>().unwrap();
    let eager = resolver.resolve_all(SCAN_LOG.as_bytes(), ParseMode::Strict).unwrap();
    assert_eq!(lazy, eager.edges);
}

#[test]
fn test_parallel_matches_sequential() {
    let table = sample_table();
    let resolver = Resolver::new(&table);
    let log = (0..5000u64).map(|i| format!("{:#x} -> {:#x}\n", 0x1000 + i * 8, i)).collect::<String>();
    let seq = resolver.resolve_all(log.as_bytes(), ParseMode::Strict).unwrap();
    let par = resolver.resolve_all_parallel(log.as_bytes(), ParseMode::Strict).unwrap();
    assert_eq!(seq.edges.len(), 5000);
    assert_eq!(seq, par);
}

#[test]
fn test_edges_stop_at_first_error() {
    let table = sample_table();
    let resolver = Resolver::new(&table);
    let mut edges = resolver.edges(["# header", "0x1070 -> 0x20", "0x1070 => 0x20", "0x1 -> 0x2"]);
    assert_eq!(edges.next().unwrap().unwrap(), GraphEdge { from: 0x1067, to: 0x20 });
    let err = edges.next().unwrap().unwrap_err();
    assert_eq!(err.to_string(), "scan log line 3: missing `->` separator: `0x1070 => 0x20`");
    assert!(edges.next().is_none());
}

#[test]
fn test_resolve_all_fail_fast_and_lenient() {
    let table = sample_table();
    let resolver = Resolver::new(&table);
    let log = "0x1070 -> 0x20\n0x1070 -> 0xzz\n0x99999 -> 0x1\n";

    let err = resolver.resolve_all(log.as_bytes(), ParseMode::Strict).unwrap_err();
    assert_eq!(err.to_string(), "scan log line 2: invalid hex `0xzz`: `0x1070 -> 0xzz`");

    let graph = resolver.resolve_all(log.as_bytes(), ParseMode::Lenient).unwrap();
    assert_eq!(graph.edges, [GraphEdge { from: 0x1067, to: 0x20 }, GraphEdge { from: 0x99999, to: 0x1 }]);
}

#[test]
fn test_resolve_all_invalid_utf8() {
    let table = sample_table();
    let resolver = Resolver::new(&table);
    let log = &b"0x1070 -> 0x20\n0x10\xff -> 0x20\n0x99999 -> 0x1\n"[..];

    let err = resolver.resolve_all(log, ParseMode::Strict).unwrap_err();
    assert_eq!(err.to_string(), "scan log line 2: invalid utf-8: `0x10\u{fffd} -> 0x20`");

    for graph in [
        resolver.resolve_all(log, ParseMode::Lenient).unwrap(),
        resolver.resolve_all_parallel(log, ParseMode::Lenient).unwrap(),
    ] {
        assert_eq!(graph.edges, [GraphEdge { from: 0x1067, to: 0x20 }, GraphEdge { from: 0x99999, to: 0x1 }]);
    }
}
